use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;

use super::{ModStorage, StorageError};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Mods folder hosted as a directory in a GitHub repository, driven through
/// the contents API. Updates and deletions need the current blob sha, so
/// writes are a lookup followed by the mutation.
#[derive(Debug)]
pub struct GithubStorage {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    path: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    sha: String,
}

impl GithubStorage {
    pub fn new(owner: String, repo: String, path: String, token: String) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, owner, repo, path, token)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        owner: String,
        repo: String,
        path: String,
        token: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            owner,
            repo,
            path,
            token,
        }
    }

    fn contents_url(&self, name: Option<&str>) -> String {
        let base = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, self.path
        );
        match name {
            Some(n) => format!("{}/{}", base, n),
            None => base,
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("User-Agent", "modgate")
            .header("Accept", "application/vnd.github+json")
    }

    async fn sha_of(&self, name: &str) -> Result<Option<String>, StorageError> {
        let resp = self
            .request(reqwest::Method::GET, self.contents_url(Some(name)))
            .send()
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(StorageError::Session(format!(
                "contents lookup returned {}",
                resp.status()
            )));
        }

        let entry: ContentEntry = resp
            .json()
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;
        Ok(Some(entry.sha))
    }
}

#[async_trait]
impl ModStorage for GithubStorage {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let resp = self
            .request(reqwest::Method::GET, self.contents_url(None))
            .send()
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::List(format!(
                "contents listing returned {}",
                resp.status()
            )));
        }

        let entries: Vec<ContentEntry> = resp
            .json()
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        // An existing file must be updated with its current sha.
        let sha = self.sha_of(name).await?;

        let mut body = json!({
            "message": format!("Add mod {} via bot", name),
            "content": BASE64.encode(&bytes),
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let resp = self
            .request(reqwest::Method::PUT, self.contents_url(Some(name)))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::Transfer(format!(
                "content upload returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let sha = self
            .sha_of(name)
            .await?
            .ok_or_else(|| StorageError::Remove(format!("{} not found", name)))?;

        let body = json!({
            "message": format!("Remove mod {} via bot", name),
            "sha": sha,
        });

        let resp = self
            .request(reqwest::Method::DELETE, self.contents_url(Some(name)))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Remove(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::Remove(format!(
                "content deletion returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn storage(server: &mockito::Server) -> GithubStorage {
        GithubStorage::with_api_base(
            server.url(),
            "owner".into(),
            "repo".into(),
            "mods".into(),
            "token".into(),
        )
    }

    #[tokio::test]
    async fn list_returns_directory_names() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/owner/repo/contents/mods")
            .with_status(200)
            .with_body(r#"[{"name":"a.jar","sha":"s1"},{"name":"b.jar","sha":"s2"}]"#)
            .create_async()
            .await;

        let names = storage(&server).list().await.unwrap();
        assert_eq!(names, vec!["a.jar", "b.jar"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn put_new_file_sends_base64_content() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/repos/owner/repo/contents/mods/new.jar")
            .with_status(404)
            .create_async()
            .await;
        let upload = server
            .mock("PUT", "/repos/owner/repo/contents/mods/new.jar")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "content": BASE64.encode(b"jar bytes"),
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        storage(&server)
            .put("new.jar", b"jar bytes".to_vec())
            .await
            .unwrap();
        lookup.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn put_existing_file_includes_sha() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo/contents/mods/old.jar")
            .with_status(200)
            .with_body(r#"{"name":"old.jar","sha":"abc123"}"#)
            .create_async()
            .await;
        let upload = server
            .mock("PUT", "/repos/owner/repo/contents/mods/old.jar")
            .match_body(Matcher::PartialJson(serde_json::json!({"sha": "abc123"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        storage(&server)
            .put("old.jar", b"updated".to_vec())
            .await
            .unwrap();
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn delete_looks_up_sha_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo/contents/mods/gone.jar")
            .with_status(200)
            .with_body(r#"{"name":"gone.jar","sha":"dead"}"#)
            .create_async()
            .await;
        let removal = server
            .mock("DELETE", "/repos/owner/repo/contents/mods/gone.jar")
            .match_body(Matcher::PartialJson(serde_json::json!({"sha": "dead"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        storage(&server).delete("gone.jar").await.unwrap();
        removal.assert_async().await;
    }

    #[tokio::test]
    async fn delete_missing_file_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo/contents/mods/ghost.jar")
            .with_status(404)
            .create_async()
            .await;

        let err = storage(&server).delete("ghost.jar").await.unwrap_err();
        assert!(matches!(err, StorageError::Remove(_)));
    }
}
