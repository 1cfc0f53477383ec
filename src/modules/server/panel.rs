use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::PanelConfig;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("panel unavailable: {0}")]
    Unavailable(String),
    #[error("panel API returned {0}")]
    Api(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub online: bool,
    pub state: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

#[derive(Deserialize)]
struct ResourcesResponse {
    attributes: ResourceAttributes,
}

#[derive(Deserialize)]
struct ResourceAttributes {
    current_state: String,
    resources: ResourceUsage,
}

#[derive(Deserialize)]
struct ResourceUsage {
    cpu_absolute: f64,
    memory_bytes: u64,
    disk_bytes: u64,
}

/// Pterodactyl client API wrapper for the one server the bot manages.
#[derive(Debug)]
pub struct PanelClient {
    client: reqwest::Client,
    base_url: String,
    server_id: String,
    api_key: String,
}

impl PanelClient {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            server_id: config.server_id.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/servers/{}/{}", self.base_url, self.server_id, tail)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    pub async fn status(&self) -> Result<ServerStatus, PanelError> {
        let resp = self
            .authed(self.client.get(self.url("resources")))
            .send()
            .await
            .map_err(|e| PanelError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PanelError::Api(resp.status()));
        }

        let parsed: ResourcesResponse = resp
            .json()
            .await
            .map_err(|e| PanelError::Unavailable(e.to_string()))?;

        Ok(ServerStatus {
            online: parsed.attributes.current_state == "running",
            state: parsed.attributes.current_state,
            cpu_percent: parsed.attributes.resources.cpu_absolute,
            memory_bytes: parsed.attributes.resources.memory_bytes,
            disk_bytes: parsed.attributes.resources.disk_bytes,
        })
    }

    pub async fn restart(&self) -> Result<(), PanelError> {
        self.power("restart").await
    }

    async fn power(&self, signal: &str) -> Result<(), PanelError> {
        let resp = self
            .authed(self.client.post(self.url("power")))
            .json(&json!({ "signal": signal }))
            .send()
            .await
            .map_err(|e| PanelError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PanelError::Api(resp.status()));
        }
        Ok(())
    }

    /// Run a line on the server console, e.g. `say ...` broadcasts.
    pub async fn send_command(&self, command: &str) -> Result<(), PanelError> {
        let resp = self
            .authed(self.client.post(self.url("command")))
            .json(&json!({ "command": command }))
            .send()
            .await
            .map_err(|e| PanelError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PanelError::Api(resp.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> PanelClient {
        PanelClient::new(&PanelConfig {
            base_url: server.url(),
            server_id: "abc123".into(),
            api_key: "key".into(),
        })
    }

    #[tokio::test]
    async fn status_parses_resource_attributes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/servers/abc123/resources")
            .with_status(200)
            .with_body(
                r#"{"attributes":{"current_state":"running","resources":{"cpu_absolute":42.5,"memory_bytes":2147483648,"disk_bytes":1073741824}}}"#,
            )
            .create_async()
            .await;

        let status = client(&server).status().await.unwrap();
        assert!(status.online);
        assert_eq!(status.state, "running");
        assert_eq!(status.cpu_percent, 42.5);
        assert_eq!(status.memory_bytes, 2_147_483_648);
    }

    #[tokio::test]
    async fn stopped_server_reports_offline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/servers/abc123/resources")
            .with_status(200)
            .with_body(
                r#"{"attributes":{"current_state":"offline","resources":{"cpu_absolute":0.0,"memory_bytes":0,"disk_bytes":0}}}"#,
            )
            .create_async()
            .await;

        let status = client(&server).status().await.unwrap();
        assert!(!status.online);
    }

    #[tokio::test]
    async fn restart_posts_the_restart_signal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/servers/abc123/power")
            .match_body(Matcher::Json(serde_json::json!({"signal": "restart"})))
            .with_status(204)
            .create_async()
            .await;

        client(&server).restart().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_surface_as_status_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/servers/abc123/resources")
            .with_status(502)
            .create_async()
            .await;

        let err = client(&server).status().await.unwrap_err();
        assert!(matches!(err, PanelError::Api(code) if code.as_u16() == 502));
    }
}
