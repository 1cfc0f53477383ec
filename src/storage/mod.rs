use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StorageConfig;

pub mod github;
pub mod local;
pub mod sftp;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("backend session error: {0}")]
    Session(String),
    #[error("failed to list mods: {0}")]
    List(String),
    #[error("failed to transfer mod: {0}")]
    Transfer(String),
    #[error("failed to remove mod: {0}")]
    Remove(String),
}

/// Capability contract every mods-folder backend implements. The gatekeeper
/// and the command layer only ever talk through this trait, so swapping
/// backends never touches them.
#[async_trait]
pub trait ModStorage: Send + Sync + Debug {
    async fn list(&self) -> Result<Vec<String>, StorageError>;
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

pub fn from_config(config: &StorageConfig) -> Arc<dyn ModStorage> {
    match config {
        StorageConfig::Local { mods_dir } => Arc::new(local::LocalStorage::new(mods_dir)),
        StorageConfig::Sftp {
            host,
            port,
            username,
            password,
            mods_dir,
        } => Arc::new(sftp::SftpStorage::new(
            host.clone(),
            *port,
            username.clone(),
            password.clone(),
            mods_dir.clone(),
        )),
        StorageConfig::Github {
            owner,
            repo,
            path,
            token,
        } => Arc::new(github::GithubStorage::new(
            owner.clone(),
            repo.clone(),
            path.clone(),
            token.clone(),
        )),
    }
}

/// Strip everything outside `[A-Za-z0-9._-]` so a user-supplied name can
/// never escape the mods directory. Applied before every backend path.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_ordinary_names() {
        assert_eq!(sanitize_file_name("ExampleMod-1.0.jar"), "ExampleMod-1.0.jar");
        assert_eq!(sanitize_file_name("some_mod.v2.jar"), "some_mod.v2.jar");
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(
            sanitize_file_name("../../etc/passwd.jar"),
            "......etcpasswd.jar"
        );
        assert_eq!(sanitize_file_name("a/b\\c.jar"), "abc.jar");
    }

    #[test]
    fn sanitize_strips_unicode_and_spaces() {
        assert_eq!(sanitize_file_name("my mod (final).jar"), "mymodfinal.jar");
        assert_eq!(sanitize_file_name("möd§.jar"), "md.jar");
    }
}
