use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use super::{ModStorage, StorageError};

/// Mods directory on the machine the bot runs on.
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ModStorage for LocalStorage {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::List(e.to_string()))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;
        fs::write(self.root.join(name), bytes)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.root.join(name))
            .await
            .map_err(|e| StorageError::Remove(e.to_string()))
    }
}
