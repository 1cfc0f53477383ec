use serde::{de::DeserializeOwned, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{fs, sync::RwLock, time};
use tracing::error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Codec(String),
    #[error("database error: {0}")]
    Custom(String),
}

/// JSON-file-backed store. Loaded once at startup; every transaction
/// rewrites the file before the in-memory copy is swapped.
#[derive(Clone, Debug)]
pub struct Database<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> {
    path: Arc<PathBuf>,
    inner: Arc<RwLock<T>>,
}

impl<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> Database<T> {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DbError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create database directory: {}", e);
                DbError::Io(e)
            })?;
        }

        let data = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => data,
                Err(e) => {
                    error!("Failed to decode database {}: {}", path.display(), e);
                    T::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                error!("Failed to read database {}: {}", path.display(), e);
                T::default()
            }
        };

        Ok(Self {
            path: Arc::new(path),
            inner: Arc::new(RwLock::new(data)),
        })
    }

    async fn save(&self, data: &T) -> Result<(), DbError> {
        let bytes = serde_json::to_vec_pretty(data).map_err(|e| DbError::Codec(e.to_string()))?;

        match time::timeout(Duration::from_secs(5), fs::write(self.path.as_ref(), bytes)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                error!("Database save operation timed out");
                Err(DbError::Custom("save operation timed out".into()))
            }
        }
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.read().await;
        f(&guard)
    }

    /// Apply a mutation and persist it. The write guard is held across the
    /// save so concurrent transactions cannot interleave.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut T) -> Result<R, String>,
    {
        let mut guard = self.inner.write().await;
        let mut staged = guard.clone();
        let result = f(&mut staged).map_err(DbError::Custom)?;

        self.save(&staged).await?;
        *guard = staged;

        Ok(result)
    }
}
