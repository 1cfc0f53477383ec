use async_trait::async_trait;
use russh::client;
use russh_sftp::client::SftpSession;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ModStorage, StorageError};

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    // The target host comes from operator config; any presented key is accepted.
    async fn check_server_key(
        &mut self,
        _key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct SftpConn {
    // Dropping the handle closes the underlying SSH session.
    _handle: client::Handle<ClientHandler>,
    sftp: SftpSession,
}

/// Mods folder on a remote host reached over SFTP. The session is opened
/// lazily and probed before every operation; a stale session is rebuilt
/// instead of surfacing the disconnect to the user.
pub struct SftpStorage {
    host: String,
    port: u16,
    username: String,
    password: String,
    mods_dir: String,
    conn: Mutex<Option<SftpConn>>,
}

impl fmt::Debug for SftpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpStorage")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mods_dir", &self.mods_dir)
            .finish()
    }
}

impl SftpStorage {
    pub fn new(host: String, port: u16, username: String, password: String, mods_dir: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
            mods_dir,
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<SftpConn, StorageError> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, (self.host.as_str(), self.port), ClientHandler)
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;

        let authenticated = handle
            .authenticate_password(&self.username, &self.password)
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;
        if !authenticated {
            return Err(StorageError::Session(
                "password authentication rejected".into(),
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| StorageError::Session(e.to_string()))?;

        Ok(SftpConn {
            _handle: handle,
            sftp,
        })
    }

    /// Return a live session, rebuilding the cached one if its probe fails.
    async fn session<'a>(
        &self,
        guard: &'a mut Option<SftpConn>,
    ) -> Result<&'a SftpSession, StorageError> {
        let stale = match guard.as_ref() {
            Some(conn) => conn.sftp.canonicalize(".").await.is_err(),
            None => true,
        };

        if stale {
            debug!("Opening SFTP session to {}:{}", self.host, self.port);
            *guard = Some(self.connect().await?);
        }

        match guard.as_ref() {
            Some(conn) => Ok(&conn.sftp),
            None => Err(StorageError::Session("no SFTP session available".into())),
        }
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.mods_dir.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl ModStorage for SftpStorage {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut guard = self.conn.lock().await;
        let sftp = self.session(&mut guard).await?;

        let entries = sftp
            .read_dir(&self.mods_dir)
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;

        let mut names: Vec<String> = entries
            .filter(|entry| !entry.file_type().is_dir())
            .map(|entry| entry.file_name())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let sftp = self.session(&mut guard).await?;

        let mut file = sftp
            .create(self.remote_path(name))
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;
        file.shutdown()
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let sftp = self.session(&mut guard).await?;

        sftp.remove_file(self.remote_path(name))
            .await
            .map_err(|e| StorageError::Remove(e.to_string()))
    }
}
