use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::Database;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Add,
    Remove,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadHistoryRecord {
    pub action: HistoryAction,
    pub file_name: String,
    pub user_id: u64,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDatabase {
    pub records: Vec<UploadHistoryRecord>,
}

pub type HistoryHandler = Database<HistoryDatabase>;

impl HistoryHandler {
    /// Append-only; callers treat failures as non-fatal.
    pub async fn record(
        &self,
        action: HistoryAction,
        file_name: &str,
        user_id: u64,
        username: &str,
    ) -> Result<(), String> {
        let record = UploadHistoryRecord {
            action,
            file_name: file_name.to_string(),
            user_id,
            username: username.to_string(),
            timestamp: Utc::now(),
        };

        self.transaction(|db| {
            db.records.push(record);
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Vec<UploadHistoryRecord> {
        self.read(|db| db.records.iter().rev().take(limit).cloned().collect())
            .await
    }
}
