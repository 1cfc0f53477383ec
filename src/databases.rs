use crate::database::{Database, DbError};
use crate::modules::mods::database::HistoryDatabase;

#[derive(Debug)]
pub struct Databases {
    pub history: Database<HistoryDatabase>,
}

impl Databases {
    pub async fn open(history_path: &str) -> Result<Self, DbError> {
        Ok(Self {
            history: Database::open(history_path).await?,
        })
    }
}
