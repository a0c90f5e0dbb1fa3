use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::ct_log::{self, Column as LogCol, Entity as LogEntity};
use crate::error::{Result, StorageError};
use crate::store::{ignore_duplicate, EntriesStore};

/// Resumption cursor of one CT log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCheckpoint {
    pub log_id: i64,
    pub url: String,
    /// Highest entry index already processed.
    pub max_entry: u64,
    pub last_entry_time: Option<DateTime<Utc>>,
}

impl From<ct_log::Model> for LogCheckpoint {
    fn from(m: ct_log::Model) -> Self {
        Self {
            log_id: m.log_id,
            url: m.url,
            max_entry: u64::try_from(m.max_entry).unwrap_or_default(),
            last_entry_time: m.last_entry_time.map(|t| t.and_utc()),
        }
    }
}

impl EntriesStore {
    /// Returns the checkpoint for `url`, creating a zeroed one for a log seen
    /// for the first time.
    ///
    /// The log client owns the read-modify-write cycle; nothing here locks
    /// the row between `get_log_state` and `save_log_state`.
    pub async fn get_log_state(&self, url: &str) -> Result<LogCheckpoint> {
        if let Some(row) = self.find_log(url).await? {
            return Ok(row.into());
        }

        let row = ct_log::ActiveModel {
            url: Set(url.to_string()),
            max_entry: Set(0),
            last_entry_time: Set(None),
            ..Default::default()
        };
        ignore_duplicate(async {
            LogEntity::insert(row)
                .exec_without_returning(&self.db)
                .await
                .map(|_| ())
        })
        .await?;
        tracing::info!(url, "Registered new CT log");

        self.find_log(url)
            .await?
            .map(LogCheckpoint::from)
            .ok_or_else(|| StorageError::MissingId {
                entity: "ctlog",
                key: url.to_string(),
            })
    }

    /// Persists the cursor fields of a checkpoint obtained from
    /// [`EntriesStore::get_log_state`].
    pub async fn save_log_state(&self, checkpoint: &LogCheckpoint) -> Result<()> {
        let row = ct_log::ActiveModel {
            log_id: Set(checkpoint.log_id),
            url: Set(checkpoint.url.clone()),
            max_entry: Set(i64::try_from(checkpoint.max_entry).unwrap_or(i64::MAX)),
            last_entry_time: Set(checkpoint.last_entry_time.map(|t| t.naive_utc())),
        };
        row.update(&self.db).await?;
        tracing::debug!(
            url = %checkpoint.url,
            max_entry = checkpoint.max_entry,
            "Saved log checkpoint"
        );
        Ok(())
    }

    async fn find_log(&self, url: &str) -> Result<Option<ct_log::Model>> {
        Ok(LogEntity::find()
            .filter(LogCol::Url.eq(url))
            .one(&self.db)
            .await?)
    }
}
