use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{clock::Timestamp, Result};

use super::InAppMessage;

/// Records last displayed more than this many days ago are dropped by
/// [`InAppRepository::clean_cached_in_app_messages`].
pub const MESSAGE_CACHE_RETENTION_DAYS: i64 = 6 * 30;

/// Display history of a message that was shown at least once, kept so the message can be
/// redisplayed according to its redisplay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InAppMessageRecord {
    /// Id of the displayed message.
    pub message_id: String,
    /// Number of completed displays.
    pub display_quantity: u32,
    /// End of the last completed display.
    pub last_display_time: Option<Timestamp>,
    /// Click ids recorded during the current display cycle.
    #[serde(default)]
    pub click_ids: HashSet<String>,
    /// Whether the message was displayed in the current session.
    #[serde(default)]
    pub displayed_in_session: bool,
}

impl From<&InAppMessage> for InAppMessageRecord {
    fn from(message: &InAppMessage) -> Self {
        InAppMessageRecord {
            message_id: message.message_id.clone(),
            display_quantity: message.redisplay_stats.display_quantity,
            last_display_time: message.redisplay_stats.last_display_time,
            click_ids: message.click_ids().clone(),
            displayed_in_session: message.is_displayed_in_session,
        }
    }
}

/// Persistent storage for [`InAppMessageRecord`]s.
#[async_trait]
pub trait InAppRepository: Send + Sync {
    /// Insert or replace the record for `record.message_id`.
    async fn save_in_app_message(&self, record: InAppMessageRecord) -> Result<()>;

    /// All saved records.
    async fn list_in_app_messages(&self) -> Result<Vec<InAppMessageRecord>>;

    /// Drop records last displayed more than [`MESSAGE_CACHE_RETENTION_DAYS`] before `now`.
    async fn clean_cached_in_app_messages(&self, now: Timestamp) -> Result<()>;
}

/// [`InAppRepository`] backed by process memory.
#[derive(Default)]
pub struct InMemoryInAppRepository {
    records: RwLock<HashMap<String, InAppMessageRecord>>,
}

impl InMemoryInAppRepository {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InAppRepository for InMemoryInAppRepository {
    async fn save_in_app_message(&self, record: InAppMessageRecord) -> Result<()> {
        self.records
            .write()
            .expect("thread holding repository lock should not panic")
            .insert(record.message_id.clone(), record);
        Ok(())
    }

    async fn list_in_app_messages(&self) -> Result<Vec<InAppMessageRecord>> {
        Ok(self
            .records
            .read()
            .expect("thread holding repository lock should not panic")
            .values()
            .cloned()
            .collect())
    }

    async fn clean_cached_in_app_messages(&self, now: Timestamp) -> Result<()> {
        let cutoff = now - chrono::Duration::days(MESSAGE_CACHE_RETENTION_DAYS);
        self.records
            .write()
            .expect("thread holding repository lock should not panic")
            .retain(|_, record| record.last_display_time.map_or(true, |t| t >= cutoff));
        Ok(())
    }
}
