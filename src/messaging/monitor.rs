//! Published/received message bookkeeping behind the `/cap` dashboard.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messaging::message::IntegrationMessage;

/// Records kept per direction before succeeded entries are evicted.
const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Succeeded,
    Failed,
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub status: MessageStatus,
    pub retries: u32,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip)]
    message: IntegrationMessage,
}

impl MessageRecord {
    /// The envelope as it was published or received.
    pub fn message(&self) -> &IntegrationMessage {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionStats {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub published: DirectionStats,
    pub received: DirectionStats,
}

/// Outcome ledger for both directions.
///
/// Received records are keyed by message id and group, so one message
/// delivered to two groups is tracked twice.
#[derive(Default)]
pub struct MessageMonitor {
    published: DashMap<Uuid, MessageRecord>,
    received: DashMap<(Uuid, String), MessageRecord>,
}

impl MessageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(
        &self,
        message: &IntegrationMessage,
        attempts: u32,
        error: Option<String>,
    ) {
        let record = Self::record(message, attempts, error);
        let now = record.updated_at;
        self.published
            .entry(message.id)
            .and_modify(|existing| {
                existing.retries += attempts;
                existing.status = record.status;
                existing.last_error = record.last_error.clone();
                existing.updated_at = now;
            })
            .or_insert(record);
        evict(&self.published);
    }

    pub fn record_received(&self, message: &IntegrationMessage, attempts: u32, error: Option<String>) {
        let group = message.group.clone().unwrap_or_default();
        self.received
            .insert((message.id, group), Self::record(message, attempts, error));
        evict(&self.received);
    }

    /// Messages whose publication failed, oldest first.
    pub fn failed_published(&self) -> Vec<IntegrationMessage> {
        let mut failed: Vec<(DateTime<Utc>, IntegrationMessage)> = self
            .published
            .iter()
            .filter(|r| r.status == MessageStatus::Failed)
            .map(|r| (r.added_at, r.message.clone()))
            .collect();
        failed.sort_by_key(|(added, _)| *added);
        failed.into_iter().map(|(_, m)| m).collect()
    }

    pub fn published(&self, status: Option<MessageStatus>) -> Vec<MessageRecord> {
        snapshot(self.published.iter().map(|r| r.value().clone()), status)
    }

    pub fn received(&self, status: Option<MessageStatus>) -> Vec<MessageRecord> {
        snapshot(self.received.iter().map(|r| r.value().clone()), status)
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            published: count(self.published.iter().map(|r| r.status)),
            received: count(self.received.iter().map(|r| r.status)),
        }
    }

    fn record(message: &IntegrationMessage, attempts: u32, error: Option<String>) -> MessageRecord {
        let now = Utc::now();
        MessageRecord {
            id: message.id,
            name: message.name.clone(),
            group: message.group.clone(),
            status: if error.is_some() {
                MessageStatus::Failed
            } else {
                MessageStatus::Succeeded
            },
            retries: attempts.saturating_sub(1),
            added_at: now,
            updated_at: now,
            last_error: error,
            message: message.clone(),
        }
    }
}

fn snapshot(
    records: impl Iterator<Item = MessageRecord>,
    status: Option<MessageStatus>,
) -> Vec<MessageRecord> {
    let mut out: Vec<MessageRecord> = records
        .filter(|r| status.map_or(true, |s| r.status == s))
        .collect();
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    out
}

fn count(statuses: impl Iterator<Item = MessageStatus>) -> DirectionStats {
    statuses.fold(DirectionStats::default(), |mut acc, s| {
        match s {
            MessageStatus::Succeeded => acc.succeeded += 1,
            MessageStatus::Failed => acc.failed += 1,
        }
        acc
    })
}

/// Drop the oldest succeeded record once over capacity. Failed records stay
/// until they succeed.
fn evict<K>(records: &DashMap<K, MessageRecord>)
where
    K: Eq + std::hash::Hash + Clone,
{
    if records.len() <= MAX_RECORDS {
        return;
    }
    let oldest = records
        .iter()
        .filter(|r| r.status == MessageStatus::Succeeded)
        .min_by_key(|r| r.updated_at)
        .map(|r| r.key().clone());
    if let Some(key) = oldest {
        records.remove(&key);
    }
}
