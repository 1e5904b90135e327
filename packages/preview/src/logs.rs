use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{LogSource, LogType, PreviewLog};

/// Keep only the last 1000 entries to prevent memory issues
const MAX_LOG_ENTRIES: usize = 1000;

/// Bounded, shared buffer of preview output and supervisor events.
#[derive(Debug, Clone, Default)]
pub struct SessionLogs {
    entries: Arc<RwLock<VecDeque<PreviewLog>>>,
}

impl SessionLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, source: LogSource, log_type: LogType, message: impl Into<String>) {
        let entry = PreviewLog {
            timestamp: Utc::now(),
            source,
            log_type,
            message: message.into(),
        };

        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        if entries.len() > MAX_LOG_ENTRIES {
            entries.pop_front();
        }
    }

    /// Record a supervisor event
    pub async fn system(&self, message: impl Into<String>) {
        self.push(LogSource::System, LogType::System, message).await;
    }

    /// Entries newer than `since`, keeping only the most recent `limit`
    pub async fn get(&self, since: Option<DateTime<Utc>>, limit: Option<usize>) -> Vec<PreviewLog> {
        let entries = self.entries.read().await;

        let mut filtered: Vec<PreviewLog> = match since {
            Some(since_time) => entries
                .iter()
                .filter(|log| log.timestamp > since_time)
                .cloned()
                .collect(),
            None => entries.iter().cloned().collect(),
        };

        if let Some(max_count) = limit {
            if filtered.len() > max_count {
                filtered = filtered.split_off(filtered.len() - max_count);
            }
        }

        filtered
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
