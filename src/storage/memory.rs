//! In-memory check store (no persistence)
//!
//! Append-only vector behind a mutex. Useful for tests and for
//! deployments that only care about live state, at the cost of losing
//! history on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::backend::CheckStore;
use super::error::StorageResult;
use super::schema::CheckRow;

/// In-memory check store
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<CheckRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows (test helper).
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl CheckStore for MemoryStore {
    async fn append_check(&self, row: CheckRow) -> StorageResult<()> {
        self.rows.lock().await.push(row);
        Ok(())
    }

    async fn query_since(
        &self,
        device_id: Option<i64>,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<CheckRow>> {
        let rows = self.rows.lock().await;

        let mut matching: Vec<CheckRow> = rows
            .iter()
            .filter(|row| device_id.is_none_or(|id| row.device_id == id))
            .filter(|row| since.is_none_or(|cutoff| row.timestamp >= cutoff))
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.timestamp);

        Ok(matching)
    }

    async fn history(&self, device_id: i64, limit: usize) -> StorageResult<Vec<CheckRow>> {
        let rows = self.rows.lock().await;

        let mut matching: Vec<CheckRow> = rows
            .iter()
            .filter(|row| row.device_id == device_id)
            .cloned()
            .collect();
        matching.sort_by_key(|row| std::cmp::Reverse(row.timestamp));
        matching.truncate(limit);

        Ok(matching)
    }

    async fn latest_per_device(&self) -> StorageResult<Vec<CheckRow>> {
        let rows = self.rows.lock().await;

        let mut latest: HashMap<i64, &CheckRow> = HashMap::new();
        for row in rows.iter() {
            match latest.get(&row.device_id) {
                Some(current) if current.timestamp >= row.timestamp => {}
                _ => {
                    latest.insert(row.device_id, row);
                }
            }
        }

        let mut result: Vec<CheckRow> = latest.into_values().cloned().collect();
        result.sort_by_key(|row| row.device_id);
        Ok(result)
    }

    async fn recent_errors(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let rows = self.rows.lock().await;

        let mut matching: Vec<CheckRow> = rows
            .iter()
            .filter(|row| !row.available && row.error.is_some() && row.timestamp >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|row| std::cmp::Reverse(row.timestamp));
        matching.truncate(limit);

        Ok(matching)
    }

    async fn slowest_available(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let rows = self.rows.lock().await;

        let mut matching: Vec<CheckRow> = rows
            .iter()
            .filter(|row| row.available && row.latency_ms.is_some())
            .filter(|row| since.is_none_or(|cutoff| row.timestamp >= cutoff))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.latency_ms
                .partial_cmp(&a.latency_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matching.truncate(limit);

        Ok(matching)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
