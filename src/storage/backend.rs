//! Check store trait definition
//!
//! This module defines the `CheckStore` trait that all persistence
//! backends implement. Appends come from many concurrent checker tasks,
//! so implementations must tolerate concurrent writes without a shared
//! transaction across checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::CheckRow;

/// Trait for availability check persistence backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; every checker task holds the
/// same store and appends independently.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Append one check result. Called exactly once per (device, check).
    async fn append_check(&self, row: CheckRow) -> StorageResult<()>;

    /// All checks since `since` (all time when `None`), optionally
    /// restricted to one device, ordered by timestamp ascending.
    async fn query_since(
        &self,
        device_id: Option<i64>,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<CheckRow>>;

    /// The N most recent checks for one device, newest first.
    async fn history(&self, device_id: i64, limit: usize) -> StorageResult<Vec<CheckRow>>;

    /// The single most recent check per device (max-timestamp grouping).
    async fn latest_per_device(&self) -> StorageResult<Vec<CheckRow>>;

    /// Unavailable checks that carry an error message, newest first,
    /// bounded by `since` and `limit`.
    async fn recent_errors(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>>;

    /// Available checks ordered by descending latency, optionally
    /// time-bounded. Used for the "slowest devices" stat.
    async fn slowest_available(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>>;

    /// Close the store and release resources.
    async fn close(&self) -> StorageResult<()>;
}
