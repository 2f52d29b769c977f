//! SQLite store behavior: persistence across reopen, query shapes and
//! concurrent appends.

use chrono::{Duration, Utc};
use fleetwatch::CheckMethod;
use fleetwatch::storage::{CheckRow, CheckStore, SqliteStore};
use pretty_assertions::assert_eq;

fn row(device_id: i64, available: bool, latency_ms: Option<f64>, age_minutes: i64) -> CheckRow {
    CheckRow {
        timestamp: Utc::now() - Duration::minutes(age_minutes),
        device_id,
        device_name: format!("device-{device_id}"),
        available,
        latency_ms,
        method: if available {
            CheckMethod::Ping
        } else {
            CheckMethod::AllFailed
        },
        error: (!available).then(|| "unreachable".to_string()),
    }
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("checks.db");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        store.append_check(row(1, true, Some(3.0), 5)).await.unwrap();
        store.append_check(row(2, false, None, 4)).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();
    let rows = store.query_since(None, None).await.unwrap();
    assert_eq!(rows.len(), 2);
    // ascending by timestamp
    assert!(rows[0].timestamp <= rows[1].timestamp);
    assert_eq!(rows[0].device_id, 1);
    assert_eq!(rows[0].latency_ms, Some(3.0));
    assert_eq!(rows[1].method, CheckMethod::AllFailed);
    assert_eq!(rows[1].error.as_deref(), Some("unreachable"));
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_query_filters_by_device_and_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    store.append_check(row(1, true, Some(1.0), 120)).await.unwrap();
    store.append_check(row(1, true, Some(2.0), 10)).await.unwrap();
    store.append_check(row(2, true, Some(3.0), 10)).await.unwrap();

    let device_rows = store.query_since(Some(1), None).await.unwrap();
    assert_eq!(device_rows.len(), 2);

    let recent = store
        .query_since(Some(1), Some(Utc::now() - Duration::hours(1)))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].latency_ms, Some(2.0));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_latest_per_device_takes_max_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    store.append_check(row(1, false, None, 60)).await.unwrap();
    store.append_check(row(1, true, Some(2.0), 1)).await.unwrap();
    store.append_check(row(2, false, None, 1)).await.unwrap();

    let mut latest = store.latest_per_device().await.unwrap();
    latest.sort_by_key(|r| r.device_id);

    assert_eq!(latest.len(), 2);
    assert!(latest[0].available, "newest row for device 1 wins");
    assert!(!latest[1].available);

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_history_newest_first_with_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    for age in [30, 20, 10] {
        store
            .append_check(row(1, true, Some(age as f64), age))
            .await
            .unwrap();
    }

    let history = store.history(1, 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].latency_ms, Some(10.0));
    assert_eq!(history[1].latency_ms, Some(20.0));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_error_and_slowest_queries() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    store.append_check(row(1, false, None, 10)).await.unwrap();
    store.append_check(row(2, true, Some(80.0), 10)).await.unwrap();
    store.append_check(row(3, true, Some(5.0), 10)).await.unwrap();

    let errors = store
        .recent_errors(Utc::now() - Duration::hours(1), 50)
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].device_id, 1);

    let slowest = store.slowest_available(None, 5).await.unwrap();
    assert_eq!(slowest.len(), 2);
    assert_eq!(slowest[0].device_id, 2, "descending by latency");
    assert_eq!(slowest[1].device_id, 3);

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_appends_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(SqliteStore::new(dir.path().join("checks.db")).await.unwrap());

    let mut tasks = vec![];
    for id in 0..32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.append_check(row(id, true, Some(1.0), 0)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let rows = store.query_since(None, None).await.unwrap();
    assert_eq!(rows.len(), 32);

    store.close().await.unwrap();
}
