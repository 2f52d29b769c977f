//! Aggregated views over a mixed fleet: latest state, history, chart
//! series and the stats snapshot.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use fleetwatch::CheckMethod;
use fleetwatch::aggregator::TimeRange;
use fleetwatch::storage::{CheckRow, CheckStore};
use pretty_assertions::assert_eq;

use crate::helpers::{AddressPinger, build_service, test_device};

/// Fleet of three where only device 1 answers pings.
async fn checked_service() -> (
    fleetwatch::service::MonitorService,
    Arc<fleetwatch::storage::MemoryStore>,
) {
    let up = IpAddr::V4(Ipv4Addr::new(127, 1, 0, 1));
    let (service, store) = build_service(vec![], Arc::new(AddressPinger::up_for([up])));

    for id in 1..=3 {
        service.registry().insert(test_device(id)).await;
    }
    service.check_all().await;

    (service, store)
}

#[tokio::test]
async fn test_latest_reflects_current_fleet_state() {
    let (service, _store) = checked_service().await;

    let latest = service.get_latest().await.unwrap();
    assert_eq!(latest.len(), 3);

    assert!(latest[0].available);
    assert_eq!(latest[0].method, CheckMethod::Ping);
    assert!(!latest[1].available);
    assert!(!latest[2].available);
}

#[tokio::test]
async fn test_stats_over_live_results() {
    let (service, _store) = checked_service().await;

    let stats = service.get_stats(TimeRange::OneHour).await.unwrap();

    assert_eq!(stats.device_summary.total_devices, 3);
    assert_eq!(stats.device_summary.active_devices, 3);

    assert_eq!(stats.availability_summary.devices_available, 1);
    assert_eq!(stats.availability_summary.devices_unavailable, 2);
    assert_eq!(stats.availability_summary.availability_rate, 33.33);
    assert_eq!(stats.availability_summary.avg_response_time_ms, Some(5.0));

    assert_eq!(stats.check_methods.get("ping"), Some(&1));
    assert_eq!(stats.check_methods.get("all_failed"), Some(&2));

    // both down devices carry the unreachable error message
    assert_eq!(stats.recent_errors.len(), 2);

    assert_eq!(stats.top_slowest_devices.len(), 1);
    assert_eq!(stats.top_slowest_devices[0].device_id, 1);

    assert_eq!(stats.system_status.time_range, "1h");
    assert!(!stats.system_status.background_checks_running);
}

#[tokio::test]
async fn test_history_is_per_device_and_bounded() {
    let (service, _store) = checked_service().await;

    service.check_all().await;
    service.check_all().await;

    let history = service.get_history(1, 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.device_id == 1));
    assert!(history[0].timestamp >= history[1].timestamp);
}

#[tokio::test]
async fn test_chart_data_spans_seeded_days() {
    let up = IpAddr::V4(Ipv4Addr::new(127, 1, 0, 1));
    let (service, store) = build_service(vec![], Arc::new(AddressPinger::up_for([up])));

    // two days of history: yesterday 1 of 2 up, today 1 of 1 up; explicit
    // calendar timestamps keep the day buckets stable near midnight
    let today = Utc::now().date_naive();
    let yesterday = today - Days::new(1);
    let at = |date: chrono::NaiveDate, hms: (u32, u32, u32)| -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(hms.0, hms.1, hms.2).unwrap();
        date.and_time(time).and_utc()
    };

    let rows = [
        (true, at(yesterday, (8, 0, 0)), Some(4.0)),
        (false, at(yesterday, (9, 0, 0)), None),
        (true, at(today, (0, 0, 0)), Some(6.0)),
    ];
    for (available, timestamp, latency_ms) in rows {
        store
            .append_check(CheckRow {
                timestamp,
                device_id: 1,
                device_name: "device-1".to_string(),
                available,
                latency_ms,
                method: CheckMethod::Ping,
                error: None,
            })
            .await
            .unwrap();
    }

    let chart = service.get_chart_data(1, 7).await.unwrap();

    assert_eq!(chart.device_id, 1);
    assert_eq!(chart.timestamps.len(), 3);
    assert_eq!(chart.availability, vec![1, 0, 1]);
    assert_eq!(chart.response_times, vec![4.0, 0.0, 6.0]);
    assert_eq!(chart.daily_uptime, vec![50.0, 100.0]);
    assert_eq!(chart.total_uptime_percent, 66.67);
}
