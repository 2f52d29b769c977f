//! Read-side aggregation
//!
//! Turns the append-only check history into the views callers actually
//! want: the latest state per device, chart-ready series with daily
//! uptime, and a fleet-wide statistics snapshot. Everything here is
//! read-only over the store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::AvailabilityCheckResult;
use crate::batch::BatchState;
use crate::directory::DeviceRegistry;
use crate::settings::{self, SettingsStore};
use crate::storage::CheckStore;

/// Window selector for [`Aggregator::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwentyFourHours,
    SevenDays,
    #[default]
    All,
}

impl TimeRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "30m" => Some(Self::ThirtyMinutes),
            "1h" => Some(Self::OneHour),
            "6h" => Some(Self::SixHours),
            "24h" => Some(Self::TwentyFourHours),
            "7d" => Some(Self::SevenDays),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwentyFourHours => "24h",
            Self::SevenDays => "7d",
            Self::All => "all",
        }
    }

    /// Start of the window, or `None` for the unbounded range.
    fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::ThirtyMinutes => Some(now - Duration::minutes(30)),
            Self::OneHour => Some(now - Duration::hours(1)),
            Self::SixHours => Some(now - Duration::hours(6)),
            Self::TwentyFourHours => Some(now - Duration::hours(24)),
            Self::SevenDays => Some(now - Duration::days(7)),
            Self::All => None,
        }
    }

    /// How many hourly trend buckets the window warrants.
    fn trend_hours(&self) -> i64 {
        match self {
            Self::ThirtyMinutes | Self::OneHour => 1,
            Self::SixHours => 6,
            Self::TwentyFourHours | Self::All => 24,
            Self::SevenDays => 24 * 7,
        }
    }
}

/// Chart-ready series for one device: parallel arrays plus a daily
/// uptime roll-up.
#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub device_id: i64,
    pub timestamps: Vec<DateTime<Utc>>,
    /// 1 = available, 0 = not.
    pub availability: Vec<u8>,
    /// Latency per check; 0 where none was measured.
    pub response_times: Vec<f64>,
    pub daily_uptime: Vec<f64>,
    pub daily_dates: Vec<String>,
    pub total_uptime_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub timestamp: DateTime<Utc>,
    pub background_checks_running: bool,
    pub check_interval_minutes: u32,
    pub time_range: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub total_devices: usize,
    pub active_devices: usize,
    pub inactive_devices: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilitySummary {
    pub devices_available: usize,
    pub devices_unavailable: usize,
    pub availability_rate: f64,
    pub avg_response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucket {
    /// Bucket label, `YYYY-MM-DD HH:00`.
    pub hour: String,
    pub availability_rate: f64,
    pub check_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub device_id: i64,
    pub device_name: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStats {
    pub system_status: SystemStatus,
    pub device_summary: DeviceSummary,
    pub availability_summary: AvailabilitySummary,
    /// Latest check method per device, counted by method tag.
    pub check_methods: HashMap<String, usize>,
    pub hourly_trend: Vec<HourlyBucket>,
    pub recent_errors: Vec<ErrorRecord>,
    pub top_slowest_devices: Vec<AvailabilityCheckResult>,
}

const RECENT_ERROR_LIMIT: usize = 50;
const SLOWEST_LIMIT: usize = 5;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Read-side view over store, registry and batch state.
pub struct Aggregator {
    store: Arc<dyn CheckStore>,
    registry: Arc<DeviceRegistry>,
    batch: Arc<BatchState>,
    settings: Arc<dyn SettingsStore>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn CheckStore>,
        registry: Arc<DeviceRegistry>,
        batch: Arc<BatchState>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            store,
            registry,
            batch,
            settings,
        }
    }

    /// Latest check result per device, one entry each, in device-id order.
    pub async fn latest_state(&self) -> anyhow::Result<Vec<AvailabilityCheckResult>> {
        let rows = self.store.latest_per_device().await?;
        let mut results: Vec<AvailabilityCheckResult> =
            rows.into_iter().map(|row| row.into_result()).collect();
        results.sort_by_key(|r| r.device_id);
        Ok(results)
    }

    /// Trailing-window series for one device plus daily uptime percentages.
    #[instrument(skip(self))]
    pub async fn chart_data(&self, device_id: i64, days: u32) -> anyhow::Result<ChartData> {
        let since = Utc::now() - Duration::days(i64::from(days));
        let rows = self.store.query_since(Some(device_id), Some(since)).await?;

        let mut timestamps = Vec::with_capacity(rows.len());
        let mut availability = Vec::with_capacity(rows.len());
        let mut response_times = Vec::with_capacity(rows.len());

        // (date, available count, total count), chronological
        let mut daily: Vec<(String, usize, usize)> = Vec::new();

        for row in &rows {
            timestamps.push(row.timestamp);
            availability.push(u8::from(row.available));
            response_times.push(row.latency_ms.unwrap_or(0.0));

            let date = row.timestamp.format("%Y-%m-%d").to_string();
            match daily.last_mut() {
                Some((day, up, total)) if *day == date => {
                    *up += usize::from(row.available);
                    *total += 1;
                }
                _ => daily.push((date, usize::from(row.available), 1)),
            }
        }

        let total_up: usize = daily.iter().map(|(_, up, _)| up).sum();
        let total_checks: usize = daily.iter().map(|(_, _, total)| total).sum();
        let total_uptime_percent = if total_checks > 0 {
            round2(total_up as f64 / total_checks as f64 * 100.0)
        } else {
            0.0
        };

        let (daily_dates, daily_uptime) = daily
            .into_iter()
            .map(|(date, up, total)| (date, round2(up as f64 / total as f64 * 100.0)))
            .unzip();

        Ok(ChartData {
            device_id,
            timestamps,
            availability,
            response_times,
            daily_uptime,
            daily_dates,
            total_uptime_percent,
        })
    }

    /// Fleet-wide statistics snapshot over the given window.
    #[instrument(skip(self))]
    pub async fn stats(&self, range: TimeRange) -> anyhow::Result<MonitoringStats> {
        let now = Utc::now();
        let window_start = range.start(now);

        let latest = self.latest_state().await?;

        let devices_available = latest.iter().filter(|r| r.available).count();
        let devices_unavailable = latest.len() - devices_available;
        let availability_rate = if latest.is_empty() {
            0.0
        } else {
            round2(devices_available as f64 / latest.len() as f64 * 100.0)
        };

        let latencies: Vec<f64> = latest
            .iter()
            .filter(|r| r.available)
            .filter_map(|r| r.latency_ms)
            .collect();
        let avg_response_time_ms = if latencies.is_empty() {
            None
        } else {
            Some(round2(latencies.iter().sum::<f64>() / latencies.len() as f64))
        };

        let mut check_methods: HashMap<String, usize> = HashMap::new();
        for result in &latest {
            *check_methods.entry(result.method.to_string()).or_default() += 1;
        }

        let total_devices = self.registry.len().await;
        let active_devices = self.registry.active_snapshot().await.len();

        let hourly_trend = self.hourly_trend(now, range.trend_hours()).await?;

        // unbounded ranges still cap the error history at one day
        let error_start = window_start.unwrap_or(now - Duration::days(1));
        let recent_errors = self
            .store
            .recent_errors(error_start, RECENT_ERROR_LIMIT)
            .await?
            .into_iter()
            .filter_map(|row| {
                row.error.clone().map(|error_message| ErrorRecord {
                    device_id: row.device_id,
                    device_name: row.device_name,
                    error_message,
                    timestamp: row.timestamp,
                })
            })
            .collect();

        let top_slowest_devices = self
            .store
            .slowest_available(window_start, SLOWEST_LIMIT)
            .await?
            .into_iter()
            .map(|row| row.into_result())
            .collect();

        Ok(MonitoringStats {
            system_status: SystemStatus {
                timestamp: now,
                background_checks_running: self.batch.status().await.in_progress,
                check_interval_minutes: settings::get_check_interval(self.settings.as_ref()).await,
                time_range: range.as_str(),
            },
            device_summary: DeviceSummary {
                total_devices,
                active_devices,
                inactive_devices: total_devices - active_devices,
            },
            availability_summary: AvailabilitySummary {
                devices_available,
                devices_unavailable,
                availability_rate,
                avg_response_time_ms,
            },
            check_methods,
            hourly_trend,
            recent_errors,
            top_slowest_devices,
        })
    }

    /// Availability rate per trailing one-hour window, oldest first,
    /// ending with the (partial) current hour.
    async fn hourly_trend(
        &self,
        now: DateTime<Utc>,
        hours: i64,
    ) -> anyhow::Result<Vec<HourlyBucket>> {
        let window_start = now - Duration::hours(hours);
        let rows = self.store.query_since(None, Some(window_start)).await?;

        // index 0 = oldest bucket [now - hours, now - hours + 1h)
        let mut up = vec![0usize; hours as usize + 1];
        let mut total = vec![0usize; hours as usize + 1];

        for row in &rows {
            let age_secs = (now - row.timestamp).num_seconds();
            if age_secs < 0 {
                continue;
            }
            // floor division: a check under an hour old belongs to the
            // partial current bucket (offset 0), not the previous one
            let offset = age_secs / 3600;
            if offset > hours {
                continue;
            }
            let index = (hours - offset) as usize;
            up[index] += usize::from(row.available);
            total[index] += 1;
        }

        let buckets = (0..=hours)
            .map(|index| {
                let offset = hours - index;
                let hour = (now - Duration::hours(offset))
                    .format("%Y-%m-%d %H:00")
                    .to_string();
                let count = total[index as usize];
                let rate = if count > 0 {
                    up[index as usize] as f64 / count as f64 * 100.0
                } else {
                    0.0
                };
                HourlyBucket {
                    hour,
                    availability_rate: rate,
                    check_count: count,
                }
            })
            .collect();

        Ok(buckets)
    }
}
