//! Background loops: the short-interval poller and the daily full refresh
//!
//! Both loops observe cancellation only while sleeping or between passes, so
//! shutdown never interrupts a write.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::service::RefreshService;

/// Time from `now` until the next `at` wall-clock time in `tz`.
///
/// A time skipped by a DST jump resolves to the first instant after the gap;
/// a repeated time resolves to its earlier occurrence.
pub fn seconds_until(at: NaiveTime, tz: Tz, now: DateTime<Utc>) -> Duration {
    let today = now.with_timezone(&tz).date_naive();

    for offset in 0..=2 {
        let naive = (today + ChronoDuration::days(offset)).and_time(at);
        let resolved = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + ChronoDuration::hours(1))).earliest());

        if let Some(target) = resolved {
            let target = target.with_timezone(&Utc);
            if target > now {
                return (target - now).to_std().unwrap_or(Duration::ZERO);
            }
        }
    }

    Duration::from_secs(24 * 60 * 60)
}

/// Refresh `group` every `interval` until cancelled
pub async fn run_poller(
    service: Arc<RefreshService>,
    group: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(group = %group, interval_secs = interval.as_secs(), "Poller started");

    while !cancel.is_cancelled() {
        match service.refresh_once(&group).await {
            Ok(report) if report.changed > 0 => {
                info!(changed = report.changed, written = report.written.len(), "Poll pass found changes")
            },
            Ok(_) => {},
            Err(e) => error!(group = %group, error = %e, fatal = e.is_fatal_to_pass(), "Poll pass failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    info!("Poller stopped");
}

/// Run a full refresh of `groups` daily at `at` in `tz` until cancelled
pub async fn run_daily(
    service: Arc<RefreshService>,
    groups: Vec<String>,
    at: NaiveTime,
    tz: Tz,
    cancel: CancellationToken,
) {
    info!(groups = groups.len(), at = %at, timezone = %tz, "Daily job started");

    loop {
        let wait = seconds_until(at, tz, Utc::now());
        info!(wait_secs = wait.as_secs(), "Next daily run scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {},
        }

        match service.full_refresh(&groups).await {
            Ok(report) => info!(
                changed = report.changed,
                files_written = report.written.len(),
                folders_deleted = report.cleanup.folders_deleted,
                "Daily run finished"
            ),
            Err(e) => error!(error = %e, fatal = e.is_fatal_to_pass(), "Daily run failed"),
        }
    }

    info!("Daily job stopped");
}
