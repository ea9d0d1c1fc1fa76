//! Background scheduling for the claims pipeline.
//!
//! Two timer loops, spawned from `main`:
//! 1. Ingest: full pipeline run on a fixed interval, plus extra runs at a
//!    business-hours timetable, plus a daily retention prune.
//! 2. Health: the monitor's probes on an hourly cadence.
//!
//! Each loop returns a `JoinHandle` and a shutdown flag checked every tick.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ingest::DirSource;
use crate::monitor::HealthMonitor;
use crate::pipeline::processor::ClaimProcessor;
use crate::store::Database;

/// Default ingest interval: 4 hours.
const DEFAULT_INGEST_INTERVAL_SECS: u64 = 14_400;

/// Default health check interval: 1 hour.
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 3_600;

/// Extra ingest runs at 08:00, 13:00 and 18:00 UTC, on top of the interval.
const DAILY_RUN_SCHEDULE: &str = "0 0 8,13,18 * * *";

/// Hours between retention prunes.
const PRUNE_INTERVAL_HOURS: i64 = 24;

/// Spawn the background ingest loop.
///
/// The loop runs the full pipeline immediately on startup, then every
/// `interval_secs` (falling back to `INGEST_INTERVAL_SECS` or the 4-hour
/// default), and additionally whenever the business-hours timetable fires.
/// Once a day it prunes stored emails and archived documents older than
/// `keep_days`.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_ingest_loop(
    db: Arc<dyn Database>,
    processor: Arc<ClaimProcessor>,
    source: Arc<DirSource>,
    keep_days: u32,
    interval_secs: Option<u64>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let interval = interval_secs.unwrap_or_else(|| {
        std::env::var("INGEST_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INGEST_INTERVAL_SECS)
    });

    let handle = tokio::spawn(async move {
        info!("Ingest loop started: every {interval}s plus the daily timetable");

        let mut tick = tokio::time::interval(Duration::from_secs(interval));
        let mut last_prune: Option<DateTime<Utc>> = None;

        // First interval tick fires immediately, so a run happens at startup.
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = sleep_until_daily_run() => {
                    debug!("Daily timetable fired");
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                info!("Ingest loop shutting down");
                return;
            }

            if let Err(e) = processor.run_ingest(source.as_ref()).await {
                error!("Ingest run failed: {e}");
            }

            let prune_due = last_prune
                .map(|t| Utc::now() - t >= chrono::Duration::hours(PRUNE_INTERVAL_HOURS))
                .unwrap_or(true);
            if prune_due {
                prune_old_data(&db, &source, keep_days).await;
                last_prune = Some(Utc::now());
            }
        }
    });

    (handle, shutdown_flag)
}

/// Spawn the background health check loop.
///
/// The first tick fires immediately, so one check runs at startup. Interval
/// falls back to `HEALTH_INTERVAL_SECS` or the hourly default.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_health_loop(
    monitor: Arc<HealthMonitor>,
    interval_secs: Option<u64>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let interval = interval_secs.unwrap_or_else(|| {
        std::env::var("HEALTH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS)
    });

    let handle = tokio::spawn(async move {
        info!("Health monitor started: checking every {interval}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Health monitor shutting down");
                return;
            }

            // The check logs and alerts on its own; only the probe failure
            // itself needs reporting here.
            if let Err(e) = monitor.run_health_check().await {
                error!("Health check failed: {e}");
            }
        }
    });

    (handle, shutdown_flag)
}

/// Sleep until the next business-hours run. Falls back to a day-long sleep
/// when the timetable cannot be parsed.
async fn sleep_until_daily_run() {
    match next_timetable_fire(DAILY_RUN_SCHEDULE) {
        Some(next) => {
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => tokio::time::sleep(Duration::from_secs(86_400)).await,
    }
}

/// Parse a cron expression and compute the next fire time from now.
fn next_timetable_fire(schedule: &str) -> Option<DateTime<Utc>> {
    match cron::Schedule::from_str(schedule) {
        Ok(parsed) => parsed.upcoming(Utc).next(),
        Err(e) => {
            warn!("Invalid timetable '{schedule}': {e}");
            None
        }
    }
}

/// Delete stored emails and archived documents past the retention window.
/// Failures are logged and retried on the next daily pass.
async fn prune_old_data(db: &Arc<dyn Database>, source: &Arc<DirSource>, keep_days: u32) {
    if let Err(e) = db.prune_emails(keep_days).await {
        error!("Email prune failed: {e}");
    }
    if let Err(e) = source.prune_archive(keep_days) {
        error!("Archive prune failed: {e}");
    }
}
