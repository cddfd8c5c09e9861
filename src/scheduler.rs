//! Daily trigger for the recurrence engine.
//!
//! The engine takes an explicit reference day per pass; this module is
//! where the wall clock comes in: one pass immediately at startup (to
//! recover runs missed while the process was down) and one pass per day at
//! the configured UTC hour. Back-to-back or overlapping passes are safe —
//! idempotence lives in the engine, not here.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::recurrence::RecurrenceEngine;

/// Spawn the background generation loop.
pub fn spawn(engine: RecurrenceEngine) -> tokio::task::JoinHandle<()> {
    let hour = engine.config().hour;
    tokio::spawn(async move {
        tracing::info!("Running recurring task generation on startup");
        run_once(&engine);

        loop {
            let wait = until_next_run(Utc::now(), hour);
            tracing::debug!("Next scheduled generation pass in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;
            run_once(&engine);
        }
    })
}

fn run_once(engine: &RecurrenceEngine) {
    let today = Utc::now().date_naive();
    if let Err(e) = engine.run(today) {
        tracing::error!("Recurring task generation pass failed: {}", e);
    }
}

/// Time until the next daily run at `hour:00:00` UTC, strictly in the
/// future relative to `now`.
fn until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let now_naive = now.naive_utc();
    let mut next = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or(now_naive);
    if next <= now_naive {
        next += chrono::Duration::days(1);
    }
    (next - now_naive).to_std().unwrap_or_default()
}
