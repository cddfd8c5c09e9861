//! The recurring-task generation engine.
//!
//! Given a parent template's recurrence rule and its generation watermark,
//! the engine deterministically computes which missed occurrences must be
//! materialized as task instances, and does so idempotently under repeated,
//! concurrent, or delayed invocation.
//!
//! # Components
//!
//! - [`next_occurrence`]: pure occurrence calculator, no I/O.
//! - [`materialize`]: builds an independent instance from a parent for one
//!   occurrence date.
//! - [`RecurrenceEngine`]: the driver. One [`RecurrenceEngine::run`] pass
//!   scans eligible parents, walks each one forward to "today", and advances
//!   its watermark with a conditional write.
//!
//! "Today" is always an explicit input threaded through the engine — the
//! core never reads the wall clock for date arithmetic, so every code path
//! is testable with fixed dates.

mod calculator;
mod generator;

pub use calculator::next_occurrence;
pub use generator::{materialize, RecurrenceEngine};

use serde::Serialize;
use thiserror::Error;

/// Engine configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Whether archived parents keep generating instances. Defaults to true.
    pub include_archived: bool,
    /// UTC hour of the daily scheduled run. Defaults to 2.
    pub hour: u32,
}

impl GenerationConfig {
    /// Load configuration from environment variables:
    /// `TASKMILL_RECUR_ARCHIVED` (true/false) and `TASKMILL_RECURRENCE_HOUR`
    /// (0-23).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let include_archived = std::env::var("TASKMILL_RECUR_ARCHIVED")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(defaults.include_archived);

        let hour = std::env::var("TASKMILL_RECURRENCE_HOUR")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|h| *h < 24)
            .unwrap_or(defaults.hour);

        Self {
            include_archived,
            hour,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            include_archived: true,
            hour: 2,
        }
    }
}

/// Outcome of one generation pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GenerationReport {
    /// Parents matched by the eligibility query.
    pub eligible_parents: usize,
    /// Instances materialized across all parents.
    pub instances_created: usize,
    /// Parents whose processing failed; they stay eligible for the next run.
    pub failed_parents: usize,
}

/// Failure of a whole generation pass. Per-parent failures are logged and
/// counted in the report instead.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Failed to query eligible parents: {0}")]
    Catalog(#[source] anyhow::Error),
}
