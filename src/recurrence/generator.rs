//! The generation driver and instance materializer.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{RecurrenceKind, RecurrenceRule, Subtask, Task};

use super::calculator::next_occurrence;
use super::{GenerationConfig, GenerationError, GenerationReport};

/// Drives instance generation across all eligible parent templates.
///
/// Cheap to clone; clones share the run lock, so the startup pass and the
/// daily scheduled pass cannot interleave within one process. Across
/// processes the conditional watermark write in
/// [`Database::advance_watermark`] keeps runs from double-generating.
#[derive(Clone)]
pub struct RecurrenceEngine {
    db: Database,
    config: GenerationConfig,
    run_lock: Arc<Mutex<()>>,
}

impl RecurrenceEngine {
    pub fn new(db: Database, config: GenerationConfig) -> Self {
        Self {
            db,
            config,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// One generation pass with `today` as the reference day.
    ///
    /// Each parent is processed independently: a failure is logged and
    /// counted, leaving its watermark untouched so the next scheduled run
    /// retries it. Re-running on the same day is a no-op because every
    /// successful pass advances the watermark to `today`, which removes the
    /// parent from the eligibility query for the rest of the day.
    pub fn run(&self, today: NaiveDate) -> Result<GenerationReport, GenerationError> {
        let _guard = self.run_lock.lock().expect("generation run lock poisoned");

        let parents = self
            .db
            .find_eligible_parents(today, self.config.include_archived)
            .map_err(GenerationError::Catalog)?;

        let now = Utc::now();
        let mut report = GenerationReport {
            eligible_parents: parents.len(),
            ..Default::default()
        };

        for parent in parents {
            match self.catch_up(&parent, today, now) {
                Ok(created) => report.instances_created += created,
                Err(e) => {
                    tracing::warn!(
                        "Failed to generate instances for task {}: {}; will retry next run",
                        parent.id,
                        e
                    );
                    report.failed_parents += 1;
                }
            }
        }

        tracing::info!(
            "Generation pass for {}: {} eligible, {} instances created, {} failed",
            today,
            report.eligible_parents,
            report.instances_created,
            report.failed_parents
        );
        Ok(report)
    }

    /// Walk one parent forward from its anchor, materializing an instance
    /// per missed occurrence up to and including `today`, then advance the
    /// watermark.
    fn catch_up(&self, parent: &Task, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        // First available of: watermark, due date, creation date.
        let anchor = parent
            .last_generated_at
            .or(parent.due_date)
            .unwrap_or_else(|| parent.created_at.date_naive());

        let mut created = 0;
        let mut cursor = next_occurrence(anchor, parent.recurrence, &parent.recurrence_rule);
        while let Some(occurrence) = cursor {
            if occurrence > today {
                break;
            }
            let instance = materialize(parent, occurrence, now);
            self.db.insert_task(&instance)?;
            tracing::debug!(
                "Generated instance of \"{}\" due {}",
                parent.text,
                occurrence
            );
            created += 1;
            cursor = next_occurrence(occurrence, parent.recurrence, &parent.recurrence_rule);
        }

        // Advance even when nothing was generated, so the parent drops out
        // of the eligibility query until tomorrow.
        if !self.db.advance_watermark(parent.id, today)? {
            tracing::debug!(
                "Watermark for task {} already advanced by a concurrent run",
                parent.id
            );
        }

        Ok(created)
    }
}

/// Build a new, independent task instance from a parent for one occurrence
/// date. Pure construction; the caller persists it.
///
/// The instance copies owner, text, priority, description and tags,
/// deep-copies the subtask templates with their completion reset, takes the
/// occurrence date as its due date, and re-anchors the parent's reminder on
/// the occurrence day keeping the original time of day. Recurrence fields
/// are inert on the instance.
pub fn materialize(parent: &Task, occurrence: NaiveDate, now: DateTime<Utc>) -> Task {
    let reminder_time = parent.reminder_time.and_then(|reminder| {
        occurrence
            .and_hms_opt(reminder.hour(), reminder.minute(), reminder.second())
            .map(|dt| dt.and_utc())
    });

    Task {
        id: Uuid::new_v4(),
        user_id: parent.user_id,
        text: parent.text.clone(),
        description: parent.description.clone(),
        priority: parent.priority,
        tags: parent.tags.clone(),
        subtasks: parent
            .subtasks
            .iter()
            .map(|st| Subtask {
                text: st.text.clone(),
                completed: false,
            })
            .collect(),
        due_date: Some(occurrence),
        reminder_time,
        completed: false,
        completed_at: None,
        recurrence: RecurrenceKind::None,
        recurrence_rule: RecurrenceRule::default(),
        last_generated_at: None,
        is_instance: true,
        parent_id: Some(parent.id),
        is_archived: false,
        pinned: false,
        display_order: parent.display_order,
        created_at: now,
        updated_at: now,
    }
}
