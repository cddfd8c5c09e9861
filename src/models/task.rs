use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single todo item owned by a user.
///
/// Tasks come in two flavors:
///
/// - **Parent templates** (`is_instance = false`): may carry a recurrence
///   rule. The generation engine scans these and materializes one instance
///   per missed occurrence.
/// - **Generated instances** (`is_instance = true`): concrete, independently
///   completable copies produced from a parent for one occurrence date. An
///   instance never spawns further instances.
///
/// `last_generated_at` is the parent's generation watermark: the calendar
/// date through which instance generation has been completed. It is
/// monotonically non-decreasing and never set past "today" at the time of a
/// generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub description: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Set when `completed` transitions to true, cleared on reversal.
    pub completed_at: Option<DateTime<Utc>>,
    pub recurrence: RecurrenceKind,
    pub recurrence_rule: RecurrenceRule,
    /// Generation watermark; meaningful only on parent templates.
    pub last_generated_at: Option<NaiveDate>,
    pub is_instance: bool,
    /// Set iff `is_instance` is true, referencing the originating parent.
    pub parent_id: Option<Uuid>,
    pub is_archived: bool,
    pub pinned: bool,
    /// Stable user-defined ordering within a list.
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task priority. Defaults to `Medium` on creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// How often a parent template produces instances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// Kind-specific recurrence parameters.
///
/// Weekly rules read `day_of_week` (0–6, Sunday = 0). Monthly rules read
/// `day_of_month` (clamped to the target month's length). Yearly rules read
/// `month` (0–11) and `day_of_month`. Fields irrelevant to the active kind
/// are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub day_of_week: Option<u32>,
    pub day_of_month: Option<u32>,
    pub month: Option<u32>,
}

/// An inline checklist item on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Input for creating a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub text: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
    pub subtasks: Option<Vec<Subtask>>,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub recurrence: Option<RecurrenceKind>,
    pub recurrence_rule: Option<RecurrenceRule>,
}

/// Input for updating a task. Fields left as `None` are unchanged.
///
/// Changing `recurrence` resets the generation watermark: switching to
/// `none` also clears the rule, switching between active kinds restarts
/// generation from the task's due date or creation date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub text: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
    pub subtasks: Option<Vec<Subtask>>,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub is_archived: Option<bool>,
    pub pinned: Option<bool>,
    pub recurrence: Option<RecurrenceKind>,
    pub recurrence_rule: Option<RecurrenceRule>,
}

/// Input for bulk reordering: task ids in their new display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderInput {
    pub order: Vec<Uuid>,
}

/// List-endpoint filters, matching the query parameters of
/// `GET /users/{user_id}/tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    /// Substring match against text, description and tags.
    pub search: Option<String>,
    /// `completed`, `incomplete`, or `priority-high|medium|low`.
    pub filter: Option<String>,
    /// Exact tag match.
    pub tag: Option<String>,
    /// `overdue`, `upcoming-7-days`, `this-week`, or `this-month`.
    pub date_filter: Option<String>,
    /// When true, list archived tasks instead of active ones.
    pub archived: Option<bool>,
}
