//! Domain models for taskmill.
//!
//! # Core Concepts
//!
//! - [`Task`]: The central entity. A task is either a *parent template*
//!   (`is_instance = false`, may carry a recurrence rule) or a *generated
//!   instance* (`is_instance = true`, linked to its parent via `parent_id`).
//! - [`RecurrenceKind`] / [`RecurrenceRule`]: Describe how often a parent
//!   template spawns instances, and on which weekday / day-of-month / month.
//! - [`Subtask`]: An inline checklist item. Subtask templates on a parent are
//!   copied onto every generated instance with their completion reset.

mod task;

pub use task::*;
