//! taskmill: a personal task-management backend.
//!
//! Users own todo items with priorities, tags, due dates, subtasks and
//! recurrence rules. The interesting part lives in [`recurrence`]: the
//! engine that materializes instances of recurring parent templates,
//! deterministically and idempotently, driven by [`scheduler`]. The
//! [`api`] module exposes the task CRUD surface over HTTP and [`db`] holds
//! the SQLite-backed store.

pub mod api;
pub mod db;
pub mod models;
pub mod recurrence;
pub mod scheduler;
