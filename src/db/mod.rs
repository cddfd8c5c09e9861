mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::*;

/// Column list shared by every task SELECT. Order matters: `task_from_row`
/// reads by index.
const TASK_COLUMNS: &str = "id, user_id, text, description, priority, tags, subtasks, \
     due_date, reminder_time, completed, completed_at, recurrence, recurrence_rule, \
     last_generated_at, is_instance, parent_id, is_archived, pinned, display_order, \
     created_at, updated_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        if let Ok(path) = std::env::var("TASKMILL_DB") {
            return Self::open(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("", "", "taskmill")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("taskmill.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Task CRUD
    // ============================================================

    pub fn create_task(&self, user_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id,
            text: input.text,
            description: input.description.unwrap_or_default(),
            priority: input.priority.unwrap_or(Priority::Medium),
            tags: input.tags.unwrap_or_default(),
            subtasks: input.subtasks.unwrap_or_default(),
            due_date: input.due_date,
            reminder_time: input.reminder_time,
            completed: false,
            completed_at: None,
            recurrence: input.recurrence.unwrap_or(RecurrenceKind::None),
            recurrence_rule: input.recurrence_rule.unwrap_or_default(),
            // Generation starts from scratch: the driver anchors on the due
            // date or creation date until the first watermark is written.
            last_generated_at: None,
            is_instance: false,
            parent_id: None,
            is_archived: false,
            pinned: false,
            display_order: 0,
            created_at: now,
            updated_at: now,
        };
        self.insert_task(&task)?;
        Ok(task)
    }

    /// Persist a fully-built task as a new record. Used by `create_task` and
    /// by the recurrence engine when materializing instances.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            rusqlite::params![
                task.id.to_string(),
                task.user_id.to_string(),
                &task.text,
                &task.description,
                task.priority.as_str(),
                serde_json::to_string(&task.tags)?,
                serde_json::to_string(&task.subtasks)?,
                task.due_date.map(format_date),
                task.reminder_time.map(|t| t.to_rfc3339()),
                task.completed as i32,
                task.completed_at.map(|t| t.to_rfc3339()),
                task.recurrence.as_str(),
                serde_json::to_string(&task.recurrence_rule)?,
                task.last_generated_at.map(format_date),
                task.is_instance as i32,
                task.parent_id.map(|u| u.to_string()),
                task.is_archived as i32,
                task.pinned as i32,
                task.display_order,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, user_id: Uuid, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
        ))?;

        let mut rows = stmt.query([id.to_string(), user_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(task_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// List a user's tasks with the view filters from the list endpoint.
    ///
    /// `today` is the caller's reference day for the date filters; it is
    /// passed in rather than read from the clock here so queries stay
    /// reproducible in tests.
    pub fn list_tasks(&self, user_id: Uuid, filter: &TaskFilter, today: NaiveDate) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];

        // Archived tasks live in their own view
        if filter.archived.unwrap_or(false) {
            sql.push_str(" AND is_archived = 1");
        } else {
            sql.push_str(" AND is_archived = 0");
        }

        let mut completion_pinned = false;
        match filter.filter.as_deref() {
            Some("completed") => {
                sql.push_str(" AND completed = 1");
                completion_pinned = true;
            }
            Some("incomplete") => {
                sql.push_str(" AND completed = 0");
                completion_pinned = true;
            }
            Some(f) if f.starts_with("priority-") => {
                if let Some(priority) = Priority::from_str(&f["priority-".len()..]) {
                    sql.push_str(" AND priority = ?");
                    params.push(Box::new(priority.as_str().to_string()));
                }
            }
            _ => {}
        }

        if let Some(tag) = &filter.tag {
            // Tags are a JSON array of strings; match the quoted element.
            sql.push_str(" AND tags LIKE ?");
            params.push(Box::new(format!("%\"{}\"%", tag)));
        }

        if let Some(search) = &filter.search {
            sql.push_str(" AND (text LIKE ? OR description LIKE ? OR tags LIKE ?)");
            let pattern = format!("%{}%", search);
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }

        match filter.date_filter.as_deref() {
            Some("overdue") => {
                sql.push_str(" AND due_date IS NOT NULL AND due_date < ?");
                params.push(Box::new(format_date(today)));
                if !completion_pinned {
                    sql.push_str(" AND completed = 0");
                }
            }
            Some("upcoming-7-days") => {
                let end = today.checked_add_days(Days::new(7)).unwrap_or(today);
                sql.push_str(" AND due_date >= ? AND due_date <= ?");
                params.push(Box::new(format_date(today)));
                params.push(Box::new(format_date(end)));
                if !completion_pinned {
                    sql.push_str(" AND completed = 0");
                }
            }
            Some("this-week") => {
                // ISO week, Monday through Sunday
                let start = today
                    .checked_sub_days(Days::new(
                        today.weekday().num_days_from_monday() as u64
                    ))
                    .unwrap_or(today);
                let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
                sql.push_str(" AND due_date >= ? AND due_date <= ?");
                params.push(Box::new(format_date(start)));
                params.push(Box::new(format_date(end)));
            }
            Some("this-month") => {
                let start = today.with_day(1).unwrap_or(today);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(today);
                sql.push_str(" AND due_date >= ? AND due_date <= ?");
                params.push(Box::new(format_date(start)));
                params.push(Box::new(format_date(end)));
            }
            _ => {}
        }

        sql.push_str(" ORDER BY pinned DESC, display_order, created_at DESC");

        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let tasks = stmt
            .query_map(params_ref.as_slice(), task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Tasks due on a specific day (the "My Day" view).
    pub fn tasks_due_on(&self, user_id: Uuid, day: NaiveDate) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ? AND due_date = ?
             ORDER BY display_order, created_at DESC"
        ))?;

        let tasks = stmt
            .query_map([user_id.to_string(), format_date(day)], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn update_task(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateTaskInput,
    ) -> Result<Option<Task>> {
        let Some(mut task) = self.get_task(user_id, id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        if let Some(text) = input.text {
            task.text = text;
        }
        if let Some(description) = input.description {
            task.description = description;
        }
        if let Some(priority) = input.priority {
            task.priority = priority;
        }
        if let Some(tags) = input.tags {
            task.tags = tags;
        }
        if let Some(subtasks) = input.subtasks {
            task.subtasks = subtasks;
        }
        if let Some(due_date) = input.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(reminder_time) = input.reminder_time {
            task.reminder_time = Some(reminder_time);
        }
        if let Some(is_archived) = input.is_archived {
            task.is_archived = is_archived;
        }
        if let Some(pinned) = input.pinned {
            task.pinned = pinned;
        }
        if let Some(completed) = input.completed {
            if completed != task.completed {
                task.completed_at = if completed { Some(now) } else { None };
            }
            task.completed = completed;
        }

        // Recurrence transitions. Instances never become templates; a switch
        // to `none` clears the rule and the watermark, any other switch
        // resets the watermark so generation restarts from the anchor chain.
        if let Some(kind) = input.recurrence {
            if kind != task.recurrence && !task.is_instance {
                task.recurrence = kind;
                task.last_generated_at = None;
                task.recurrence_rule = if kind == RecurrenceKind::None {
                    RecurrenceRule::default()
                } else {
                    input.recurrence_rule.clone().unwrap_or_default()
                };
            } else if task.recurrence != RecurrenceKind::None {
                if let Some(rule) = input.recurrence_rule.clone() {
                    task.recurrence_rule = rule;
                }
            }
        } else if let Some(rule) = input.recurrence_rule {
            if task.recurrence != RecurrenceKind::None {
                task.recurrence_rule = rule;
            }
        }

        task.updated_at = now;

        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE tasks SET text = ?, description = ?, priority = ?, tags = ?, subtasks = ?,
                 due_date = ?, reminder_time = ?, completed = ?, completed_at = ?,
                 recurrence = ?, recurrence_rule = ?, last_generated_at = ?,
                 is_archived = ?, pinned = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
            rusqlite::params![
                &task.text,
                &task.description,
                task.priority.as_str(),
                serde_json::to_string(&task.tags)?,
                serde_json::to_string(&task.subtasks)?,
                task.due_date.map(format_date),
                task.reminder_time.map(|t| t.to_rfc3339()),
                task.completed as i32,
                task.completed_at.map(|t| t.to_rfc3339()),
                task.recurrence.as_str(),
                serde_json::to_string(&task.recurrence_rule)?,
                task.last_generated_at.map(format_date),
                task.is_archived as i32,
                task.pinned as i32,
                task.updated_at.to_rfc3339(),
                id.to_string(),
                user_id.to_string(),
            ],
        )?;

        Ok(Some(task))
    }

    /// Flip a task's completion flag, maintaining `completed_at`.
    ///
    /// Completion is refused while any subtask is still open.
    pub fn toggle_complete(&self, user_id: Uuid, id: Uuid) -> Result<Option<Task>> {
        let Some(mut task) = self.get_task(user_id, id)? else {
            return Ok(None);
        };

        if !task.completed && task.subtasks.iter().any(|st| !st.completed) {
            anyhow::bail!("Complete all subtasks before marking the task as complete");
        }

        let now = Utc::now();
        task.completed = !task.completed;
        task.completed_at = if task.completed { Some(now) } else { None };
        task.updated_at = now;

        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE tasks SET completed = ?, completed_at = ?, updated_at = ? WHERE id = ? AND user_id = ?",
            rusqlite::params![
                task.completed as i32,
                task.completed_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
                id.to_string(),
                user_id.to_string(),
            ],
        )?;

        Ok(Some(task))
    }

    /// Delete a task. Deleting a recurring parent cascades to every
    /// instance generated from it.
    pub fn delete_task(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let Some(task) = self.get_task(user_id, id)? else {
            return Ok(false);
        };

        if task.recurrence != RecurrenceKind::None && !task.is_instance {
            let removed = self.delete_instances_of(id, user_id)?;
            if removed > 0 {
                tracing::info!("Deleted {} instances of recurring task {}", removed, id);
            }
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM tasks WHERE id = ? AND user_id = ?",
            [id.to_string(), user_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Remove every instance generated from the given parent. Returns the
    /// number of deleted rows.
    pub fn delete_instances_of(&self, parent_id: Uuid, user_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM tasks WHERE parent_id = ? AND user_id = ?",
            [parent_id.to_string(), user_id.to_string()],
        )?;
        Ok(rows)
    }

    pub fn clear_completed(&self, user_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM tasks WHERE user_id = ? AND completed = 1",
            [user_id.to_string()],
        )?;
        Ok(rows)
    }

    /// Rewrite display order from an ordered id list. Ids not owned by the
    /// user are ignored. Returns the number of updated rows.
    pub fn reorder_tasks(&self, user_id: Uuid, order: &[Uuid]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let mut updated = 0;
        for (index, id) in order.iter().enumerate() {
            updated += tx.execute(
                "UPDATE tasks SET display_order = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                rusqlite::params![index as i64, &now, id.to_string(), user_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(updated)
    }

    // ============================================================
    // Recurrence engine support
    // ============================================================

    /// Parent templates due for instance generation: recurring, not an
    /// instance, not completed, and with a watermark before `today` (or no
    /// watermark at all). Spans all users.
    pub fn find_eligible_parents(
        &self,
        today: NaiveDate,
        include_archived: bool,
    ) -> Result<Vec<Task>> {
        let mut sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE recurrence != 'none' AND is_instance = 0 AND completed = 0
               AND (last_generated_at IS NULL OR last_generated_at < ?)"
        );
        if !include_archived {
            sql.push_str(" AND is_archived = 0");
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let parents = stmt
            .query_map([format_date(today)], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parents)
    }

    /// Conditionally advance a parent's generation watermark to `today`.
    ///
    /// The guard makes the write a compare-and-set: it only applies when the
    /// stored watermark is still behind `today`, so concurrent generation
    /// runs cannot double-advance and the watermark never moves backwards.
    /// Returns false when another run got there first.
    pub fn advance_watermark(&self, id: Uuid, today: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE tasks SET last_generated_at = ?, updated_at = ?
             WHERE id = ? AND (last_generated_at IS NULL OR last_generated_at < ?)",
            rusqlite::params![
                format_date(today),
                Utc::now().to_rfc3339(),
                id.to_string(),
                format_date(today),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Instances generated from a parent, oldest occurrence first.
    pub fn instances_of(&self, parent_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id = ? ORDER BY due_date"
        ))?;

        let tasks = stmt
            .query_map([parent_id.to_string()], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        text: row.get(2)?,
        description: row.get(3)?,
        priority: Priority::from_str(&row.get::<_, String>(4)?).unwrap_or(Priority::Medium),
        tags: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
        subtasks: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        due_date: row.get::<_, Option<String>>(7)?.map(parse_date),
        reminder_time: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        completed: row.get::<_, i32>(9)? != 0,
        completed_at: row.get::<_, Option<String>>(10)?.map(parse_datetime),
        recurrence: RecurrenceKind::from_str(&row.get::<_, String>(11)?)
            .unwrap_or(RecurrenceKind::None),
        recurrence_rule: serde_json::from_str(&row.get::<_, String>(12)?).unwrap_or_default(),
        last_generated_at: row.get::<_, Option<String>>(13)?.map(parse_date),
        is_instance: row.get::<_, i32>(14)? != 0,
        parent_id: row.get::<_, Option<String>>(15)?.map(parse_uuid),
        is_archived: row.get::<_, i32>(16)? != 0,
        pinned: row.get::<_, i32>(17)? != 0,
        display_order: row.get(18)?,
        created_at: parse_datetime(row.get::<_, String>(19)?),
        updated_at: parse_datetime(row.get::<_, String>(20)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(s: String) -> NaiveDate {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
