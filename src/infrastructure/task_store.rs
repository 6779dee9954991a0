use crate::domain::models::{Priority, RecurrencePattern, Task, TaskPatch, TaskStatus};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Task collection, scoped by owner on every call.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<Task, CoreError>;
    async fn update(
        &self,
        user_id: &str,
        task_id: &str,
        patch: TaskPatch,
        now: NaiveDateTime,
    ) -> Result<Task, CoreError>;
    async fn delete(&self, user_id: &str, task_id: &str) -> Result<(), CoreError>;
    async fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, CoreError>;
    async fn get_many(&self, user_id: &str, task_ids: &[String]) -> Result<Vec<Task>, CoreError>;
    /// Active tasks, newest first.
    async fn list_inbox(&self, user_id: &str) -> Result<Vec<Task>, CoreError>;
    /// Recurring tasks still eligible for materialization.
    async fn list_recurring_active(&self, user_id: &str) -> Result<Vec<Task>, CoreError>;
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(raw: &str, context: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| CoreError::InvalidInput(format!("invalid {context} '{raw}': {error}")))
}

pub(crate) fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str, context: &str) -> Result<NaiveDateTime, CoreError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|error| CoreError::InvalidInput(format!("invalid {context} '{raw}': {error}")))
}

#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db_path: PathBuf,
}

impl SqliteTaskStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        let connection = Connection::open(&self.db_path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(connection)
    }
}

const TASK_COLUMNS: &str = "id, user_id, title, notes, status, priority, duration_minutes, \
     color, is_recurring, recurrence_pattern, recurrence_days, recurrence_end_date, \
     created_at, updated_at";

struct RawTask {
    id: String,
    user_id: String,
    title: String,
    notes: Option<String>,
    status: String,
    priority: String,
    duration_minutes: i64,
    color: Option<String>,
    is_recurring: i64,
    recurrence_pattern: Option<String>,
    recurrence_days: String,
    recurrence_end_date: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_task_from_row(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        notes: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        duration_minutes: row.get(6)?,
        color: row.get(7)?,
        is_recurring: row.get(8)?,
        recurrence_pattern: row.get(9)?,
        recurrence_days: row.get(10)?,
        recurrence_end_date: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn decode_task(raw: RawTask) -> Result<Task, CoreError> {
    let status = TaskStatus::parse(&raw.status)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown task status '{}'", raw.status)))?;
    let priority = Priority::parse(&raw.priority).ok_or_else(|| {
        CoreError::InvalidInput(format!("unknown task priority '{}'", raw.priority))
    })?;
    // Unknown pattern text decodes to None so the recurrence predicate fails
    // safe instead of the whole row read failing.
    let recurrence_pattern = raw
        .recurrence_pattern
        .as_deref()
        .and_then(RecurrencePattern::parse);
    let recurrence_days: Vec<u8> = serde_json::from_str(&raw.recurrence_days).unwrap_or_default();
    let recurrence_end_date = raw
        .recurrence_end_date
        .as_deref()
        .map(|value| parse_date(value, "task.recurrence_end_date"))
        .transpose()?;

    Ok(Task {
        id: raw.id,
        user_id: raw.user_id,
        title: raw.title,
        notes: raw.notes,
        status,
        priority,
        duration_minutes: raw.duration_minutes.max(0) as u32,
        color: raw.color,
        is_recurring: raw.is_recurring != 0,
        recurrence_pattern,
        recurrence_days,
        recurrence_end_date,
        created_at: parse_timestamp(&raw.created_at, "task.created_at")?,
        updated_at: parse_timestamp(&raw.updated_at, "task.updated_at")?,
    })
}

fn write_task(connection: &Connection, task: &Task) -> Result<(), CoreError> {
    connection.execute(
        "INSERT INTO tasks (id, user_id, title, notes, status, priority, duration_minutes, \
         color, is_recurring, recurrence_pattern, recurrence_days, recurrence_end_date, \
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           notes = excluded.notes,
           status = excluded.status,
           priority = excluded.priority,
           duration_minutes = excluded.duration_minutes,
           color = excluded.color,
           is_recurring = excluded.is_recurring,
           recurrence_pattern = excluded.recurrence_pattern,
           recurrence_days = excluded.recurrence_days,
           recurrence_end_date = excluded.recurrence_end_date,
           updated_at = excluded.updated_at",
        params![
            task.id,
            task.user_id,
            task.title,
            task.notes,
            task.status.as_str(),
            task.priority.as_str(),
            task.duration_minutes as i64,
            task.color,
            task.is_recurring as i64,
            task.recurrence_pattern.map(RecurrencePattern::as_str),
            serde_json::to_string(&task.recurrence_days)?,
            task.recurrence_end_date.map(format_date),
            format_timestamp(task.created_at),
            format_timestamp(task.updated_at),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, CoreError> {
        let connection = self.connect()?;
        write_task(&connection, &task)?;
        Ok(task)
    }

    async fn update(
        &self,
        user_id: &str,
        task_id: &str,
        patch: TaskPatch,
        now: NaiveDateTime,
    ) -> Result<Task, CoreError> {
        let mut task = self
            .get(user_id, task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        patch.apply(&mut task);
        task.updated_at = now;

        let connection = self.connect()?;
        write_task(&connection, &task)?;
        Ok(task)
    }

    async fn delete(&self, user_id: &str, task_id: &str) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(())
    }

    async fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, CoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                params![task_id, user_id],
                raw_task_from_row,
            )
            .optional()?;
        raw.map(decode_task).transpose()
    }

    async fn get_many(&self, user_id: &str, task_ids: &[String]) -> Result<Vec<Task>, CoreError> {
        let mut tasks = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            if let Some(task) = self.get(user_id, task_id).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn list_inbox(&self, user_id: &str) -> Result<Vec<Task>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND status IN ('todo', 'in_progress')
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = statement.query_map(params![user_id], raw_task_from_row)?;
        rows.map(|row| decode_task(row?)).collect()
    }

    async fn list_recurring_active(&self, user_id: &str) -> Result<Vec<Task>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND is_recurring = 1 AND status IN ('todo', 'in_progress')
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = statement.query_map(params![user_id], raw_task_from_row)?;
        rows.map(|row| decode_task(row?)).collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    rows: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, CoreError> {
        self.rows
            .lock()
            .map_err(|error| CoreError::InvalidInput(format!("task store lock poisoned: {error}")))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, CoreError> {
        self.lock()?.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        user_id: &str,
        task_id: &str,
        patch: TaskPatch,
        now: NaiveDateTime,
    ) -> Result<Task, CoreError> {
        let mut rows = self.lock()?;
        let task = rows
            .get_mut(task_id)
            .filter(|task| task.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        patch.apply(task);
        task.updated_at = now;
        Ok(task.clone())
    }

    async fn delete(&self, user_id: &str, task_id: &str) -> Result<(), CoreError> {
        let mut rows = self.lock()?;
        if rows
            .get(task_id)
            .map(|task| task.user_id == user_id)
            .unwrap_or(false)
        {
            rows.remove(task_id);
        }
        Ok(())
    }

    async fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, CoreError> {
        Ok(self
            .lock()?
            .get(task_id)
            .filter(|task| task.user_id == user_id)
            .cloned())
    }

    async fn get_many(&self, user_id: &str, task_ids: &[String]) -> Result<Vec<Task>, CoreError> {
        let rows = self.lock()?;
        Ok(task_ids
            .iter()
            .filter_map(|task_id| rows.get(task_id))
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_inbox(&self, user_id: &str) -> Result<Vec<Task>, CoreError> {
        let rows = self.lock()?;
        let mut tasks: Vec<Task> = rows
            .values()
            .filter(|task| task.user_id == user_id && task.status.is_active())
            .cloned()
            .collect();
        tasks.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(tasks)
    }

    async fn list_recurring_active(&self, user_id: &str) -> Result<Vec<Task>, CoreError> {
        let tasks = self.list_inbox(user_id).await?;
        Ok(tasks.into_iter().filter(|task| task.is_recurring).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::tests::sample_task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDb {
        path: PathBuf,
    }

    impl TempDb {
        fn new() -> Self {
            let sequence = NEXT_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "daygrid-task-store-tests-{}-{}.db",
                std::process::id(),
                sequence
            ));
            crate::infrastructure::storage::initialize_database(&path).expect("initialize db");
            Self { path }
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[tokio::test]
    async fn sqlite_roundtrips_task_rows() {
        let db = TempDb::new();
        let store = SqliteTaskStore::new(&db.path);
        let task = sample_task();

        store.insert(task.clone()).await.expect("insert task");
        let loaded = store
            .get(&task.user_id, &task.id)
            .await
            .expect("get task")
            .expect("task exists");
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn sqlite_update_applies_patch_and_stamps_updated_at() {
        let db = TempDb::new();
        let store = SqliteTaskStore::new(&db.path);
        let task = sample_task();
        store.insert(task.clone()).await.expect("insert task");

        let now = task.created_at + chrono::Duration::hours(2);
        let updated = store
            .update(
                &task.user_id,
                &task.id,
                TaskPatch {
                    duration_minutes: Some(45),
                    notes: Some(None),
                    ..TaskPatch::default()
                },
                now,
            )
            .await
            .expect("update task");

        assert_eq!(updated.duration_minutes, 45);
        assert_eq!(updated.notes, None);
        assert_eq!(updated.updated_at, now);
    }

    #[tokio::test]
    async fn sqlite_scopes_reads_by_owner() {
        let db = TempDb::new();
        let store = SqliteTaskStore::new(&db.path);
        let task = sample_task();
        store.insert(task.clone()).await.expect("insert task");

        let foreign = store.get("someone-else", &task.id).await.expect("get");
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn inbox_lists_active_tasks_newest_first() {
        let store = InMemoryTaskStore::default();
        let mut older = sample_task();
        older.id = "tsk-old".to_string();
        let mut newer = sample_task();
        newer.id = "tsk-new".to_string();
        newer.created_at = newer.created_at + chrono::Duration::days(1);
        let mut done = sample_task();
        done.id = "tsk-done".to_string();
        done.status = TaskStatus::Done;

        for task in [older, newer, done] {
            store.insert(task).await.expect("insert task");
        }

        let inbox = store.list_inbox("usr-1").await.expect("list inbox");
        let ids: Vec<&str> = inbox.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["tsk-new", "tsk-old"]);
    }

    #[tokio::test]
    async fn recurring_listing_excludes_cancelled_and_one_off_tasks() {
        let store = InMemoryTaskStore::default();
        let recurring = sample_task();
        let mut one_off = sample_task();
        one_off.id = "tsk-2".to_string();
        one_off.is_recurring = false;
        one_off.recurrence_pattern = None;
        let mut cancelled = sample_task();
        cancelled.id = "tsk-3".to_string();
        cancelled.status = TaskStatus::Cancelled;

        for task in [recurring.clone(), one_off, cancelled] {
            store.insert(task).await.expect("insert task");
        }

        let listed = store
            .list_recurring_active("usr-1")
            .await
            .expect("list recurring");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, recurring.id);
    }

    #[tokio::test]
    async fn unknown_pattern_text_decodes_to_none() {
        let db = TempDb::new();
        let store = SqliteTaskStore::new(&db.path);
        let task = sample_task();
        store.insert(task.clone()).await.expect("insert task");

        let connection = Connection::open(&db.path).expect("open db");
        connection
            .execute(
                "UPDATE tasks SET recurrence_pattern = 'fortnightly' WHERE id = ?1",
                params![task.id],
            )
            .expect("corrupt pattern");

        let loaded = store
            .get(&task.user_id, &task.id)
            .await
            .expect("get task")
            .expect("task exists");
        assert_eq!(loaded.recurrence_pattern, None);
    }
}
