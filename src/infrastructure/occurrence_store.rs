use crate::domain::models::{Occurrence, OccurrencePatch};
use crate::domain::timegrid;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::task_store::{
    format_date, format_timestamp, parse_date, parse_timestamp,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Occurrence collection, scoped by owner on every call.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Batch insert; either all rows land or the call fails.
    async fn insert_many(&self, rows: Vec<Occurrence>) -> Result<usize, CoreError>;
    async fn update(
        &self,
        user_id: &str,
        occurrence_id: &str,
        patch: OccurrencePatch,
        now: NaiveDateTime,
    ) -> Result<Occurrence, CoreError>;
    async fn delete(&self, user_id: &str, occurrence_id: &str) -> Result<(), CoreError>;
    async fn get(&self, user_id: &str, occurrence_id: &str)
        -> Result<Option<Occurrence>, CoreError>;
    /// All occurrences on a date, earliest start first.
    async fn list_for_date(&self, user_id: &str, date: NaiveDate)
        -> Result<Vec<Occurrence>, CoreError>;
    /// Task ids that already have an occurrence on the date.
    async fn task_ids_on(&self, user_id: &str, date: NaiveDate)
        -> Result<HashSet<String>, CoreError>;
    /// The task's most recent occurrence by date.
    async fn most_recent_for_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<Option<Occurrence>, CoreError>;
    async fn find_for_task_on(
        &self,
        user_id: &str,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Occurrence>, CoreError>;
    /// Not-yet-completed occurrences of a task on or after `from`
    /// (strictly after when `inclusive` is false).
    async fn pending_for_task(
        &self,
        user_id: &str,
        task_id: &str,
        from: NaiveDate,
        inclusive: bool,
    ) -> Result<Vec<Occurrence>, CoreError>;
    /// Earliest occurrence date per task, for inbox labels.
    async fn earliest_dates(&self, user_id: &str) -> Result<HashMap<String, NaiveDate>, CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteOccurrenceStore {
    db_path: PathBuf,
}

impl SqliteOccurrenceStore {
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

const OCCURRENCE_COLUMNS: &str = "id, task_id, user_id, date, start_time, end_time, \
     is_completed, completed_at, created_at, updated_at";

struct RawOccurrence {
    id: String,
    task_id: String,
    user_id: String,
    date: String,
    start_time: String,
    end_time: String,
    is_completed: i64,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_occurrence_from_row(row: &Row<'_>) -> rusqlite::Result<RawOccurrence> {
    Ok(RawOccurrence {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        date: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        is_completed: row.get(6)?,
        completed_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn decode_occurrence(raw: RawOccurrence) -> Result<Occurrence, CoreError> {
    let start_time = timegrid::parse_time(&raw.start_time).map_err(CoreError::InvalidTime)?;
    let end_time = timegrid::parse_time(&raw.end_time).map_err(CoreError::InvalidTime)?;
    let completed_at = raw
        .completed_at
        .as_deref()
        .map(|value| parse_timestamp(value, "occurrence.completed_at"))
        .transpose()?;

    Ok(Occurrence {
        date: parse_date(&raw.date, "occurrence.date")?,
        start_time,
        end_time,
        is_completed: raw.is_completed != 0,
        completed_at,
        created_at: parse_timestamp(&raw.created_at, "occurrence.created_at")?,
        updated_at: parse_timestamp(&raw.updated_at, "occurrence.updated_at")?,
        id: raw.id,
        task_id: raw.task_id,
        user_id: raw.user_id,
    })
}

fn write_occurrence(connection: &Connection, occurrence: &Occurrence) -> Result<(), CoreError> {
    connection.execute(
        "INSERT INTO occurrences (id, task_id, user_id, date, start_time, end_time, \
         is_completed, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
           date = excluded.date,
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           is_completed = excluded.is_completed,
           completed_at = excluded.completed_at,
           updated_at = excluded.updated_at",
        params![
            occurrence.id,
            occurrence.task_id,
            occurrence.user_id,
            format_date(occurrence.date),
            timegrid::format_time(occurrence.start_time),
            timegrid::format_time(occurrence.end_time),
            occurrence.is_completed as i64,
            occurrence.completed_at.map(format_timestamp),
            format_timestamp(occurrence.created_at),
            format_timestamp(occurrence.updated_at),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl OccurrenceStore for SqliteOccurrenceStore {
    async fn insert_many(&self, rows: Vec<Occurrence>) -> Result<usize, CoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for occurrence in &rows {
            write_occurrence(&transaction, occurrence)?;
        }
        transaction.commit()?;
        Ok(rows.len())
    }

    async fn update(
        &self,
        user_id: &str,
        occurrence_id: &str,
        patch: OccurrencePatch,
        now: NaiveDateTime,
    ) -> Result<Occurrence, CoreError> {
        let mut occurrence = self
            .get(user_id, occurrence_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        patch.apply(&mut occurrence);
        occurrence.updated_at = now;

        let connection = self.connect()?;
        write_occurrence(&connection, &occurrence)?;
        Ok(occurrence)
    }

    async fn delete(&self, user_id: &str, occurrence_id: &str) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM occurrences WHERE id = ?1 AND user_id = ?2",
            params![occurrence_id, user_id],
        )?;
        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        occurrence_id: &str,
    ) -> Result<Option<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE id = ?1 AND user_id = ?2"
                ),
                params![occurrence_id, user_id],
                raw_occurrence_from_row,
            )
            .optional()?;
        raw.map(decode_occurrence).transpose()
    }

    async fn list_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
             WHERE user_id = ?1 AND date = ?2
             ORDER BY start_time ASC, id ASC"
        ))?;
        let rows = statement.query_map(params![user_id, format_date(date)], raw_occurrence_from_row)?;
        rows.map(|row| decode_occurrence(row?)).collect()
    }

    async fn task_ids_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<HashSet<String>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT task_id FROM occurrences WHERE user_id = ?1 AND date = ?2",
        )?;
        let rows = statement.query_map(params![user_id, format_date(date)], |row| row.get(0))?;
        let mut task_ids = HashSet::new();
        for row in rows {
            task_ids.insert(row?);
        }
        Ok(task_ids)
    }

    async fn most_recent_for_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<Option<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
                     WHERE user_id = ?1 AND task_id = ?2
                     ORDER BY date DESC, start_time DESC LIMIT 1"
                ),
                params![user_id, task_id],
                raw_occurrence_from_row,
            )
            .optional()?;
        raw.map(decode_occurrence).transpose()
    }

    async fn find_for_task_on(
        &self,
        user_id: &str,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
                     WHERE user_id = ?1 AND task_id = ?2 AND date = ?3
                     ORDER BY start_time ASC LIMIT 1"
                ),
                params![user_id, task_id, format_date(date)],
                raw_occurrence_from_row,
            )
            .optional()?;
        raw.map(decode_occurrence).transpose()
    }

    async fn pending_for_task(
        &self,
        user_id: &str,
        task_id: &str,
        from: NaiveDate,
        inclusive: bool,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let comparison = if inclusive { ">=" } else { ">" };
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
             WHERE user_id = ?1 AND task_id = ?2 AND is_completed = 0 AND date {comparison} ?3
             ORDER BY date ASC, start_time ASC"
        ))?;
        let rows =
            statement.query_map(params![user_id, task_id, format_date(from)], raw_occurrence_from_row)?;
        rows.map(|row| decode_occurrence(row?)).collect()
    }

    async fn earliest_dates(&self, user_id: &str) -> Result<HashMap<String, NaiveDate>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT task_id, MIN(date) FROM occurrences WHERE user_id = ?1 GROUP BY task_id",
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut earliest = HashMap::new();
        for row in rows {
            let (task_id, raw_date) = row?;
            earliest.insert(task_id, parse_date(&raw_date, "occurrence.date")?);
        }
        Ok(earliest)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOccurrenceStore {
    rows: Mutex<HashMap<String, Occurrence>>,
}

impl InMemoryOccurrenceStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Occurrence>>, CoreError> {
        self.rows.lock().map_err(|error| {
            CoreError::InvalidInput(format!("occurrence store lock poisoned: {error}"))
        })
    }

    fn sorted_by_clock(mut rows: Vec<Occurrence>) -> Vec<Occurrence> {
        rows.sort_by(|left, right| {
            left.date
                .cmp(&right.date)
                .then_with(|| left.start_time.cmp(&right.start_time))
                .then_with(|| left.id.cmp(&right.id))
        });
        rows
    }
}

#[async_trait]
impl OccurrenceStore for InMemoryOccurrenceStore {
    async fn insert_many(&self, rows: Vec<Occurrence>) -> Result<usize, CoreError> {
        let mut stored = self.lock()?;
        let count = rows.len();
        for occurrence in rows {
            stored.insert(occurrence.id.clone(), occurrence);
        }
        Ok(count)
    }

    async fn update(
        &self,
        user_id: &str,
        occurrence_id: &str,
        patch: OccurrencePatch,
        now: NaiveDateTime,
    ) -> Result<Occurrence, CoreError> {
        let mut rows = self.lock()?;
        let occurrence = rows
            .get_mut(occurrence_id)
            .filter(|occurrence| occurrence.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        patch.apply(occurrence);
        occurrence.updated_at = now;
        Ok(occurrence.clone())
    }

    async fn delete(&self, user_id: &str, occurrence_id: &str) -> Result<(), CoreError> {
        let mut rows = self.lock()?;
        if rows
            .get(occurrence_id)
            .map(|occurrence| occurrence.user_id == user_id)
            .unwrap_or(false)
        {
            rows.remove(occurrence_id);
        }
        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        occurrence_id: &str,
    ) -> Result<Option<Occurrence>, CoreError> {
        Ok(self
            .lock()?
            .get(occurrence_id)
            .filter(|occurrence| occurrence.user_id == user_id)
            .cloned())
    }

    async fn list_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let rows = self.lock()?;
        Ok(Self::sorted_by_clock(
            rows.values()
                .filter(|occurrence| occurrence.user_id == user_id && occurrence.date == date)
                .cloned()
                .collect(),
        ))
    }

    async fn task_ids_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<HashSet<String>, CoreError> {
        let rows = self.lock()?;
        Ok(rows
            .values()
            .filter(|occurrence| occurrence.user_id == user_id && occurrence.date == date)
            .map(|occurrence| occurrence.task_id.clone())
            .collect())
    }

    async fn most_recent_for_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<Option<Occurrence>, CoreError> {
        let rows = self.lock()?;
        let mut matching: Vec<Occurrence> = rows
            .values()
            .filter(|occurrence| occurrence.user_id == user_id && occurrence.task_id == task_id)
            .cloned()
            .collect();
        matching = Self::sorted_by_clock(matching);
        Ok(matching.pop())
    }

    async fn find_for_task_on(
        &self,
        user_id: &str,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Occurrence>, CoreError> {
        let rows = self.lock()?;
        let matching: Vec<Occurrence> = rows
            .values()
            .filter(|occurrence| {
                occurrence.user_id == user_id
                    && occurrence.task_id == task_id
                    && occurrence.date == date
            })
            .cloned()
            .collect();
        Ok(Self::sorted_by_clock(matching).into_iter().next())
    }

    async fn pending_for_task(
        &self,
        user_id: &str,
        task_id: &str,
        from: NaiveDate,
        inclusive: bool,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let rows = self.lock()?;
        Ok(Self::sorted_by_clock(
            rows.values()
                .filter(|occurrence| {
                    occurrence.user_id == user_id
                        && occurrence.task_id == task_id
                        && !occurrence.is_completed
                        && if inclusive {
                            occurrence.date >= from
                        } else {
                            occurrence.date > from
                        }
                })
                .cloned()
                .collect(),
        ))
    }

    async fn earliest_dates(&self, user_id: &str) -> Result<HashMap<String, NaiveDate>, CoreError> {
        let rows = self.lock()?;
        let mut earliest: HashMap<String, NaiveDate> = HashMap::new();
        for occurrence in rows.values().filter(|occurrence| occurrence.user_id == user_id) {
            earliest
                .entry(occurrence.task_id.clone())
                .and_modify(|date| *date = (*date).min(occurrence.date))
                .or_insert(occurrence.date);
        }
        Ok(earliest)
    }
}
