use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Active tasks appear in the inbox and are eligible for materialization.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Todo | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekdays,
    Weekly,
    Biweekly,
    Monthly,
}

impl RecurrencePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekdays => "weekdays",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "daily" => Some(Self::Daily),
            "weekdays" => Some(Self::Weekdays),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub duration_minutes: u32,
    pub color: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    /// Weekdays the task recurs on, Sunday = 0 through Saturday = 6.
    /// Meaningful only for the weekly and biweekly patterns.
    pub recurrence_days: Vec<u8>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.duration_minutes == 0 {
            return Err("task.duration_minutes must be > 0".to_string());
        }
        if self.is_recurring && self.recurrence_pattern.is_none() {
            return Err("task.recurrence_pattern is required for recurring tasks".to_string());
        }
        for day in &self.recurrence_days {
            if *day > 6 {
                return Err("task.recurrence_days entries must be in 0..=6".to_string());
            }
        }
        Ok(())
    }

    /// The date the recurrence math anchors on.
    pub fn recurrence_anchor(&self) -> NaiveDate {
        self.created_at.date()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_completed: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Occurrence {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "occurrence.id")?;
        validate_non_empty(&self.task_id, "occurrence.task_id")?;
        validate_non_empty(&self.user_id, "occurrence.user_id")?;
        if self.end_time <= self.start_time {
            return Err("occurrence.end_time must be after occurrence.start_time".to_string());
        }
        if self.is_completed != self.completed_at.is_some() {
            return Err("occurrence.completed_at must be set iff completed".to_string());
        }
        Ok(())
    }

    pub fn duration_minutes(&self) -> u32 {
        (self.end_time - self.start_time).num_minutes().max(0) as u32
    }
}

/// An occurrence joined with its owning task, the shape the timeline renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledOccurrence {
    #[serde(flatten)]
    pub occurrence: Occurrence,
    pub task: Task,
}

/// Create-task input as the dialog submits it. Missing fields take the
/// documented defaults (medium priority, 30 minutes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
    pub duration_minutes: Option<u32>,
    pub color: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_days: Vec<u8>,
    pub recurrence_end_date: Option<NaiveDate>,
}

/// Partial update for a task row. `None` leaves the field untouched; the
/// nested options overwrite nullable columns.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub duration_minutes: Option<u32>,
    pub color: Option<Option<String>>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<Option<RecurrencePattern>>,
    pub recurrence_days: Option<Vec<u8>>,
    pub recurrence_end_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(duration_minutes) = self.duration_minutes {
            task.duration_minutes = duration_minutes;
        }
        if let Some(color) = &self.color {
            task.color = color.clone();
        }
        if let Some(is_recurring) = self.is_recurring {
            task.is_recurring = is_recurring;
        }
        if let Some(recurrence_pattern) = self.recurrence_pattern {
            task.recurrence_pattern = recurrence_pattern;
        }
        if let Some(recurrence_days) = &self.recurrence_days {
            task.recurrence_days = recurrence_days.clone();
        }
        if let Some(recurrence_end_date) = self.recurrence_end_date {
            task.recurrence_end_date = recurrence_end_date;
        }
    }
}

/// Partial update for an occurrence row.
#[derive(Debug, Clone, Default)]
pub struct OccurrencePatch {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_completed: Option<bool>,
    pub completed_at: Option<Option<NaiveDateTime>>,
}

impl OccurrencePatch {
    pub fn apply(&self, occurrence: &mut Occurrence) {
        if let Some(date) = self.date {
            occurrence.date = date;
        }
        if let Some(start_time) = self.start_time {
            occurrence.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            occurrence.end_time = end_time;
        }
        if let Some(is_completed) = self.is_completed {
            occurrence.is_completed = is_completed;
        }
        if let Some(completed_at) = self.completed_at {
            occurrence.completed_at = completed_at;
        }
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
