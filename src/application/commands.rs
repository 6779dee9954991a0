use crate::application::bootstrap::bootstrap_workspace;
use crate::application::scheduling::{
    next_id, CascadeOutcome, MaterializeOutcome, PlacementResult, ResizeResult, SchedulingService,
    Session,
};
use crate::domain::layout::{layout_day, CardLayout};
use crate::domain::models::{
    Occurrence, OccurrencePatch, Priority, RecurrencePattern, ScheduledOccurrence, Task,
    TaskDraft, TaskPatch,
};
use crate::domain::timegrid::{minutes_of, time_of};
use crate::infrastructure::config::{load_timeline_settings, TimelineSettings};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_store::{OccurrenceStore, SqliteOccurrenceStore};
use crate::infrastructure::task_store::{SqliteTaskStore, TaskStore};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_TASK_DURATION_MINUTES: u32 = 30;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    session: Session,
    timeline: TimelineSettings,
    task_store: Arc<SqliteTaskStore>,
    occurrence_store: Arc<SqliteOccurrenceStore>,
    scheduler: SchedulingService<SqliteTaskStore, SqliteOccurrenceStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, session: Session) -> Result<Self, CoreError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let timeline = load_timeline_settings(&config_dir)?;
        let task_store = Arc::new(SqliteTaskStore::new(&bootstrap.database_path));
        let occurrence_store = Arc::new(SqliteOccurrenceStore::new(&bootstrap.database_path));
        let scheduler =
            SchedulingService::new(Arc::clone(&task_store), Arc::clone(&occurrence_store))
                .with_default_occurrence_start(timeline.default_occurrence_start);

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            session,
            timeline,
            task_store,
            occurrence_store,
            scheduler,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timeline_settings(&self) -> &TimelineSettings {
        &self.timeline
    }

    pub fn command_error(&self, command: &str, error: &CoreError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": chrono::Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn log_materialize(&self, command: &str, outcome: &MaterializeOutcome) {
        if outcome.created > 0 {
            self.log_info(
                command,
                &format!("materialized {} occurrences", outcome.created),
            );
        }
        if outcome.failed > 0 {
            self.log_error(
                command,
                &format!("failed to materialize {} occurrences", outcome.failed),
            );
        }
        for error in &outcome.errors {
            self.log_error(command, error);
        }
    }

    fn log_cascade(&self, command: &str, task_id: &str, outcome: &CascadeOutcome) {
        self.log_info(
            command,
            &format!(
                "cascaded task_id={task_id} updated={} failed={}",
                outcome.updated, outcome.failed
            ),
        );
        for error in &outcome.errors {
            self.log_error(command, error);
        }
        self.log_materialize(command, &outcome.materialized);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayProgress {
    pub completed: usize,
    pub total: usize,
}

/// Everything the shell needs to render one day.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    /// Unscheduled, non-recurring active tasks. Recurring tasks never sit in
    /// the inbox; materialization puts them on the timeline.
    pub inbox: Vec<Task>,
    /// The day's occurrences joined with their tasks, earliest start first.
    pub scheduled: Vec<ScheduledOccurrence>,
    /// Earliest occurrence date per task, for inbox labels.
    pub schedule_dates: HashMap<String, NaiveDate>,
    /// Pixel layout for `scheduled`, index-aligned.
    pub layout: Vec<CardLayout>,
    pub progress: DayProgress,
}

/// Materialize the date, then load the three reads the day view needs. The
/// reads run concurrently and any one failing fails the load; the
/// materialization is best-effort and only logged.
pub async fn load_day_impl(state: &AppState, date: NaiveDate) -> Result<DayView, CoreError> {
    let outcome = state.scheduler.materialize_day(&state.session, date).await;
    state.log_materialize("load_day", &outcome);

    let owner = state.session.require_owner()?;
    let (inbox_tasks, occurrences, schedule_dates) = tokio::try_join!(
        state.task_store.list_inbox(owner),
        state.occurrence_store.list_for_date(owner, date),
        state.occurrence_store.earliest_dates(owner),
    )?;

    let mut task_ids: Vec<String> = occurrences
        .iter()
        .map(|occurrence| occurrence.task_id.clone())
        .collect();
    task_ids.sort();
    task_ids.dedup();
    let tasks_by_id: HashMap<String, Task> = state
        .task_store
        .get_many(owner, &task_ids)
        .await?
        .into_iter()
        .map(|task| (task.id.clone(), task))
        .collect();

    // Inner join: an occurrence without a surviving task is not rendered.
    let scheduled: Vec<ScheduledOccurrence> = occurrences
        .into_iter()
        .filter_map(|occurrence| {
            tasks_by_id
                .get(&occurrence.task_id)
                .map(|task| ScheduledOccurrence {
                    occurrence,
                    task: task.clone(),
                })
        })
        .collect();

    let inbox: Vec<Task> = inbox_tasks
        .into_iter()
        .filter(|task| !task.is_recurring && !schedule_dates.contains_key(&task.id))
        .collect();

    let day_occurrences: Vec<Occurrence> = scheduled
        .iter()
        .map(|entry| entry.occurrence.clone())
        .collect();
    let layout = layout_day(&day_occurrences, &state.timeline.timeline_config());

    let progress = DayProgress {
        completed: scheduled
            .iter()
            .filter(|entry| entry.occurrence.is_completed)
            .count(),
        total: scheduled.len(),
    };

    Ok(DayView {
        date,
        inbox,
        scheduled,
        schedule_dates,
        layout,
        progress,
    })
}

/// Create a task; optionally drop it straight onto a slot.
pub async fn create_task_impl(
    state: &AppState,
    draft: TaskDraft,
    schedule_at: Option<(NaiveDate, NaiveTime)>,
) -> Result<Task, CoreError> {
    let owner = state.session.require_owner()?;
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(CoreError::InvalidInput("title must not be empty".to_string()));
    }

    let now = state.now();
    // A recurring task created without an explicit pattern recurs daily.
    let recurrence_pattern = if draft.is_recurring {
        draft.recurrence_pattern.or(Some(RecurrencePattern::Daily))
    } else {
        draft.recurrence_pattern
    };
    let task = Task {
        id: next_id("tsk"),
        user_id: owner.to_string(),
        title: title.to_string(),
        notes: draft
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        status: crate::domain::models::TaskStatus::Todo,
        priority: draft.priority.unwrap_or(Priority::Medium),
        duration_minutes: draft
            .duration_minutes
            .unwrap_or(DEFAULT_TASK_DURATION_MINUTES),
        color: draft.color,
        is_recurring: draft.is_recurring,
        recurrence_pattern,
        recurrence_days: draft.recurrence_days,
        recurrence_end_date: draft.recurrence_end_date,
        created_at: now,
        updated_at: now,
    };
    task.validate().map_err(CoreError::InvalidInput)?;

    let task = state.task_store.insert(task).await?;
    state.log_info("create_task", &format!("created task_id={}", task.id));

    if let Some((date, start_time)) = schedule_at {
        let placement = state
            .scheduler
            .place_at(&state.session, &task, None, date, start_time)
            .await?;
        if let Some(cascade) = &placement.cascade {
            state.log_cascade("create_task", &task.id, cascade);
        }
    }

    Ok(task)
}

/// Apply a task edit. Recurring tasks cascade their duration to future
/// occurrences; a non-recurring task only adjusts its occurrence on the
/// rendered date, when it has one.
pub async fn update_task_impl(
    state: &AppState,
    task_id: &str,
    patch: TaskPatch,
    reference_date: NaiveDate,
) -> Result<Task, CoreError> {
    let owner = state.session.require_owner()?;
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(CoreError::InvalidInput("task_id must not be empty".to_string()));
    }

    let mut preview = state
        .task_store
        .get(owner, task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
    patch.apply(&mut preview);
    preview.validate().map_err(CoreError::InvalidInput)?;

    let duration_changed = patch.duration_minutes.is_some();
    let task = state
        .task_store
        .update(owner, task_id, patch, state.now())
        .await?;

    if task.is_recurring {
        let cascade = state
            .scheduler
            .propagate_duration(
                &state.session,
                task_id,
                task.duration_minutes,
                reference_date,
            )
            .await;
        state.log_cascade("update_task", task_id, &cascade);
    } else if duration_changed {
        if let Some(occurrence) = state
            .occurrence_store
            .find_for_task_on(owner, task_id, reference_date)
            .await?
        {
            let end_time = time_of(minutes_of(occurrence.start_time) + task.duration_minutes);
            state
                .occurrence_store
                .update(
                    owner,
                    &occurrence.id,
                    OccurrencePatch {
                        end_time: Some(end_time),
                        ..OccurrencePatch::default()
                    },
                    state.now(),
                )
                .await?;
        }
    }

    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(task)
}

pub async fn delete_task_impl(state: &AppState, task_id: &str) -> Result<(), CoreError> {
    let owner = state.session.require_owner()?;
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(CoreError::InvalidInput("task_id must not be empty".to_string()));
    }

    state.task_store.delete(owner, task_id).await?;
    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(())
}

/// Remove a single occurrence from the schedule; the task survives.
pub async fn delete_occurrence_impl(
    state: &AppState,
    occurrence_id: &str,
) -> Result<(), CoreError> {
    let owner = state.session.require_owner()?;
    let occurrence_id = occurrence_id.trim();
    if occurrence_id.is_empty() {
        return Err(CoreError::InvalidInput(
            "occurrence_id must not be empty".to_string(),
        ));
    }

    state.occurrence_store.delete(owner, occurrence_id).await?;
    state.log_info(
        "delete_occurrence",
        &format!("deleted occurrence_id={occurrence_id}"),
    );
    Ok(())
}

pub async fn toggle_complete_impl(
    state: &AppState,
    occurrence_id: &str,
    completed: bool,
) -> Result<Occurrence, CoreError> {
    let owner = state.session.require_owner()?;
    let now = state.now();
    let patch = OccurrencePatch {
        is_completed: Some(completed),
        completed_at: Some(completed.then_some(now)),
        ..OccurrencePatch::default()
    };
    let occurrence = state
        .occurrence_store
        .update(owner, occurrence_id.trim(), patch, now)
        .await?;
    state.log_info(
        "toggle_complete",
        &format!("occurrence_id={} completed={completed}", occurrence.id),
    );
    Ok(occurrence)
}

/// Explicitly schedule a task onto a slot (inbox drop or dialog).
pub async fn schedule_task_impl(
    state: &AppState,
    task_id: &str,
    date: NaiveDate,
    start_time: NaiveTime,
) -> Result<PlacementResult, CoreError> {
    let owner = state.session.require_owner()?;
    let task = state
        .task_store
        .get(owner, task_id.trim())
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;

    let placement = state
        .scheduler
        .place_at(&state.session, &task, None, date, start_time)
        .await?;
    if let Some(cascade) = &placement.cascade {
        state.log_cascade("schedule_task", &task.id, cascade);
    }
    state.log_info(
        "schedule_task",
        &format!(
            "task_id={} date={} start={}",
            task.id, date, placement.occurrence.start_time
        ),
    );
    Ok(placement)
}

/// Drag an existing occurrence to a new slot (possibly on another date).
pub async fn reschedule_impl(
    state: &AppState,
    occurrence_id: &str,
    date: NaiveDate,
    start_time: NaiveTime,
) -> Result<PlacementResult, CoreError> {
    let owner = state.session.require_owner()?;
    let occurrence = state
        .occurrence_store
        .get(owner, occurrence_id.trim())
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
    let task = state
        .task_store
        .get(owner, &occurrence.task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {}", occurrence.task_id)))?;

    let placement = state
        .scheduler
        .place_at(&state.session, &task, Some(&occurrence), date, start_time)
        .await?;
    if let Some(cascade) = &placement.cascade {
        state.log_cascade("reschedule", &task.id, cascade);
    }
    Ok(placement)
}

/// Resize an occurrence to a dropped end offset (minutes since midnight).
pub async fn resize_occurrence_impl(
    state: &AppState,
    occurrence_id: &str,
    proposed_end_minutes: u32,
) -> Result<ResizeResult, CoreError> {
    let result = state
        .scheduler
        .resize_to(&state.session, occurrence_id.trim(), proposed_end_minutes)
        .await?;
    if let Some(cascade) = &result.cascade {
        state.log_cascade("resize_occurrence", &result.occurrence.task_id, cascade);
    }
    state.log_info(
        "resize_occurrence",
        &format!(
            "occurrence_id={} new_duration={}m",
            result.occurrence.id, result.new_duration_minutes
        ),
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "daygrid-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone(), Session::authenticated("usr-test"))
                .expect("initialize app state")
        }

        fn anonymous_app_state(&self) -> AppState {
            AppState::new(self.path.clone(), Session::anonymous()).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            ..TaskDraft::default()
        }
    }

    fn recurring_draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            is_recurring: true,
            ..TaskDraft::default()
        }
    }

    #[tokio::test]
    async fn create_task_rejects_empty_title() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let result = create_task_impl(&state, draft("   "), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_task_requires_authentication() {
        let workspace = TempWorkspace::new();
        let state = workspace.anonymous_app_state();
        let result = create_task_impl(&state, draft("Plan sprint"), None).await;
        assert!(matches!(result, Err(CoreError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn created_tasks_land_in_the_inbox_until_scheduled() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Write report"), None)
            .await
            .expect("create task");

        let view = load_day_impl(&state, date(2024, 3, 1)).await.expect("load day");
        assert_eq!(view.inbox.len(), 1);
        assert_eq!(view.inbox[0].id, task.id);
        assert!(view.scheduled.is_empty());
        assert_eq!(view.progress, DayProgress::default());
    }

    #[tokio::test]
    async fn recurring_tasks_default_to_daily_and_materialize_on_load() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, recurring_draft("Standup"), None)
            .await
            .expect("create task");
        assert_eq!(task.recurrence_pattern, Some(RecurrencePattern::Daily));

        let target = task.created_at.date() + chrono::Duration::days(3);
        let view = load_day_impl(&state, target).await.expect("load day");

        // Materialized onto the timeline at the default slot, not the inbox.
        assert!(view.inbox.is_empty());
        assert_eq!(view.scheduled.len(), 1);
        let entry = &view.scheduled[0];
        assert_eq!(entry.task.id, task.id);
        assert_eq!(entry.occurrence.start_time, time(9, 0));
        assert_eq!(entry.occurrence.end_time, time(9, 30));

        // Loading again must not duplicate the row.
        let view = load_day_impl(&state, target).await.expect("reload day");
        assert_eq!(view.scheduled.len(), 1);
    }

    #[tokio::test]
    async fn scheduling_moves_a_task_out_of_the_inbox() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Deep work"), None)
            .await
            .expect("create task");

        let target = date(2024, 3, 1);
        schedule_task_impl(&state, &task.id, target, time(10, 0))
            .await
            .expect("schedule task");

        let view = load_day_impl(&state, target).await.expect("load day");
        assert!(view.inbox.is_empty());
        assert_eq!(view.scheduled.len(), 1);
        assert_eq!(view.scheduled[0].occurrence.start_time, time(10, 0));
        assert_eq!(view.scheduled[0].occurrence.end_time, time(10, 30));
        assert_eq!(view.schedule_dates.get(&task.id), Some(&target));
        assert_eq!(view.layout.len(), 1);
        assert_eq!(view.layout[0].width_pct, 100.0);
    }

    #[tokio::test]
    async fn dragging_a_recurring_task_pins_every_future_slot() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, recurring_draft("Daily review"), None)
            .await
            .expect("create task");

        let target = task.created_at.date() + chrono::Duration::days(1);
        let placement = schedule_task_impl(&state, &task.id, target, time(14, 0))
            .await
            .expect("schedule task");
        assert_eq!(placement.occurrence.start_time, time(14, 0));
        assert_eq!(placement.occurrence.end_time, time(14, 30));

        // Every materialized future occurrence through the lookahead takes
        // the identical slot.
        let owner = state.session().owner().expect("authenticated");
        for offset in 1..=14 {
            let row = state
                .occurrence_store
                .find_for_task_on(owner, &task.id, target + chrono::Duration::days(offset))
                .await
                .expect("query")
                .expect("future occurrence exists");
            assert_eq!(row.start_time, time(14, 0));
            assert_eq!(row.end_time, time(14, 30));
        }
    }

    #[tokio::test]
    async fn toggle_complete_stamps_and_clears_the_timestamp() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Review PR"), None)
            .await
            .expect("create task");
        let placement = schedule_task_impl(&state, &task.id, date(2024, 3, 1), time(9, 0))
            .await
            .expect("schedule task");

        let done = toggle_complete_impl(&state, &placement.occurrence.id, true)
            .await
            .expect("complete");
        assert!(done.is_completed);
        assert!(done.completed_at.is_some());

        let undone = toggle_complete_impl(&state, &placement.occurrence.id, false)
            .await
            .expect("uncomplete");
        assert!(!undone.is_completed);
        assert!(undone.completed_at.is_none());

        let view = load_day_impl(&state, date(2024, 3, 1)).await.expect("load day");
        assert_eq!(view.progress, DayProgress { completed: 0, total: 1 });
    }

    #[tokio::test]
    async fn resize_updates_the_row_and_the_task_default() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Focus block"), None)
            .await
            .expect("create task");
        let placement = schedule_task_impl(&state, &task.id, date(2024, 3, 1), time(9, 0))
            .await
            .expect("schedule task");

        // A drop at 09:40 snaps to 09:45.
        let result = resize_occurrence_impl(&state, &placement.occurrence.id, 9 * 60 + 40)
            .await
            .expect("resize");
        assert_eq!(result.occurrence.end_time, time(9, 45));
        assert_eq!(result.new_duration_minutes, 45);

        let owner = state.session().owner().expect("authenticated");
        let task = state
            .task_store
            .get(owner, &task.id)
            .await
            .expect("get task")
            .expect("task exists");
        assert_eq!(task.duration_minutes, 45);
    }

    #[tokio::test]
    async fn reschedule_moves_the_same_row_to_another_date() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Errand"), None)
            .await
            .expect("create task");
        let placement = schedule_task_impl(&state, &task.id, date(2024, 3, 1), time(9, 0))
            .await
            .expect("schedule task");

        let moved = reschedule_impl(&state, &placement.occurrence.id, date(2024, 3, 2), time(16, 0))
            .await
            .expect("reschedule");
        assert_eq!(moved.occurrence.id, placement.occurrence.id);
        assert_eq!(moved.occurrence.date, date(2024, 3, 2));

        let before = load_day_impl(&state, date(2024, 3, 1)).await.expect("load day");
        assert!(before.scheduled.is_empty());
        let after = load_day_impl(&state, date(2024, 3, 2)).await.expect("load day");
        assert_eq!(after.scheduled.len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_task_clears_its_occurrences_from_the_day() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Old chore"), None)
            .await
            .expect("create task");
        schedule_task_impl(&state, &task.id, date(2024, 3, 1), time(9, 0))
            .await
            .expect("schedule task");

        delete_task_impl(&state, &task.id).await.expect("delete task");

        let view = load_day_impl(&state, date(2024, 3, 1)).await.expect("load day");
        assert!(view.scheduled.is_empty());
        assert!(view.inbox.is_empty());
    }

    #[tokio::test]
    async fn removing_an_occurrence_keeps_the_task() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, draft("Call dentist"), None)
            .await
            .expect("create task");
        let placement = schedule_task_impl(&state, &task.id, date(2024, 3, 1), time(9, 0))
            .await
            .expect("schedule task");

        delete_occurrence_impl(&state, &placement.occurrence.id)
            .await
            .expect("delete occurrence");

        let view = load_day_impl(&state, date(2024, 3, 1)).await.expect("load day");
        assert!(view.scheduled.is_empty());
        assert_eq!(view.inbox.len(), 1);
        assert_eq!(view.inbox[0].id, task.id);
    }

    #[tokio::test]
    async fn load_day_requires_authentication_but_materialization_degrades_silently() {
        let workspace = TempWorkspace::new();
        let state = workspace.anonymous_app_state();
        let result = load_day_impl(&state, date(2024, 3, 1)).await;
        assert!(matches!(result, Err(CoreError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn editing_a_recurring_task_cascades_the_new_duration() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, recurring_draft("Workout"), None)
            .await
            .expect("create task");

        let reference = task.created_at.date() + chrono::Duration::days(1);
        update_task_impl(
            &state,
            &task.id,
            TaskPatch {
                duration_minutes: Some(60),
                ..TaskPatch::default()
            },
            reference,
        )
        .await
        .expect("update task");

        let owner = state.session().owner().expect("authenticated");
        let row = state
            .occurrence_store
            .find_for_task_on(owner, &task.id, reference + chrono::Duration::days(5))
            .await
            .expect("query")
            .expect("materialized occurrence exists");
        assert_eq!(row.duration_minutes(), 60);
    }

    #[tokio::test]
    async fn overlapping_day_entries_share_columns_in_the_layout() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let first = create_task_impl(&state, draft("Call"), None)
            .await
            .expect("create task");
        let second = create_task_impl(&state, draft("Email sweep"), None)
            .await
            .expect("create task");

        let target = date(2024, 3, 1);
        schedule_task_impl(&state, &first.id, target, time(9, 0))
            .await
            .expect("schedule first");
        schedule_task_impl(&state, &second.id, target, time(9, 15))
            .await
            .expect("schedule second");

        let view = load_day_impl(&state, target).await.expect("load day");
        assert_eq!(view.layout.len(), 2);
        assert!(view.layout.iter().all(|card| card.columns == 2));
        assert!(view.layout.iter().all(|card| card.width_pct == 50.0));
    }
}
