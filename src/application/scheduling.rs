use crate::domain::models::{Occurrence, OccurrencePatch, Task, TaskPatch};
use crate::domain::recurrence::should_recur_on;
use crate::domain::timegrid::{minutes_of, snap_to_slot, time_of};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_store::OccurrenceStore;
use crate::infrastructure::task_store::TaskStore;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// How many days ahead cascades materialize before touching future rows.
pub const CASCADE_LOOKAHEAD_DAYS: i64 = 14;
/// Resize grid and minimum occurrence length, in minutes.
pub const RESIZE_SNAP_MINUTES: u32 = 15;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", chrono::Utc::now().timestamp_micros())
}

/// Owner scope resolved by the auth collaborator, threaded explicitly into
/// every service call.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn owner(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn require_owner(&self) -> Result<&str, CoreError> {
        self.user_id.as_deref().ok_or(CoreError::NotAuthenticated)
    }
}

/// Best-effort result of materializing one or more dates. Errors are carried
/// for the caller to log; they never propagate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl MaterializeOutcome {
    fn absorb(&mut self, other: MaterializeOutcome) {
        self.created += other.created;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Best-effort result of a cascade over future occurrences. A partial
/// cascade is acceptable; the next invocation repairs stragglers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub materialized: MaterializeOutcome,
}

#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub occurrence: Occurrence,
    pub created: bool,
    pub cascade: Option<CascadeOutcome>,
}

#[derive(Debug, Clone)]
pub struct ResizeResult {
    pub occurrence: Occurrence,
    pub new_duration_minutes: u32,
    pub cascade: Option<CascadeOutcome>,
}

/// Recurrence materialization and schedule mutation over the two stores.
pub struct SchedulingService<T, O>
where
    T: TaskStore,
    O: OccurrenceStore,
{
    task_store: Arc<T>,
    occurrence_store: Arc<O>,
    /// Fallback slot start for tasks with no prior occurrence.
    default_occurrence_start: NaiveTime,
    now_provider: NowProvider,
}

impl<T, O> SchedulingService<T, O>
where
    T: TaskStore,
    O: OccurrenceStore,
{
    pub fn new(task_store: Arc<T>, occurrence_store: Arc<O>) -> Self {
        Self {
            task_store,
            occurrence_store,
            default_occurrence_start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid fixed time"),
            now_provider: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    pub fn with_default_occurrence_start(mut self, start: NaiveTime) -> Self {
        self.default_occurrence_start = start;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now(&self) -> NaiveDateTime {
        (self.now_provider)()
    }

    /// Create the missing occurrences for every recurring task that should
    /// recur on `date`. Idempotent: tasks already represented on the date are
    /// skipped, so a second call is a no-op. Never fails the caller; an
    /// unauthenticated session no-ops silently.
    pub async fn materialize_day(&self, session: &Session, date: NaiveDate) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();
        let Some(owner) = session.owner() else {
            return outcome;
        };

        let recurring = match self.task_store.list_recurring_active(owner).await {
            Ok(tasks) => tasks,
            Err(error) => {
                outcome.errors.push(format!("listing recurring tasks: {error}"));
                return outcome;
            }
        };
        if recurring.is_empty() {
            return outcome;
        }

        let already_scheduled = match self.occurrence_store.task_ids_on(owner, date).await {
            Ok(task_ids) => task_ids,
            Err(error) => {
                outcome
                    .errors
                    .push(format!("listing existing occurrences: {error}"));
                return outcome;
            }
        };

        let now = self.now();
        let mut to_create = Vec::new();
        for task in recurring {
            if already_scheduled.contains(&task.id) {
                continue;
            }
            if !should_recur_on(&task, date) {
                continue;
            }

            // Reuse the task's most recent slot; fall back to the default
            // start plus the task's duration.
            let recent = self
                .occurrence_store
                .most_recent_for_task(owner, &task.id)
                .await
                .ok()
                .flatten();
            let (start_time, end_time) = match recent {
                Some(previous) => (previous.start_time, previous.end_time),
                None => {
                    let start = self.default_occurrence_start;
                    (start, time_of(minutes_of(start) + task.duration_minutes))
                }
            };

            to_create.push(Occurrence {
                id: next_id("occ"),
                task_id: task.id.clone(),
                user_id: owner.to_string(),
                date,
                start_time,
                end_time,
                is_completed: false,
                completed_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        if to_create.is_empty() {
            return outcome;
        }

        let attempted = to_create.len();
        match self.occurrence_store.insert_many(to_create).await {
            Ok(created) => outcome.created = created,
            Err(error) => {
                outcome.failed = attempted;
                outcome.errors.push(format!("inserting occurrences: {error}"));
            }
        }
        outcome
    }

    /// Materialize a window of dates relative to `base`.
    pub async fn materialize_window(
        &self,
        session: &Session,
        base: NaiveDate,
        offsets: RangeInclusive<i64>,
    ) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();
        for offset in offsets {
            let date = base + Duration::days(offset);
            outcome.absorb(self.materialize_day(session, date).await);
        }
        outcome
    }

    /// Recompute the end time of every future, not-yet-completed occurrence
    /// of a task from its own start time plus the new duration. The window
    /// includes `reference_date` itself.
    pub async fn propagate_duration(
        &self,
        session: &Session,
        task_id: &str,
        new_duration_minutes: u32,
        reference_date: NaiveDate,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        let Some(owner) = session.owner() else {
            return outcome;
        };

        // Future rows must exist before they can receive the update.
        outcome.materialized = self
            .materialize_window(session, reference_date, 0..=CASCADE_LOOKAHEAD_DAYS)
            .await;

        let pending = match self
            .occurrence_store
            .pending_for_task(owner, task_id, reference_date, true)
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                outcome.errors.push(format!("listing future occurrences: {error}"));
                return outcome;
            }
        };

        let now = self.now();
        for occurrence in pending {
            let end_time = time_of(minutes_of(occurrence.start_time) + new_duration_minutes);
            let patch = OccurrencePatch {
                end_time: Some(end_time),
                ..OccurrencePatch::default()
            };
            match self
                .occurrence_store
                .update(owner, &occurrence.id, patch, now)
                .await
            {
                Ok(_) => outcome.updated += 1,
                Err(error) => {
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("occurrence {}: {error}", occurrence.id));
                }
            }
        }
        outcome
    }

    /// Move every strictly-future, not-yet-completed occurrence of a task to
    /// the identical new slot.
    pub async fn propagate_time_slot(
        &self,
        session: &Session,
        task_id: &str,
        new_start_time: NaiveTime,
        new_end_time: NaiveTime,
        reference_date: NaiveDate,
    ) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        let Some(owner) = session.owner() else {
            return outcome;
        };

        outcome.materialized = self
            .materialize_window(session, reference_date, 1..=CASCADE_LOOKAHEAD_DAYS)
            .await;

        let pending = match self
            .occurrence_store
            .pending_for_task(owner, task_id, reference_date, false)
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                outcome.errors.push(format!("listing future occurrences: {error}"));
                return outcome;
            }
        };

        let now = self.now();
        for occurrence in pending {
            let patch = OccurrencePatch {
                start_time: Some(new_start_time),
                end_time: Some(new_end_time),
                ..OccurrencePatch::default()
            };
            match self
                .occurrence_store
                .update(owner, &occurrence.id, patch, now)
                .await
            {
                Ok(_) => outcome.updated += 1,
                Err(error) => {
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("occurrence {}: {error}", occurrence.id));
                }
            }
        }
        outcome
    }

    /// Drop a task onto a slot: update the task's occurrence in place when
    /// one exists (the dragged one, or one already on the target date),
    /// otherwise create one. Recurring tasks then cascade the slot to their
    /// future occurrences.
    pub async fn place_at(
        &self,
        session: &Session,
        task: &Task,
        dragged: Option<&Occurrence>,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<PlacementResult, CoreError> {
        let owner = session.require_owner()?;

        let duration_minutes = dragged
            .map(Occurrence::duration_minutes)
            .unwrap_or(task.duration_minutes);
        let start_time = time_of(minutes_of(start_time));
        let end_time = time_of(minutes_of(start_time) + duration_minutes);

        let existing = match dragged {
            Some(occurrence) => Some(occurrence.clone()),
            None => {
                self.occurrence_store
                    .find_for_task_on(owner, &task.id, date)
                    .await?
            }
        };

        let now = self.now();
        // Update in place rather than delete-and-reinsert so a failure half
        // way through never loses the row.
        let (occurrence, created) = match existing {
            Some(previous) => {
                let patch = OccurrencePatch {
                    date: Some(date),
                    start_time: Some(start_time),
                    end_time: Some(end_time),
                    ..OccurrencePatch::default()
                };
                let updated = self
                    .occurrence_store
                    .update(owner, &previous.id, patch, now)
                    .await?;
                (updated, false)
            }
            None => {
                let occurrence = Occurrence {
                    id: next_id("occ"),
                    task_id: task.id.clone(),
                    user_id: owner.to_string(),
                    date,
                    start_time,
                    end_time,
                    is_completed: false,
                    completed_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.occurrence_store
                    .insert_many(vec![occurrence.clone()])
                    .await?;
                (occurrence, true)
            }
        };

        let cascade = if task.is_recurring {
            Some(
                self.propagate_time_slot(session, &task.id, start_time, end_time, date)
                    .await,
            )
        } else {
            None
        };

        Ok(PlacementResult {
            occurrence,
            created,
            cascade,
        })
    }

    /// Resize an occurrence to a proposed end offset: snap to the 15-minute
    /// grid, clamp to at least one slot past the start, update the row, and
    /// adopt the new duration as the task default (cascading it for
    /// recurring tasks).
    pub async fn resize_to(
        &self,
        session: &Session,
        occurrence_id: &str,
        proposed_end_minutes: u32,
    ) -> Result<ResizeResult, CoreError> {
        let owner = session.require_owner()?;

        let occurrence = self
            .occurrence_store
            .get(owner, occurrence_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        let task = self
            .task_store
            .get(owner, &occurrence.task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {}", occurrence.task_id)))?;

        let start_minutes = minutes_of(occurrence.start_time);
        let snapped = snap_to_slot(proposed_end_minutes, RESIZE_SNAP_MINUTES);
        let end_minutes = snapped.max(start_minutes + RESIZE_SNAP_MINUTES);
        let new_duration_minutes = end_minutes - start_minutes;

        let now = self.now();
        let updated = self
            .occurrence_store
            .update(
                owner,
                occurrence_id,
                OccurrencePatch {
                    end_time: Some(time_of(end_minutes)),
                    ..OccurrencePatch::default()
                },
                now,
            )
            .await?;

        self.task_store
            .update(
                owner,
                &occurrence.task_id,
                TaskPatch {
                    duration_minutes: Some(new_duration_minutes),
                    ..TaskPatch::default()
                },
                now,
            )
            .await?;

        let cascade = if task.is_recurring {
            Some(
                self.propagate_duration(
                    session,
                    &occurrence.task_id,
                    new_duration_minutes,
                    occurrence.date,
                )
                .await,
            )
        } else {
            None
        };

        Ok(ResizeResult {
            occurrence: updated,
            new_duration_minutes,
            cascade,
        })
    }
}
