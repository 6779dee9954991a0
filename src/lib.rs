pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    create_task_impl, delete_occurrence_impl, delete_task_impl, load_day_impl, reschedule_impl,
    resize_occurrence_impl, schedule_task_impl, toggle_complete_impl, update_task_impl, AppState,
    DayProgress, DayView,
};
pub use application::scheduling::{
    CascadeOutcome, MaterializeOutcome, PlacementResult, ResizeResult, SchedulingService, Session,
    CASCADE_LOOKAHEAD_DAYS, RESIZE_SNAP_MINUTES,
};
pub use domain::layout::{
    layout_day, now_and_next, overlap_groups, position, CardLayout, CardPosition, TimelineConfig,
};
pub use domain::models::{
    Occurrence, OccurrencePatch, Priority, RecurrencePattern, ScheduledOccurrence, Task,
    TaskDraft, TaskPatch, TaskStatus,
};
pub use domain::recurrence::should_recur_on;
pub use infrastructure::config::TimelineSettings;
pub use infrastructure::error::CoreError;
pub use infrastructure::occurrence_store::{
    InMemoryOccurrenceStore, OccurrenceStore, SqliteOccurrenceStore,
};
pub use infrastructure::task_store::{InMemoryTaskStore, SqliteTaskStore, TaskStore};
