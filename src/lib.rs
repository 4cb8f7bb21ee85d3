//! Pomodoro phase timer with per-task time tracking.
//!
//! `domain` holds the pure timer and tracking state machines, `infrastructure`
//! the config files, task stores, credentials and logging, and `application`
//! the focus session that joins them plus the command facade.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, bootstrap_workspace, open_task_store};
pub use application::commands::{
    AppState, TimerStateResponse, create_project_impl, create_task_impl, delete_project_impl,
    delete_task_impl, get_focus_summary_impl, get_timer_state_impl, list_projects_impl,
    list_tasks_impl, reset_timer_impl, select_tasks_impl, start_tracking_impl,
    stop_tracking_impl, switch_phase_impl, tick_timer_impl, toggle_timer_impl,
    tracked_elapsed_impl, update_settings_impl, update_task_impl,
};
pub use application::focus_session::{
    CompletionNotifier, CompletionPort, FocusSession, NowProvider,
};
pub use application::refresh::{run_countdown, run_elapsed_refresh};
pub use application::summary::{FocusSummary, PhaseRecord, summarize};
pub use domain::models::{NewProject, NewTask, Phase, Project, Task, TaskPatch, TaskUpdate};
pub use domain::phase_timer::{
    PhaseCompletion, PhaseTimer, RunState, TickOutcome, TimerDisplay, TimerState,
};
pub use domain::settings::{Settings, SettingsOverride};
pub use domain::time_tracking::{StartIntent, StopIntent, TrackedElapsed};
pub use infrastructure::error::InfraError;
pub use infrastructure::task_store::{InMemoryTaskStore, SqliteTaskStore, StoreKind, TaskFilter, TaskStore};
