use crate::application::bootstrap::{bootstrap_workspace, open_task_store};
use crate::application::focus_session::{CompletionPort, FocusSession};
use crate::application::summary::{DEFAULT_SUMMARY_DAYS, FocusSummary, summarize};
use crate::domain::models::{NewProject, NewTask, Phase, Project, Task, TaskPatch};
use crate::domain::phase_timer::RunState;
use crate::domain::settings::{Settings, SettingsOverride};
use crate::domain::time_tracking::TrackedElapsed;
use crate::infrastructure::config::{load_settings, read_timezone, save_settings};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging;
use crate::infrastructure::task_store::{StoreKind, TaskFilter, TaskStore};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing_appender::non_blocking::WorkerGuard;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    timezone: Tz,
    store: Arc<dyn TaskStore>,
    session: Arc<Mutex<FocusSession>>,
}

impl AppState {
    pub async fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_credential_store(workspace_root, &KeyringCredentialStore::default()).await
    }

    pub async fn with_credential_store(
        workspace_root: PathBuf,
        credentials: &dyn CredentialStore,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let timezone = read_timezone(&bootstrap.config_dir)?;
        let store = open_task_store(&bootstrap, credentials, Utc::now()).await?;
        let session = FocusSession::new(bootstrap.settings, Arc::clone(&store));

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            timezone,
            store,
            session: Arc::new(Mutex::new(session)),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Shared handle for the countdown loop.
    pub fn session(&self) -> Arc<Mutex<FocusSession>> {
        Arc::clone(&self.session)
    }

    pub async fn completion_port(&self) -> CompletionPort {
        self.session.lock().await.completion_port()
    }

    /// Installs file logging under the workspace `logs/` directory. Hold the
    /// guard for as long as the process runs.
    pub fn init_logging(&self) -> Option<WorkerGuard> {
        logging::init(&self.logs_dir)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, %error, "command failed");
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateResponse {
    pub phase: Phase,
    pub run_state: RunState,
    pub is_active: bool,
    pub minutes: i64,
    pub seconds: i64,
    pub remaining_seconds: i64,
    pub display: String,
    pub sessions_completed_in_cycle: u32,
    pub long_break_interval: u32,
    pub selected_task_ids: Vec<String>,
}

async fn lock_session(state: &AppState) -> MutexGuard<'_, FocusSession> {
    state.session.lock().await
}

fn to_timer_state_response(session: &FocusSession) -> TimerStateResponse {
    let display = session.display();
    let timer = session.timer();
    TimerStateResponse {
        phase: display.phase,
        run_state: timer.run_state(),
        is_active: display.is_active,
        minutes: display.minutes,
        seconds: display.seconds,
        remaining_seconds: display.remaining_seconds(),
        display: display.to_string(),
        sessions_completed_in_cycle: timer.state().sessions_completed_in_cycle,
        long_break_interval: timer.settings().long_break_interval,
        selected_task_ids: session.selected_task_ids().to_vec(),
    }
}

fn required_id<'a>(value: &'a str, field: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn normalize_ids(task_ids: Vec<String>) -> Vec<String> {
    task_ids
        .into_iter()
        .map(|task_id| task_id.trim().to_string())
        .filter(|task_id| !task_id.is_empty())
        .collect()
}

fn parse_datetime_input(raw: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("{field} must be RFC3339: {error}")))
}

pub async fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let session = lock_session(state).await;
    Ok(to_timer_state_response(&session))
}

pub async fn toggle_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let mut session = lock_session(state).await;
    let run_state = session.toggle().await?;
    state.log_info("toggle_timer", &format!("timer is now {run_state:?}"));
    Ok(to_timer_state_response(&session))
}

pub async fn reset_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let mut session = lock_session(state).await;
    session.reset().await?;
    state.log_info("reset_timer", "reset current phase");
    Ok(to_timer_state_response(&session))
}

pub async fn switch_phase_impl(
    state: &AppState,
    phase: String,
) -> Result<TimerStateResponse, InfraError> {
    let target = Phase::parse(&phase)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported phase: {}", phase.trim())))?;
    let mut session = lock_session(state).await;
    session.switch_phase(target).await?;
    state.log_info("switch_phase", &format!("switched to {target}"));
    Ok(to_timer_state_response(&session))
}

pub async fn tick_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let mut session = lock_session(state).await;
    session.tick().await?;
    Ok(to_timer_state_response(&session))
}

/// Merges the override over the saved settings, persists the result and hands
/// it to the running timer.
pub async fn update_settings_impl(
    state: &AppState,
    settings_override: SettingsOverride,
) -> Result<Settings, InfraError> {
    let current = load_settings(&state.config_dir)?;
    let next = current.apply_override(&settings_override);
    next.validate().map_err(InfraError::InvalidConfig)?;
    save_settings(&state.config_dir, &next)?;

    lock_session(state).await.update_settings(next);
    state.log_info("update_settings", "saved timer settings");
    Ok(next)
}

pub async fn create_task_impl(
    state: &AppState,
    title: String,
    project_id: Option<String>,
) -> Result<Task, InfraError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(InfraError::InvalidConfig(
            "title must not be empty".to_string(),
        ));
    }

    let task = state
        .store
        .create_task(NewTask {
            title: title.to_string(),
            project_id: optional_text(project_id),
        })
        .await?;
    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub async fn list_tasks_impl(
    state: &AppState,
    project_id: Option<String>,
    include_completed: Option<bool>,
) -> Result<Vec<Task>, InfraError> {
    let filter = TaskFilter {
        project_id: optional_text(project_id),
        include_completed: include_completed.unwrap_or(true),
    };
    let mut tasks = state.store.list_tasks(&filter).await?;
    tasks.sort_by(|left, right| left.created_at.cmp(&right.created_at));
    Ok(tasks)
}

/// An empty `project_id` clears the assignment.
pub async fn update_task_impl(
    state: &AppState,
    task_id: String,
    title: Option<String>,
    project_id: Option<String>,
    completed: Option<bool>,
    focus: Option<bool>,
) -> Result<Task, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;

    if let Some(title) = title.as_deref() {
        if title.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "title must not be empty".to_string(),
            ));
        }
    }

    let patch = TaskPatch {
        title: title.map(|value| value.trim().to_string()),
        project_id: project_id.map(|value| optional_text(Some(value))),
        completed,
        focus,
    };
    if patch.is_empty() {
        return Err(InfraError::InvalidConfig(
            "update must change at least one field".to_string(),
        ));
    }

    let updated = state.store.update_task(task_id, &patch).await?;
    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(updated)
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;

    let removed = state.store.delete_task(task_id).await?;
    if !removed {
        return Ok(false);
    }
    lock_session(state).await.forget_task(task_id);

    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

pub async fn select_tasks_impl(
    state: &AppState,
    task_ids: Vec<String>,
) -> Result<Vec<String>, InfraError> {
    let task_ids = normalize_ids(task_ids);
    let selected = lock_session(state).await.select_tasks(&task_ids).await?;
    state.log_info("select_tasks", &format!("selected {} task(s)", selected.len()));
    Ok(selected)
}

pub async fn start_tracking_impl(
    state: &AppState,
    task_ids: Vec<String>,
) -> Result<Vec<TrackedElapsed>, InfraError> {
    let task_ids = normalize_ids(task_ids);
    if task_ids.is_empty() {
        return Err(InfraError::InvalidConfig(
            "task_ids must not be empty".to_string(),
        ));
    }

    let session = lock_session(state).await;
    let started = session.start_tracking(&task_ids).await?;
    state.log_info("start_tracking", &format!("started {started} task(s)"));
    let elapsed = session.tracked_elapsed().await?;
    Ok(elapsed)
}

/// Stops the given tasks, or every tracked task when `task_ids` is `None`.
pub async fn stop_tracking_impl(
    state: &AppState,
    task_ids: Option<Vec<String>>,
) -> Result<Vec<TrackedElapsed>, InfraError> {
    let task_ids = task_ids.map(normalize_ids);
    let session = lock_session(state).await;
    let stopped = session.stop_tracking(task_ids.as_deref()).await?;
    state.log_info("stop_tracking", &format!("stopped {stopped} task(s)"));
    let elapsed = session.tracked_elapsed().await?;
    Ok(elapsed)
}

pub async fn tracked_elapsed_impl(state: &AppState) -> Result<Vec<TrackedElapsed>, InfraError> {
    lock_session(state).await.tracked_elapsed().await
}

pub async fn create_project_impl(
    state: &AppState,
    name: String,
    color: Option<String>,
) -> Result<Project, InfraError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InfraError::InvalidConfig(
            "name must not be empty".to_string(),
        ));
    }

    let project = state
        .store
        .create_project(NewProject {
            name: name.to_string(),
            color: optional_text(color),
        })
        .await?;
    state.log_info("create_project", &format!("created project_id={}", project.id));
    Ok(project)
}

pub async fn list_projects_impl(state: &AppState) -> Result<Vec<Project>, InfraError> {
    state.store.list_projects().await
}

pub async fn delete_project_impl(state: &AppState, project_id: String) -> Result<bool, InfraError> {
    let project_id = required_id(&project_id, "project_id")?;
    let removed = state.store.delete_project(project_id).await?;
    if removed {
        state.log_info("delete_project", &format!("deleted project_id={project_id}"));
    }
    Ok(removed)
}

/// Summary of this session's completed phases. Defaults to the last 7 days,
/// which is also how far back the session history reaches.
pub async fn get_focus_summary_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<FocusSummary, InfraError> {
    let session = lock_session(state).await;
    let now = session.now();
    let end = match end {
        Some(raw) => parse_datetime_input(&raw, "end")?,
        None => now,
    };
    let start = match start {
        Some(raw) => parse_datetime_input(&raw, "start")?,
        None => end - Duration::days(DEFAULT_SUMMARY_DAYS),
    };
    summarize(session.history(), start, end, state.timezone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
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
                "pomotrack-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        async fn app_state(&self) -> AppState {
            AppState::with_credential_store(self.path.clone(), &InMemoryCredentialStore::default())
                .await
                .expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn fresh_state_shows_a_full_pomodoro() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let timer = get_timer_state_impl(&state).await.expect("timer state");

        assert_eq!(state.store_kind(), StoreKind::Local);
        assert_eq!(timer.phase, Phase::Pomodoro);
        assert_eq!(timer.run_state, RunState::NotStarted);
        assert_eq!(timer.display, "25:00");
        assert_eq!(timer.long_break_interval, 4);
    }

    #[tokio::test]
    async fn create_task_rejects_empty_title() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let result = create_task_impl(&state, "   ".to_string(), None).await;
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn create_update_and_list_tasks_roundtrip() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let project = create_project_impl(&state, "Thesis".to_string(), Some("#112233".to_string()))
            .await
            .expect("create project");
        let created = create_task_impl(
            &state,
            "  Write integration tests ".to_string(),
            Some(project.id.clone()),
        )
        .await
        .expect("create task");
        assert_eq!(created.title, "Write integration tests");

        let updated = update_task_impl(
            &state,
            created.id.clone(),
            None,
            Some(String::new()),
            Some(true),
            None,
        )
        .await
        .expect("update task");
        assert_eq!(updated.project_id, None);
        assert!(updated.completed);

        let open = list_tasks_impl(&state, None, Some(false)).await.expect("list open");
        assert!(open.is_empty());
        let all = list_tasks_impl(&state, None, None).await.expect("list all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, created.id);

        let no_op = update_task_impl(&state, created.id, None, None, None, None).await;
        assert!(no_op.is_err());
    }

    #[tokio::test]
    async fn switch_phase_parses_names_and_rejects_unknown() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let timer = switch_phase_impl(&state, "long_break".to_string())
            .await
            .expect("switch phase");
        assert_eq!(timer.phase, Phase::LongBreak);
        assert_eq!(timer.display, "15:00");
        assert!(!timer.is_active);
        assert_eq!(timer.sessions_completed_in_cycle, 0);

        assert!(switch_phase_impl(&state, "lunch".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn toggle_tracks_selected_tasks_and_stop_all_commits() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let first = create_task_impl(&state, "First".to_string(), None)
            .await
            .expect("create first");
        let second = create_task_impl(&state, "Second".to_string(), None)
            .await
            .expect("create second");

        let selected = select_tasks_impl(
            &state,
            vec![first.id.clone(), format!(" {} ", second.id), String::new()],
        )
        .await
        .expect("select tasks");
        assert_eq!(selected, vec![first.id.clone(), second.id.clone()]);

        let timer = toggle_timer_impl(&state).await.expect("start timer");
        assert_eq!(timer.run_state, RunState::Running);
        let elapsed = tracked_elapsed_impl(&state).await.expect("elapsed");
        assert_eq!(elapsed.len(), 2);

        let remaining = stop_tracking_impl(&state, None).await.expect("stop all");
        assert!(remaining.is_empty());
        let tasks = list_tasks_impl(&state, None, None).await.expect("list tasks");
        assert!(tasks.iter().all(|task| !task.is_tracked()));
    }

    #[tokio::test]
    async fn manual_tracking_requires_ids() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let task = create_task_impl(&state, "Manual".to_string(), None)
            .await
            .expect("create task");

        assert!(start_tracking_impl(&state, vec![" ".to_string()]).await.is_err());
        let tracked = start_tracking_impl(&state, vec![task.id.clone()])
            .await
            .expect("start tracking");
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].task_id, task.id);

        let remaining = stop_tracking_impl(&state, Some(vec![task.id]))
            .await
            .expect("stop tracking");
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_selected_task_drops_it_from_selection() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let task = create_task_impl(&state, "Doomed".to_string(), None)
            .await
            .expect("create task");
        select_tasks_impl(&state, vec![task.id.clone()])
            .await
            .expect("select task");

        assert!(delete_task_impl(&state, task.id.clone()).await.expect("delete"));
        assert!(!delete_task_impl(&state, task.id).await.expect("delete again"));
        let timer = get_timer_state_impl(&state).await.expect("timer state");
        assert!(timer.selected_task_ids.is_empty());
        assert!(delete_task_impl(&state, "  ".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn update_settings_persists_and_applies_to_idle_timer() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let settings = update_settings_impl(
            &state,
            SettingsOverride {
                pomodoro_minutes: Some(50),
                ..SettingsOverride::default()
            },
        )
        .await
        .expect("update settings");

        assert_eq!(settings.pomodoro_minutes, 50);
        assert_eq!(settings.short_break_minutes, 5);
        assert_eq!(load_settings(state.config_dir()).expect("reload"), settings);
        let timer = get_timer_state_impl(&state).await.expect("timer state");
        assert_eq!(timer.display, "50:00");

        let invalid = update_settings_impl(
            &state,
            SettingsOverride {
                long_break_interval: Some(0),
                ..SettingsOverride::default()
            },
        )
        .await;
        assert!(matches!(invalid, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn deleting_a_project_unassigns_tasks() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        let project = create_project_impl(&state, "Side".to_string(), None)
            .await
            .expect("create project");
        create_task_impl(&state, "Assigned".to_string(), Some(project.id.clone()))
            .await
            .expect("create task");

        assert!(delete_project_impl(&state, project.id.clone()).await.expect("delete"));
        assert!(list_projects_impl(&state).await.expect("list projects").is_empty());
        let tasks = list_tasks_impl(&state, Some(project.id), None)
            .await
            .expect("list by project");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn focus_summary_validates_range() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let summary = get_focus_summary_impl(&state, None, None)
            .await
            .expect("default summary");
        assert_eq!(summary.completed_pomodoros, 0);
        assert_eq!(summary.timezone, "UTC");

        let inverted = get_focus_summary_impl(
            &state,
            Some("2026-02-17T00:00:00Z".to_string()),
            Some("2026-02-16T00:00:00Z".to_string()),
        )
        .await;
        assert!(inverted.is_err());
        assert!(
            get_focus_summary_impl(&state, Some("yesterday".to_string()), None)
                .await
                .is_err()
        );
    }
}
