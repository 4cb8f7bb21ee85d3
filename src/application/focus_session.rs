use crate::application::summary::{DEFAULT_SUMMARY_DAYS, PhaseRecord};
use crate::domain::models::{Phase, Task, TaskUpdate};
use crate::domain::phase_timer::{PhaseCompletion, PhaseTimer, RunState, TickOutcome, TimerDisplay};
use crate::domain::settings::Settings;
use crate::domain::time_tracking::{
    TrackedElapsed, elapsed_snapshot, start_intents, stop_intents,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::{TaskFilter, TaskStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub trait CompletionNotifier: Send + Sync {
    fn phase_completed(&self, completion: &PhaseCompletion);
}

impl<F> CompletionNotifier for F
where
    F: Fn(&PhaseCompletion) + Send + Sync,
{
    fn phase_completed(&self, completion: &PhaseCompletion) {
        self(completion)
    }
}

/// Stable handle the countdown notifies on completion. Rebinding swaps the
/// target without touching the loop that holds the port.
#[derive(Clone, Default)]
pub struct CompletionPort {
    target: Arc<RwLock<Option<Arc<dyn CompletionNotifier>>>>,
}

impl CompletionPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, notifier: Arc<dyn CompletionNotifier>) {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        *target = Some(notifier);
    }

    pub fn unbind(&self) {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        *target = None;
    }

    pub fn is_bound(&self) -> bool {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn notify(&self, completion: &PhaseCompletion) {
        let notifier = self
            .target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notifier) = notifier {
            notifier.phase_completed(completion);
        }
    }
}

impl std::fmt::Debug for CompletionPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPort")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// One timer session: the phase timer, the tasks selected to track against
/// it, and the store those tracking intents are written to.
///
/// Every transition updates the in-memory timer before persistence is
/// attempted. A failed batch is returned to the caller but never rolls the
/// timer back.
pub struct FocusSession {
    timer: PhaseTimer,
    selected: Vec<String>,
    store: Arc<dyn TaskStore>,
    completion_port: CompletionPort,
    now_provider: NowProvider,
    history: Vec<PhaseRecord>,
}

impl FocusSession {
    pub fn new(settings: Settings, store: Arc<dyn TaskStore>) -> Self {
        Self {
            timer: PhaseTimer::new(settings),
            selected: Vec::new(),
            store,
            completion_port: CompletionPort::new(),
            now_provider: Arc::new(Utc::now),
            history: Vec::new(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_completion_port(mut self, completion_port: CompletionPort) -> Self {
        self.completion_port = completion_port;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn now_provider(&self) -> NowProvider {
        Arc::clone(&self.now_provider)
    }

    pub fn completion_port(&self) -> CompletionPort {
        self.completion_port.clone()
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn timer(&self) -> &PhaseTimer {
        &self.timer
    }

    pub fn display(&self) -> TimerDisplay {
        self.timer.display(self.now())
    }

    pub fn selected_task_ids(&self) -> &[String] {
        &self.selected
    }

    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Completed phases older than the default summary window are dropped.
    fn record_history(&mut self, record: PhaseRecord, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(DEFAULT_SUMMARY_DAYS);
        self.history.retain(|kept| kept.completed_at >= cutoff);
        self.history.push(record);
    }

    fn tracks_selection(&self) -> bool {
        self.timer.phase() == Phase::Pomodoro && self.timer.run_state() == RunState::Running
    }

    async fn snapshot(&self) -> Result<Vec<Task>, InfraError> {
        self.store.list_tasks(&TaskFilter::all()).await
    }

    async fn apply(&self, updates: Vec<TaskUpdate>, context: &str) -> Result<(), InfraError> {
        if updates.is_empty() {
            return Ok(());
        }
        match self.store.apply_batch(&updates).await {
            Ok(()) => {
                tracing::info!(context, updates = updates.len(), "applied tracking batch");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(context, %error, "tracking batch failed; timer state kept");
                Err(error)
            }
        }
    }

    async fn stop_selected(&self, now: DateTime<Utc>, context: &str) -> Result<(), InfraError> {
        if self.selected.is_empty() {
            return Ok(());
        }
        let tasks = self.snapshot().await?;
        let selected = tasks
            .iter()
            .filter(|task| self.selected.contains(&task.id));
        let updates = stop_intents(selected, now)
            .into_iter()
            .map(TaskUpdate::from)
            .collect();
        self.apply(updates, context).await
    }

    async fn start_selected(&self, now: DateTime<Utc>, context: &str) -> Result<(), InfraError> {
        if self.selected.is_empty() {
            return Ok(());
        }
        let tasks = self.snapshot().await?;
        let updates = start_intents(&tasks, &self.selected, now)
            .into_iter()
            .map(TaskUpdate::from)
            .collect();
        self.apply(updates, context).await
    }

    /// Starts, pauses or resumes the timer. In a Pomodoro the selected tasks
    /// start or stop tracking at the same instant the timer changed.
    pub async fn toggle(&mut self) -> Result<RunState, InfraError> {
        let now = self.now();
        let run_state = self.timer.toggle(now);
        tracing::info!(phase = %self.timer.phase(), ?run_state, "timer toggled");

        if self.timer.phase() == Phase::Pomodoro {
            match run_state {
                RunState::Running => self.start_selected(now, "toggle").await?,
                RunState::Paused => self.stop_selected(now, "toggle").await?,
                RunState::NotStarted => {}
            }
        }
        Ok(run_state)
    }

    pub async fn reset(&mut self) -> Result<(), InfraError> {
        let now = self.now();
        self.timer.reset();
        tracing::info!(phase = %self.timer.phase(), "timer reset");
        self.stop_selected(now, "reset").await
    }

    pub async fn switch_phase(&mut self, target: Phase) -> Result<(), InfraError> {
        let now = self.now();
        self.timer.switch_phase(target);
        tracing::info!(phase = %target, "phase switched");
        self.stop_selected(now, "switch_phase").await
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.timer.update_settings(settings);
        tracing::info!(?settings, "timer settings updated");
    }

    /// Advances the countdown. On completion the port is notified first, then
    /// a finished Pomodoro commits tracked time and one session to every
    /// selected task in a single batch.
    pub async fn tick(&mut self) -> Result<TickOutcome, InfraError> {
        let now = self.now();
        let outcome = self.timer.tick(now);
        let TickOutcome::Completed(completion) = &outcome else {
            return Ok(outcome);
        };

        tracing::info!(
            completed = %completion.completed_phase,
            next = %completion.next_phase,
            cycle = completion.sessions_completed_in_cycle,
            "phase completed"
        );
        self.completion_port.notify(completion);

        let task_ids = if completion.completed_phase == Phase::Pomodoro {
            self.selected.clone()
        } else {
            Vec::new()
        };
        self.record_history(PhaseRecord::from_completion(completion, task_ids), now);

        if completion.completed_phase == Phase::Pomodoro && !self.selected.is_empty() {
            let tasks = self.snapshot().await?;
            let selected = tasks
                .iter()
                .filter(|task| self.selected.contains(&task.id))
                .collect::<Vec<_>>();
            let mut updates = stop_intents(selected.iter().copied(), now)
                .into_iter()
                .map(TaskUpdate::from)
                .collect::<Vec<_>>();
            updates.extend(selected.iter().map(|task| TaskUpdate::RecordSession {
                task_id: task.id.clone(),
                session_seconds: completion.duration_seconds,
            }));
            self.apply(updates, "complete").await?;
        }
        Ok(outcome)
    }

    /// Replaces the selection. While a Pomodoro is running, newly selected
    /// tasks start tracking and deselected ones stop, in one batch.
    pub async fn select_tasks(&mut self, task_ids: &[String]) -> Result<Vec<String>, InfraError> {
        let mut seen = HashSet::new();
        let next = task_ids
            .iter()
            .map(|task_id| task_id.trim())
            .filter(|task_id| !task_id.is_empty() && seen.insert(*task_id))
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();

        let tasks = self.snapshot().await?;
        if let Some(missing) = next
            .iter()
            .find(|task_id| !tasks.iter().any(|task| &task.id == *task_id))
        {
            return Err(InfraError::NotFound(format!("task {missing}")));
        }

        let previous = std::mem::replace(&mut self.selected, next);
        tracing::info!(selected = self.selected.len(), "task selection changed");
        if !self.tracks_selection() {
            return Ok(self.selected.clone());
        }

        let now = self.now();
        let deselected = tasks
            .iter()
            .filter(|task| previous.contains(&task.id) && !self.selected.contains(&task.id));
        let mut updates = stop_intents(deselected, now)
            .into_iter()
            .map(TaskUpdate::from)
            .collect::<Vec<_>>();
        updates.extend(
            start_intents(&tasks, &self.selected, now)
                .into_iter()
                .map(TaskUpdate::from),
        );
        self.apply(updates, "select_tasks").await?;
        Ok(self.selected.clone())
    }

    /// Drops a task from the selection, e.g. after it was deleted.
    pub fn forget_task(&mut self, task_id: &str) {
        self.selected.retain(|selected| selected != task_id);
    }

    /// Manual "start all". Returns how many tasks actually started.
    pub async fn start_tracking(&self, task_ids: &[String]) -> Result<usize, InfraError> {
        let tasks = self.snapshot().await?;
        let updates = start_intents(&tasks, task_ids, self.now())
            .into_iter()
            .map(TaskUpdate::from)
            .collect::<Vec<_>>();
        let started = updates.len();
        self.apply(updates, "start_tracking").await?;
        Ok(started)
    }

    /// Manual "stop all" over `task_ids`, or over every tracked task when `None`.
    pub async fn stop_tracking(&self, task_ids: Option<&[String]>) -> Result<usize, InfraError> {
        let tasks = self.snapshot().await?;
        let targets = tasks.iter().filter(|task| match task_ids {
            Some(ids) => ids.iter().any(|id| id.trim() == task.id),
            None => true,
        });
        let updates = stop_intents(targets, self.now())
            .into_iter()
            .map(TaskUpdate::from)
            .collect::<Vec<_>>();
        let stopped = updates.len();
        self.apply(updates, "stop_tracking").await?;
        Ok(stopped)
    }

    pub async fn tracked_elapsed(&self) -> Result<Vec<TrackedElapsed>, InfraError> {
        let tasks = self.snapshot().await?;
        Ok(elapsed_snapshot(&tasks, self.now()))
    }
}
