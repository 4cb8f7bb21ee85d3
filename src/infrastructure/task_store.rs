use crate::domain::models::{NewProject, NewTask, Project, Task, TaskPatch, TaskUpdate};
use crate::domain::timestamp::TimestampValue;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub include_completed: bool,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self {
            project_id: None,
            include_completed: true,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if !self.include_completed && task.completed {
            return false;
        }
        match &self.project_id {
            Some(project_id) => task.project_id.as_deref() == Some(project_id.as_str()),
            None => true,
        }
    }
}

/// Storage capability for tasks and projects. Guest sessions use a local
/// implementation and signed-in sessions a remote one; callers never branch
/// on which.
#[async_trait]
pub trait TaskStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Latest snapshot of every task, refreshed after each successful write.
    fn subscribe(&self) -> watch::Receiver<Vec<Task>>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, InfraError>;

    async fn create_task(&self, draft: NewTask) -> Result<Task, InfraError>;

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError>;

    async fn delete_task(&self, task_id: &str) -> Result<bool, InfraError>;

    /// Applies every update or none of them. An unknown task id fails the batch.
    async fn apply_batch(&self, updates: &[TaskUpdate]) -> Result<(), InfraError>;

    async fn list_projects(&self) -> Result<Vec<Project>, InfraError>;

    async fn create_project(&self, draft: NewProject) -> Result<Project, InfraError>;

    /// Deletes the project and unassigns its tasks.
    async fn delete_project(&self, project_id: &str) -> Result<bool, InfraError>;
}

fn build_task(draft: NewTask) -> Result<Task, InfraError> {
    let task = Task {
        id: next_id("task"),
        title: draft.title.trim().to_string(),
        project_id: draft
            .project_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        manual_time_spent: 0,
        tracking_started_at: None,
        total_pomodoro_sessions: 0,
        total_time_spent: 0,
        completed: false,
        focus: false,
        created_at: Utc::now(),
    };
    task.validate().map_err(InfraError::InvalidConfig)?;
    Ok(task)
}

fn build_project(draft: NewProject) -> Result<Project, InfraError> {
    let project = Project {
        id: next_id("project"),
        name: draft.name.trim().to_string(),
        color: draft
            .color
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        created_at: Utc::now(),
    };
    project.validate().map_err(InfraError::InvalidConfig)?;
    Ok(project)
}

fn patched(mut task: Task, patch: &TaskPatch) -> Result<Task, InfraError> {
    let mut patch = patch.clone();
    patch.title = patch.title.map(|title| title.trim().to_string());
    patch.apply_to(&mut task);
    task.validate().map_err(InfraError::InvalidConfig)?;
    Ok(task)
}

/// The project a patch assigns, if it assigns one. Existing assignments are
/// not re-checked.
fn assigned_project<'a>(patch: &TaskPatch, updated: &'a Task) -> Option<&'a str> {
    match patch.project_id {
        Some(Some(_)) => updated.project_id.as_deref(),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Vec<Task>,
    projects: Vec<Project>,
}

#[derive(Debug)]
pub struct InMemoryTaskStore {
    state: Mutex<MemoryState>,
    snapshot: watch::Sender<Vec<Task>>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::with_tasks(Vec::new())
    }
}

impl InMemoryTaskStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let (snapshot, _) = watch::channel(tasks.clone());
        Self {
            state: Mutex::new(MemoryState {
                tasks,
                projects: Vec::new(),
            }),
            snapshot,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Lock(format!("task store: {error}")))
    }

    fn publish(&self, tasks: &[Task]) {
        self.snapshot.send_replace(tasks.to_vec());
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshot.subscribe()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, InfraError> {
        let state = self.lock()?;
        Ok(state
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }

    async fn create_task(&self, draft: NewTask) -> Result<Task, InfraError> {
        let task = build_task(draft)?;
        let mut state = self.lock()?;
        if let Some(project_id) = task.project_id.as_deref() {
            if !state.projects.iter().any(|project| project.id == project_id) {
                return Err(InfraError::NotFound(format!("project {project_id}")));
            }
        }
        state.tasks.push(task.clone());
        self.publish(&state.tasks);
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        let mut state = self.lock()?;
        let index = state
            .tasks
            .iter()
            .position(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        let updated = patched(state.tasks[index].clone(), patch)?;
        if let Some(project_id) = assigned_project(patch, &updated) {
            if !state.projects.iter().any(|project| project.id == project_id) {
                return Err(InfraError::NotFound(format!("project {project_id}")));
            }
        }
        state.tasks[index] = updated.clone();
        self.publish(&state.tasks);
        Ok(updated)
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        let before = state.tasks.len();
        state.tasks.retain(|task| task.id != task_id);
        let removed = state.tasks.len() != before;
        if removed {
            self.publish(&state.tasks);
        }
        Ok(removed)
    }

    async fn apply_batch(&self, updates: &[TaskUpdate]) -> Result<(), InfraError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut state = self.lock()?;
        let mut next = state.tasks.clone();
        for update in updates {
            let task = next
                .iter_mut()
                .find(|task| task.id == update.task_id())
                .ok_or_else(|| InfraError::NotFound(format!("task {}", update.task_id())))?;
            task.apply(update);
        }
        state.tasks = next;
        self.publish(&state.tasks);
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, InfraError> {
        Ok(self.lock()?.projects.clone())
    }

    async fn create_project(&self, draft: NewProject) -> Result<Project, InfraError> {
        let project = build_project(draft)?;
        self.lock()?.projects.push(project.clone());
        Ok(project)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        let before = state.projects.len();
        state.projects.retain(|project| project.id != project_id);
        if state.projects.len() == before {
            return Ok(false);
        }
        for task in &mut state.tasks {
            if task.project_id.as_deref() == Some(project_id) {
                task.project_id = None;
            }
        }
        self.publish(&state.tasks);
        Ok(true)
    }
}

const TASK_COLUMNS: &str = "id, title, project_id, manual_time_spent, tracking_started_at, \
     total_pomodoro_sessions, total_time_spent, completed, focus, created_at";

/// Guest-mode store backed by the workspace SQLite database.
#[derive(Debug)]
pub struct SqliteTaskStore {
    db_path: PathBuf,
    snapshot: watch::Sender<Vec<Task>>,
}

impl SqliteTaskStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let db_path = db_path.as_ref().to_path_buf();
        initialize_database(&db_path)?;
        let (snapshot, _) = watch::channel(Vec::new());
        let store = Self { db_path, snapshot };
        let connection = store.connect()?;
        store.publish(&connection)?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn publish(&self, connection: &Connection) -> Result<(), InfraError> {
        let tasks = load_tasks(connection, &TaskFilter::all())?;
        self.snapshot.send_replace(tasks);
        Ok(())
    }

    fn create_task_sync(&self, draft: NewTask) -> Result<Task, InfraError> {
        let task = build_task(draft)?;
        let connection = self.connect()?;
        if let Some(project_id) = task.project_id.as_deref() {
            if find_project(&connection, project_id)?.is_none() {
                return Err(InfraError::NotFound(format!("project {project_id}")));
            }
        }
        write_task(&connection, &task)?;
        self.publish(&connection)?;
        Ok(task)
    }

    fn update_task_sync(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        let connection = self.connect()?;
        let current = find_task(&connection, task_id)?
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        let updated = patched(current, patch)?;
        if let Some(project_id) = assigned_project(patch, &updated) {
            if find_project(&connection, project_id)?.is_none() {
                return Err(InfraError::NotFound(format!("project {project_id}")));
            }
        }
        write_task(&connection, &updated)?;
        self.publish(&connection)?;
        Ok(updated)
    }

    fn delete_task_sync(&self, task_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let removed = connection.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])? > 0;
        if removed {
            self.publish(&connection)?;
        }
        Ok(removed)
    }

    fn apply_batch_sync(&self, updates: &[TaskUpdate]) -> Result<(), InfraError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for update in updates {
            let mut task = find_task(&transaction, update.task_id())?
                .ok_or_else(|| InfraError::NotFound(format!("task {}", update.task_id())))?;
            task.apply(update);
            write_task(&transaction, &task)?;
        }
        transaction.commit()?;
        self.publish(&connection)
    }

    fn create_project_sync(&self, draft: NewProject) -> Result<Project, InfraError> {
        let project = build_project(draft)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO projects (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id,
                project.name,
                project.color,
                project.created_at.to_rfc3339()
            ],
        )?;
        Ok(project)
    }

    fn delete_project_sync(&self, project_id: &str) -> Result<bool, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let removed = transaction.execute("DELETE FROM projects WHERE id = ?1", params![project_id])? > 0;
        if removed {
            transaction.execute(
                "UPDATE tasks SET project_id = NULL WHERE project_id = ?1",
                params![project_id],
            )?;
        }
        transaction.commit()?;
        if removed {
            self.publish(&connection)?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshot.subscribe()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, InfraError> {
        load_tasks(&self.connect()?, filter)
    }

    async fn create_task(&self, draft: NewTask) -> Result<Task, InfraError> {
        self.create_task_sync(draft)
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        self.update_task_sync(task_id, patch)
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, InfraError> {
        self.delete_task_sync(task_id)
    }

    async fn apply_batch(&self, updates: &[TaskUpdate]) -> Result<(), InfraError> {
        self.apply_batch_sync(updates)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT id, name, color, created_at FROM projects ORDER BY created_at, id")?;
        let rows = statement.query_map([], read_project)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(InfraError::from)
    }

    async fn create_project(&self, draft: NewProject) -> Result<Project, InfraError> {
        self.create_project_sync(draft)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, InfraError> {
        self.delete_project_sync(project_id)
    }
}

fn load_tasks(connection: &Connection, filter: &TaskFilter) -> Result<Vec<Task>, InfraError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE (?1 IS NULL OR project_id = ?1) AND (?2 = 1 OR completed = 0)
         ORDER BY created_at, id"
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(
        params![filter.project_id, filter.include_completed],
        read_task,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(InfraError::from)
}

fn find_task(connection: &Connection, task_id: &str) -> Result<Option<Task>, InfraError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    connection
        .query_row(&sql, params![task_id], read_task)
        .optional()
        .map_err(InfraError::from)
}

fn find_project(connection: &Connection, project_id: &str) -> Result<Option<Project>, InfraError> {
    connection
        .query_row(
            "SELECT id, name, color, created_at FROM projects WHERE id = ?1",
            params![project_id],
            read_project,
        )
        .optional()
        .map_err(InfraError::from)
}

fn write_task(connection: &Connection, task: &Task) -> Result<(), InfraError> {
    connection.execute(
        "INSERT INTO tasks (id, title, project_id, manual_time_spent, tracking_started_at,
                            total_pomodoro_sessions, total_time_spent, completed, focus, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           project_id = excluded.project_id,
           manual_time_spent = excluded.manual_time_spent,
           tracking_started_at = excluded.tracking_started_at,
           total_pomodoro_sessions = excluded.total_pomodoro_sessions,
           total_time_spent = excluded.total_time_spent,
           completed = excluded.completed,
           focus = excluded.focus",
        params![
            task.id,
            task.title,
            task.project_id,
            task.manual_time_spent,
            task.tracking_started_at.map(|value| value.to_rfc3339()),
            task.total_pomodoro_sessions,
            task.total_time_spent,
            task.completed,
            task.focus,
            task.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Integer millis and text both occur in older databases; anything else reads as untracked.
fn sql_timestamp(value: Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Integer(millis) => Utc.timestamp_millis_opt(millis).single(),
        Value::Text(text) => TimestampValue::Text(text).to_datetime(),
        _ => None,
    }
}

fn required_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    sql_timestamp(row.get::<_, Value>(index)?).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(
            index,
            "created_at".to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

fn read_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        project_id: row.get(2)?,
        manual_time_spent: row.get(3)?,
        tracking_started_at: sql_timestamp(row.get::<_, Value>(4)?),
        total_pomodoro_sessions: row.get(5)?,
        total_time_spent: row.get(6)?,
        completed: row.get(7)?,
        focus: row.get(8)?,
        created_at: required_timestamp(row, 9)?,
    })
}

fn read_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        created_at: required_timestamp(row, 3)?,
    })
}
