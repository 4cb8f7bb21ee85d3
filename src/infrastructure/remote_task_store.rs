use crate::domain::models::{NewProject, NewTask, Project, Task, TaskPatch, TaskUpdate};
use crate::domain::timestamp::TimestampValue;
use crate::infrastructure::credential_store::SyncCredentials;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::{StoreKind, TaskFilter, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use url::Url;

/// Signed-in store. Every write goes to the sync service and the local
/// snapshot is re-fetched afterwards so subscribers see server state.
#[derive(Debug)]
pub struct RemoteTaskStore {
    client: Client,
    base_url: Url,
    credentials: SyncCredentials,
    snapshot: watch::Sender<Vec<Task>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTask {
    id: String,
    title: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    manual_time_spent: i64,
    #[serde(default)]
    tracking_started_at: serde_json::Value,
    #[serde(default)]
    total_pomodoro_sessions: u32,
    #[serde(default)]
    total_time_spent: i64,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    focus: bool,
    #[serde(default)]
    created_at: serde_json::Value,
}

impl From<RemoteTask> for Task {
    fn from(remote: RemoteTask) -> Self {
        Task {
            id: remote.id,
            title: remote.title,
            project_id: remote.project_id.filter(|value| !value.trim().is_empty()),
            manual_time_spent: remote.manual_time_spent.max(0),
            tracking_started_at: TimestampValue::from_json(&remote.tracking_started_at),
            total_pomodoro_sessions: remote.total_pomodoro_sessions,
            total_time_spent: remote.total_time_spent.max(0),
            completed: remote.completed,
            focus: remote.focus,
            created_at: TimestampValue::from_json(&remote.created_at)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteProject {
    id: String,
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    created_at: serde_json::Value,
}

impl From<RemoteProject> for Project {
    fn from(remote: RemoteProject) -> Self {
        Project {
            id: remote.id,
            name: remote.name,
            color: remote.color,
            created_at: TimestampValue::from_json(&remote.created_at)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TaskListResponse {
    #[serde(default)]
    tasks: Vec<RemoteTask>,
}

#[derive(Debug, serde::Deserialize)]
struct ProjectListResponse {
    #[serde(default)]
    projects: Vec<RemoteProject>,
}

#[derive(Debug, serde::Serialize)]
struct BatchRequest<'a> {
    updates: &'a [TaskUpdate],
}

impl RemoteTaskStore {
    /// Builds the store without touching the network. The snapshot stays
    /// empty until the first fetch; use [`RemoteTaskStore::connect`] to open
    /// a session.
    pub fn new(base_url: &str, credentials: SyncCredentials) -> Result<Self, InfraError> {
        Self::with_client(Client::new(), base_url, credentials)
    }

    /// Builds the store and fetches the task list once so `subscribe()`
    /// starts from server state.
    pub async fn connect(base_url: &str, credentials: SyncCredentials) -> Result<Self, InfraError> {
        let store = Self::new(base_url, credentials)?;
        let tasks = store.refresh().await?;
        tracing::debug!(count = tasks.len(), "fetched initial remote task snapshot");
        Ok(store)
    }

    fn with_client(
        client: Client,
        base_url: &str,
        credentials: SyncCredentials,
    ) -> Result<Self, InfraError> {
        Self::ensure_non_empty(&credentials.user_id, "user id")?;
        Self::ensure_non_empty(&credentials.access_token, "access token")?;
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "remote base url cannot be a base".to_string(),
            ));
        }
        let (snapshot, _) = watch::channel(Vec::new());
        Ok(Self {
            client,
            base_url,
            credentials,
            snapshot,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("sync api error: http {}", status.as_u16())
        } else {
            format!("sync api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Remote(message)
    }

    fn endpoint(&self, tail: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Remote("sync api base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("users");
            segments.push(&self.credentials.user_id);
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let response = request
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while {context}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Remote(format!("failed reading response while {context}: {error}")))?;
        tracing::debug!(status = status.as_u16(), context, "sync api response");
        Ok((status, body))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, InfraError> {
        let (status, body) = self.execute(request, context).await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        parse_payload(&body, context)
    }

    async fn fetch_all_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let url = self.endpoint(&["tasks"])?;
        let parsed: TaskListResponse = self.fetch(self.client.get(url), "listing tasks").await?;
        Ok(parsed.tasks.into_iter().map(Task::from).collect())
    }

    async fn refresh(&self) -> Result<Vec<Task>, InfraError> {
        let tasks = self.fetch_all_tasks().await?;
        self.snapshot.send_replace(tasks.clone());
        Ok(tasks)
    }

    /// Deletes return false on 404 so callers can treat them like local deletes.
    async fn delete(&self, url: Url, context: &str) -> Result<bool, InfraError> {
        let (status, body) = self.execute(self.client.delete(url), context).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(true)
    }
}

fn parse_payload<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, InfraError> {
    serde_json::from_str(body).map_err(|error| {
        InfraError::Remote(format!("invalid payload while {context}: {error}; body={body}"))
    })
}

#[async_trait]
impl TaskStore for RemoteTaskStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshot.subscribe()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, InfraError> {
        let tasks = self.refresh().await?;
        Ok(tasks.into_iter().filter(|task| filter.matches(task)).collect())
    }

    async fn create_task(&self, draft: NewTask) -> Result<Task, InfraError> {
        Self::ensure_non_empty(&draft.title, "title")?;
        let url = self.endpoint(&["tasks"])?;
        let created: RemoteTask = self
            .fetch(self.client.post(url).json(&draft), "creating task")
            .await?;
        self.refresh().await?;
        Ok(created.into())
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let url = self.endpoint(&["tasks", task_id])?;
        let (status, body) = self
            .execute(self.client.patch(url).json(patch), "updating task")
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound(format!("task {task_id}")));
        }
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let updated: RemoteTask = parse_payload(&body, "updating task")?;
        self.refresh().await?;
        Ok(updated.into())
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let removed = self
            .delete(self.endpoint(&["tasks", task_id])?, "deleting task")
            .await?;
        if removed {
            self.refresh().await?;
        }
        Ok(removed)
    }

    async fn apply_batch(&self, updates: &[TaskUpdate]) -> Result<(), InfraError> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["tasks:batch"])?;
        let (status, body) = self
            .execute(
                self.client.post(url).json(&BatchRequest { updates }),
                "applying task batch",
            )
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(InfraError::NotFound(format!("task batch rejected: {body}")));
        }
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        self.refresh().await?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, InfraError> {
        let url = self.endpoint(&["projects"])?;
        let parsed: ProjectListResponse = self.fetch(self.client.get(url), "listing projects").await?;
        Ok(parsed.projects.into_iter().map(Project::from).collect())
    }

    async fn create_project(&self, draft: NewProject) -> Result<Project, InfraError> {
        Self::ensure_non_empty(&draft.name, "project name")?;
        let url = self.endpoint(&["projects"])?;
        let created: RemoteProject = self
            .fetch(self.client.post(url).json(&draft), "creating project")
            .await?;
        Ok(created.into())
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, InfraError> {
        Self::ensure_non_empty(project_id, "project id")?;
        let removed = self
            .delete(self.endpoint(&["projects", project_id])?, "deleting project")
            .await?;
        if removed {
            self.refresh().await?;
        }
        Ok(removed)
    }
}
