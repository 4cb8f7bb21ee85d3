use crate::domain::settings::Settings;
use crate::infrastructure::config::{StorageMode, ensure_default_configs, load_settings, read_storage_config};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_task_store::RemoteTaskStore;
use crate::infrastructure::storage::initialize_database;
use crate::infrastructure::task_store::{SqliteTaskStore, TaskStore};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: Settings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("pomotrack.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

/// Picks the task store for this session. Cloud mode needs a base URL,
/// unexpired credentials and a reachable sync service; otherwise the local
/// database is used.
pub async fn open_task_store(
    workspace: &BootstrapResult,
    credentials: &dyn CredentialStore,
    now: DateTime<Utc>,
) -> Result<Arc<dyn TaskStore>, InfraError> {
    let storage = read_storage_config(&workspace.config_dir)?;
    if storage.mode == StorageMode::Cloud {
        match (storage.remote_base_url.as_deref(), credentials.load_credentials()?) {
            (Some(base_url), Some(stored)) if stored.is_valid_at(now) => {
                if let Some(user_id) = storage.user_id.as_deref() {
                    if user_id != stored.user_id {
                        tracing::warn!(
                            configured = user_id,
                            signed_in = %stored.user_id,
                            "storage.userId differs from signed-in user; using signed-in user"
                        );
                    }
                }
                match RemoteTaskStore::connect(base_url, stored).await {
                    Ok(store) => {
                        tracing::info!(base_url, "using remote task store");
                        return Ok(Arc::new(store));
                    }
                    Err(error) => {
                        tracing::warn!(%error, base_url, "remote task store unreachable; using local task store");
                    }
                }
            }
            (None, _) => {
                tracing::warn!("cloud mode without storage.remoteBaseUrl; using local task store");
            }
            _ => {
                tracing::warn!("no valid sync credentials; using local task store");
            }
        }
    }

    let store = SqliteTaskStore::open(&workspace.database_path)?;
    tracing::info!(path = %workspace.database_path.display(), "using local task store");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{StorageConfig, save_storage_config};
    use crate::infrastructure::config::save_settings;
    use crate::infrastructure::credential_store::{InMemoryCredentialStore, SyncCredentials};
    use crate::infrastructure::remote_task_store::test_server::{closed_addr, serve_json_once};
    use crate::infrastructure::task_store::StoreKind;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotrack-bootstrap-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn use_cloud(workspace: &BootstrapResult, base_url: &str) {
        save_storage_config(
            &workspace.config_dir,
            &StorageConfig {
                mode: StorageMode::Cloud,
                remote_base_url: Some(base_url.to_string()),
                user_id: Some("user-1".to_string()),
            },
        )
        .expect("save storage config");
    }

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let temp = TempWorkspace::new();
        let first = bootstrap_workspace(&temp.path).expect("first bootstrap");
        let second = bootstrap_workspace(&temp.path).expect("second bootstrap");

        assert!(first.config_dir.join("app.json").exists());
        assert!(first.config_dir.join("settings.json").exists());
        assert!(first.logs_dir.is_dir());
        assert!(first.database_path.ends_with("state/pomotrack.sqlite"));
        assert_eq!(first.database_path, second.database_path);
    }

    fn signed_in() -> InMemoryCredentialStore {
        let credentials = InMemoryCredentialStore::default();
        credentials
            .save_credentials(&SyncCredentials {
                user_id: "user-1".to_string(),
                access_token: "token".to_string(),
                expires_at: None,
            })
            .expect("save credentials");
        credentials
    }

    #[test]
    fn bootstrap_returns_saved_settings() {
        let temp = TempWorkspace::new();
        let first = bootstrap_workspace(&temp.path).expect("first bootstrap");
        assert_eq!(first.settings, Settings::default());

        let custom = Settings {
            pomodoro_minutes: 50,
            long_break_interval: 2,
            ..Settings::default()
        };
        save_settings(&first.config_dir, &custom).expect("save settings");

        let second = bootstrap_workspace(&temp.path).expect("second bootstrap");
        assert_eq!(second.settings, custom);
    }

    #[tokio::test]
    async fn guest_mode_opens_local_store() {
        let temp = TempWorkspace::new();
        let workspace = bootstrap_workspace(&temp.path).expect("bootstrap");
        let store = open_task_store(&workspace, &InMemoryCredentialStore::default(), Utc::now())
            .await
            .expect("open store");
        assert_eq!(store.kind(), StoreKind::Local);
    }

    #[tokio::test]
    async fn cloud_mode_without_valid_credentials_falls_back_to_local() {
        let temp = TempWorkspace::new();
        let workspace = bootstrap_workspace(&temp.path).expect("bootstrap");
        use_cloud(&workspace, "https://sync.example.com/v1");
        let now = Utc::now();
        let credentials = InMemoryCredentialStore::default();

        let store = open_task_store(&workspace, &credentials, now)
            .await
            .expect("open store");
        assert_eq!(store.kind(), StoreKind::Local);

        credentials
            .save_credentials(&SyncCredentials {
                user_id: "user-1".to_string(),
                access_token: "token".to_string(),
                expires_at: Some(now - Duration::minutes(1)),
            })
            .expect("save expired credentials");
        let store = open_task_store(&workspace, &credentials, now)
            .await
            .expect("open store");
        assert_eq!(store.kind(), StoreKind::Local);
    }

    #[tokio::test]
    async fn cloud_mode_with_unreachable_service_falls_back_to_local() {
        let temp = TempWorkspace::new();
        let workspace = bootstrap_workspace(&temp.path).expect("bootstrap");
        let addr = closed_addr().await;
        use_cloud(&workspace, &format!("http://{addr}/v1"));

        let store = open_task_store(&workspace, &signed_in(), Utc::now())
            .await
            .expect("open store");
        assert_eq!(store.kind(), StoreKind::Local);
    }

    #[tokio::test]
    async fn cloud_mode_with_credentials_opens_remote_store_with_tasks() {
        let temp = TempWorkspace::new();
        let workspace = bootstrap_workspace(&temp.path).expect("bootstrap");
        let (addr, _request) = serve_json_once(
            r#"{"tasks":[{"id":"a","title":"Resumed","trackingStartedAt":1771232400000,"createdAt":1771146000000}]}"#,
        )
        .await;
        use_cloud(&workspace, &format!("http://{addr}/v1"));

        let store = open_task_store(&workspace, &signed_in(), Utc::now())
            .await
            .expect("open store");
        assert_eq!(store.kind(), StoreKind::Remote);
        let snapshot = store.subscribe().borrow().clone();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].is_tracked());
    }
}
