use crate::domain::settings::Settings;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SETTINGS_JSON: &str = "settings.json";
const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Guest,
    Cloud,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub mode: StorageMode,
    pub remote_base_url: Option<String>,
    pub user_id: Option<String>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let defaults = Settings::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Pomotrack",
                "timezone": DEFAULT_TIMEZONE,
                "storage": {
                    "mode": "guest",
                    "remoteBaseUrl": null,
                    "userId": null
                }
            }),
        ),
        (
            SETTINGS_JSON,
            serde_json::json!({
                "schema": 1,
                "pomodoroMinutes": defaults.pomodoro_minutes,
                "shortBreakMinutes": defaults.short_break_minutes,
                "longBreakMinutes": defaults.long_break_minutes,
                "longBreakInterval": defaults.long_break_interval
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_settings(config_dir: &Path) -> Result<Settings, InfraError> {
    let raw = read_config(&config_dir.join(SETTINGS_JSON))?;
    let settings: Settings = serde_json::from_value(raw)?;
    settings.validate().map_err(InfraError::InvalidConfig)?;
    Ok(settings)
}

pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<(), InfraError> {
    settings.validate().map_err(InfraError::InvalidConfig)?;
    let mut value = serde_json::to_value(settings)?;
    let object = value.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig("settings must serialize to an object".to_string())
    })?;
    object.insert("schema".to_string(), serde_json::json!(1));
    write_config(&config_dir.join(SETTINGS_JSON), &value)
}

pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_TIMEZONE);
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

pub fn read_storage_config(config_dir: &Path) -> Result<StorageConfig, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let storage = app.get("storage");
    let text = |key: &str| {
        storage
            .and_then(|value| value.get(key))
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };

    let mode = match text("mode").as_deref() {
        None | Some("guest") => StorageMode::Guest,
        Some("cloud") => StorageMode::Cloud,
        Some(other) => {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported storage.mode '{other}'"
            )));
        }
    };

    Ok(StorageConfig {
        mode,
        remote_base_url: text("remoteBaseUrl"),
        user_id: text("userId"),
    })
}

pub fn save_storage_config(config_dir: &Path, storage: &StorageConfig) -> Result<(), InfraError> {
    if storage.mode == StorageMode::Cloud && storage.remote_base_url.is_none() {
        return Err(InfraError::InvalidConfig(
            "storage.remoteBaseUrl is required in cloud mode".to_string(),
        ));
    }

    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "storage".to_string(),
        serde_json::json!({
            "mode": storage.mode,
            "remoteBaseUrl": storage.remote_base_url,
            "userId": storage.user_id,
        }),
    );
    write_config(&path, &app)
}
