use crate::domain::timestamp::deserialize_lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pomodoro => "pomodoro",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "pomodoro" | "focus" => Some(Self::Pomodoro),
            "shortbreak" => Some(Self::ShortBreak),
            "longbreak" => Some(Self::LongBreak),
            _ => None,
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Self::Pomodoro)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pomodoro => "Pomodoro",
            Self::ShortBreak => "Short break",
            Self::LongBreak => "Long break",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Committed tracked time in whole seconds.
    #[serde(default)]
    pub manual_time_spent: i64,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub tracking_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_pomodoro_sessions: u32,
    #[serde(default)]
    pub total_time_spent: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub focus: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.manual_time_spent < 0 {
            return Err("task.manual_time_spent must be >= 0".to_string());
        }
        if self.total_time_spent < 0 {
            return Err("task.total_time_spent must be >= 0".to_string());
        }
        Ok(())
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking_started_at.is_some()
    }

    /// Applies one store intent in place. Intents for other tasks are ignored.
    pub fn apply(&mut self, update: &TaskUpdate) {
        if update.task_id() != self.id {
            return;
        }
        match update {
            TaskUpdate::StartTracking { started_at, .. } => {
                if self.tracking_started_at.is_none() {
                    self.tracking_started_at = Some(*started_at);
                }
            }
            TaskUpdate::StopTracking {
                elapsed_seconds, ..
            } => {
                if self.tracking_started_at.take().is_some() {
                    self.manual_time_spent += (*elapsed_seconds).max(0);
                }
            }
            TaskUpdate::RecordSession {
                session_seconds, ..
            } => {
                self.total_pomodoro_sessions += 1;
                self.total_time_spent += (*session_seconds).max(0);
            }
            TaskUpdate::Patch { patch, .. } => patch.apply_to(self),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` unassigns the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.project_id.is_none()
            && self.completed.is_none()
            && self.focus.is_none()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(project_id) = &self.project_id {
            task.project_id = project_id.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(focus) = self.focus {
            task.focus = focus;
        }
    }
}

/// A mutation proposed for the task store. Batches of these are applied atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskUpdate {
    #[serde(rename_all = "camelCase")]
    StartTracking {
        task_id: String,
        started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StopTracking {
        task_id: String,
        elapsed_seconds: i64,
    },
    #[serde(rename_all = "camelCase")]
    RecordSession {
        task_id: String,
        session_seconds: i64,
    },
    #[serde(rename_all = "camelCase")]
    Patch { task_id: String, patch: TaskPatch },
}

impl TaskUpdate {
    pub fn task_id(&self) -> &str {
        match self {
            Self::StartTracking { task_id, .. }
            | Self::StopTracking { task_id, .. }
            | Self::RecordSession { task_id, .. }
            | Self::Patch { task_id, .. } => task_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "project.id")?;
        validate_non_empty(&self.name, "project.name")?;
        if let Some(color) = &self.color {
            validate_hex_color(color, "project.color")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hex_color(value: &str, field_name: &str) -> Result<(), String> {
    let Some(digits) = value.strip_prefix('#') else {
        return Err(format!("{field_name} must start with '#'"));
    };
    if !matches!(digits.len(), 3 | 6) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{field_name} must be #RGB or #RRGGBB"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "task-1".to_string(),
            title: "Write report".to_string(),
            project_id: None,
            manual_time_spent: 120,
            tracking_started_at: None,
            total_pomodoro_sessions: 0,
            total_time_spent: 0,
            completed: false,
            focus: false,
            created_at: fixed_time("2026-02-16T08:00:00Z"),
        }
    }

    #[test]
    fn task_validate_rejects_empty_title() {
        let mut task = sample_task();
        task.title = "  ".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn phase_parse_accepts_wire_and_label_forms() {
        assert_eq!(Phase::parse("longBreak"), Some(Phase::LongBreak));
        assert_eq!(Phase::parse("short_break"), Some(Phase::ShortBreak));
        assert_eq!(Phase::parse("Short break"), Some(Phase::ShortBreak));
        assert_eq!(Phase::parse("focus"), Some(Phase::Pomodoro));
        assert_eq!(Phase::parse("nap"), None);
    }

    #[test]
    fn start_tracking_keeps_existing_start() {
        let original = fixed_time("2026-02-16T09:00:00Z");
        let mut task = sample_task();
        task.tracking_started_at = Some(original);

        task.apply(&TaskUpdate::StartTracking {
            task_id: task.id.clone(),
            started_at: fixed_time("2026-02-16T09:30:00Z"),
        });

        assert_eq!(task.tracking_started_at, Some(original));
    }

    #[test]
    fn stop_tracking_commits_delta_once() {
        let mut task = sample_task();
        task.tracking_started_at = Some(fixed_time("2026-02-16T09:00:00Z"));
        let stop = TaskUpdate::StopTracking {
            task_id: task.id.clone(),
            elapsed_seconds: 90,
        };

        task.apply(&stop);
        task.apply(&stop);

        assert_eq!(task.manual_time_spent, 210);
        assert!(!task.is_tracked());
    }

    #[test]
    fn record_session_increments_counters() {
        let mut task = sample_task();
        task.apply(&TaskUpdate::RecordSession {
            task_id: task.id.clone(),
            session_seconds: 1500,
        });
        assert_eq!(task.total_pomodoro_sessions, 1);
        assert_eq!(task.total_time_spent, 1500);
    }

    #[test]
    fn updates_for_other_tasks_are_ignored() {
        let mut task = sample_task();
        task.apply(&TaskUpdate::RecordSession {
            task_id: "other".to_string(),
            session_seconds: 1500,
        });
        assert_eq!(task, sample_task());
    }

    #[test]
    fn patch_can_unassign_project() {
        let mut task = sample_task();
        task.project_id = Some("project-1".to_string());
        TaskPatch {
            project_id: Some(None),
            completed: Some(true),
            ..TaskPatch::default()
        }
        .apply_to(&mut task);
        assert_eq!(task.project_id, None);
        assert!(task.completed);
    }

    #[test]
    fn project_validate_checks_color() {
        let mut project = Project {
            id: "project-1".to_string(),
            name: "Thesis".to_string(),
            color: Some("#12ab9F".to_string()),
            created_at: fixed_time("2026-02-16T08:00:00Z"),
        };
        assert!(project.validate().is_ok());
        project.color = Some("teal".to_string());
        assert!(project.validate().is_err());
    }

    #[test]
    fn task_deserializes_remote_timestamp_shapes() {
        let payload = serde_json::json!({
            "id": "task-9",
            "title": "Remote",
            "manualTimeSpent": 30,
            "trackingStartedAt": { "seconds": 1_771_232_400, "nanoseconds": 0 },
            "createdAt": "2026-02-16T08:00:00Z"
        });
        let task: Task = serde_json::from_value(payload).expect("deserialize task");
        assert_eq!(
            task.tracking_started_at,
            Some(fixed_time("2026-02-16T09:00:00Z"))
        );

        let malformed = serde_json::json!({
            "id": "task-9",
            "title": "Remote",
            "trackingStartedAt": { "unexpected": true },
            "createdAt": "2026-02-16T08:00:00Z"
        });
        let task: Task = serde_json::from_value(malformed).expect("deserialize malformed");
        assert!(!task.is_tracked());
    }

    #[test]
    fn task_update_serde_roundtrip() {
        let update = TaskUpdate::StopTracking {
            task_id: "task-1".to_string(),
            elapsed_seconds: 42,
        };
        let json = serde_json::to_value(&update).expect("serialize update");
        assert_eq!(json["kind"], "stopTracking");
        assert_eq!(json["elapsedSeconds"], 42);
        let parsed: TaskUpdate = serde_json::from_value(json).expect("deserialize update");
        assert_eq!(parsed, update);
    }
}
