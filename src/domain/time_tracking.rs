use crate::domain::models::{Task, TaskUpdate};
use crate::domain::phase_timer::whole_seconds_between;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartIntent {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StopIntent {
    pub task_id: String,
    /// Time tracked since the live start; `manual_time_spent` already holds the rest.
    pub elapsed_seconds_to_commit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedElapsed {
    pub task_id: String,
    pub elapsed_seconds: i64,
}

impl From<StartIntent> for TaskUpdate {
    fn from(intent: StartIntent) -> Self {
        TaskUpdate::StartTracking {
            task_id: intent.task_id,
            started_at: intent.started_at,
        }
    }
}

impl From<StopIntent> for TaskUpdate {
    fn from(intent: StopIntent) -> Self {
        TaskUpdate::StopTracking {
            task_id: intent.task_id,
            elapsed_seconds: intent.elapsed_seconds_to_commit,
        }
    }
}

/// Committed time plus the live contribution, in whole seconds. A start
/// timestamp in the future contributes nothing.
pub fn elapsed_seconds(task: &Task, now: DateTime<Utc>) -> i64 {
    match task.tracking_started_at {
        Some(started_at) => task.manual_time_spent + whole_seconds_between(started_at, now),
        None => task.manual_time_spent,
    }
}

pub fn active_subjects(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.is_tracked() && !task.completed)
        .collect()
}

pub fn is_tracking_any(tasks: &[Task]) -> bool {
    tasks.iter().any(|task| task.is_tracked() && !task.completed)
}

/// Start intents for every requested task that exists in `tasks` and is not
/// already tracked. All intents share `now`.
pub fn start_intents(tasks: &[Task], task_ids: &[String], now: DateTime<Utc>) -> Vec<StartIntent> {
    let mut seen = HashSet::new();
    task_ids
        .iter()
        .map(|task_id| task_id.trim())
        .filter(|task_id| seen.insert(*task_id))
        .filter_map(|task_id| tasks.iter().find(|task| task.id == task_id))
        .filter(|task| !task.is_tracked())
        .map(|task| StartIntent {
            task_id: task.id.clone(),
            started_at: now,
        })
        .collect()
}

/// Stop intents for the tracked tasks among `tasks`; untracked ones are skipped.
pub fn stop_intents<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: DateTime<Utc>,
) -> Vec<StopIntent> {
    tasks
        .into_iter()
        .filter(|task| task.is_tracked())
        .map(|task| StopIntent {
            task_id: task.id.clone(),
            elapsed_seconds_to_commit: elapsed_seconds(task, now) - task.manual_time_spent,
        })
        .collect()
}

pub fn elapsed_snapshot(tasks: &[Task], now: DateTime<Utc>) -> Vec<TrackedElapsed> {
    active_subjects(tasks)
        .into_iter()
        .map(|task| TrackedElapsed {
            task_id: task.id.clone(),
            elapsed_seconds: elapsed_seconds(task, now),
        })
        .collect()
}
