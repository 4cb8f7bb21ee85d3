use crate::domain::models::Phase;
use crate::domain::phase_timer::PhaseCompletion;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary window when no range is given. Session history keeps the same span.
pub const DEFAULT_SUMMARY_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub phase: Phase,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub task_ids: Vec<String>,
}

impl PhaseRecord {
    pub fn from_completion(completion: &PhaseCompletion, task_ids: Vec<String>) -> Self {
        Self {
            phase: completion.completed_phase,
            completed_at: completion.completed_at,
            duration_seconds: completion.duration_seconds,
            task_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyFocus {
    pub date: NaiveDate,
    pub pomodoros: u32,
    pub focus_seconds: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub completed_pomodoros: u32,
    pub completed_breaks: u32,
    pub total_focus_seconds: i64,
    pub days: Vec<DailyFocus>,
}

/// Aggregates completions in `[start, end)`. Days are local calendar days in `timezone`.
pub fn summarize(
    records: &[PhaseRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timezone: Tz,
) -> Result<FocusSummary, InfraError> {
    if end <= start {
        return Err(InfraError::InvalidConfig(
            "end must be greater than start".to_string(),
        ));
    }

    let in_range = records
        .iter()
        .filter(|record| record.completed_at >= start && record.completed_at < end)
        .collect::<Vec<_>>();

    let completed_breaks = in_range
        .iter()
        .filter(|record| record.phase.is_break())
        .count() as u32;

    let mut days: BTreeMap<NaiveDate, DailyFocus> = BTreeMap::new();
    for record in in_range.iter().filter(|record| record.phase == Phase::Pomodoro) {
        let date = record.completed_at.with_timezone(&timezone).date_naive();
        let day = days.entry(date).or_insert(DailyFocus {
            date,
            pomodoros: 0,
            focus_seconds: 0,
        });
        day.pomodoros += 1;
        day.focus_seconds += record.duration_seconds.max(0);
    }

    Ok(FocusSummary {
        start,
        end,
        timezone: timezone.name().to_string(),
        completed_pomodoros: days.values().map(|day| day.pomodoros).sum(),
        completed_breaks,
        total_focus_seconds: days.values().map(|day| day.focus_seconds).sum(),
        days: days.into_values().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn record(phase: Phase, completed_at: &str, duration_seconds: i64) -> PhaseRecord {
        PhaseRecord {
            phase,
            completed_at: at(completed_at),
            duration_seconds,
            task_ids: Vec::new(),
        }
    }

    #[test]
    fn groups_focus_by_local_day() {
        let records = vec![
            record(Phase::Pomodoro, "2026-02-16T14:00:00Z", 1500),
            // 2026-02-17 09:30 in Tokyo
            record(Phase::Pomodoro, "2026-02-17T00:30:00Z", 1500),
            record(Phase::ShortBreak, "2026-02-17T00:35:00Z", 300),
            record(Phase::LongBreak, "2026-02-17T01:20:00Z", 900),
        ];

        let summary = summarize(
            &records,
            at("2026-02-16T00:00:00Z"),
            at("2026-02-18T00:00:00Z"),
            chrono_tz::Asia::Tokyo,
        )
        .expect("summarize");

        assert_eq!(summary.completed_pomodoros, 2);
        assert_eq!(summary.completed_breaks, 2);
        assert_eq!(summary.total_focus_seconds, 3000);
        assert_eq!(summary.timezone, "Asia/Tokyo");
        assert_eq!(
            summary
                .days
                .iter()
                .map(|day| (day.date.to_string(), day.pomodoros))
                .collect::<Vec<_>>(),
            vec![("2026-02-16".to_string(), 1), ("2026-02-17".to_string(), 1)]
        );
    }

    #[test]
    fn range_is_half_open() {
        let records = vec![
            record(Phase::Pomodoro, "2026-02-16T09:00:00Z", 1500),
            record(Phase::Pomodoro, "2026-02-16T10:00:00Z", 1500),
        ];
        let summary = summarize(
            &records,
            at("2026-02-16T09:00:00Z"),
            at("2026-02-16T10:00:00Z"),
            Tz::UTC,
        )
        .expect("summarize");
        assert_eq!(summary.completed_pomodoros, 1);
    }

    #[test]
    fn rejects_empty_range() {
        let instant = at("2026-02-16T09:00:00Z");
        assert!(matches!(
            summarize(&[], instant, instant, Tz::UTC),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
