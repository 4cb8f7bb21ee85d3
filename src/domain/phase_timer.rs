use crate::domain::models::Phase;
use crate::domain::settings::Settings;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    NotStarted,
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub is_active: bool,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub paused_remaining_seconds: Option<i64>,
    pub sessions_completed_in_cycle: u32,
    /// Full length of the phase being counted down. Captured when the phase is
    /// entered so a settings change cannot rescale a running countdown.
    pub phase_duration_seconds: i64,
}

impl TimerState {
    fn fresh(phase: Phase, settings: &Settings, sessions_completed_in_cycle: u32) -> Self {
        Self {
            phase,
            is_active: false,
            timer_started_at: None,
            paused_remaining_seconds: None,
            sessions_completed_in_cycle,
            phase_duration_seconds: settings.duration_seconds(phase),
        }
    }

    pub fn run_state(&self) -> RunState {
        match (
            self.is_active,
            self.timer_started_at,
            self.paused_remaining_seconds,
        ) {
            (true, Some(_), _) => RunState::Running,
            (false, _, Some(_)) => RunState::Paused,
            _ => RunState::NotStarted,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerDisplay {
    pub phase: Phase,
    pub minutes: i64,
    pub seconds: i64,
    pub is_active: bool,
}

impl TimerDisplay {
    fn new(phase: Phase, remaining_seconds: i64, is_active: bool) -> Self {
        let remaining_seconds = remaining_seconds.max(0);
        Self {
            phase,
            minutes: remaining_seconds / 60,
            seconds: remaining_seconds % 60,
            is_active,
        }
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.minutes * 60 + self.seconds
    }
}

impl std::fmt::Display for TimerDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCompletion {
    pub completed_phase: Phase,
    pub next_phase: Phase,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub sessions_completed_in_cycle: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle { remaining_seconds: i64 },
    Counting { remaining_seconds: i64 },
    Completed(PhaseCompletion),
}

/// Drift-free Pomodoro countdown.
///
/// Remaining time is always derived from the stored start timestamp, never by
/// decrementing on each tick, so scheduling jitter in the caller's refresh
/// loop cannot accumulate. The timer performs no I/O; every method that needs
/// the current time takes it as `now`.
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    settings: Settings,
    state: TimerState,
}

impl PhaseTimer {
    pub fn new(settings: Settings) -> Self {
        let settings = settings.sanitized();
        Self {
            state: TimerState::fresh(Phase::Pomodoro, &settings, 0),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn run_state(&self) -> RunState {
        self.state.run_state()
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        let duration = self.state.phase_duration_seconds;
        if let (true, Some(started_at)) = (self.state.is_active, self.state.timer_started_at) {
            return (duration - whole_seconds_between(started_at, now)).max(0);
        }
        if let Some(paused_remaining) = self.state.paused_remaining_seconds {
            return paused_remaining.clamp(0, duration);
        }
        duration
    }

    pub fn display(&self, now: DateTime<Utc>) -> TimerDisplay {
        TimerDisplay::new(
            self.state.phase,
            self.remaining_seconds(now),
            self.state.is_active,
        )
    }

    /// Starts, pauses or resumes the countdown and returns the resulting run state.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> RunState {
        match self.run_state() {
            RunState::Running => {
                let remaining = self.remaining_seconds(now);
                self.state.is_active = false;
                self.state.timer_started_at = None;
                self.state.paused_remaining_seconds = Some(remaining);
            }
            RunState::Paused => {
                let remaining = self.remaining_seconds(now);
                let already_elapsed = self.state.phase_duration_seconds - remaining;
                self.state.is_active = true;
                self.state.timer_started_at = Some(now - Duration::seconds(already_elapsed));
                self.state.paused_remaining_seconds = None;
            }
            RunState::NotStarted => {
                self.state.is_active = true;
                self.state.timer_started_at = Some(now);
                self.state.paused_remaining_seconds = None;
            }
        }
        self.run_state()
    }

    pub fn reset(&mut self) {
        self.state = TimerState::fresh(
            self.state.phase,
            &self.settings,
            self.state.sessions_completed_in_cycle,
        );
    }

    /// Manual phase change. The cycle counter is left alone.
    pub fn switch_phase(&mut self, target: Phase) {
        self.state = TimerState::fresh(
            target,
            &self.settings,
            self.state.sessions_completed_in_cycle,
        );
    }

    /// Replaces the settings. A running countdown keeps its captured duration
    /// until the next reset, switch or completion; an idle or paused phase picks
    /// up the new duration immediately, and a paused remainder never exceeds it.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings.sanitized();
        match self.run_state() {
            RunState::Running => {}
            RunState::Paused => {
                let duration = self.settings.duration_seconds(self.state.phase);
                self.state.phase_duration_seconds = duration;
                self.state.paused_remaining_seconds = self
                    .state
                    .paused_remaining_seconds
                    .map(|remaining| remaining.min(duration));
            }
            RunState::NotStarted => {
                self.state.phase_duration_seconds =
                    self.settings.duration_seconds(self.state.phase);
            }
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let remaining_seconds = self.remaining_seconds(now);
        if self.run_state() != RunState::Running {
            return TickOutcome::Idle { remaining_seconds };
        }
        if remaining_seconds > 0 {
            return TickOutcome::Counting { remaining_seconds };
        }
        TickOutcome::Completed(self.complete(now))
    }

    fn complete(&mut self, now: DateTime<Utc>) -> PhaseCompletion {
        let completed_phase = self.state.phase;
        let duration_seconds = self.state.phase_duration_seconds;
        let mut sessions = self.state.sessions_completed_in_cycle;

        let next_phase = match completed_phase {
            Phase::Pomodoro => {
                sessions += 1;
                if sessions >= self.settings.long_break_interval {
                    sessions = 0;
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            Phase::ShortBreak | Phase::LongBreak => Phase::Pomodoro,
        };

        self.state = TimerState::fresh(next_phase, &self.settings, sessions);
        PhaseCompletion {
            completed_phase,
            next_phase,
            completed_at: now,
            duration_seconds,
            sessions_completed_in_cycle: sessions,
        }
    }
}

/// Whole seconds from `start` to `now`, floored and never negative.
pub fn whole_seconds_between(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds().max(0) / 1000
}
