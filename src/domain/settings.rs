use crate::domain::models::Phase;
use serde::{Deserialize, Serialize};

pub const DEFAULT_POMODORO_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_LONG_BREAK_INTERVAL: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub pomodoro_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pomodoro_minutes: DEFAULT_POMODORO_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        validate_positive(self.pomodoro_minutes, "settings.pomodoro_minutes")?;
        validate_positive(self.short_break_minutes, "settings.short_break_minutes")?;
        validate_positive(self.long_break_minutes, "settings.long_break_minutes")?;
        validate_positive(self.long_break_interval, "settings.long_break_interval")?;
        Ok(())
    }

    /// Lifts every zero field to 1 so a bad value never stalls the timer.
    pub fn sanitized(self) -> Self {
        Self {
            pomodoro_minutes: self.pomodoro_minutes.max(1),
            short_break_minutes: self.short_break_minutes.max(1),
            long_break_minutes: self.long_break_minutes.max(1),
            long_break_interval: self.long_break_interval.max(1),
        }
    }

    pub fn duration_seconds(&self, phase: Phase) -> i64 {
        let minutes = match phase {
            Phase::Pomodoro => self.pomodoro_minutes,
            Phase::ShortBreak => self.short_break_minutes,
            Phase::LongBreak => self.long_break_minutes,
        };
        i64::from(minutes.max(1)) * 60
    }

    pub fn apply_override(&self, override_settings: &SettingsOverride) -> Settings {
        Settings {
            pomodoro_minutes: override_settings
                .pomodoro_minutes
                .unwrap_or(self.pomodoro_minutes),
            short_break_minutes: override_settings
                .short_break_minutes
                .unwrap_or(self.short_break_minutes),
            long_break_minutes: override_settings
                .long_break_minutes
                .unwrap_or(self.long_break_minutes),
            long_break_interval: override_settings
                .long_break_interval
                .unwrap_or(self.long_break_interval),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    pub pomodoro_minutes: Option<u32>,
    pub short_break_minutes: Option<u32>,
    pub long_break_minutes: Option<u32>,
    pub long_break_interval: Option<u32>,
}

fn validate_positive(value: u32, field_name: &str) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field_name} must be >= 1"));
    }
    Ok(())
}
