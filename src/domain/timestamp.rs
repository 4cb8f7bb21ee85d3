use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Timestamp shapes that reach the storage adapters: epoch milliseconds,
/// RFC 3339 (or integer) text, and remote `{seconds, nanoseconds}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Millis(i64),
    Text(String),
    Remote {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(alias = "_nanoseconds", default)]
        nanoseconds: u32,
    },
}

impl TimestampValue {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(millis) => Utc.timestamp_millis_opt(*millis).single(),
            Self::Text(raw) => parse_text(raw),
            Self::Remote {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Option<DateTime<Utc>> {
        serde_json::from_value::<TimestampValue>(value.clone())
            .ok()
            .and_then(|parsed| parsed.to_datetime())
    }
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// Lenient `deserialize_with` for optional timestamps. Anything that does not
/// normalize to a valid instant becomes `None`.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(TimestampValue::from_json))
}
