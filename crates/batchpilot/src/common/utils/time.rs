use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

pub const fn minutes(count: u64) -> Duration {
    Duration::from_secs(count * 60)
}

/// Whole minutes contained in `duration` (rounded down).
pub fn whole_minutes(duration: Duration) -> u64 {
    duration.as_secs() / 60
}

/// Formats the duration as an ISO-8601 duration with minute granularity (e.g. `PT90M`),
/// which is the format used for remote wall-clock and resize timeouts.
pub fn format_iso8601_minutes(duration: Duration) -> String {
    format!("PT{}M", whole_minutes(duration))
}

/// Whole minutes elapsed between `since` and `now`. A `since` in the future yields zero.
pub fn minutes_between(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_minutes().max(0) as u64
}

pub fn parse_human_time(text: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(text.trim())
        .map_err(|e| anyhow!("Could not parse duration `{text}` (use e.g. `90m` or `2h`): {e}"))
}

pub fn deserialize_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    parse_human_time(&buf).map_err(serde::de::Error::custom)
}

pub fn deserialize_human_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = Option::<String>::deserialize(deserializer)?;
    buf.map(|value| parse_human_time(&value).map_err(serde::de::Error::custom))
        .transpose()
}
