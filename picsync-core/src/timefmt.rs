//! Wall-clock timestamps as they appear in checkpoint files.
//!
//! Checkpoints store local time truncated to whole seconds in the
//! `YYYY-MM-DD HH:MM:SS` layout. The serde helpers below keep that exact
//! string shape on disk while the rest of the crate works with
//! [`NaiveDateTime`].

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serializer};

/// `strftime` layout shared by every persisted timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time with sub-second precision dropped.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
}

/// Render an elapsed number of seconds in the largest whole unit.
pub fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

/// Age of `timestamp` relative to `now`, clamped at zero.
pub fn format_age(timestamp: NaiveDateTime, now: NaiveDateTime) -> String {
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

/// `#[serde(with = "timefmt::required")]` for a mandatory timestamp field.
pub mod required {
    use super::*;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "timefmt::optional")]` for a nullable timestamp field.
pub mod optional {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => s.serialize_some(&format(value)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|raw| parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
