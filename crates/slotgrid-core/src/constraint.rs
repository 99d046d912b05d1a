use std::fmt;

use chrono::{TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, error, instrument};

use crate::datetime::{parse_weekday_name, weekday_name};
use crate::timerange::{
    TimeRangeEntry, ZoneConverter, format_time_ranges, parse_forbidden_time_range,
    serialize_forbidden_time_range,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    ForbiddenTimerange,
    PreferredTimerange,
    PreferredWeekdays,
    RequiredCapacity,
    PreferredLocations,
    ForbiddenLocations,
    RequiredResourceTypes,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 7] = [
        ConstraintKind::ForbiddenTimerange,
        ConstraintKind::PreferredTimerange,
        ConstraintKind::PreferredWeekdays,
        ConstraintKind::RequiredCapacity,
        ConstraintKind::PreferredLocations,
        ConstraintKind::ForbiddenLocations,
        ConstraintKind::RequiredResourceTypes,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_key() == key.trim())
    }

    pub fn as_key(self) -> &'static str {
        match self {
            ConstraintKind::ForbiddenTimerange => "forbidden_timerange",
            ConstraintKind::PreferredTimerange => "preferred_timerange",
            ConstraintKind::PreferredWeekdays => "preferred_weekdays",
            ConstraintKind::RequiredCapacity => "required_capacity",
            ConstraintKind::PreferredLocations => "preferred_locations",
            ConstraintKind::ForbiddenLocations => "forbidden_locations",
            ConstraintKind::RequiredResourceTypes => "required_resource_types",
        }
    }

    pub fn is_time_range(self) -> bool {
        matches!(
            self,
            ConstraintKind::ForbiddenTimerange | ConstraintKind::PreferredTimerange
        )
    }
}

/// A weekday token from a `preferred_weekdays` value.
///
/// Tokens that are not one of the seven names are kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayName {
    Known(Weekday),
    Unrecognized(String),
}

impl DayName {
    pub fn parse(token: &str) -> Self {
        match parse_weekday_name(token) {
            Some(day) => DayName::Known(day),
            None => DayName::Unrecognized(token.to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, DayName::Unrecognized(raw) if raw.trim().is_empty())
    }
}

impl fmt::Display for DayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayName::Known(day) => f.write_str(weekday_name(*day)),
            DayName::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// Capacity bounds, kept as the JSON numbers they were written as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredCapacity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
}

pub fn serialize_preferred_weekdays(weekdays: &[DayName]) -> String {
    weekdays
        .iter()
        .filter(|day| !day.is_empty())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_preferred_weekdays(value: &str) -> Vec<DayName> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(DayName::parse)
        .collect()
}

/// JSON object with only the bounds that are set; `{}` when neither is.
pub fn serialize_required_capacity(capacity: &RequiredCapacity) -> String {
    match serde_json::to_string(capacity) {
        Ok(json) => json,
        Err(err) => {
            error!(error = %err, "failed to serialize capacity; emitting empty object");
            "{}".to_string()
        }
    }
}

/// Lenient capacity parse. Bad JSON yields an empty capacity.
///
/// Bounds written as numeric strings are accepted; numbers pass
/// through unchanged. Other bound values are dropped.
pub fn parse_required_capacity(value: &str) -> RequiredCapacity {
    let parsed = match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(value = %other, "capacity value is not an object");
            return RequiredCapacity::default();
        }
        Err(err) => {
            debug!(error = %err, "capacity value is not valid json");
            return RequiredCapacity::default();
        }
    };

    RequiredCapacity {
        min: parsed.get("min").and_then(coerce_bound),
        max: parsed.get("max").and_then(coerce_bound),
    }
}

fn coerce_bound(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => serde_json::from_str::<Number>(s.trim()).ok(),
        _ => None,
    }
}

pub fn serialize_comma_separated<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_comma_separated(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// The key/value pair exchanged with the constraint repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub key: String,
    pub value: String,
}

impl ConstraintRecord {
    pub fn decode<Z: TimeZone>(&self, converter: &ZoneConverter<Z>) -> ConstraintValue {
        ConstraintValue::decode(&self.key, &self.value, converter)
    }
}

/// A decoded constraint value. Time ranges hold local entries.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    ForbiddenTimerange(Vec<TimeRangeEntry>),
    PreferredTimerange(Vec<TimeRangeEntry>),
    PreferredWeekdays(Vec<DayName>),
    RequiredCapacity(RequiredCapacity),
    PreferredLocations(Vec<String>),
    ForbiddenLocations(Vec<String>),
    RequiredResourceTypes(Vec<String>),
    Other { key: String, raw: String },
}

impl ConstraintValue {
    pub fn kind(&self) -> Option<ConstraintKind> {
        Some(match self {
            ConstraintValue::ForbiddenTimerange(_) => ConstraintKind::ForbiddenTimerange,
            ConstraintValue::PreferredTimerange(_) => ConstraintKind::PreferredTimerange,
            ConstraintValue::PreferredWeekdays(_) => ConstraintKind::PreferredWeekdays,
            ConstraintValue::RequiredCapacity(_) => ConstraintKind::RequiredCapacity,
            ConstraintValue::PreferredLocations(_) => ConstraintKind::PreferredLocations,
            ConstraintValue::ForbiddenLocations(_) => ConstraintKind::ForbiddenLocations,
            ConstraintValue::RequiredResourceTypes(_) => ConstraintKind::RequiredResourceTypes,
            ConstraintValue::Other { .. } => return None,
        })
    }

    pub fn key(&self) -> &str {
        match self {
            ConstraintValue::Other { key, .. } => key,
            known => known.kind().map(ConstraintKind::as_key).unwrap_or_default(),
        }
    }

    /// Decodes a stored value. Time ranges come back in local time.
    #[instrument(skip(wire, converter))]
    pub fn decode<Z: TimeZone>(key: &str, wire: &str, converter: &ZoneConverter<Z>) -> Self {
        Self::parse_with(key, wire, |utc| converter.utc_entries_to_local(&utc))
    }

    /// Decodes a value typed by hand in local time; no zone conversion.
    pub fn parse_local(key: &str, text: &str) -> Self {
        Self::parse_with(key, text, |local| local)
    }

    fn parse_with<F>(key: &str, text: &str, ranges: F) -> Self
    where
        F: FnOnce(Vec<TimeRangeEntry>) -> Vec<TimeRangeEntry>,
    {
        let Some(kind) = ConstraintKind::from_key(key) else {
            debug!(key, "unknown constraint key; keeping raw value");
            return ConstraintValue::Other {
                key: key.to_string(),
                raw: text.to_string(),
            };
        };

        match kind {
            ConstraintKind::ForbiddenTimerange => {
                ConstraintValue::ForbiddenTimerange(ranges(parse_forbidden_time_range(text)))
            }
            ConstraintKind::PreferredTimerange => {
                ConstraintValue::PreferredTimerange(ranges(parse_forbidden_time_range(text)))
            }
            ConstraintKind::PreferredWeekdays => {
                ConstraintValue::PreferredWeekdays(parse_preferred_weekdays(text))
            }
            ConstraintKind::RequiredCapacity => {
                ConstraintValue::RequiredCapacity(parse_required_capacity(text))
            }
            ConstraintKind::PreferredLocations => {
                ConstraintValue::PreferredLocations(parse_comma_separated(text))
            }
            ConstraintKind::ForbiddenLocations => {
                ConstraintValue::ForbiddenLocations(parse_comma_separated(text))
            }
            ConstraintKind::RequiredResourceTypes => {
                ConstraintValue::RequiredResourceTypes(parse_comma_separated(text))
            }
        }
    }

    /// Encodes for storage. Time ranges are converted to UTC.
    #[instrument(skip(self, converter), fields(key = %self.key()))]
    pub fn encode<Z: TimeZone>(&self, converter: &ZoneConverter<Z>) -> ConstraintRecord {
        let value = match self {
            ConstraintValue::ForbiddenTimerange(entries)
            | ConstraintValue::PreferredTimerange(entries) => {
                serialize_forbidden_time_range(entries, converter)
            }
            ConstraintValue::PreferredWeekdays(days) => serialize_preferred_weekdays(days),
            ConstraintValue::RequiredCapacity(capacity) => serialize_required_capacity(capacity),
            ConstraintValue::PreferredLocations(values)
            | ConstraintValue::ForbiddenLocations(values)
            | ConstraintValue::RequiredResourceTypes(values) => serialize_comma_separated(values),
            ConstraintValue::Other { raw, .. } => raw.clone(),
        };

        ConstraintRecord {
            key: self.key().to_string(),
            value,
        }
    }

    /// Local entries for time range kinds.
    pub fn time_ranges(&self) -> Option<&[TimeRangeEntry]> {
        match self {
            ConstraintValue::ForbiddenTimerange(entries)
            | ConstraintValue::PreferredTimerange(entries) => Some(entries),
            _ => None,
        }
    }

    /// Human readable rendering, local time for ranges.
    pub fn display_text(&self) -> String {
        match self {
            ConstraintValue::ForbiddenTimerange(entries)
            | ConstraintValue::PreferredTimerange(entries) => format_time_ranges(entries),
            ConstraintValue::PreferredWeekdays(days) => days
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            ConstraintValue::RequiredCapacity(capacity) => match (&capacity.min, &capacity.max) {
                (Some(min), Some(max)) => format!("{min} to {max}"),
                (Some(min), None) => format!("at least {min}"),
                (None, Some(max)) => format!("at most {max}"),
                (None, None) => "any".to_string(),
            },
            ConstraintValue::PreferredLocations(values)
            | ConstraintValue::ForbiddenLocations(values)
            | ConstraintValue::RequiredResourceTypes(values) => values.join(", "),
            ConstraintValue::Other { raw, .. } => raw.clone(),
        }
    }
}
