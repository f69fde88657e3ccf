use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clock::{ClockTime, MINUTES_PER_DAY};
use crate::error::TrackerError;

/// Scheduled activity occupying `[start, start + duration)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub start: ClockTime,
    /// Minutes
    pub duration: u32,
    pub name: String,
}

impl TimeBlock {
    /// Wraps past midnight. Durations come straight from stored JSON and
    /// may be arbitrarily large.
    pub fn end(&self) -> ClockTime {
        ClockTime::from_minutes(self.start.minutes_since_midnight() + self.duration % MINUTES_PER_DAY)
    }
}

/// Instantaneous scheduled event (wake-up, snack, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: ClockTime,
    pub name: String,
}

/// Recovery/transition period drawn between blocks. Never "current".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: String,
    pub start: ClockTime,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    #[serde(default = "default_schedule_name")]
    pub name: String,
    #[serde(default)]
    pub time_blocks: Vec<TimeBlock>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

fn default_schedule_name() -> String {
    "Default".to_string()
}

impl Default for DaySchedule {
    fn default() -> Self {
        Self {
            name: default_schedule_name(),
            time_blocks: Vec::new(),
            markers: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

impl DaySchedule {
    pub fn is_empty(&self) -> bool {
        self.time_blocks.is_empty() && self.markers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub major_ticks: Vec<ClockTime>,
}

/// Persisted schedule document (storage key `schedule`).
/// `schedules` is the week: index 0 is the base day, 1..=3 are the
/// Monday/Wednesday/Thursday overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDocument {
    #[serde(default)]
    pub schedules: Vec<DaySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Before,
    #[default]
    After,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Before => f.write_str("before"),
            Timing::After => f.write_str("after"),
        }
    }
}

/// Self-reported energy or focus level, 1..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, TrackerError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TrackerError::InvalidInput(format!(
                "level {} outside {}..={}",
                value,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for Level {
    type Error = TrackerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        value.0
    }
}

/// One tracker log entry. `timestamp` is the entry's identity and is
/// compared as the exact stored string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub activity: String,
    pub timing: Timing,
    pub energy: Level,
    pub focus: Level,
}

/// Formats an instant the way entry timestamps are stored
/// (`2024-01-01T09:00:00.000Z`).
pub fn entry_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackerEventKind {
    LogAdded,
    LogUpdated,
    LogDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerEventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_timestamp: Option<String>,
}

/// Emitted for every log mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TrackerEventKind,
    pub timestamp: String,
    pub resource: String,
    pub payload: TrackerEventPayload,
}

impl TrackerEvent {
    pub fn new(kind: TrackerEventKind, resource: &str, payload: TrackerEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: entry_timestamp(Utc::now()),
            resource: resource.to_string(),
            payload,
        }
    }
}

/// API Response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }
}
