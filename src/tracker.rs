//! Tracker form state.
//!
//! The form defaults its activity and timing from the resolver until the
//! user picks an activity by hand. That manual pick holds until the form is
//! submitted or reset.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::models::{entry_timestamp, Level, LogEntry, ScheduleDocument, Timing};
use crate::resolver::Resolution;

/// Minimum normalized Levenshtein similarity for an activity suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TrackerForm {
    pub activity: String,
    pub timing: Timing,
    pub energy: Level,
    pub focus: Level,
    pub editing: Option<LogEntry>,
    pub is_manual_selection: bool,
}

/// A submitted form: the entry plus the timestamp it replaces, if editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub entry: LogEntry,
    pub editing_timestamp: Option<String>,
}

impl TrackerForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_activity(&mut self, activity: impl Into<String>) {
        self.activity = activity.into();
        self.is_manual_selection = true;
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    pub fn set_energy(&mut self, energy: Level) {
        self.energy = energy;
    }

    pub fn set_focus(&mut self, focus: Level) {
        self.focus = focus;
    }

    /// Adopts the resolver's default unless the user picked an activity.
    /// Returns whether the form changed.
    pub fn apply_resolution(&mut self, resolution: &Resolution) -> bool {
        if self.is_manual_selection {
            return false;
        }
        let (Some(activity), Some(timing)) = (resolution.activity(), resolution.timing()) else {
            return false;
        };
        if self.activity == activity && self.timing == timing {
            return false;
        }

        debug!(activity, timing = %timing, "form_default_activity");
        self.activity = activity.to_string();
        self.timing = timing;
        true
    }

    pub fn begin_edit(&mut self, entry: LogEntry) {
        self.activity = entry.activity.clone();
        self.timing = entry.timing;
        self.energy = entry.energy;
        self.focus = entry.focus;
        self.editing = Some(entry);
    }

    pub fn cancel_edit(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Builds the log entry and resets the form.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<Submission> {
        if self.activity.trim().is_empty() {
            return Err(TrackerError::InvalidInput("no activity selected".to_string()));
        }

        let submission = Submission {
            entry: LogEntry {
                timestamp: entry_timestamp(now),
                activity: self.activity.clone(),
                timing: self.timing,
                energy: self.energy,
                focus: self.focus,
            },
            editing_timestamp: self.editing.as_ref().map(|e| e.timestamp.clone()),
        };
        self.reset();
        Ok(submission)
    }
}

/// Unique activity types across every schedule: block types first, then
/// marker types, in first-seen order.
pub fn activity_catalogue(document: &ScheduleDocument) -> Vec<String> {
    let block_types = document
        .schedules
        .iter()
        .flat_map(|s| s.time_blocks.iter().map(|b| b.kind.as_str()));
    let marker_types = document
        .schedules
        .iter()
        .flat_map(|s| s.markers.iter().map(|m| m.kind.as_str()));

    let mut catalogue: Vec<String> = Vec::new();
    for kind in block_types.chain(marker_types) {
        if !kind.is_empty() && !catalogue.iter().any(|known| known == kind) {
            catalogue.push(kind.to_string());
        }
    }
    catalogue
}

/// Closest catalogue entry to `input`, if similar enough.
pub fn suggest_activity<'a>(input: &str, catalogue: &'a [String]) -> Option<&'a str> {
    let needle = input.trim().to_lowercase();
    catalogue
        .iter()
        .map(|candidate| (candidate, strsim::normalized_levenshtein(&needle, &candidate.to_lowercase())))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.as_str())
}
