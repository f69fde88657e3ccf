//! Resolves a weekly routine against the wall clock: which block is
//! running, which marker just fired and what comes up next today.

use std::borrow::Cow;

use chrono::{Datelike, Duration, NaiveDateTime, Weekday};
use serde::Serialize;
use tracing::debug;

use crate::clock::ClockTime;
use crate::models::{DaySchedule, Marker, ScheduleDocument, TimeBlock, Timing};

/// How long a marker stays current after it fires.
pub const MARKER_GRACE_MINUTES: i64 = 5;

/// Picks the schedule for `now`'s weekday.
///
/// Monday, Wednesday and Thursday use entries 1, 2 and 3 when present; every
/// other case uses entry 0. An empty week yields an empty schedule.
pub fn resolve_day_schedule(week: &[DaySchedule], now: NaiveDateTime) -> Cow<'_, DaySchedule> {
    let Some(base) = week.first() else {
        return Cow::Owned(DaySchedule::default());
    };

    let override_index = match now.weekday() {
        Weekday::Mon => Some(1),
        Weekday::Wed => Some(2),
        Weekday::Thu => Some(3),
        _ => None,
    };

    Cow::Borrowed(override_index.and_then(|i| week.get(i)).unwrap_or(base))
}

/// First block, in declaration order, with `start <= now < start + duration`.
pub fn resolve_current_block(schedule: &DaySchedule, now: NaiveDateTime) -> Option<&TimeBlock> {
    schedule.time_blocks.iter().find(|block| {
        let start = block.start.on_date(now.date());
        let end = start + Duration::minutes(i64::from(block.duration));
        start <= now && now < end
    })
}

/// First marker, in declaration order, that fired within `(now - 5min, now]`.
pub fn resolve_current_marker(schedule: &DaySchedule, now: NaiveDateTime) -> Option<&Marker> {
    let window_start = now - Duration::minutes(MARKER_GRACE_MINUTES);
    schedule.markers.iter().find(|marker| {
        let fired_at = marker.time.on_date(now.date());
        window_start < fired_at && fired_at <= now
    })
}

/// Blocks order before markers when they start in the same minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Block,
    Marker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextEvent {
    pub kind: EventKind,
    pub activity: String,
    pub name: String,
    pub start_time: ClockTime,
}

/// Nearest block or marker starting strictly after the current minute.
/// Only today is searched.
pub fn resolve_next_event(schedule: &DaySchedule, now: NaiveDateTime) -> Option<NextEvent> {
    let now_minutes = ClockTime::of(now).minutes_since_midnight();

    let blocks = schedule.time_blocks.iter().map(|block| NextEvent {
        kind: EventKind::Block,
        activity: block.kind.clone(),
        name: block.name.clone(),
        start_time: block.start,
    });
    let markers = schedule.markers.iter().map(|marker| NextEvent {
        kind: EventKind::Marker,
        activity: marker.kind.clone(),
        name: marker.name.clone(),
        start_time: marker.time,
    });

    // min_by_key keeps the first of equal keys, so declaration order breaks
    // the remaining ties
    blocks
        .chain(markers)
        .filter(|event| event.start_time.minutes_since_midnight() > now_minutes)
        .min_by_key(|event| (event.start_time.minutes_since_midnight(), event.kind))
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resolution {
    CurrentMarker { marker: Marker },
    CurrentBlock { block: TimeBlock },
    Upcoming { event: NextEvent },
    Idle,
}

impl Resolution {
    /// Log timing the tracker form should default to.
    pub fn timing(&self) -> Option<Timing> {
        match self {
            Resolution::CurrentMarker { .. } | Resolution::CurrentBlock { .. } => Some(Timing::After),
            Resolution::Upcoming { .. } => Some(Timing::Before),
            Resolution::Idle => None,
        }
    }

    /// Activity type the tracker form should default to.
    pub fn activity(&self) -> Option<&str> {
        match self {
            Resolution::CurrentMarker { marker } => Some(&marker.kind),
            Resolution::CurrentBlock { block } => Some(&block.kind),
            Resolution::Upcoming { event } => Some(&event.activity),
            Resolution::Idle => None,
        }
    }
}

/// Marker beats block, block beats upcoming.
pub fn resolve(schedule: &DaySchedule, now: NaiveDateTime) -> Resolution {
    from_parts(
        schedule,
        now,
        resolve_current_block(schedule, now),
        resolve_current_marker(schedule, now),
    )
}

fn from_parts(
    schedule: &DaySchedule,
    now: NaiveDateTime,
    block: Option<&TimeBlock>,
    marker: Option<&Marker>,
) -> Resolution {
    if let Some(marker) = marker {
        return Resolution::CurrentMarker {
            marker: marker.clone(),
        };
    }
    if let Some(block) = block {
        return Resolution::CurrentBlock {
            block: block.clone(),
        };
    }
    match resolve_next_event(schedule, now) {
        Some(event) => Resolution::Upcoming { event },
        None => Resolution::Idle,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockProgress {
    pub end: ClockTime,
    pub percent: u8,
    pub remaining_minutes: i64,
    pub remaining_label: String,
}

/// Progress through `block` at `now`.
pub fn block_progress(block: &TimeBlock, now: NaiveDateTime) -> BlockProgress {
    let start = block.start.on_date(now.date());
    let total_ms = i64::from(block.duration) * 60_000;
    let end = start + Duration::milliseconds(total_ms);

    let elapsed_ms = (now - start).num_milliseconds();
    let percent = if total_ms == 0 {
        100
    } else {
        ((elapsed_ms as f64 / total_ms as f64) * 100.0).round().clamp(0.0, 100.0) as u8
    };

    let remaining_ms = (end - now).num_milliseconds();
    let remaining_minutes = (remaining_ms as f64 / 60_000.0).ceil() as i64;

    BlockProgress {
        end: block.end(),
        percent,
        remaining_minutes,
        remaining_label: remaining_label(remaining_minutes),
    }
}

pub fn remaining_label(minutes: i64) -> String {
    match minutes {
        m if m < 1 => "Less than 1 minute".to_string(),
        1 => "1 minute".to_string(),
        m => format!("{} minutes", m),
    }
}

/// Snapshot of a resolution pass, as published to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionView {
    pub at: NaiveDateTime,
    pub schedule: String,
    pub resolution: Resolution,
    pub activity: Option<String>,
    pub timing: Option<Timing>,
    pub current_block: Option<TimeBlock>,
    pub progress: Option<BlockProgress>,
}

impl ResolutionView {
    pub fn idle(at: NaiveDateTime) -> Self {
        Self {
            at,
            schedule: DaySchedule::default().name,
            resolution: Resolution::Idle,
            activity: None,
            timing: None,
            current_block: None,
            progress: None,
        }
    }
}

/// Passed to observers when the current block or marker changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionChange {
    pub block: Option<TimeBlock>,
    pub marker: Option<Marker>,
    pub resolution: Resolution,
}

pub type ResolutionObserver = Box<dyn FnMut(&ResolutionChange) + Send>;

/// Stateful resolver driven by a periodic tick.
///
/// Remembers the last current block and marker and notifies observers when
/// either changes (compared by value). The first tick always notifies.
#[derive(Default)]
pub struct ActivityResolver {
    current_block: Option<TimeBlock>,
    current_marker: Option<Marker>,
    primed: bool,
    observers: Vec<ResolutionObserver>,
}

impl ActivityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change<F>(&mut self, observer: F)
    where
        F: FnMut(&ResolutionChange) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn current_block(&self) -> Option<&TimeBlock> {
        self.current_block.as_ref()
    }

    pub fn current_marker(&self) -> Option<&Marker> {
        self.current_marker.as_ref()
    }

    pub fn tick(&mut self, document: Option<&ScheduleDocument>, now: NaiveDateTime) -> ResolutionView {
        let week = document.map(|doc| doc.schedules.as_slice()).unwrap_or(&[]);
        let schedule = resolve_day_schedule(week, now);

        let block = resolve_current_block(&schedule, now);
        let marker = resolve_current_marker(&schedule, now);
        let resolution = from_parts(&schedule, now, block, marker);

        let changed = !self.primed
            || block != self.current_block.as_ref()
            || marker != self.current_marker.as_ref();

        if changed {
            self.primed = true;
            self.current_block = block.cloned();
            self.current_marker = marker.cloned();
            debug!(
                schedule = %schedule.name,
                block = block.map(|b| b.name.as_str()),
                marker = marker.map(|m| m.name.as_str()),
                "current_activity_changed"
            );

            let change = ResolutionChange {
                block: self.current_block.clone(),
                marker: self.current_marker.clone(),
                resolution: resolution.clone(),
            };
            for observer in &mut self.observers {
                observer(&change);
            }
        }

        ResolutionView {
            at: now,
            schedule: schedule.name.clone(),
            activity: resolution.activity().map(str::to_string),
            timing: resolution.timing(),
            current_block: block.cloned(),
            progress: block.map(|b| block_progress(b, now)),
            resolution,
        }
    }
}
