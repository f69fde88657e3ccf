use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

pub(crate) const MINUTES_PER_DAY: u32 = 24 * 60;

/// Wall-clock time of day as written in schedule documents (`HH:MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hours: u8,
    minutes: u8,
}

impl ClockTime {
    pub fn new(hours: u32, minutes: u32) -> Result<Self> {
        if hours >= 24 || minutes >= 60 {
            return Err(TrackerError::InvalidTime(format!("{}:{:02}", hours, minutes)));
        }
        Ok(Self {
            hours: hours as u8,
            minutes: minutes as u8,
        })
    }

    /// Builds a time from minutes since midnight, wrapping past 24:00.
    pub fn from_minutes(minutes: u32) -> Self {
        let minutes = minutes % MINUTES_PER_DAY;
        Self {
            hours: (minutes / 60) as u8,
            minutes: (minutes % 60) as u8,
        }
    }

    /// Time of day of `at`, seconds truncated.
    pub fn of(at: NaiveDateTime) -> Self {
        Self {
            hours: at.hour() as u8,
            minutes: at.minute() as u8,
        }
    }

    pub fn hours(self) -> u32 {
        self.hours as u32
    }

    pub fn minutes(self) -> u32 {
        self.minutes as u32
    }

    pub fn minutes_since_midnight(self) -> u32 {
        self.hours() * 60 + self.minutes()
    }

    /// Combines this time with a calendar date.
    pub fn on_date(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.as_naive_time())
    }

    fn as_naive_time(self) -> NaiveTime {
        // hours/minutes are range-checked on construction
        NaiveTime::from_hms_opt(self.hours(), self.minutes(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for ClockTime {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TrackerError::InvalidTime(s.to_string());
        let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: u32 = hours.parse().map_err(|_| invalid())?;
        let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
        Self::new(hours, minutes).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the local system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a settable instant, for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: NaiveDateTime) {
        if let Ok(mut guard) = self.at.lock() {
            *guard = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.at.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
