//! Simulation time
//!
//! Epochs are carried as seconds past J2000 (2000-01-01T12:00:00) on a
//! uniform timescale. Leap seconds are ignored, which keeps the clock
//! monotonic under arbitrary time warp.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Unix timestamp of the J2000 reference instant
const J2000_UNIX_SECONDS: i64 = 946_728_000;

/// A point in simulation time (seconds past J2000)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(f64);

impl Epoch {
    pub const J2000: Epoch = Epoch(0.0);

    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds past J2000
    pub fn seconds(&self) -> f64 {
        self.0
    }

    pub fn days_since_j2000(&self) -> f64 {
        self.0 / SECONDS_PER_DAY
    }

    pub fn centuries_since_j2000(&self) -> f64 {
        self.days_since_j2000() / DAYS_PER_CENTURY
    }

    pub fn from_datetime(datetime: &DateTime<Utc>) -> Self {
        let whole = (datetime.timestamp() - J2000_UNIX_SECONDS) as f64;
        let frac = datetime.timestamp_subsec_nanos() as f64 * 1e-9;
        Self(whole + frac)
    }

    /// Convert back to a calendar date, `None` if outside chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.0.is_finite() {
            return None;
        }
        let whole = self.0.floor();
        let nanos = (((self.0 - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(J2000_UNIX_SECONDS + whole as i64, nanos)
    }

    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

impl FromStr for Epoch {
    type Err = chrono::ParseError;

    /// Parse an RFC 3339 timestamp such as `2025-05-11T00:00:00Z`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let datetime = DateTime::parse_from_rfc3339(s.trim())?;
        Ok(Self::from_datetime(&datetime.with_timezone(&Utc)))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "J2000{:+}s", self.0),
        }
    }
}

impl Add<f64> for Epoch {
    type Output = Epoch;

    fn add(self, seconds: f64) -> Epoch {
        Epoch(self.0 + seconds)
    }
}

impl AddAssign<f64> for Epoch {
    fn add_assign(&mut self, seconds: f64) {
        self.0 += seconds;
    }
}

impl Sub<f64> for Epoch {
    type Output = Epoch;

    fn sub(self, seconds: f64) -> Epoch {
        Epoch(self.0 - seconds)
    }
}

impl Sub<Epoch> for Epoch {
    type Output = f64;

    /// Elapsed seconds between two epochs
    fn sub(self, other: Epoch) -> f64 {
        self.0 - other.0
    }
}
