//! # Technology Configuration
//!
//! Per-technology polling settings. The interval is deliberately limited to a
//! handful of values: every distinct interval is a separate scheduling
//! cohort, and an unbounded set of cohorts means an unbounded set of timers.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One of the allowed polling intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PollingInterval {
    /// 15 minutes.
    FifteenMinutes,
    /// 1 hour.
    Hourly,
    /// 12 hours.
    TwelveHours,
    /// 24 hours.
    Daily,
    /// 7 days.
    Weekly,
}

impl PollingInterval {
    /// Every allowed interval, shortest first.
    pub const ALL: [PollingInterval; 5] = [
        Self::FifteenMinutes,
        Self::Hourly,
        Self::TwelveHours,
        Self::Daily,
        Self::Weekly,
    ];

    /// Parse from minutes, rejecting anything outside the allowed set.
    pub fn from_minutes(minutes: u32) -> Result<Self, ValidationError> {
        match minutes {
            15 => Ok(Self::FifteenMinutes),
            60 => Ok(Self::Hourly),
            720 => Ok(Self::TwelveHours),
            1440 => Ok(Self::Daily),
            10080 => Ok(Self::Weekly),
            other => Err(ValidationError::InvalidInterval(other)),
        }
    }

    /// The interval length in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            Self::FifteenMinutes => 15,
            Self::Hourly => 60,
            Self::TwelveHours => 720,
            Self::Daily => 1440,
            Self::Weekly => 10080,
        }
    }

    /// The interval as a `chrono::Duration`.
    pub fn as_duration(self) -> Duration {
        Duration::minutes(i64::from(self.minutes()))
    }
}

impl Default for PollingInterval {
    fn default() -> Self {
        Self::Daily
    }
}

impl TryFrom<u32> for PollingInterval {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
    }
}

impl From<PollingInterval> for u32 {
    fn from(interval: PollingInterval) -> Self {
        interval.minutes()
    }
}

impl std::fmt::Display for PollingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FifteenMinutes => f.write_str("15m"),
            Self::Hourly => f.write_str("1h"),
            Self::TwelveHours => f.write_str("12h"),
            Self::Daily => f.write_str("24h"),
            Self::Weekly => f.write_str("7d"),
        }
    }
}

/// Polling configuration for one technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyConfig {
    /// Technology name; must be registered.
    pub name: String,
    /// How often each pair of this technology is due.
    pub interval: PollingInterval,
    /// Disabled technologies are never due on the schedule.
    pub active: bool,
}

impl TechnologyConfig {
    /// Create an active config.
    pub fn new(name: impl Into<String>, interval: PollingInterval) -> Self {
        Self {
            name: name.into(),
            interval,
            active: true,
        }
    }
}
