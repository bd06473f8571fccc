//! Detection request, validated parameters and read filters
//!
//! A `DetectionRequest` is what a caller sends (JSON or CLI). `validate()` turns
//! it into engine parameters plus the filter the read provider applies.

use crate::domain::error::DetectionError;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Deserialize;

/// Default co-travel window (seconds)
pub const DEFAULT_WINDOW_SECONDS: i64 = 300;

/// Default caller threshold for distinct readers/days
pub const DEFAULT_MIN_COINCIDENCES: i64 = 2;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionRequest {
    #[serde(default)]
    pub target_plate: Option<String>,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    #[serde(default = "default_min_coincidences")]
    pub min_coincidences: i64,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub time_from: Option<String>,
    #[serde(default)]
    pub time_to: Option<String>,
}

fn default_window_seconds() -> i64 {
    DEFAULT_WINDOW_SECONDS
}

fn default_min_coincidences() -> i64 {
    DEFAULT_MIN_COINCIDENCES
}

impl Default for DetectionRequest {
    fn default() -> Self {
        Self {
            target_plate: None,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            min_coincidences: DEFAULT_MIN_COINCIDENCES,
            date_from: None,
            date_to: None,
            time_from: None,
            time_to: None,
        }
    }
}

/// Validated engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    pub window: Duration,
    pub min_coincidences: u32,
    /// When set, every emitted pair must contain this plate
    pub target_plate: Option<String>,
}

impl DetectionParams {
    pub fn new(window_seconds: i64, min_coincidences: i64) -> Result<Self, DetectionError> {
        if window_seconds <= 0 {
            return Err(DetectionError::Configuration(format!(
                "window_seconds must be positive, got {window_seconds}"
            )));
        }
        if min_coincidences < 0 {
            return Err(DetectionError::Configuration(format!(
                "min_coincidences must not be negative, got {min_coincidences}"
            )));
        }
        let window = Duration::try_seconds(window_seconds).ok_or_else(|| {
            DetectionError::Configuration(format!("window_seconds out of range: {window_seconds}"))
        })?;
        let min_coincidences = u32::try_from(min_coincidences).map_err(|_| {
            DetectionError::Configuration(format!(
                "min_coincidences out of range: {min_coincidences}"
            ))
        })?;
        Ok(Self { window, min_coincidences, target_plate: None })
    }

    pub fn with_target_plate(mut self, plate: &str) -> Self {
        self.target_plate = Some(plate.to_string());
        self
    }

    #[inline]
    pub fn window_seconds(&self) -> i64 {
        self.window.num_seconds()
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            window: Duration::seconds(DEFAULT_WINDOW_SECONDS),
            min_coincidences: DEFAULT_MIN_COINCIDENCES as u32,
            target_plate: None,
        }
    }
}

/// Date and time-of-day restrictions applied by the read provider.
///
/// `date_to` covers the whole day. Time-of-day bounds are inclusive at minute
/// resolution and do not wrap past midnight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
}

impl ReadFilter {
    pub fn matches(&self, timestamp: &NaiveDateTime) -> bool {
        let date = timestamp.date();
        if self.date_from.is_some_and(|from| date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| date > to) {
            return false;
        }
        let minute_of_day = minute_of_day(&timestamp.time());
        if self.time_from.is_some_and(|from| minute_of_day < minute_of_day_of(from)) {
            return false;
        }
        if self.time_to.is_some_and(|to| minute_of_day > minute_of_day_of(to)) {
            return false;
        }
        true
    }

    #[inline]
    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }
}

#[inline]
fn minute_of_day(time: &NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[inline]
fn minute_of_day_of(time: NaiveTime) -> u32 {
    minute_of_day(&time)
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, DetectionError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        DetectionError::Validation(format!("{field} '{value}' is not YYYY-MM-DD: {e}"))
    })
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, DetectionError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map_err(|e| DetectionError::Validation(format!("{field} '{value}' is not HH:MM: {e}")))
}

impl DetectionRequest {
    /// Validate the request. Configuration problems are reported before
    /// filter problems.
    pub fn validate(&self) -> Result<(DetectionParams, ReadFilter), DetectionError> {
        let mut params = DetectionParams::new(self.window_seconds, self.min_coincidences)?;

        if let Some(plate) = self.target_plate.as_deref().map(str::trim) {
            if !plate.is_empty() {
                params = params.with_target_plate(plate);
            }
        }

        let filter = ReadFilter {
            date_from: self.date_from.as_deref().map(|v| parse_date("date_from", v)).transpose()?,
            date_to: self.date_to.as_deref().map(|v| parse_date("date_to", v)).transpose()?,
            time_from: self.time_from.as_deref().map(|v| parse_time("time_from", v)).transpose()?,
            time_to: self.time_to.as_deref().map(|v| parse_time("time_to", v)).transpose()?,
        };

        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(DetectionError::Validation(format!(
                    "date_from {from} is after date_to {to}"
                )));
            }
        }

        Ok((params, filter))
    }
}
