//! Sweep run identity and parameters.
//!
//! A run is identified by a local-time [`RunTimestamp`] of the form
//! `YYYYMMDD-HHMMSS`. The date half doubles as the day bucket under which the
//! run's directory lives.

use crate::error::{AppResult, SweepError};
use crate::grid::WavelengthGrid;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unique run identifier, `YYYYMMDD-HHMMSS` in local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunTimestamp(String);

impl RunTimestamp {
    /// `strftime` pattern for run timestamps.
    pub const FORMAT: &'static str = "%Y%m%d-%H%M%S";

    /// Mint a timestamp for the current local time.
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Timestamp for an explicit wall-clock time.
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.format(Self::FORMAT).to_string())
    }

    /// Parse and validate a `YYYYMMDD-HHMMSS` string.
    pub fn parse(s: &str) -> AppResult<Self> {
        let parsed = NaiveDateTime::parse_from_str(s, Self::FORMAT)
            .map_err(|_| SweepError::InvalidTimestamp(s.to_string()))?;
        // chrono accepts unpadded fields; only the canonical spelling is an id
        let canonical = Self::from_datetime(parsed);
        if canonical.0 != s {
            return Err(SweepError::InvalidTimestamp(s.to_string()));
        }
        Ok(canonical)
    }

    /// The timestamp string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `YYYYMMDD` day bucket.
    pub fn day_bucket(&self) -> &str {
        // Validated on construction: eight ASCII digits precede the dash.
        &self.0[..8]
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunTimestamp {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RunTimestamp {
    type Error = SweepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RunTimestamp> for String {
    fn from(value: RunTimestamp) -> Self {
        value.0
    }
}

/// Parameters of one wavelength sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepParams {
    /// First grid wavelength (nm).
    pub start_nm: f64,
    /// Exclusive upper bound of the grid (nm).
    pub end_nm: f64,
    /// Grid spacing (nm).
    pub step_nm: f64,
    /// Spectrometer exposure per acquisition (s).
    pub exposure_time_sec: f64,
    /// Settle delay after each wavelength command (s).
    pub wait_time_sec: f64,
    /// 532 nm pump power (W), if recorded.
    pub pump_power_w: Option<f64>,
    /// Probe power (W), if recorded.
    pub probe_power_w: Option<f64>,
}

impl SweepParams {
    /// Parameters without recorded laser powers.
    pub fn new(
        start_nm: f64,
        end_nm: f64,
        step_nm: f64,
        exposure_time_sec: f64,
        wait_time_sec: f64,
    ) -> Self {
        Self {
            start_nm,
            end_nm,
            step_nm,
            exposure_time_sec,
            wait_time_sec,
            pump_power_w: None,
            probe_power_w: None,
        }
    }

    /// Attach the pump (532 nm) power.
    pub fn with_pump_power(mut self, watts: f64) -> Self {
        self.pump_power_w = Some(watts);
        self
    }

    /// Attach the probe power.
    pub fn with_probe_power(mut self, watts: f64) -> Self {
        self.probe_power_w = Some(watts);
        self
    }

    /// Reject parameters that cannot drive a sweep.
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("start_nm", self.start_nm),
            ("end_nm", self.end_nm),
            ("step_nm", self.step_nm),
        ] {
            if !value.is_finite() {
                return Err(SweepError::InvalidParameter(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.step_nm <= 0.0 {
            return Err(SweepError::InvalidParameter(format!(
                "step_nm must be positive, got {}",
                self.step_nm
            )));
        }
        self.exposure()?;
        self.wait()?;
        for (name, power) in [
            ("pump_power_w", self.pump_power_w),
            ("probe_power_w", self.probe_power_w),
        ] {
            if let Some(p) = power {
                if !p.is_finite() || p < 0.0 {
                    return Err(SweepError::InvalidParameter(format!(
                        "{name} must be a non-negative number, got {p}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Exposure as a duration.
    pub fn exposure(&self) -> AppResult<Duration> {
        seconds("exposure_time_sec", self.exposure_time_sec)
    }

    /// Settle delay as a duration.
    pub fn wait(&self) -> AppResult<Duration> {
        seconds("wait_time_sec", self.wait_time_sec)
    }

    /// Wavelength grid described by start, end and step.
    pub fn grid(&self) -> AppResult<WavelengthGrid> {
        WavelengthGrid::new(self.start_nm, self.end_nm, self.step_nm)
    }
}

fn seconds(name: &str, value: f64) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        SweepError::InvalidParameter(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        ))
    })
}

/// A timestamped sweep, immutable once minted.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRun {
    /// Run id.
    pub timestamp: RunTimestamp,
    /// Sweep parameters.
    pub params: SweepParams,
}

impl SweepRun {
    /// Pair a timestamp with its parameters.
    pub fn new(timestamp: RunTimestamp, params: SweepParams) -> Self {
        Self { timestamp, params }
    }
}
