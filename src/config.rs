//! Configuration System using Figment
//!
//! Strongly-typed configuration for sweeps. Sources, lowest precedence first:
//! 1. Built-in defaults (`SweepConfig::default()`)
//! 2. TOML file (default: `config/sweep.toml`, skipped if absent)
//! 3. Environment variables prefixed with `SPECSWEEP_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! SPECSWEEP_APPLICATION__LOG_LEVEL=debug
//! SPECSWEEP_STORAGE__DATA_DIR=/mnt/lab/data
//! SPECSWEEP_LASER__SETTLE=poll_lock
//! SPECSWEEP_SPECTROMETER__EXPOSURES_PER_FRAME=4
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spectral_sweep::config::SweepConfig;
//!
//! let config = SweepConfig::load()?;
//! println!("Data directory: {}", config.storage.data_dir.display());
//! # Ok::<(), spectral_sweep::error::SweepError>(())
//! ```

use crate::error::{AppResult, SweepError};
use crate::instrument::{FrameCombination, GratingSelection};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/sweep.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SPECSWEEP_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SweepConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Output layout
    pub storage: StorageConfig,
    /// Laser settling behaviour
    pub laser: LaserConfig,
    /// Spectrometer acquisition settings
    pub spectrometer: SpectrometerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "spectral-sweep".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable
    Pretty,
    /// One JSON object per line
    Json,
}

/// Storage layout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the ledger and the per-day run directories
    pub data_dir: PathBuf,
    /// Ledger file name inside `data_dir`
    pub ledger_file: String,
    /// Summary table file name inside each run directory
    pub summary_file: String,
    /// Hand the run directory to the spectrometer for raw frame output
    pub save_raw_frames: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ledger_file: "logger.csv".to_string(),
            summary_file: "data_summary.txt".to_string(),
            save_raw_frames: true,
        }
    }
}

/// How the controller decides the laser has reached its wavelength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// Sleep the sweep's wait time and assume lock
    Fixed,
    /// Sleep the wait time, then poll the laser's lock status
    PollLock,
}

/// Laser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserConfig {
    /// Settling strategy
    pub settle: SettleMode,
    /// Interval between lock queries
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Give up on lock after this long
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Time the simulated laser needs to lock after a move
    #[serde(with = "humantime_serde")]
    pub lock_time: Duration,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            settle: SettleMode::Fixed,
            poll_interval: Duration::from_millis(50),
            lock_timeout: Duration::from_secs(5),
            lock_time: Duration::ZERO,
        }
    }
}

/// Spectrometer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrometerConfig {
    /// Exposures combined into each stored frame
    pub exposures_per_frame: u32,
    /// Average or sum the combined exposures
    pub combination: FrameCombination,
    /// Frames stored per acquisition
    pub frames_to_store: u32,
    /// Upper bound on a single acquisition, on top of its exposure time
    #[serde(with = "humantime_serde")]
    pub acquisition_timeout: Duration,
    /// Seed for the simulated detector
    pub seed: u64,
    /// Lowest simulated total count (inclusive)
    pub min_count: u64,
    /// Highest simulated total count (exclusive)
    pub max_count: u64,
    /// Active area width (pixels)
    pub sensor_width: u32,
    /// Active area height (pixels)
    pub sensor_height: u32,
    /// Grating to select before the sweep
    pub grating: Option<GratingSelection>,
}

impl Default for SpectrometerConfig {
    fn default() -> Self {
        Self {
            exposures_per_frame: 1,
            combination: FrameCombination::Average,
            frames_to_store: 1,
            acquisition_timeout: Duration::from_secs(30),
            seed: 42,
            min_count: 5000,
            max_count: 10000,
            sensor_width: 64,
            sensor_height: 8,
            grating: None,
        }
    }
}

impl SweepConfig {
    /// Load from the default file location plus environment overrides.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific TOML file plus environment overrides.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> AppResult<Self> {
        let config: SweepConfig = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered figment used by [`SweepConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SweepConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values that parse but cannot drive a sweep.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: &str| Err(SweepError::Configuration(msg.to_string()));

        if self.storage.ledger_file.trim().is_empty() {
            return invalid("storage.ledger_file must not be empty");
        }
        if self.storage.summary_file.trim().is_empty() {
            return invalid("storage.summary_file must not be empty");
        }
        if self.laser.settle == SettleMode::PollLock && self.laser.poll_interval.is_zero() {
            return invalid("laser.poll_interval must be non-zero when polling for lock");
        }
        let s = &self.spectrometer;
        if s.exposures_per_frame == 0 {
            return invalid("spectrometer.exposures_per_frame must be at least 1");
        }
        if s.frames_to_store == 0 {
            return invalid("spectrometer.frames_to_store must be at least 1");
        }
        if s.min_count >= s.max_count {
            return invalid("spectrometer.min_count must be below spectrometer.max_count");
        }
        if s.sensor_width == 0 || s.sensor_height == 0 {
            return invalid("spectrometer sensor dimensions must be non-zero");
        }
        if s.acquisition_timeout.is_zero() {
            return invalid("spectrometer.acquisition_timeout must be non-zero");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SweepError::Configuration(format!("cannot render configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let config = SweepConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config, SweepConfig::default());
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.storage.ledger_file, "logger.csv");
    }

    #[test]
    #[serial]
    fn file_values_override_defaults() {
        let file = write_toml(
            r#"
            [storage]
            data_dir = "/tmp/lab"

            [laser]
            settle = "poll_lock"
            poll_interval = "10ms"
            lock_timeout = "2s"

            [spectrometer]
            exposures_per_frame = 4
            combination = "sum"

            [spectrometer.grating]
            blaze_nm = 750
            groove_density = 300
            grating_index = 1
            turret_index = 2
            "#,
        );

        let config = SweepConfig::load_from(file.path()).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/lab"));
        assert_eq!(config.storage.ledger_file, "logger.csv");
        assert_eq!(config.laser.settle, SettleMode::PollLock);
        assert_eq!(config.laser.poll_interval, Duration::from_millis(10));
        assert_eq!(config.laser.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.spectrometer.exposures_per_frame, 4);
        assert_eq!(config.spectrometer.combination, FrameCombination::Sum);
        let grating = config.spectrometer.grating.unwrap();
        assert_eq!(grating.turret_index, 2);
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        let file = write_toml("[application]\nlog_level = \"warn\"\n");
        std::env::set_var("SPECSWEEP_APPLICATION__LOG_LEVEL", "debug");
        std::env::set_var("SPECSWEEP_SPECTROMETER__SEED", "7");

        let result = SweepConfig::load_from(file.path());

        std::env::remove_var("SPECSWEEP_APPLICATION__LOG_LEVEL");
        std::env::remove_var("SPECSWEEP_SPECTROMETER__SEED");

        let config = result.unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.spectrometer.seed, 7);
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        let file = write_toml("[spectrometer]\nmin_count = 10\nmax_count = 10\n");
        let err = SweepConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));

        let file = write_toml("[spectrometer]\nexposures_per_frame = 0\n");
        assert!(SweepConfig::load_from(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn malformed_toml_is_a_config_error() {
        let file = write_toml("[laser]\nsettle = \"sometimes\"\n");
        let err = SweepConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[test]
    fn toml_rendering_round_trips() {
        let config = SweepConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: SweepConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
