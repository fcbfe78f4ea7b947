//! Custom error types for the application.
//!
//! This module defines the primary error type, `SweepError`, for the crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures a sweep can run into, from configuration and filesystem issues to
//! instrument timeouts.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML parse errors or type
//!   mismatches between a config source and [`crate::config::SweepConfig`].
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but holds
//!   unusable values (e.g. a zero poll interval). Caught by `SweepConfig::validate`.
//! - **`Io`** / **`Storage`**: Directory creation, ledger append and summary writes.
//!   `Storage` carries the offending path. These are fatal to a saving sweep: it must
//!   not proceed without a valid output location.
//! - **`Csv`**: Malformed ledger or summary rows.
//! - **`InvalidParameter`**: Sweep parameters that cannot describe a grid or a timing.
//! - **`InvalidTimestamp`**: Strings that are not `YYYYMMDD-HHMMSS`.
//! - **`LockTimeout`** / **`AcquisitionTimeout`**: The instrument did not reach the
//!   requested state in time.
//!
//! Device drivers themselves report `anyhow::Error`; the sweep controller attaches
//! context to those and surfaces them unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SweepError>;

/// Errors produced by the ledger, grid, configuration and timing layers.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Configuration could not be loaded or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds unusable values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem failure on a known path.
    #[error("Failed to {action} '{}': {source}", path.display())]
    Storage {
        /// What was being attempted, e.g. "create run directory".
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Ledger or summary table could not be read or written as CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Sweep parameters do not describe a valid sweep.
    #[error("Invalid sweep parameter: {0}")]
    InvalidParameter(String),

    /// A run timestamp did not have the `YYYYMMDD-HHMMSS` shape.
    #[error("Invalid run timestamp '{0}', expected YYYYMMDD-HHMMSS")]
    InvalidTimestamp(String),

    /// Raw image data does not match its declared shape or encoding.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The laser did not report lock within the allotted time.
    #[error("Laser did not lock at {wavelength_nm} nm within {timeout:?}")]
    LockTimeout {
        /// Commanded wavelength.
        wavelength_nm: f64,
        /// Time spent polling.
        timeout: Duration,
    },

    /// The spectrometer did not complete an acquisition in time.
    #[error("Acquisition did not complete within {0:?}")]
    AcquisitionTimeout(Duration),
}

impl From<figment::Error> for SweepError {
    fn from(err: figment::Error) -> Self {
        SweepError::Config(Box::new(err))
    }
}

impl SweepError {
    /// Adapter for `map_err` that tags an I/O error with the path it hit.
    pub fn storage(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| SweepError::Storage {
            action,
            path,
            source,
        }
    }
}
