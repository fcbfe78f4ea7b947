//! Core library for the spectral-sweep application.
//!
//! Tunes a laser across a wavelength grid, integrates photon counts with a
//! spectrometer at each step, and keeps an append-only ledger of every saved
//! sweep alongside a per-run summary table.
//!
//! - [`sweep`]: the controller that drives the instruments
//! - [`ledger`]: run parameters and output directories
//! - [`summary`]: per-run (wavelength, count) tables
//! - [`instrument`]: device traits, frame decoding and simulated devices
//! - [`report`]: text reports joining a ledger row with its table

pub mod config;
pub mod error;
pub mod grid;
pub mod instrument;
pub mod ledger;
pub mod logging;
pub mod report;
pub mod run;
pub mod summary;
pub mod sweep;

pub use error::{AppResult, SweepError};
pub use ledger::{ExperimentLedger, LedgerRow};
pub use run::{RunTimestamp, SweepParams, SweepRun};
pub use summary::{SummaryPoint, SweepResult};
pub use sweep::{SettlePolicy, SweepController, SweepOptions, SweepOutcome, SweepState};
