//! Wavelength sweep controller.
//!
//! Drives a [`TunableLaser`] and a [`Spectrometer`] across a [`WavelengthGrid`]:
//!
//! ```text
//! Init ──► Sweeping(0) ──► Sweeping(1) ──► ... ──► Done
//!   │          │
//!   │          ├─ set wavelength
//!   │          ├─ settle (fixed delay, optionally poll lock)
//!   │          ├─ acquire (bounded by a timeout)
//!   │          └─ rewrite summary table (when saving)
//!   └─ mint timestamp, record run in ledger (when saving)
//! ```
//!
//! There are no retries and no cancellation. Any device or filesystem error
//! aborts the sweep; the summary table on disk then holds every point that
//! completed before the failure.

use crate::config::{SettleMode, SweepConfig};
use crate::error::SweepError;
use crate::grid::WavelengthGrid;
use crate::instrument::{
    Acquisition, AcquisitionSettings, FrameCombination, GratingSelection, RawFrameTarget,
    RegionOfInterest, Spectrometer, TunableLaser,
};
use crate::ledger::ExperimentLedger;
use crate::run::{RunTimestamp, SweepParams, SweepRun};
use crate::summary::SweepResult;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration, Instant};

/// How the controller waits for the laser after each wavelength command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep the sweep's wait time.
    Fixed,
    /// Sleep the wait time, then poll lock status every `interval` until
    /// locked or `timeout` has passed.
    PollLock {
        /// Delay between lock queries
        interval: Duration,
        /// Upper bound on polling
        timeout: Duration,
    },
}

/// Sweep behaviour that does not change from run to run.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOptions {
    /// Settling strategy
    pub settle: SettlePolicy,
    /// Exposures folded into each stored frame
    pub exposures_per_frame: u32,
    /// Average or sum exposures
    pub combination: FrameCombination,
    /// Frames stored per acquisition
    pub frames_to_store: u32,
    /// Region summed into the total count
    pub roi: Option<RegionOfInterest>,
    /// Slack on top of the nominal exposure time before an acquisition is abandoned
    pub acquisition_timeout: Duration,
    /// Let the spectrometer write raw frames into the run directory
    pub save_raw_frames: bool,
    /// Grating to select before the first step
    pub grating: Option<GratingSelection>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::Fixed,
            exposures_per_frame: 1,
            combination: FrameCombination::Average,
            frames_to_store: 1,
            roi: None,
            acquisition_timeout: Duration::from_secs(30),
            save_raw_frames: false,
            grating: None,
        }
    }
}

impl SweepOptions {
    /// Options derived from the loaded configuration.
    pub fn from_config(config: &SweepConfig) -> Self {
        let settle = match config.laser.settle {
            SettleMode::Fixed => SettlePolicy::Fixed,
            SettleMode::PollLock => SettlePolicy::PollLock {
                interval: config.laser.poll_interval,
                timeout: config.laser.lock_timeout,
            },
        };
        let s = &config.spectrometer;
        Self {
            settle,
            exposures_per_frame: s.exposures_per_frame,
            combination: s.combination,
            frames_to_store: s.frames_to_store,
            roi: None,
            acquisition_timeout: s.acquisition_timeout,
            save_raw_frames: config.storage.save_raw_frames,
            grating: s.grating,
        }
    }

    fn acquisition_settings(&self, exposure: Duration) -> AcquisitionSettings {
        AcquisitionSettings {
            exposure,
            exposures_per_frame: self.exposures_per_frame,
            combination: self.combination,
            frames_to_store: self.frames_to_store,
            roi: self.roi,
        }
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// No grid point started yet
    Init,
    /// Working on grid point `index` of `total`
    Sweeping {
        /// Zero-based grid index
        index: usize,
        /// Grid length
        total: usize,
    },
    /// Every grid point completed
    Done,
}

/// Running totals for one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepAccumulator {
    /// Frames the spectrometer has returned this run
    pub frames_acquired: u64,
    /// Completed (wavelength, count) points
    pub result: SweepResult,
}

impl SweepAccumulator {
    fn record(&mut self, wavelength_nm: f64, acquisition: &Acquisition) {
        self.frames_acquired += acquisition.frames.len() as u64;
        self.result.push(wavelength_nm, acquisition.total_count);
    }
}

/// What a finished sweep produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Run id, `None` when the sweep was not saved
    pub timestamp: Option<RunTimestamp>,
    /// Run directory, `None` when the sweep was not saved
    pub run_dir: Option<PathBuf>,
    /// Per-run totals
    pub accumulator: SweepAccumulator,
}

/// Drives one laser and one spectrometer through wavelength sweeps.
pub struct SweepController {
    laser: Arc<dyn TunableLaser>,
    spectrometer: Arc<dyn Spectrometer>,
    ledger: ExperimentLedger,
    options: SweepOptions,
    state: SweepState,
}

impl SweepController {
    /// Controller with default options.
    pub fn new(
        laser: Arc<dyn TunableLaser>,
        spectrometer: Arc<dyn Spectrometer>,
        ledger: ExperimentLedger,
    ) -> Self {
        Self {
            laser,
            spectrometer,
            ledger,
            options: SweepOptions::default(),
            state: SweepState::Init,
        }
    }

    /// Replace the sweep options.
    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Ledger used for saved runs.
    pub fn ledger(&self) -> &ExperimentLedger {
        &self.ledger
    }

    /// Run a sweep. When `save` is set, a timestamp is minted from the local
    /// clock and the run is recorded before the first step.
    pub async fn run(&mut self, params: &SweepParams, save: bool) -> Result<SweepOutcome> {
        let timestamp = save.then(RunTimestamp::now);
        self.execute(params, timestamp).await
    }

    /// Run and save a sweep under an explicit timestamp.
    pub async fn run_as(
        &mut self,
        timestamp: RunTimestamp,
        params: &SweepParams,
    ) -> Result<SweepOutcome> {
        self.execute(params, Some(timestamp)).await
    }

    async fn execute(
        &mut self,
        params: &SweepParams,
        timestamp: Option<RunTimestamp>,
    ) -> Result<SweepOutcome> {
        self.state = SweepState::Init;
        params.validate()?;
        let grid = params.grid()?;
        let wait = params.wait()?;
        let settings = self.options.acquisition_settings(params.exposure()?);

        let run_dir = match &timestamp {
            Some(ts) => Some(
                self.ledger
                    .record(&SweepRun::new(ts.clone(), params.clone()))?,
            ),
            None => None,
        };
        let summary_path = timestamp.as_ref().map(|ts| self.ledger.summary_path(ts));

        if let Some(grating) = self.options.grating {
            self.spectrometer
                .select_grating(grating)
                .await
                .with_context(|| format!("selecting grating {grating}"))?;
        }

        tracing::info!(
            timestamp = timestamp.as_ref().map(RunTimestamp::as_str).unwrap_or("unsaved"),
            points = grid.len(),
            start_nm = params.start_nm,
            end_nm = params.end_nm,
            step_nm = params.step_nm,
            "Starting wavelength sweep"
        );

        let accumulator = self
            .sweep_grid(&grid, wait, &settings, run_dir.as_ref(), summary_path.as_ref())
            .await?;

        self.state = SweepState::Done;
        tracing::info!(
            timestamp = timestamp.as_ref().map(RunTimestamp::as_str).unwrap_or("unsaved"),
            points = accumulator.result.len(),
            frames = accumulator.frames_acquired,
            "Wavelength sweep complete"
        );

        Ok(SweepOutcome {
            timestamp,
            run_dir,
            accumulator,
        })
    }

    async fn sweep_grid(
        &mut self,
        grid: &WavelengthGrid,
        wait: Duration,
        settings: &AcquisitionSettings,
        run_dir: Option<&PathBuf>,
        summary_path: Option<&PathBuf>,
    ) -> Result<SweepAccumulator> {
        let mut acc = SweepAccumulator::default();
        let total = grid.len();

        for (index, nm) in grid.iter().enumerate() {
            self.state = SweepState::Sweeping { index, total };

            self.laser
                .set_wavelength(nm)
                .await
                .with_context(|| format!("setting laser wavelength to {nm} nm"))?;
            self.settle(nm, wait).await?;

            let target = run_dir
                .filter(|_| self.options.save_raw_frames)
                .map(|dir| RawFrameTarget {
                    dir: dir.clone(),
                    base_name: format!("frame-{index:04}-{nm}"),
                });
            let acquisition = self.acquire(nm, settings, target.as_ref()).await?;
            acc.record(nm, &acquisition);

            if let Some(path) = summary_path {
                acc.result
                    .write(path)
                    .with_context(|| format!("saving summary after {nm} nm"))?;
            }

            tracing::info!(
                step = index + 1,
                of = total,
                wavelength_nm = nm,
                total_count = acquisition.total_count,
                "Grid point complete"
            );
        }
        Ok(acc)
    }

    async fn settle(&self, nm: f64, wait: Duration) -> Result<()> {
        sleep(wait).await;

        let SettlePolicy::PollLock { interval, timeout } = self.options.settle else {
            return Ok(());
        };
        let deadline = Instant::now() + timeout;
        loop {
            let locked = self
                .laser
                .is_locked()
                .await
                .with_context(|| format!("querying laser lock at {nm} nm"))?;
            if locked {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SweepError::LockTimeout {
                    wavelength_nm: nm,
                    timeout,
                }
                .into());
            }
            tracing::debug!(wavelength_nm = nm, "Laser not locked yet");
            sleep(interval).await;
        }
    }

    async fn acquire(
        &self,
        nm: f64,
        settings: &AcquisitionSettings,
        target: Option<&RawFrameTarget>,
    ) -> Result<Acquisition> {
        let limit = settings
            .nominal_duration()
            .saturating_add(self.options.acquisition_timeout);
        timeout(limit, self.spectrometer.acquire(settings, target))
            .await
            .map_err(|_| SweepError::AcquisitionTimeout(limit))?
            .with_context(|| format!("acquiring at {nm} nm"))
    }
}
