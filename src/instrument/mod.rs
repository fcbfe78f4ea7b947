//! Hardware-agnostic instrument interfaces.
//!
//! A sweep needs two collaborators: a [`TunableLaser`] to move the probe
//! wavelength and a [`Spectrometer`] to integrate photon counts at each step.
//! Vendor drivers implement these traits; [`mock`] provides simulated devices
//! that stand in for them.
//!
//! Both traits are async so drivers can await their own I/O, but the sweep
//! controller awaits every call before issuing the next one: from its point of
//! view each command is blocking.

pub mod frame;
pub mod mock;

pub use frame::{Frame, FrameCombination, PixelBuffer, PixelFormat, RegionOfInterest};
pub use mock::{MockLaser, MockSpectrometer};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunable-wavelength source.
#[async_trait]
pub trait TunableLaser: Send + Sync {
    /// Command a new wavelength (nm). Returns once the command is acknowledged,
    /// not once the laser has settled.
    async fn set_wavelength(&self, nm: f64) -> Result<()>;

    /// Last commanded wavelength (nm).
    async fn wavelength(&self) -> Result<f64>;

    /// Whether the laser reports being locked at its commanded wavelength.
    ///
    /// Lasers without lock feedback report locked unconditionally.
    async fn is_locked(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Spectrometer grating turret position, e.g. `[750nm,300][1][2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GratingSelection {
    /// Blaze wavelength (nm)
    pub blaze_nm: u32,
    /// Grooves per mm
    pub groove_density: u32,
    /// Grating slot on the turret
    pub grating_index: u32,
    /// Turret number
    pub turret_index: u32,
}

impl std::fmt::Display for GratingSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}nm,{}][{}][{}]",
            self.blaze_nm, self.groove_density, self.grating_index, self.turret_index
        )
    }
}

/// Per-acquisition camera settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Exposure of a single readout
    pub exposure: Duration,
    /// Exposures folded into each stored frame
    pub exposures_per_frame: u32,
    /// How exposures are folded
    pub combination: FrameCombination,
    /// Frames stored per acquisition
    pub frames_to_store: u32,
    /// Region summed into the total count; whole sensor if `None`
    pub roi: Option<RegionOfInterest>,
}

impl AcquisitionSettings {
    /// Single exposure, single frame, whole sensor.
    pub fn new(exposure: Duration) -> Self {
        Self {
            exposure,
            exposures_per_frame: 1,
            combination: FrameCombination::Average,
            frames_to_store: 1,
            roi: None,
        }
    }

    /// Nominal detector time for one acquisition.
    pub fn nominal_duration(&self) -> Duration {
        self.exposure
            .saturating_mul(self.exposures_per_frame)
            .saturating_mul(self.frames_to_store)
    }
}

/// Where a spectrometer should write the raw frames of one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrameTarget {
    /// Output directory
    pub dir: PathBuf,
    /// File stem; frame index and extension are appended
    pub base_name: String,
}

/// Result of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    /// Stored frames
    pub frames: Vec<Frame>,
    /// Photon count summed over the ROI of every stored frame
    pub total_count: f64,
}

impl Acquisition {
    /// Build from frames, summing counts inside `roi`.
    pub fn from_frames(
        frames: Vec<Frame>,
        roi: Option<&RegionOfInterest>,
    ) -> crate::error::AppResult<Self> {
        let mut total_count = 0.0;
        for frame in &frames {
            total_count += frame.total_counts(roi)?;
        }
        Ok(Self {
            frames,
            total_count,
        })
    }
}

/// Photon-counting spectrometer camera.
#[async_trait]
pub trait Spectrometer: Send + Sync {
    /// Move the grating turret.
    async fn select_grating(&self, grating: GratingSelection) -> Result<()>;

    /// Run one acquisition to completion and return its frames and total count.
    ///
    /// Raw frames are written under `target` when one is given.
    async fn acquire(
        &self,
        settings: &AcquisitionSettings,
        target: Option<&RawFrameTarget>,
    ) -> Result<Acquisition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grating_formats_like_turret_setting() {
        let g = GratingSelection {
            blaze_nm: 750,
            groove_density: 300,
            grating_index: 1,
            turret_index: 2,
        };
        assert_eq!(g.to_string(), "[750nm,300][1][2]");
    }

    #[test]
    fn nominal_duration_scales_with_exposures_and_frames() {
        let mut settings = AcquisitionSettings::new(Duration::from_millis(100));
        settings.exposures_per_frame = 3;
        settings.frames_to_store = 2;
        assert_eq!(settings.nominal_duration(), Duration::from_millis(600));
    }

    #[test]
    fn acquisition_sums_all_frames() {
        let frames = vec![
            Frame::new(2, 1, PixelBuffer::MonoU16(vec![1, 2])).unwrap(),
            Frame::new(2, 1, PixelBuffer::MonoU16(vec![3, 4])).unwrap(),
        ];
        let acq = Acquisition::from_frames(frames, None).unwrap();
        assert_eq!(acq.total_count, 10.0);
    }
}
