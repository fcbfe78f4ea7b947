//! Mock Hardware Implementations
//!
//! Simulated laser and spectrometer for running sweeps without the vendor
//! control software. All waits use `tokio::time::sleep`, so tests can run on a
//! paused clock.
//!
//! # Available Mocks
//!
//! - `MockLaser` - acknowledges every wavelength command, reports lock after a
//!   configurable delay
//! - `MockSpectrometer` - seeded photon counts in a configurable range, spread
//!   evenly over a small sensor

use super::{
    Acquisition, AcquisitionSettings, Frame, GratingSelection, PixelBuffer, RawFrameTarget,
    Spectrometer, TunableLaser,
};
use crate::config::SpectrometerConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration, Instant};

// =============================================================================
// MockLaser - Simulated Tunable Laser
// =============================================================================

struct LaserState {
    wavelength_nm: f64,
    moved_at: Instant,
    history: Vec<f64>,
}

/// Mock tunable laser.
///
/// Starts at 800 nm. After each move it reports unlocked until `lock_time`
/// has elapsed.
///
/// # Example
///
/// ```rust,ignore
/// let laser = MockLaser::new();
/// laser.set_wavelength(790.0).await?;
/// assert_eq!(laser.wavelength().await?, 790.0);
/// ```
pub struct MockLaser {
    state: Arc<RwLock<LaserState>>,
    lock_time: Duration,
    fail_at_nm: Option<f64>,
}

impl MockLaser {
    /// Laser that locks instantly.
    pub fn new() -> Self {
        Self::with_lock_time(Duration::ZERO)
    }

    /// Laser that needs `lock_time` after each move before reporting lock.
    pub fn with_lock_time(lock_time: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(LaserState {
                wavelength_nm: 800.0,
                moved_at: Instant::now(),
                history: Vec::new(),
            })),
            lock_time,
            fail_at_nm: None,
        }
    }

    /// Reject any command to `nm`, to exercise sweep abort paths.
    pub fn failing_at(mut self, nm: f64) -> Self {
        self.fail_at_nm = Some(nm);
        self
    }

    /// Every wavelength commanded so far, in order.
    pub async fn history(&self) -> Vec<f64> {
        self.state.read().await.history.clone()
    }
}

impl Default for MockLaser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunableLaser for MockLaser {
    async fn set_wavelength(&self, nm: f64) -> Result<()> {
        if self.fail_at_nm.is_some_and(|f| (f - nm).abs() < 1e-9) {
            bail!("MockLaser: tuning to {nm} nm rejected");
        }
        let mut state = self.state.write().await;
        tracing::debug!(from = state.wavelength_nm, to = nm, "MockLaser: tuning");
        state.wavelength_nm = nm;
        state.moved_at = Instant::now();
        state.history.push(nm);
        Ok(())
    }

    async fn wavelength(&self) -> Result<f64> {
        Ok(self.state.read().await.wavelength_nm)
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self.state.read().await.moved_at.elapsed() >= self.lock_time)
    }
}

// =============================================================================
// MockSpectrometer - Simulated Photon-Counting Camera
// =============================================================================

/// Mock spectrometer camera.
///
/// Each exposure draws a total count uniformly from `[min_count, max_count)`
/// and spreads it evenly across the sensor, so a frame's pixel sum equals the
/// drawn count. Exposures are folded per [`AcquisitionSettings::combination`].
pub struct MockSpectrometer {
    width: u32,
    height: u32,
    min_count: u64,
    max_count: u64,
    rng: Mutex<StdRng>,
    acquisitions: Arc<RwLock<u64>>,
    grating: Arc<RwLock<Option<GratingSelection>>>,
    fail_after: Option<u64>,
}

impl MockSpectrometer {
    /// Spectrometer with an explicit sensor size, count range and seed.
    pub fn new(width: u32, height: u32, min_count: u64, max_count: u64, seed: u64) -> Self {
        Self {
            width,
            height,
            min_count,
            max_count,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            acquisitions: Arc::new(RwLock::new(0)),
            grating: Arc::new(RwLock::new(None)),
            fail_after: None,
        }
    }

    /// Spectrometer built from configuration.
    pub fn from_config(config: &SpectrometerConfig) -> Self {
        Self::new(
            config.sensor_width,
            config.sensor_height,
            config.min_count,
            config.max_count,
            config.seed,
        )
    }

    /// Fail every acquisition after the first `n` succeed.
    pub fn failing_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Completed acquisitions.
    pub async fn acquisition_count(&self) -> u64 {
        *self.acquisitions.read().await
    }

    /// Currently selected grating.
    pub async fn grating(&self) -> Option<GratingSelection> {
        *self.grating.read().await
    }

    fn exposure_frame(&self, total: u64) -> Result<Frame> {
        let n = u64::from(self.width) * u64::from(self.height);
        let base = total / n;
        let rem = total % n;
        let value = |i: u64| base + u64::from(i < rem);

        let pixels = if base < u64::from(u16::MAX) {
            PixelBuffer::MonoU16((0..n).map(|i| value(i) as u16).collect())
        } else {
            PixelBuffer::MonoU32(
                (0..n)
                    .map(|i| value(i).min(u64::from(u32::MAX)) as u32)
                    .collect(),
            )
        };
        Ok(Frame::new(self.width, self.height, pixels)?)
    }
}

impl Default for MockSpectrometer {
    fn default() -> Self {
        Self::from_config(&SpectrometerConfig::default())
    }
}

#[async_trait]
impl Spectrometer for MockSpectrometer {
    async fn select_grating(&self, grating: GratingSelection) -> Result<()> {
        tracing::debug!(%grating, "MockSpectrometer: grating selected");
        *self.grating.write().await = Some(grating);
        Ok(())
    }

    async fn acquire(
        &self,
        settings: &AcquisitionSettings,
        target: Option<&RawFrameTarget>,
    ) -> Result<Acquisition> {
        if self.min_count >= self.max_count {
            bail!(
                "MockSpectrometer: empty count range [{}, {})",
                self.min_count,
                self.max_count
            );
        }
        if self.width == 0 || self.height == 0 {
            bail!(
                "MockSpectrometer: {}x{} sensor has no pixels",
                self.width,
                self.height
            );
        }
        if let Some(limit) = self.fail_after {
            if *self.acquisitions.read().await >= limit {
                bail!("MockSpectrometer: acquisition failed after {limit} acquisitions");
            }
        }

        let per_frame = settings.exposures_per_frame.max(1) as usize;
        let frame_count = settings.frames_to_store.max(1) as usize;
        let draws: Vec<u64> = {
            let mut rng = self.rng.lock().await;
            (0..per_frame * frame_count)
                .map(|_| rng.gen_range(self.min_count..self.max_count))
                .collect()
        };

        let mut frames = Vec::with_capacity(frame_count);
        for chunk in draws.chunks(per_frame) {
            let mut exposures = Vec::with_capacity(per_frame);
            for &total in chunk {
                sleep(settings.exposure).await;
                exposures.push(self.exposure_frame(total)?);
            }
            frames.push(Frame::combine(&exposures, settings.combination)?);
        }

        if let Some(target) = target {
            for (i, frame) in frames.iter().enumerate() {
                let name = if frames.len() == 1 {
                    format!("{}.csv", target.base_name)
                } else {
                    format!("{}-{}.csv", target.base_name, i)
                };
                let path = target.dir.join(name);
                frame
                    .write_csv(&path)
                    .with_context(|| format!("writing raw frame {}", path.display()))?;
            }
        }

        let acquisition = Acquisition::from_frames(frames, settings.roi.as_ref())?;
        *self.acquisitions.write().await += 1;
        Ok(acquisition)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_laser_tracks_wavelength() {
        let laser = MockLaser::new();
        assert_eq!(laser.wavelength().await.unwrap(), 800.0);

        laser.set_wavelength(790.0).await.unwrap();
        laser.set_wavelength(791.0).await.unwrap();
        assert_eq!(laser.wavelength().await.unwrap(), 791.0);
        assert_eq!(laser.history().await, vec![790.0, 791.0]);
        assert!(laser.is_locked().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_laser_locks_after_delay() {
        let laser = MockLaser::with_lock_time(Duration::from_millis(200));
        laser.set_wavelength(810.0).await.unwrap();
        assert!(!laser.is_locked().await.unwrap());

        sleep(Duration::from_millis(199)).await;
        assert!(!laser.is_locked().await.unwrap());

        sleep(Duration::from_millis(1)).await;
        assert!(laser.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_laser_failure_injection() {
        let laser = MockLaser::new().failing_at(801.0);
        laser.set_wavelength(800.0).await.unwrap();
        assert!(laser.set_wavelength(801.0).await.is_err());
        assert_eq!(laser.wavelength().await.unwrap(), 800.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_spectrometer_counts_in_range() {
        let spec = MockSpectrometer::new(16, 4, 5000, 10000, 42);
        let settings = AcquisitionSettings::new(Duration::from_millis(100));

        for _ in 0..20 {
            let acq = spec.acquire(&settings, None).await.unwrap();
            assert!(acq.total_count >= 5000.0 && acq.total_count < 10000.0);
            assert_eq!(acq.total_count.fract(), 0.0);
            assert_eq!(acq.frames.len(), 1);
        }
        assert_eq!(spec.acquisition_count().await, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_spectrometer_is_reproducible() {
        let settings = AcquisitionSettings::new(Duration::from_millis(1));
        let a = MockSpectrometer::new(8, 2, 0, 1000, 7);
        let b = MockSpectrometer::new(8, 2, 0, 1000, 7);
        for _ in 0..5 {
            let x = a.acquire(&settings, None).await.unwrap().total_count;
            let y = b.acquire(&settings, None).await.unwrap().total_count;
            assert_eq!(x, y);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_spectrometer_exposure_timing() {
        let spec = MockSpectrometer::new(4, 1, 10, 20, 1);
        let mut settings = AcquisitionSettings::new(Duration::from_millis(100));
        settings.exposures_per_frame = 3;
        settings.frames_to_store = 2;

        let start = Instant::now();
        let acq = spec.acquire(&settings, None).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(600));
        assert_eq!(acq.frames.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_spectrometer_sum_exceeds_single_exposure_range() {
        let spec = MockSpectrometer::new(4, 1, 100, 101, 1);
        let mut settings = AcquisitionSettings::new(Duration::ZERO);
        settings.exposures_per_frame = 4;
        settings.combination = crate::instrument::FrameCombination::Sum;
        let acq = spec.acquire(&settings, None).await.unwrap();
        assert_eq!(acq.total_count, 400.0);

        settings.combination = crate::instrument::FrameCombination::Average;
        let acq = spec.acquire(&settings, None).await.unwrap();
        assert_eq!(acq.total_count, 100.0);
    }

    #[tokio::test]
    async fn test_mock_spectrometer_writes_raw_frames() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MockSpectrometer::new(4, 2, 10, 20, 3);
        let target = RawFrameTarget {
            dir: dir.path().to_path_buf(),
            base_name: "frame-800.00".to_string(),
        };
        spec.acquire(&AcquisitionSettings::new(Duration::ZERO), Some(&target))
            .await
            .unwrap();
        let text = std::fs::read_to_string(dir.path().join("frame-800.00.csv")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_mock_spectrometer_failure_injection() {
        let spec = MockSpectrometer::new(2, 1, 0, 10, 0).failing_after(2);
        let settings = AcquisitionSettings::new(Duration::ZERO);
        assert!(spec.acquire(&settings, None).await.is_ok());
        assert!(spec.acquire(&settings, None).await.is_ok());
        assert!(spec.acquire(&settings, None).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_spectrometer_rejects_empty_sensor() {
        let settings = AcquisitionSettings::new(Duration::ZERO);
        let spec = MockSpectrometer::new(0, 8, 0, 10, 0);
        let err = spec.acquire(&settings, None).await.unwrap_err();
        assert!(err.to_string().contains("has no pixels"));
        assert_eq!(spec.acquisition_count().await, 0);

        assert!(MockSpectrometer::new(4, 0, 0, 10, 0)
            .acquire(&settings, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_spectrometer_grating() {
        let spec = MockSpectrometer::default();
        assert!(spec.grating().await.is_none());
        let g = GratingSelection {
            blaze_nm: 500,
            groove_density: 1200,
            grating_index: 2,
            turret_index: 1,
        };
        spec.select_grating(g).await.unwrap();
        assert_eq!(spec.grating().await, Some(g));
    }
}
