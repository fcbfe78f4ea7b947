//! Frames returned by the spectrometer camera.
//!
//! Detector data arrives as a raw little-endian buffer tagged with its pixel
//! encoding. [`PixelBuffer::decode`] turns that into one of a closed set of
//! typed buffers; everything downstream (ROI sums, exposure combination,
//! raw-frame export) works on the typed form.

use crate::error::{AppResult, SweepError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pixel encodings the acquisition software can hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Unsigned 16-bit monochrome
    MonoU16,
    /// Unsigned 32-bit monochrome
    MonoU32,
    /// 32-bit float monochrome
    MonoF32,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::MonoU16 => 2,
            PixelFormat::MonoU32 | PixelFormat::MonoF32 => 4,
        }
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::MonoU16 => "MonochromeUnsigned16",
            PixelFormat::MonoU32 => "MonochromeUnsigned32",
            PixelFormat::MonoF32 => "MonochromeFloating32",
        }
    }
}

/// Decoded pixel data.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// 16-bit counts
    MonoU16(Vec<u16>),
    /// 32-bit counts
    MonoU32(Vec<u32>),
    /// Floating-point intensities
    MonoF32(Vec<f32>),
}

impl PixelBuffer {
    /// Decode a raw little-endian buffer.
    pub fn decode(format: PixelFormat, bytes: &[u8]) -> AppResult<Self> {
        let width = format.bytes_per_pixel();
        if bytes.len() % width != 0 {
            return Err(SweepError::InvalidFrame(format!(
                "{} bytes is not a whole number of {} pixels",
                bytes.len(),
                format.as_str()
            )));
        }
        let chunks = bytes.chunks_exact(width);
        Ok(match format {
            PixelFormat::MonoU16 => PixelBuffer::MonoU16(
                chunks.map(|c| u16::from_le_bytes([c[0], c[1]])).collect(),
            ),
            PixelFormat::MonoU32 => PixelBuffer::MonoU32(
                chunks
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            PixelFormat::MonoF32 => PixelBuffer::MonoF32(
                chunks
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        })
    }

    /// Encoding of this buffer.
    pub fn format(&self) -> PixelFormat {
        match self {
            PixelBuffer::MonoU16(_) => PixelFormat::MonoU16,
            PixelBuffer::MonoU32(_) => PixelFormat::MonoU32,
            PixelBuffer::MonoF32(_) => PixelFormat::MonoF32,
        }
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::MonoU16(v) => v.len(),
            PixelBuffer::MonoU32(v) => v.len(),
            PixelBuffer::MonoF32(v) => v.len(),
        }
    }

    /// True for a zero-pixel buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel value widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            PixelBuffer::MonoU16(v) => v.get(index).map(|&p| f64::from(p)),
            PixelBuffer::MonoU32(v) => v.get(index).map(|&p| f64::from(p)),
            PixelBuffer::MonoF32(v) => v.get(index).map(|&p| f64::from(p)),
        }
    }

    fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

/// Rectangular detector region, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// Left column
    pub x: u32,
    /// Top row
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl RegionOfInterest {
    /// Region covering the whole sensor.
    pub fn full_sensor(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// How multiple exposures are folded into one stored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameCombination {
    /// Pixel-wise mean
    Average,
    /// Pixel-wise sum
    Sum,
}

/// One image, row-major. Always holds exactly `width * height` pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: PixelBuffer,
}

impl Frame {
    /// Wrap decoded pixels, checking they fill `width * height`.
    pub fn new(width: u32, height: u32, pixels: PixelBuffer) -> AppResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SweepError::InvalidFrame(format!(
                "{}x{} frame needs {expected} pixels, got {}",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel data.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Decode a raw buffer into a frame.
    pub fn from_raw(format: PixelFormat, width: u32, height: u32, bytes: &[u8]) -> AppResult<Self> {
        Self::new(width, height, PixelBuffer::decode(format, bytes)?)
    }

    /// Sum of pixel values, over the whole frame or inside `roi`.
    pub fn total_counts(&self, roi: Option<&RegionOfInterest>) -> AppResult<f64> {
        let roi = roi
            .copied()
            .unwrap_or(RegionOfInterest::full_sensor(self.width, self.height));
        let fits_x = roi
            .x
            .checked_add(roi.width)
            .is_some_and(|r| r <= self.width);
        let fits_y = roi
            .y
            .checked_add(roi.height)
            .is_some_and(|b| b <= self.height);
        if !fits_x || !fits_y {
            return Err(SweepError::InvalidFrame(format!(
                "ROI {roi:?} exceeds {}x{} frame",
                self.width, self.height
            )));
        }

        let width = self.width as usize;
        let mut total = 0.0;
        for row in roi.y as usize..(roi.y + roi.height) as usize {
            let start = row * width + roi.x as usize;
            for idx in start..start + roi.width as usize {
                total += self.pixels.get(idx).unwrap_or(0.0);
            }
        }
        Ok(total)
    }

    /// Fold several same-shaped exposures into one frame.
    ///
    /// Summing integer frames yields 32-bit counts (saturating); averaging,
    /// or any float input, yields a float frame.
    pub fn combine(frames: &[Frame], mode: FrameCombination) -> AppResult<Frame> {
        let first = frames
            .first()
            .ok_or_else(|| SweepError::InvalidFrame("no exposures to combine".to_string()))?;
        if frames.len() == 1 {
            return Ok(first.clone());
        }
        if frames
            .iter()
            .any(|f| f.width != first.width || f.height != first.height)
        {
            return Err(SweepError::InvalidFrame("exposures differ in shape".to_string()));
        }

        let mut acc = vec![0.0f64; first.pixels.len()];
        for frame in frames {
            for (slot, value) in acc.iter_mut().zip(frame.pixels.to_f64()) {
                *slot += value;
            }
        }

        let any_float = frames
            .iter()
            .any(|f| f.pixels.format() == PixelFormat::MonoF32);
        let pixels = match mode {
            FrameCombination::Sum if !any_float => PixelBuffer::MonoU32(
                acc.into_iter()
                    .map(|v| v.min(f64::from(u32::MAX)) as u32)
                    .collect(),
            ),
            FrameCombination::Sum => {
                PixelBuffer::MonoF32(acc.into_iter().map(|v| v as f32).collect())
            }
            FrameCombination::Average => {
                let n = frames.len() as f64;
                PixelBuffer::MonoF32(acc.into_iter().map(|v| (v / n) as f32).collect())
            }
        };
        Frame::new(first.width, first.height, pixels)
    }

    /// Write the frame as CSV, one image row per line.
    pub fn write_csv(&self, path: &Path) -> AppResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        let width = self.width as usize;
        for row in 0..self.height as usize {
            let values: Vec<String> = (row * width..(row + 1) * width)
                .map(|i| match &self.pixels {
                    PixelBuffer::MonoU16(v) => v[i].to_string(),
                    PixelBuffer::MonoU32(v) => v[i].to_string(),
                    PixelBuffer::MonoF32(v) => v[i].to_string(),
                })
                .collect();
            writer.write_record(&values)?;
        }
        writer
            .flush()
            .map_err(SweepError::storage("write frame", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_encoding() {
        let bytes: Vec<u8> = [1u16, 2, 65535]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(
            PixelBuffer::decode(PixelFormat::MonoU16, &bytes).unwrap(),
            PixelBuffer::MonoU16(vec![1, 2, 65535])
        );

        let bytes: Vec<u8> = [70000u32, 3]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(
            PixelBuffer::decode(PixelFormat::MonoU32, &bytes).unwrap(),
            PixelBuffer::MonoU32(vec![70000, 3])
        );

        let bytes: Vec<u8> = [1.5f32, -0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(
            PixelBuffer::decode(PixelFormat::MonoF32, &bytes).unwrap(),
            PixelBuffer::MonoF32(vec![1.5, -0.25])
        );
    }

    #[test]
    fn decode_rejects_ragged_buffer() {
        let err = PixelBuffer::decode(PixelFormat::MonoU32, &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, SweepError::InvalidFrame(_)));
    }

    #[test]
    fn frame_shape_must_match_pixels() {
        assert!(Frame::new(2, 2, PixelBuffer::MonoU16(vec![1, 2, 3])).is_err());
        assert!(Frame::new(3, 1, PixelBuffer::MonoU16(vec![1, 2, 3])).is_ok());
    }

    #[test]
    fn raw_frame_exposes_checked_shape() {
        let bytes: Vec<u8> = [1u16, 2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert!(Frame::from_raw(PixelFormat::MonoU16, 4, 2, &bytes).is_err());

        let frame = Frame::from_raw(PixelFormat::MonoU16, 3, 2, &bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.pixels().len(), 6);
    }

    #[test]
    fn total_counts_over_roi() {
        // 3x2 frame:
        // 1 2 3
        // 4 5 6
        let frame = Frame::new(3, 2, PixelBuffer::MonoU16(vec![1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(frame.total_counts(None).unwrap(), 21.0);

        let roi = RegionOfInterest {
            x: 1,
            y: 0,
            width: 2,
            height: 2,
        };
        assert_eq!(frame.total_counts(Some(&roi)).unwrap(), 2.0 + 3.0 + 5.0 + 6.0);

        let outside = RegionOfInterest {
            x: 2,
            y: 0,
            width: 2,
            height: 1,
        };
        assert!(frame.total_counts(Some(&outside)).is_err());
    }

    #[test]
    fn combine_average_and_sum() {
        let a = Frame::new(2, 1, PixelBuffer::MonoU16(vec![10, 20])).unwrap();
        let b = Frame::new(2, 1, PixelBuffer::MonoU16(vec![30, 40])).unwrap();

        let summed = Frame::combine(&[a.clone(), b.clone()], FrameCombination::Sum).unwrap();
        assert_eq!(summed.pixels(), &PixelBuffer::MonoU32(vec![40, 60]));

        let averaged = Frame::combine(&[a, b], FrameCombination::Average).unwrap();
        assert_eq!(averaged.pixels(), &PixelBuffer::MonoF32(vec![20.0, 30.0]));
        assert_eq!(averaged.total_counts(None).unwrap(), 50.0);
    }

    #[test]
    fn combine_rejects_mismatched_shapes() {
        let a = Frame::new(2, 1, PixelBuffer::MonoU16(vec![1, 2])).unwrap();
        let b = Frame::new(1, 2, PixelBuffer::MonoU16(vec![1, 2])).unwrap();
        assert!(Frame::combine(&[a, b], FrameCombination::Sum).is_err());
        assert!(Frame::combine(&[], FrameCombination::Sum).is_err());
    }

    #[test]
    fn writes_rows_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");
        let frame = Frame::new(2, 2, PixelBuffer::MonoU16(vec![1, 2, 3, 4])).unwrap();
        frame.write_csv(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,2\n3,4\n");
    }
}
