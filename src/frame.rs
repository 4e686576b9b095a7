//! Captured frames and hard limits on their size.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Maximum allowed frame payload in bytes (default: 100MB).
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

const BYTES_PER_PIXEL: usize = std::mem::size_of::<u16>();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame dimensions {width}x{height} exceed maximum {max_dimension}")]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    #[error("Frame of {bytes} bytes exceeds maximum {max_bytes}")]
    TooLarge { bytes: usize, max_bytes: usize },

    #[error("Size overflow computing {context}")]
    SizeOverflow { context: &'static str },

    #[error("Frame {width}x{height} expects {expected} pixels, got {actual}")]
    PixelCountMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub pixels: usize,
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(width: u32, height: u32) -> Result<FrameSize, FrameError> {
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(FrameError::DimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_FRAME_DIMENSION,
        });
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(FrameError::SizeOverflow {
            context: "frame pixel count",
        })?;

    let bytes = pixels
        .checked_mul(BYTES_PER_PIXEL)
        .ok_or(FrameError::SizeOverflow {
            context: "frame byte size",
        })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            bytes,
            max_bytes: MAX_FRAME_BYTES,
        });
    }

    Ok(FrameSize { pixels, bytes })
}

/// One greyscale image delivered by a data-flow, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    /// Number of significant bits per pixel (e.g. 12 for a 12-bit sensor).
    depth_bits: u8,
    pixels: Vec<u16>,
    timestamp: DateTime<Utc>,
}

impl Frame {
    /// Build a frame, checking that the pixel buffer matches the dimensions.
    pub fn new(width: u32, height: u32, depth_bits: u8, pixels: Vec<u16>) -> Result<Self, FrameError> {
        let size = validate_frame_size(width, height)?;
        if pixels.len() != size.pixels {
            return Err(FrameError::PixelCountMismatch {
                width,
                height,
                expected: size.pixels,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth_bits: depth_bits.clamp(1, 16),
            pixels,
            timestamp: Utc::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn depth_bits(&self) -> u8 {
        self.depth_bits
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u16> {
        self.pixels
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Smallest and largest pixel values, `None` for an empty frame.
    pub fn min_max(&self) -> Option<(u16, u16)> {
        let mut iter = self.pixels.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }
}

/// Rescale a frame to 8 bits using its own intensity range.
///
/// The darkest pixel maps to 0 and the brightest to 255 (automatic
/// brightness/contrast). A flat frame maps to all zeros.
pub fn bytescale(frame: &Frame) -> Vec<u8> {
    let Some((lo, hi)) = frame.min_max() else {
        return Vec::new();
    };
    let span = f64::from(hi - lo);
    if span == 0.0 {
        return vec![0; frame.pixels.len()];
    }
    frame
        .pixels
        .iter()
        .map(|&p| ((f64::from(p - lo) * 255.0) / span).round() as u8)
        .collect()
}
