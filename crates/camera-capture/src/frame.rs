//! Video frame types and JPEG conversion

use crate::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest accepted frame side (pixels)
pub const MAX_DIMENSION: u32 = 8192;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Uniform frame filled with one gray level
    pub fn filled(width: u32, height: u32, level: u8, sequence: u32) -> Result<Self, CameraError> {
        let len = rgb_len(width, height)?;
        Ok(Self::new(vec![level; len], width, height, now_ns(), sequence))
    }

    /// Encode the frame as a baseline JPEG
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        let expected = rgb_len(self.width, self.height)?;
        if self.data.len() != expected {
            return Err(CameraError::Format(format!(
                "RGB buffer holds {} bytes, expected {}",
                self.data.len(),
                expected
            )));
        }

        let mut out = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Decode a JPEG (e.g. an IP camera snapshot) into an RGB frame
    pub fn from_jpeg(jpeg: &[u8], sequence: u32) -> Result<Self, CameraError> {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
            timestamp_ns: now_ns(),
            sequence,
        })
    }
}

/// Byte length of an RGB buffer, rejecting empty or oversized frames
fn rgb_len(width: u32, height: u32) -> Result<usize, CameraError> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CameraError::Format(format!(
            "frame size {}x{} outside 1..={}",
            width, height, MAX_DIMENSION
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(3))
        .ok_or_else(|| CameraError::Format(format!("frame size {}x{} overflows", width, height)))
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
