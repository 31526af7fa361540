//! Decoded video frame: packed RGB24 with grayscale conversion for the models.

use image::RgbImage;
use std::time::Duration;

/// A decoded video frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB24 pixel data (width * height * 3 bytes), row-major.
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// Decode order within the current media, starting at 0 after each load or rewind.
    pub sequence: u64,
    /// Presentation time relative to the start of the media.
    pub timestamp: Duration,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Wrap packed RGB24 data. Fails if the buffer does not match the dimensions.
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp: Duration,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected || width == 0 || height == 0 {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            timestamp,
        })
    }

    pub fn from_image(image: RgbImage, sequence: u64, timestamp: Duration) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::from_rgb(image.into_raw(), width, height, sequence, timestamp)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Luma plane (ITU-R BT.601 weights), one byte per pixel.
    pub fn to_grayscale(&self) -> Vec<u8> {
        rgb_to_grayscale(&self.data)
    }
}

/// Convert packed RGB24 to grayscale.
///
/// Uses integer BT.601 weights (77, 150, 29) / 256; trailing partial pixels are ignored.
pub fn rgb_to_grayscale(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let y = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32;
            (y >> 8) as u8
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid RGB24 length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
