//! Collaborator boundary for camera images.
//!
//! The record/replay core never compresses pixels itself.  A camera stack
//! supplies an [`ImageEncoder`] to turn an [`ImageFrame`] into a payload for
//! recording, and an [`ImageDecoder`] to turn a replayed payload back into a
//! frame.

use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Pixel layout of an [`ImageFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ImageFormat {
    #[default]
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Gray,
}

impl ImageFormat {
    /// Number of interleaved channels per pixel.
    pub fn channels(self) -> usize {
        match self {
            ImageFormat::Rgb | ImageFormat::Bgr => 3,
            ImageFormat::Rgba | ImageFormat::Bgra => 4,
            ImageFormat::Gray => 1,
        }
    }
}

/// An uncompressed frame as it comes off (or goes back into) a camera.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub format: ImageFormat,
    /// Interleaved pixel data, row-major.
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// Byte length `data` must have for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }
}

/// Compression settings passed through to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub compress: bool,
    /// Encoder quality, 0–100.
    pub quality: u8,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            compress: true,
            quality: 90,
        }
    }
}

/// Turns a frame into a self-describing payload (pixels plus format and
/// compression metadata).
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, frame: &ImageFrame, options: ImageOptions) -> Result<Vec<u8>, CodecError>;
}

/// Inverse of [`ImageEncoder`].
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<ImageFrame, CodecError>;
}
