//! Codec trait and shared types.
//!
//! The [`Codec`] trait is the seam between the conversion orchestrator and
//! whatever actually reads and writes rasters. Two operations: `probe` for
//! pixel dimensions and `convert` for producing a derivative.

use super::params::ConvertParams;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },
    #[error("Unsupported output format: {0:?}")]
    UnsupportedFormat(String),
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("Could not read dimensions from probe output: {0:?}")]
    ProbeOutput(String),
    #[error("Image has zero size: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("Codec command is empty")]
    EmptyCommand,
}

/// Smallest aspect ratio reported. Anything narrower rounds up to this.
pub const MIN_ASPECT: f64 = 0.0001;

/// Pixel dimensions of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Width over height rounded to four decimals, never below
    /// [`MIN_ASPECT`].
    ///
    /// Zero-sized images have no aspect ratio and are reported as an error.
    pub fn aspect(self) -> Result<f64, CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }
        let ratio = self.width as f64 / self.height as f64;
        Ok(((ratio * 10_000.0).round() / 10_000.0).max(MIN_ASPECT))
    }
}

/// A raster codec.
///
/// `Sync` so one instance can be shared across the rayon pool.
pub trait Codec: Sync {
    /// Read pixel dimensions without producing anything.
    fn probe(&self, path: &Path) -> Result<Dimensions, CodecError>;

    /// Write a derivative of `params.input` to `params.output`, replacing
    /// any existing file.
    fn convert(&self, params: &ConvertParams) -> Result<(), CodecError>;
}
