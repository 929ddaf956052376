//! Parameter types for codec invocations.
//!
//! - [`Quality`]: lossy encoding quality (1-100), clamped on construction.
//! - [`ConvertParams`]: one conversion from source raster to derivative path.

use std::path::PathBuf;

/// Quality setting for lossy encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// A single raster-to-derivative conversion.
///
/// The output format is chosen from the output extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}
