//! Raster codecs.
//!
//! | Backend | Probe | Convert |
//! |---|---|---|
//! | [`BuiltinCodec`] | `image::image_dimensions` | `image` decoders, JPEG / lossless WebP / PNG encoders |
//! | [`CommandCodec`] | configured probe command | configured convert command, with timeout |
//!
//! The module is split into:
//! - **Parameters**: [`Quality`] and [`ConvertParams`]
//! - **Backend**: the [`Codec`] trait, [`Dimensions`] and [`CodecError`]
//! - **Builtin** / **Command**: the two implementations

pub mod backend;
pub mod builtin;
pub mod command;
mod params;

pub use backend::{Codec, CodecError, Dimensions, MIN_ASPECT};
pub use builtin::BuiltinCodec;
pub use command::CommandCodec;
pub use params::{ConvertParams, Quality};

use crate::config::{CodecBackend, CodecConfig};

/// Build the codec selected by `[codec] backend`.
pub fn from_config(config: &CodecConfig) -> Box<dyn Codec> {
    match config.backend {
        CodecBackend::Builtin => Box::new(BuiltinCodec::new()),
        CodecBackend::Command => Box::new(CommandCodec::from_config(config)),
    }
}
