//! Pure Rust codec built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe | `image::image_dimensions` (header only) |
//! | Decode (TIFF, JPEG, PNG, WebP) | `image::ImageReader`, allocation limits lifted for large rasters |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → WebP | `WebPEncoder::new_lossless` (lossless only, so config pins quality to 100) |
//! | Encode → PNG | `PngEncoder` |

use super::backend::{Codec, CodecError, Dimensions};
use super::params::{ConvertParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Codec that runs entirely in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCodec;

impl BuiltinCodec {
    pub fn new() -> Self {
        Self
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, CodecError> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    // Orthomosaics routinely exceed the default allocation limit.
    reader.no_limits();
    reader.decode().map_err(|e| CodecError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Drop alpha and wide channels the target encoders cannot take.
fn to_8bit(img: DynamicImage, keep_alpha: bool) -> DynamicImage {
    if keep_alpha && img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

/// Encode `img` into `path`, picking the format from the extension.
fn save_image(img: DynamicImage, path: &Path, quality: Quality) -> Result<(), CodecError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let encode_err = |e: image::ImageError| CodecError::Encode {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    match ext.as_str() {
        "jpg" | "jpeg" => {
            let writer = BufWriter::new(File::create(path)?);
            let encoder = JpegEncoder::new_with_quality(writer, quality.value() as u8);
            to_8bit(img, false)
                .write_with_encoder(encoder)
                .map_err(encode_err)
        }
        "webp" => {
            let writer = BufWriter::new(File::create(path)?);
            to_8bit(img, true)
                .write_with_encoder(WebPEncoder::new_lossless(writer))
                .map_err(encode_err)
        }
        "png" => {
            let writer = BufWriter::new(File::create(path)?);
            to_8bit(img, true)
                .write_with_encoder(PngEncoder::new(writer))
                .map_err(encode_err)
        }
        other => Err(CodecError::UnsupportedFormat(other.to_string())),
    }
}

impl Codec for BuiltinCodec {
    fn probe(&self, path: &Path) -> Result<Dimensions, CodecError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| CodecError::Decode {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Dimensions { width, height })
    }

    fn convert(&self, params: &ConvertParams) -> Result<(), CodecError> {
        let img = load_image(&params.input)?;
        save_image(img, &params.output, params.quality)
    }
}
