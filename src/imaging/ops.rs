//! Pure image operations — zero side effects.
//!
//! Every function here takes a decoded [`DynamicImage`] (plus typed
//! parameters) and produces a new image or byte buffer. Nothing in this
//! module touches the filesystem, the repository, or the cache; the
//! [`pipeline`](crate::pipeline) module owns sequencing and I/O.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image::load_from_memory` (pure Rust decoders) |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Crop | `image::DynamicImage::crop_imm` (bounds checked here first) |
//! | Mirror | `image::DynamicImage::fliph` / `flipv` |
//! | Grayscale | `image::DynamicImage::grayscale` |
//! | Sepia | weighted channel transform (see [`sepia`]) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG / GIF / WebP | the respective `image` codec encoders |

use super::params::{Direction, OutputFormat, Quality};
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error(
        "crop rectangle {x},{y} {width}x{height} exceeds image bounds {image_width}x{image_height}"
    )]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("{format} encode failed: {message}")]
    EncodeFailed { format: &'static str, message: String },
}

/// Decode image bytes into pixels. The container format is sniffed from the
/// bytes themselves, not trusted from the record's mime type.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, OperationError> {
    image::load_from_memory(bytes).map_err(|e| OperationError::Decode(e.to_string()))
}

/// Resample to exactly `width` × `height` with Lanczos3.
///
/// Aspect ratio is not preserved — the caller supplies exact target
/// dimensions.
pub fn resize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Extract the region `[x, x+width) × [y, y+height)`.
///
/// Fails if the rectangle reaches past either image edge; the full-frame
/// rectangle (`0,0,w,h`) is valid.
pub fn crop(
    img: &DynamicImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<DynamicImage, OperationError> {
    let (iw, ih) = (img.width(), img.height());
    let within = x
        .checked_add(width)
        .is_some_and(|right| right <= iw)
        && y.checked_add(height).is_some_and(|bottom| bottom <= ih);
    if !within {
        return Err(OperationError::CropOutOfBounds {
            x,
            y,
            width,
            height,
            image_width: iw,
            image_height: ih,
        });
    }
    Ok(img.crop_imm(x, y, width, height))
}

/// Mirror the image along the given axis. Horizontal mirrors left-right,
/// vertical mirrors top-bottom.
pub fn mirror(img: &DynamicImage, direction: Direction) -> DynamicImage {
    match direction {
        Direction::Horizontal => img.fliph(),
        Direction::Vertical => img.flipv(),
    }
}

/// Desaturate to grayscale.
pub fn grayscale(img: &DynamicImage) -> DynamicImage {
    img.grayscale()
}

/// Apply the classic sepia channel matrix, clamping each channel to 255.
/// Alpha is carried through untouched.
pub fn sepia(img: &DynamicImage) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        pixel.0 = [
            (0.393 * r + 0.769 * g + 0.189 * b).min(255.0) as u8,
            (0.349 * r + 0.686 * g + 0.168 * b).min(255.0) as u8,
            (0.272 * r + 0.534 * g + 0.131 * b).min(255.0) as u8,
            a,
        ];
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Encode pixels into the requested container format.
///
/// Quality applies to JPEG only; PNG and WebP encode losslessly and GIF is
/// palette-quantized by the encoder.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, OperationError> {
    let mut bytes = Vec::new();
    let failed = |e: image::ImageError| OperationError::EncodeFailed {
        format: format.extension(),
        message: e.to_string(),
    };

    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, quality.value())
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(failed)?;
        }
        OutputFormat::Png => {
            let rgba = img.to_rgba8();
            PngEncoder::new(&mut bytes)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(failed)?;
        }
        OutputFormat::Gif => {
            let rgba = img.to_rgba8();
            let (w, h) = (rgba.width(), rgba.height());
            GifEncoder::new(&mut bytes)
                .encode(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(failed)?;
        }
        OutputFormat::WebP => {
            let rgba = img.to_rgba8();
            WebPEncoder::new_lossless(&mut bytes)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(failed)?;
        }
    }

    Ok(bytes)
}
