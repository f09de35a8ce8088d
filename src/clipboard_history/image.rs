//! Clipboard image processing
//!
//! Header-only dimension reads, downscaling and PNG encoding for the asset
//! store, plus RGBA conversions for the arboard clipboard boundary.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits, RgbaImage};
use std::io::Cursor;
use tracing::debug;

use crate::error::AssetError;

/// Largest edge kept for full assets.
pub const DEFAULT_MAX_IMAGE_EDGE: u32 = 3840;

/// Largest edge of thumbnails.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 200;

/// Read image dimensions from the header without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32), AssetError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AssetError::Io {
            path: "<memory>".to_string(),
            source: e,
        })?;
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(AssetError::Empty);
    }
    Ok((width, height))
}

/// Target size fitting inside `max_edge`, preserving aspect ratio.
pub fn calculate_target_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    if width >= height {
        let scaled_height = ((height as f64) * (max_edge as f64) / (width as f64)).round() as u32;
        (max_edge, scaled_height.max(1))
    } else {
        let scaled_width = ((width as f64) * (max_edge as f64) / (height as f64)).round() as u32;
        (scaled_width.max(1), max_edge)
    }
}

/// Sources with a larger edge are refused before any pixels are allocated.
pub const MAX_DECODE_EDGE: u32 = 16_384;

fn decode(bytes: &[u8]) -> Result<DynamicImage, AssetError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AssetError::Io {
            path: "<memory>".to_string(),
            source: e,
        })?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_EDGE);
    limits.max_image_height = Some(MAX_DECODE_EDGE);
    reader.limits(limits);
    Ok(reader.decode()?)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, AssetError> {
    let mut png_data = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;
    Ok(png_data)
}

/// Full asset and thumbnail produced from a single decode.
#[derive(Debug)]
pub struct RenderedImage {
    /// PNG, larger edge at most the configured maximum.
    pub full: Vec<u8>,
    /// A thumbnail failure does not invalidate the full asset.
    pub thumbnail: Result<Vec<u8>, AssetError>,
}

/// Decode `bytes` once and render the full asset plus thumbnail from the
/// same pixels.
///
/// None of the enabled codecs can decode at a reduced scale (the JPEG
/// decoder has no DCT scaling hint), so the source is decoded at its own
/// size, bounded by [`MAX_DECODE_EDGE`], and downscaled in memory. The
/// thumbnail is cut from the capped pixels rather than a re-decoded PNG.
/// PNG input that already fits is stored byte for byte.
pub fn render_assets(
    bytes: &[u8],
    max_edge: u32,
    thumbnail_edge: u32,
) -> Result<RenderedImage, AssetError> {
    let (width, height) = read_dimensions(bytes)?;
    let (target_w, target_h) = calculate_target_size(width, height, max_edge);
    let decoded = decode(bytes)?;

    let (capped, full) = if (target_w, target_h) == (width, height) {
        let full = if image::guess_format(bytes).ok() == Some(ImageFormat::Png) {
            bytes.to_vec()
        } else {
            encode_png(&decoded)?
        };
        (decoded, full)
    } else {
        debug!(width, height, target_w, target_h, "Downscaling clipboard image");
        let scaled = decoded.thumbnail(target_w, target_h);
        let full = encode_png(&scaled)?;
        (scaled, full)
    };

    Ok(RenderedImage {
        full,
        thumbnail: thumbnail_of(&capped, thumbnail_edge),
    })
}

/// Thumbnail PNG whose larger edge is at most `edge`.
fn thumbnail_of(image: &DynamicImage, edge: u32) -> Result<Vec<u8>, AssetError> {
    let (target_w, target_h) = calculate_target_size(image.width(), image.height(), edge);
    if (target_w, target_h) == (image.width(), image.height()) {
        return encode_png(image);
    }
    encode_png(&image.resize(target_w, target_h, FilterType::Triangle))
}

/// Encode raw RGBA pixels (as arboard hands them out) into PNG bytes.
pub fn encode_rgba_to_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>, AssetError> {
    let rgba_image = RgbaImage::from_raw(width, height, rgba).ok_or(AssetError::Empty)?;
    encode_png(&DynamicImage::ImageRgba8(rgba_image))
}

/// Decode any supported image into raw RGBA pixels for arboard.
pub fn decode_to_rgba(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), AssetError> {
    let rgba = decode(bytes)?.to_rgba8();
    Ok((rgba.width(), rgba.height(), rgba.into_raw()))
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::new(width, height);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]);
    }
    encode_png(&DynamicImage::ImageRgba8(img)).expect("encode fixture")
}
