//! External collaborators for the codec core: a PNG bridge built on the
//! `image` crate and a raw scanline bridge built on plain file I/O.
//!
//! Neither the codec core (`crate::qoi`) nor this module ever touch each
//! other's error types: the core stays free of an `image` dependency, and
//! callers see a single [`BridgeError`] for anything that goes wrong on the
//! way in or out of a file.
use std::fs;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgb, Rgba};

use crate::qoi::{ChannelMode, QoiDescriptor};

/// Errors raised by the PNG and raw bridges.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("image has a bit depth other than 8 bits per channel")]
    UnsupportedDepth,
    #[error("raw file size does not match width * height * channels")]
    RawSizeMismatch,
    #[error("image error")]
    Image(#[from] image::ImageError),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

/// Reads an 8-bit-per-channel PNG (or any format `image` can decode) and
/// returns it as a QOI-ready descriptor and flat pixel buffer.
///
/// If the source image isn't 8 bits per channel, returns
/// [`BridgeError::UnsupportedDepth`] without ever invoking the codec core.
pub fn read_png(path: &Path) -> Result<(QoiDescriptor, Vec<u8>), BridgeError> {
    let image = image::open(path)?;

    if !matches!(
        image,
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) | DynamicImage::ImageLuma8(_)
    ) {
        return Err(BridgeError::UnsupportedDepth);
    }

    let width = image.width() as usize;
    let height = image.height() as usize;

    let (channels, pixels) = match &image {
        DynamicImage::ImageRgba8(_) => (ChannelMode::Rgba, image.to_rgba8().into_raw()),
        _ => (ChannelMode::Rgb, image.to_rgb8().into_raw()),
    };

    Ok((
        QoiDescriptor {
            width,
            height,
            channels,
            colorspace: crate::qoi::Colorspace::Srgb,
        },
        pixels,
    ))
}

/// Writes a flat pixel buffer out as a PNG file.
pub fn write_png(path: &Path, desc: &QoiDescriptor, pixels: Vec<u8>) -> Result<(), BridgeError> {
    let width = desc.width as u32;
    let height = desc.height as u32;

    match desc.channels {
        ChannelMode::Rgba => {
            let image: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_raw(width, height, pixels)
                .ok_or(BridgeError::RawSizeMismatch)?;
            image.save(path)?;
        }
        ChannelMode::Rgb => {
            let image: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_raw(width, height, pixels)
                .ok_or(BridgeError::RawSizeMismatch)?;
            image.save(path)?;
        }
    }

    Ok(())
}

/// Reads `height` scanlines of `width * channels` bytes from a raw file.
pub fn read_raw(
    path: &Path,
    width: usize,
    height: usize,
    channels: ChannelMode,
) -> Result<Vec<u8>, BridgeError> {
    let bytes = fs::read(path)?;
    let expected = width * height * (channels as usize);
    if bytes.len() != expected {
        return Err(BridgeError::RawSizeMismatch);
    }
    Ok(bytes)
}

/// Writes a flat pixel buffer out verbatim as a raw file.
pub fn write_raw(path: &Path, pixels: &[u8]) -> Result<(), BridgeError> {
    fs::write(path, pixels)?;
    Ok(())
}
