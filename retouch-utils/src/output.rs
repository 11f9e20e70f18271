//! Image encoding helpers shared by the export adapter and the CLI.
//!
//! Centralizes format selection and encoder tuning so that in-memory exports
//! (handed to external collaborators) and files written to disk agree.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{
    ExtendedColorType, GrayImage, ImageEncoder, RgbaImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};
use log::debug;
use std::{fs, path::Path};

/// Concrete encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ExportFormat {
    /// MIME type of the encoded payload.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }

    /// Conventional file extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }

    /// Infer the format from a path extension, defaulting JPEG quality to `jpeg_quality`.
    pub fn from_path(path: &Path, jpeg_quality: u8) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg {
                quality: jpeg_quality.clamp(1, 100),
            }),
            _ => None,
        }
    }
}

/// An encoded image ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// Standard base64 of the encoded bytes.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `data:` URL embedding the payload.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

/// Encode an RGBA raster in memory.
///
/// JPEG has no alpha channel, so the alpha plane is dropped before encoding.
pub fn encode_rgba(image: &RgbaImage, format: ExportFormat) -> Result<EncodedImage> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Png => {
            PngEncoder::new_with_quality(&mut bytes, CompressionType::Default, FilterType::Adaptive)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .context("failed to encode PNG")?;
        }
        ExportFormat::Jpeg { quality } => {
            let rgb: Vec<u8> = image
                .as_raw()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .context("failed to encode JPEG")?;
        }
    }
    debug!(
        "Encoded {}x{} frame as {} ({} bytes)",
        width,
        height,
        format.mime(),
        bytes.len()
    );
    Ok(EncodedImage {
        mime: format.mime(),
        bytes,
    })
}

/// Encode and write an RGBA raster, creating parent directories as needed.
pub fn save_rgba_image(image: &RgbaImage, destination: &Path, format: ExportFormat) -> Result<()> {
    let encoded = encode_rgba(image, format)?;
    write_bytes(destination, &encoded.bytes)
}

/// Write a single-channel raster as an 8-bit grayscale PNG.
pub fn save_gray_png(image: &GrayImage, destination: &Path) -> Result<()> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(image.as_raw(), width, height, ExtendedColorType::L8)
        .context("failed to encode grayscale PNG")?;
    write_bytes(destination, &bytes)
}

fn write_bytes(destination: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(destination, bytes)
        .with_context(|| format!("failed to write {}", destination.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_encoding_is_lossless() {
        let image = RgbaImage::from_fn(8, 4, |x, y| Rgba([x as u8 * 20, y as u8 * 40, 7, 200]));
        let encoded = encode_rgba(&image, ExportFormat::Png).expect("encode");
        assert_eq!(encoded.mime, "image/png");

        let decoded = image::load_from_memory(&encoded.bytes)
            .expect("decode")
            .to_rgba8();
        assert_eq!(decoded.as_raw(), image.as_raw());
    }

    #[test]
    fn jpeg_data_url_has_prefix() {
        let image = RgbaImage::from_pixel(16, 16, Rgba([120, 90, 60, 255]));
        let encoded = encode_rgba(&image, ExportFormat::Jpeg { quality: 90 }).expect("encode");
        assert!(encoded.data_url().starts_with("data:image/jpeg;base64,"));
        assert!(!encoded.bytes.is_empty());
    }

    #[test]
    fn format_from_path_uses_extension() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/frame.JPG"), 70),
            Some(ExportFormat::Jpeg { quality: 70 })
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("frame.png"), 70),
            Some(ExportFormat::Png)
        );
        assert_eq!(ExportFormat::from_path(Path::new("frame.bmp"), 70), None);
    }
}
