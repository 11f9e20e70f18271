use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;

/// Load an image from disk and decode it to RGBA8.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_rgba_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path_ref = path.as_ref();
    let image = image::open(path_ref)
        .with_context(|| format!("failed to open image {}", path_ref.display()))?;
    anyhow::ensure!(
        image.width() > 0 && image.height() > 0,
        "image {} has zero dimensions",
        path_ref.display()
    );
    Ok(image.to_rgba8())
}
