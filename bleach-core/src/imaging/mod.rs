//! imaging — image file bridge
//!
//! Decoding sniffs the file content rather than trusting the extension.
//! Encoding follows the output extension; when the encoder rejects the
//! colour type (e.g. 16-bit or alpha into JPEG) the image is written as
//! 8-bit RGB instead.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageError, ImageReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decode the image at `path`.
pub fn load(path: &Path) -> Result<DynamicImage> {
    let image = ImageReader::open(path)
        .with_context(|| format!("could not open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("could not read {}", path.display()))?
        .decode()
        .with_context(|| format!("could not decode {}", path.display()))?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image"
    );
    Ok(image)
}

/// Encode `image` to `path`, format chosen by extension.
pub fn save(image: &DynamicImage, path: &Path) -> Result<()> {
    match image.save(path) {
        Ok(()) => Ok(()),
        Err(ImageError::Unsupported(reason)) => {
            debug!(
                path = %path.display(),
                %reason,
                "encoder rejected colour type; writing 8-bit rgb"
            );
            DynamicImage::ImageRgb8(image.to_rgb8())
                .save(path)
                .with_context(|| format!("could not write {}", path.display()))
        }
        Err(e) => Err(e).with_context(|| format!("could not write {}", path.display())),
    }
}

/// `<output_dir>/<basename of input>`.
pub fn output_path(output_dir: &Path, input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("input path has no file name: {}", input.display()))?;
    Ok(output_dir.join(name))
}
