//! Image files → grayscale sources and thresholds for the CLI.

use std::path::Path;

use image::{GrayImage, ImageReader, Luma};
use imageproc::contrast::otsu_level;
use log::debug;

use crate::error::ExtractError;
use crate::threshold::Threshold;
use crate::tile::PixelSource;

/// Load any image format `image` understands as 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<GrayImage, ExtractError> {
    let img = ImageReader::open(path)
        .map_err(|e| ExtractError::ImageLoad(format!("{}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| ExtractError::ImageLoad(format!("{}: {}", path.display(), e)))?
        .into_luma8();
    Ok(img)
}

/// Automatic foreground threshold by Otsu's method.
///
/// Selects values above the Otsu level, or at or below it when `invert`
/// is set (dark foreground on a light background).
pub fn otsu_threshold(image: &GrayImage, label: i32, invert: bool) -> Threshold {
    let level = otsu_level(image) as f64;
    debug!("Otsu level {}", level);
    if invert {
        Threshold::range(label, 0.0, level)
    } else {
        Threshold::above(label, level + 1.0)
    }
}

/// Distinct pixel values, ascending.
pub fn distinct_values(image: &GrayImage) -> Vec<u8> {
    let mut seen = [false; 256];
    for Luma([v]) in image.pixels() {
        seen[*v as usize] = true;
    }
    (0..=255u8).filter(|&v| seen[v as usize]).collect()
}

/// One exact threshold per non-zero pixel value of a classification image.
/// Zero is background.
pub fn label_thresholds(image: &GrayImage) -> Vec<Threshold> {
    distinct_values(image)
        .into_iter()
        .filter(|&v| v != 0)
        .map(|v| Threshold::exact(v as i32, v as f64))
        .collect()
}

/// Binary mask of the pixels `threshold` selects: 255 selected, 0 not.
pub fn selection_mask<S: PixelSource + ?Sized>(source: &S, threshold: &Threshold) -> GrayImage {
    GrayImage::from_fn(source.width(), source.height(), |x, y| {
        Luma([if threshold.selects(source.value(x, y)) { 255 } else { 0 }])
    })
}
