//! Image preprocessing for OCR.

use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::PreprocessConfig;

use super::ImageStage;

/// Grayscale, downscale and Otsu binarization of receipt photos.
pub struct ImagePreprocessor {
    /// Maximum image dimension.
    max_size: u32,
    /// Whether to binarize at all.
    enabled: bool,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            max_size: config.max_image_size,
            enabled: config.enabled,
        }
    }

    /// Set maximum image dimension.
    pub fn with_max_size(mut self, size: u32) -> Self {
        self.max_size = size;
        self
    }

    /// Turn a photo into a black-and-white page.
    pub fn binarize(&self, image: &DynamicImage) -> Result<GrayImage, OcrError> {
        let (orig_width, orig_height) = image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(OcrError::InvalidImage(format!(
                "empty image ({orig_width}x{orig_height})"
            )));
        }

        let (new_width, new_height) =
            calculate_resize_dimensions(orig_width, orig_height, self.max_size);
        let resized = if (new_width, new_height) == (orig_width, orig_height) {
            image.clone()
        } else {
            debug!(
                "Resizing {}x{} to {}x{}",
                orig_width, orig_height, new_width, new_height
            );
            image.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle)
        };

        let mut gray = resized.to_luma8();
        if !self.enabled {
            return Ok(gray);
        }

        let threshold = otsu_threshold(&gray);
        debug!(threshold, "Applying Otsu threshold");
        for pixel in gray.pixels_mut() {
            *pixel = Luma([if pixel[0] > threshold { 255 } else { 0 }]);
        }
        Ok(gray)
    }
}

impl ImageStage for ImagePreprocessor {
    fn prepare(&self, image: &DynamicImage) -> Result<DynamicImage, OcrError> {
        self.binarize(image).map(DynamicImage::ImageLuma8)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn calculate_resize_dimensions(width: u32, height: u32, target_size: u32) -> (u32, u32) {
    let max_dim = width.max(height);

    if target_size == 0 || max_dim <= target_size {
        return (width, height);
    }

    let scale = target_size as f32 / max_dim as f32;
    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;

    (new_width.max(1), new_height.max(1))
}

/// Global threshold maximizing between-class variance of the histogram.
///
/// Pixels strictly above the threshold are foreground.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best = (0u8, -1.0f64);
    let mut background = 0u64;
    let mut background_sum = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        background += count;
        if background == 0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0 {
            break;
        }
        background_sum += level as f64 * count as f64;

        let mean_bg = background_sum / background as f64;
        let mean_fg = (weighted_total - background_sum) / foreground as f64;
        let variance = background as f64 * foreground as f64 * (mean_bg - mean_fg).powi(2);

        if variance > best.1 {
            best = (level as u8, variance);
        }
    }

    best.0
}
