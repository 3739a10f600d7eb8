//! Seams to the external decoder and classifier.
//!
//! The cache treats classifier outputs as opaque signals; it only maps them
//! onto record flags. Both traits are called from rayon workers.

use crate::config::MediaCacheConfig;
use crate::error::ExtractError;
use crate::feature::Feature;
use image::{DynamicImage, GrayImage};
use std::fs;
use std::path::Path;

/// Raw bytes plus the decoded image of one file.
pub struct DecodedMedia {
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

pub trait MediaDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedMedia, ExtractError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceSignals {
    pub face_count: u32,
    pub any_sad: bool,
    pub any_distracted: bool,
    pub any_sleeping: bool,
}

/// Signals produced for the requested features. `None` means the signal
/// was not requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierOutput {
    /// Higher is sharper.
    pub blur_score: Option<f64>,
    pub has_meme_text: Option<bool>,
    pub face_signals: Option<FaceSignals>,
    /// Mean luma, 0 to 255.
    pub mean_luminance: Option<f64>,
}

pub trait Classifier: Send + Sync {
    /// Features this classifier can produce signals for. Unsupported
    /// features are never scheduled.
    fn supports(&self, _feature: Feature) -> bool {
        true
    }

    fn classify(&self, image: &DynamicImage, features: &[Feature]) -> Result<ClassifierOutput, ExtractError>;
}

/// Reads the file and decodes it with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl MediaDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedMedia, ExtractError> {
        let display = path.to_string_lossy().into_owned();
        let bytes = fs::read(path).map_err(|source| ExtractError::Read {
            path: display.clone(),
            source,
        })?;
        let image = image::load_from_memory(&bytes).map_err(|source| ExtractError::Decode {
            path: display,
            source,
        })?;
        Ok(DecodedMedia { bytes, image })
    }
}

/// Pixel statistics only: sharpness for blur and mean luma for low light.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn supports(&self, feature: Feature) -> bool {
        matches!(feature, Feature::Blur | Feature::LowLight)
    }

    fn classify(&self, image: &DynamicImage, features: &[Feature]) -> Result<ClassifierOutput, ExtractError> {
        let gray = image.to_luma8();
        let mut output = ClassifierOutput::default();
        if features.contains(&Feature::Blur) {
            output.blur_score = Some(laplacian_variance(&gray));
        }
        if features.contains(&Feature::LowLight) {
            output.mean_luminance = Some(mean_luminance(&gray));
        }
        Ok(output)
    }
}

/// Variance of the 4-neighbour Laplacian response. Images smaller than 3x3
/// have no interior and score 0.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let response =
                4.0 * px(x, y) - px(x - 1, y) - px(x + 1, y) - px(x, y - 1) - px(x, y + 1);
            sum += response;
            sum_sq += response * response;
            count += 1.0;
        }
    }
    let mean = sum / count;
    sum_sq / count - mean * mean
}

pub fn mean_luminance(gray: &GrayImage) -> f64 {
    let total = gray.pixels().len();
    if total == 0 {
        return 0.0;
    }
    gray.pixels().map(|p| p[0] as f64).sum::<f64>() / total as f64
}

/// Thresholds mapping raw scores onto flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub blur: f64,
    pub low_light: f64,
}

impl From<&MediaCacheConfig> for Thresholds {
    fn from(config: &MediaCacheConfig) -> Self {
        Self {
            blur: config.blur_threshold,
            low_light: config.low_light_threshold,
        }
    }
}
