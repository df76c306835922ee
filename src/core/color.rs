use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Image has no pixels: {path}")]
    EmptyImage { path: String },
}

/// A color with each channel normalized to `[0, 1]`.
///
/// Serializes as a bare `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RgbColor(pub [f64; 3]);

impl RgbColor {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self([r, g, b])
    }

    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self(rgb.map(|c| c as f64 / 255.0))
    }

    pub fn channels(&self) -> [f64; 3] {
        self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    /// Back to 8-bit channels, rounding and clamping.
    pub fn to_rgb8(&self) -> [u8; 3] {
        self.0.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn distance_squared(&self, other: &RgbColor) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "R: {:.3} G: {:.3} B: {:.3}", r, g, b)
    }
}

impl From<[f64; 3]> for RgbColor {
    fn from(channels: [f64; 3]) -> Self {
        Self(channels)
    }
}

/// Turns an image file into one representative color.
pub trait ImageColorReducer: Sync {
    fn reduce(&self, path: &Path) -> Result<RgbColor, ReduceError>;
}

/// Arithmetic mean of every pixel's RGB channels.
///
/// Alpha is dropped, not composited against a background.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanColorReducer;

impl MeanColorReducer {
    pub fn new() -> Self {
        Self
    }

    pub fn mean_color(image: &image::RgbImage) -> Option<RgbColor> {
        let total_pixels = image.width() as u64 * image.height() as u64;
        if total_pixels == 0 {
            return None;
        }

        let mut sums = [0u64; 3];
        for pixel in image.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += channel as u64;
            }
        }

        Some(RgbColor(
            sums.map(|sum| sum as f64 / total_pixels as f64 / 255.0),
        ))
    }
}

impl ImageColorReducer for MeanColorReducer {
    fn reduce(&self, path: &Path) -> Result<RgbColor, ReduceError> {
        let path_str = path.to_string_lossy().to_string();
        let img = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| ReduceError::Io {
                path: path_str.clone(),
                source,
            })?
            .decode()
            .map_err(|source| ReduceError::Decode {
                path: path_str.clone(),
                source,
            })?;

        let rgb = img.to_rgb8();
        let color =
            Self::mean_color(&rgb).ok_or(ReduceError::EmptyImage { path: path_str })?;
        log::debug!("{} -> {}", path.display(), color);
        Ok(color)
    }
}
