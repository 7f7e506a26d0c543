//! Immutable tuning values for border detection and enhancement.
//!
//! The defaults are the constants tuned for the survey card format. They are
//! passed by value into the pipeline; nothing here is global.

use crate::error::CardPrepError;

/// Thresholds and filter parameters used by the border detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Smallest accepted contour area as a fraction of the image area (inclusive).
    pub min_area_ratio: f64,
    /// Largest accepted contour area as a fraction of the image area (inclusive).
    pub max_area_ratio: f64,
    /// Exclusive lower bound on bounding-box `width / height`.
    pub min_aspect_ratio: f64,
    /// Exclusive upper bound on bounding-box `width / height`.
    pub max_aspect_ratio: f64,
    /// Margin added on every side of the winning bounding box.
    pub padding_px: u32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub polygon_epsilon_ratio: f64,
    /// Bilateral filter neighborhood diameter.
    pub bilateral_diameter: u32,
    /// Bilateral filter intensity sigma.
    pub bilateral_sigma_color: f32,
    /// Bilateral filter spatial sigma.
    pub bilateral_sigma_space: f32,
    /// Adaptive threshold neighborhood size (odd, >= 3).
    pub adaptive_block_size: u32,
    /// Constant subtracted from the local weighted mean.
    pub adaptive_offset: i16,
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
    /// Number of 3x3 dilation passes over the edge map.
    pub dilate_iterations: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.2,
            max_area_ratio: 0.95,
            min_aspect_ratio: 0.6,
            max_aspect_ratio: 1.5,
            padding_px: 5,
            polygon_epsilon_ratio: 0.02,
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            adaptive_block_size: 11,
            adaptive_offset: 2,
            canny_low: 30.0,
            canny_high: 150.0,
            dilate_iterations: 2,
        }
    }
}

impl DetectionConfig {
    /// Check that every bound is finite and ordered.
    pub fn validate(&self) -> Result<(), CardPrepError> {
        let ratios = [
            self.min_area_ratio,
            self.max_area_ratio,
            self.min_aspect_ratio,
            self.max_aspect_ratio,
            self.polygon_epsilon_ratio,
        ];
        if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(invalid("detection ratios must be finite and non-negative"));
        }
        if self.min_area_ratio > self.max_area_ratio {
            return Err(invalid("min_area_ratio exceeds max_area_ratio"));
        }
        if self.min_aspect_ratio >= self.max_aspect_ratio {
            return Err(invalid("min_aspect_ratio must be below max_aspect_ratio"));
        }
        if self.polygon_epsilon_ratio == 0.0 {
            return Err(invalid("polygon_epsilon_ratio must be > 0"));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(invalid("adaptive_block_size must be odd and >= 3"));
        }
        let floats = [
            self.bilateral_sigma_color,
            self.bilateral_sigma_space,
            self.canny_low,
            self.canny_high,
        ];
        if floats.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(invalid("filter sigmas and canny thresholds must be > 0"));
        }
        if self.canny_low > self.canny_high {
            return Err(invalid("canny_low exceeds canny_high"));
        }
        Ok(())
    }

    /// Gaussian sigma equivalent to the adaptive threshold block size,
    /// using the same kernel-size-to-sigma rule as OpenCV.
    pub(crate) fn adaptive_sigma(&self) -> f32 {
        0.3 * ((self.adaptive_block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

/// Photometric chain parameters, applied in field order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceConfig {
    /// Contrast factor; 1.0 leaves the image unchanged.
    pub contrast: f32,
    /// Sharpness factor; 1.0 leaves the image unchanged.
    pub sharpness: f32,
    /// Brightness factor; 1.0 leaves the image unchanged.
    pub brightness: f32,
    /// Gaussian radius of the unsharp mask.
    pub unsharp_radius: f32,
    /// Unsharp mask strength in percent.
    pub unsharp_percent: u32,
    /// Minimum per-channel difference (intensity levels) that gets sharpened.
    pub unsharp_threshold: u8,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            contrast: 1.3,
            sharpness: 1.5,
            brightness: 1.1,
            unsharp_radius: 1.0,
            unsharp_percent: 100,
            unsharp_threshold: 3,
        }
    }
}

impl EnhanceConfig {
    /// Check that the factors are finite and non-negative.
    pub fn validate(&self) -> Result<(), CardPrepError> {
        let factors = [self.contrast, self.sharpness, self.brightness];
        if factors.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(invalid("enhancement factors must be finite and non-negative"));
        }
        if !self.unsharp_radius.is_finite() || self.unsharp_radius <= 0.0 {
            return Err(invalid("unsharp_radius must be > 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> CardPrepError {
    CardPrepError::InvalidConfig(message.to_string())
}
