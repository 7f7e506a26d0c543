//! Survey card photo preprocessing: find the card in a phone photo, crop to
//! it, enhance for text recognition, and normalize size and encoding.
//!
//! # Example
//!
//! ```no_run
//! use cardprep::{CardPreprocessor, Preset};
//!
//! let raw_bytes = std::fs::read("card.jpg").unwrap();
//! let result = CardPreprocessor::new(raw_bytes)
//!     .unwrap()
//!     .preset(Preset::Archival)
//!     .process()
//!     .unwrap();
//! println!(
//!     "{}x{} JPEG, {} bytes, detected: {:?}",
//!     result.width,
//!     result.height,
//!     result.data.len(),
//!     result.detection.as_ref().map(|d| d.is_detected()),
//! );
//! ```
#![warn(missing_docs)]

pub mod border;
pub mod compress;
pub mod config;
pub mod crop;
pub mod enhance;
mod error;
pub mod load;
pub mod snapshots;

use std::path::PathBuf;

pub use border::{BorderDetector, BorderStrategy, ContourCandidate, Detection};
pub use config::{DetectionConfig, EnhanceConfig};
pub use crop::CropRegion;
/// Error type returned by cardprep operations.
pub use error::CardPrepError;
pub use load::{HeifDecoder, MediaType};
pub use snapshots::Snapshots;

/// Default longest side of the output, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 1600;

/// JPEG quality of archival output.
pub const ARCHIVAL_QUALITY: u8 = 95;

/// Byte budget for thumbnail output.
pub const THUMBNAIL_MAX_BYTES: usize = 300 * 1024;

/// Whether to look for the card before cropping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CropMode {
    /// Run the border detector; fall back to the full frame on a miss.
    #[default]
    BorderDetection,

    /// Keep the full frame.
    None,
}

/// How the final JPEG quality is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Single encode at a fixed quality (1–100).
    Fixed {
        /// JPEG quality.
        quality: u8,
    },

    /// Step quality down from 85 until the encoding fits.
    ByteBudget {
        /// Upper bound on the encoded size.
        max_bytes: usize,
    },
}

/// Result of processing one card photo.
#[derive(Debug, Clone)]
pub struct ProcessedCard {
    /// The encoded output bytes.
    pub data: Vec<u8>,

    /// Encoding of `data`. Always JPEG.
    pub media_type: MediaType,

    /// Width of the output image in pixels.
    pub width: u32,

    /// Height of the output image in pixels.
    pub height: u32,

    /// Size of the original input in bytes.
    pub original_size: usize,

    /// Region of the upright source image that was kept.
    pub crop_region: CropRegion,

    /// Border detection outcome; `None` when detection was not requested.
    pub detection: Option<Detection>,

    /// JPEG quality of `data`.
    pub quality_used: u8,
}

/// Pre-configured settings for the two card outputs.
///
/// A preset sets every parameter; apply it first, then override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Full-resolution copy for text recognition.
    ///
    /// - Border detection crop
    /// - Contrast, sharpness, brightness, and unsharp enhancement
    /// - 1600px longest side
    /// - JPEG at quality 95
    Archival,

    /// Small preview for listings.
    ///
    /// - No crop, no enhancement
    /// - 1600px longest side
    /// - JPEG stepped down from quality 85 until under 300 KB
    Thumbnail,
}

/// Builder for preprocessing a card photo.
///
/// Sniffs the input encoding on construction, then runs detection, crop,
/// enhancement, resize, and encoding with configurable parameters.
pub struct CardPreprocessor {
    input: Vec<u8>,
    media_type: MediaType,
    max_dimension: u32,
    crop_mode: CropMode,
    enhance: bool,
    policy: OutputPolicy,
    detection_config: DetectionConfig,
    enhance_config: EnhanceConfig,
    /// Custom detection chain. When `None`, the default chain is built from
    /// `detection_config`.
    strategies: Option<Vec<Box<dyn BorderStrategy>>>,
    heif_decoder: Option<Box<dyn HeifDecoder>>,
    snapshots: Snapshots,
}

impl CardPreprocessor {
    /// Create a preprocessor from raw image bytes (JPEG, PNG, WebP, or HEIC).
    ///
    /// Starts from [`Preset::Archival`].
    pub fn new(input: Vec<u8>) -> Result<Self, CardPrepError> {
        let media_type = MediaType::sniff(&input)?;

        Ok(Self {
            input,
            media_type,
            max_dimension: DEFAULT_MAX_DIMENSION,
            crop_mode: CropMode::BorderDetection,
            enhance: true,
            policy: OutputPolicy::Fixed {
                quality: ARCHIVAL_QUALITY,
            },
            detection_config: DetectionConfig::default(),
            enhance_config: EnhanceConfig::default(),
            strategies: None,
            heif_decoder: None,
            snapshots: Snapshots::disabled(),
        })
    }

    /// Apply a preset configuration. Individual settings can be overridden
    /// after this call.
    ///
    /// ```no_run
    /// use cardprep::{CardPreprocessor, Preset};
    ///
    /// let bytes = std::fs::read("card.heic").unwrap();
    ///
    /// let archival = CardPreprocessor::new(bytes.clone()).unwrap()
    ///     .preset(Preset::Archival)
    ///     .process().unwrap();
    ///
    /// let thumbnail = CardPreprocessor::new(bytes).unwrap()
    ///     .preset(Preset::Thumbnail)
    ///     .process().unwrap();
    /// ```
    pub fn preset(mut self, preset: Preset) -> Self {
        match preset {
            Preset::Archival => {
                self.max_dimension = DEFAULT_MAX_DIMENSION;
                self.crop_mode = CropMode::BorderDetection;
                self.enhance = true;
                self.policy = OutputPolicy::Fixed {
                    quality: ARCHIVAL_QUALITY,
                };
            }
            Preset::Thumbnail => {
                self.max_dimension = DEFAULT_MAX_DIMENSION;
                self.crop_mode = CropMode::None;
                self.enhance = false;
                self.policy = OutputPolicy::ByteBudget {
                    max_bytes: THUMBNAIL_MAX_BYTES,
                };
            }
        }
        self
    }

    /// Override the sniffed media type with the one declared by the caller.
    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    /// Provide a decoder for HEIC/HEIF input.
    pub fn heif_decoder(mut self, decoder: Box<dyn HeifDecoder>) -> Self {
        self.heif_decoder = Some(decoder);
        self
    }

    /// Set the longest output side in pixels (default: 1600). Smaller
    /// images are never upscaled.
    pub fn max_dimension(mut self, dimension: u32) -> Self {
        self.max_dimension = dimension;
        self
    }

    /// Set the crop mode (default: `CropMode::BorderDetection`).
    pub fn crop_mode(mut self, mode: CropMode) -> Self {
        self.crop_mode = mode;
        self
    }

    /// Enable or disable OCR enhancement (default: true).
    pub fn enhance(mut self, enable: bool) -> Self {
        self.enhance = enable;
        self
    }

    /// Set how the JPEG quality is chosen.
    pub fn output_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the border detection thresholds.
    pub fn detection_config(mut self, config: DetectionConfig) -> Self {
        self.detection_config = config;
        self
    }

    /// Replace the enhancement factors.
    pub fn enhance_config(mut self, config: EnhanceConfig) -> Self {
        self.enhance_config = config;
        self
    }

    /// Replace the detection chain. Strategies run in order and the first
    /// candidate wins.
    ///
    /// ```no_run
    /// use cardprep::{BorderStrategy, CardPreprocessor, ContourCandidate, DetectionConfig, Snapshots};
    /// use cardprep::border::{DetectionError, EdgeContourStrategy};
    /// use image::GrayImage;
    ///
    /// struct MarkerStrategy;
    /// impl BorderStrategy for MarkerStrategy {
    ///     fn name(&self) -> &'static str { "fiducial-markers" }
    ///     fn locate(
    ///         &self,
    ///         gray: &GrayImage,
    ///         config: &DetectionConfig,
    ///         snapshots: &Snapshots,
    ///     ) -> Result<Option<ContourCandidate>, DetectionError> {
    ///         // Your detection logic here
    ///         Ok(None)
    ///     }
    /// }
    ///
    /// let bytes = std::fs::read("card.jpg").unwrap();
    /// let result = CardPreprocessor::new(bytes).unwrap()
    ///     .border_strategies(vec![Box::new(MarkerStrategy), Box::new(EdgeContourStrategy)])
    ///     .process().unwrap();
    /// ```
    pub fn border_strategies(mut self, strategies: Vec<Box<dyn BorderStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Write every intermediate stage image into `dir`.
    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshots = Snapshots::to_dir(dir);
        self
    }

    /// Run the pipeline with the configured settings.
    pub fn process(self) -> Result<ProcessedCard, CardPrepError> {
        if self.max_dimension == 0 {
            return Err(CardPrepError::InvalidMaxDimension);
        }
        match self.policy {
            OutputPolicy::Fixed { quality } if quality == 0 || quality > 100 => {
                return Err(CardPrepError::InvalidQuality(quality));
            }
            OutputPolicy::ByteBudget { max_bytes: 0 } => {
                return Err(CardPrepError::InvalidConfig(
                    "byte budget must be > 0".into(),
                ));
            }
            _ => {}
        }
        self.detection_config.validate()?;
        if self.enhance {
            self.enhance_config.validate()?;
        }

        let detector = match self.strategies {
            Some(strategies) => BorderDetector::with_strategies(self.detection_config, strategies),
            None => BorderDetector::new(self.detection_config),
        };

        compress::process_pipeline(
            &self.input,
            &compress::PipelineSettings {
                media_type: self.media_type,
                max_dimension: self.max_dimension,
                crop_mode: &self.crop_mode,
                enhance: self.enhance.then_some(&self.enhance_config),
                policy: self.policy,
                detector: &detector,
                heif_decoder: self.heif_decoder.as_deref(),
                snapshots: &self.snapshots,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_png(width: u32, height: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;
        use image::ImageEncoder;
        use image::RgbImage;

        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    #[test]
    fn builder_defaults() {
        let png = make_test_png(200, 300);
        let result = CardPreprocessor::new(png).unwrap().process().unwrap();
        assert_eq!(&result.data[0..2], &[0xFF, 0xD8]);
        assert_eq!(result.media_type, MediaType::Jpeg);
        assert_eq!(result.quality_used, ARCHIVAL_QUALITY);
        assert!(result.detection.is_some());
        assert!(result.width <= 200);
        assert!(result.height <= 300);
    }

    #[test]
    fn builder_sniffs_media_type() {
        let png = make_test_png(10, 10);
        let builder = CardPreprocessor::new(png).unwrap();
        assert_eq!(builder.media_type, MediaType::Png);
    }

    #[test]
    fn builder_with_no_crop() {
        let png = make_test_png(200, 300);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .crop_mode(CropMode::None)
            .max_dimension(64)
            .process()
            .unwrap();
        // 200x300 → longest side 64: width = 200 × 64 / 300 = 42.67 → 42
        assert_eq!(result.height, 64);
        assert_eq!(result.width, 42);
        assert!(result.detection.is_none());
        assert_eq!(result.crop_region, CropRegion::full(200, 300));
    }

    #[test]
    fn builder_invalid_quality_high() {
        let png = make_test_png(100, 100);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .output_policy(OutputPolicy::Fixed { quality: 101 })
            .process();
        assert!(matches!(result, Err(CardPrepError::InvalidQuality(101))));
    }

    #[test]
    fn builder_invalid_quality_zero() {
        let png = make_test_png(100, 100);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .output_policy(OutputPolicy::Fixed { quality: 0 })
            .process();
        assert!(matches!(result, Err(CardPrepError::InvalidQuality(0))));
    }

    #[test]
    fn builder_zero_budget() {
        let png = make_test_png(100, 100);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .output_policy(OutputPolicy::ByteBudget { max_bytes: 0 })
            .process();
        assert!(matches!(result, Err(CardPrepError::InvalidConfig(_))));
    }

    #[test]
    fn builder_zero_max_dimension() {
        let png = make_test_png(100, 100);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .max_dimension(0)
            .process();
        assert!(matches!(result, Err(CardPrepError::InvalidMaxDimension)));
    }

    #[test]
    fn builder_invalid_detection_config() {
        let png = make_test_png(100, 100);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .detection_config(DetectionConfig {
                adaptive_block_size: 10,
                ..DetectionConfig::default()
            })
            .process();
        assert!(matches!(result, Err(CardPrepError::InvalidConfig(_))));
    }

    #[test]
    fn builder_invalid_input() {
        let result = CardPreprocessor::new(b"not an image".to_vec());
        assert!(result.is_err());
    }

    #[test]
    fn original_size_is_preserved() {
        let png = make_test_png(200, 300);
        let original_len = png.len();
        let result = CardPreprocessor::new(png).unwrap().process().unwrap();
        assert_eq!(result.original_size, original_len);
    }

    #[test]
    fn preset_thumbnail() {
        let png = make_test_png(200, 300);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .preset(Preset::Thumbnail)
            .process()
            .unwrap();
        assert!(result.detection.is_none());
        assert_eq!((result.width, result.height), (200, 300));
        assert!(result.data.len() <= THUMBNAIL_MAX_BYTES);
        assert_eq!(result.quality_used, compress::BUDGET_START_QUALITY);
    }

    #[test]
    fn preset_can_be_overridden() {
        let png = make_test_png(400, 300);
        let result = CardPreprocessor::new(png)
            .unwrap()
            .preset(Preset::Thumbnail)
            .max_dimension(100)
            .output_policy(OutputPolicy::Fixed { quality: 70 })
            .process()
            .unwrap();
        assert_eq!((result.width, result.height), (100, 75));
        assert_eq!(result.quality_used, 70);
        // Still no crop from the preset
        assert!(result.detection.is_none());
    }

    #[test]
    fn enhancement_changes_output() {
        let png = make_test_png(120, 90);
        let plain = CardPreprocessor::new(png.clone())
            .unwrap()
            .crop_mode(CropMode::None)
            .enhance(false)
            .process()
            .unwrap();
        let enhanced = CardPreprocessor::new(png)
            .unwrap()
            .crop_mode(CropMode::None)
            .process()
            .unwrap();
        assert_ne!(plain.data, enhanced.data);
    }

    #[test]
    fn processing_is_deterministic() {
        let png = make_test_png(160, 120);
        let first = CardPreprocessor::new(png.clone()).unwrap().process().unwrap();
        let second = CardPreprocessor::new(png).unwrap().process().unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(first.crop_region, second.crop_region);
    }
}
