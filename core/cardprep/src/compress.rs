//! Resizing, JPEG encoding, and the end-to-end pipeline.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageEncoder, RgbImage};
use tracing::{debug, warn};

use crate::border::BorderDetector;
use crate::config::EnhanceConfig;
use crate::crop::{crop_image, CropRegion};
use crate::enhance::enhance;
use crate::error::CardPrepError;
use crate::load::{self, HeifDecoder, MediaType};
use crate::snapshots::{names, Snapshots};
use crate::{CropMode, OutputPolicy, ProcessedCard};

/// First quality tried by the byte-budget ladder.
pub const BUDGET_START_QUALITY: u8 = 85;

/// Quality decrement between byte-budget attempts.
pub const BUDGET_QUALITY_STEP: u8 = 10;

/// Lowest quality the byte-budget ladder will use.
pub const BUDGET_MIN_QUALITY: u8 = 30;

/// A JPEG encoding and the quality that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedJpeg {
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Quality passed to the encoder.
    pub quality: u8,
}

/// Downscale so the longest side equals `max_dimension`, preserving aspect
/// ratio. Images already within the limit are returned untouched.
pub fn resize_to_fit(image: RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_dimension {
        return image;
    }

    let (new_width, new_height) = scaled_dimensions(width, height, max_dimension);
    debug!(width, height, new_width, new_height, "downscaling");
    image::imageops::resize(&image, new_width, new_height, FilterType::Lanczos3)
}

/// Scale both sides by `max_dimension / longest`, truncating to whole
/// pixels (never below 1).
pub(crate) fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height).max(1) as u64;
    let scale = |side: u32| ((side as u64 * max_dimension as u64) / longest).max(1) as u32;
    (scale(width), scale(height))
}

/// Encode as baseline JPEG at `quality` (1–100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CardPrepError> {
    if quality == 0 || quality > 100 {
        return Err(CardPrepError::InvalidQuality(quality));
    }

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CardPrepError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

/// Qualities tried under a byte budget: 85, 75, … then the floor of 30.
pub fn budget_quality_ladder() -> Vec<u8> {
    let mut ladder: Vec<u8> = (BUDGET_MIN_QUALITY..=BUDGET_START_QUALITY)
        .rev()
        .step_by(BUDGET_QUALITY_STEP as usize)
        .collect();
    if ladder.last() != Some(&BUDGET_MIN_QUALITY) {
        ladder.push(BUDGET_MIN_QUALITY);
    }
    ladder
}

/// Walk the quality ladder and return the first encoding that fits in
/// `max_bytes`. When none fits, the smallest attempt is returned; the
/// caller sees the overrun only through its length.
pub fn encode_within_budget(image: &RgbImage, max_bytes: usize) -> Result<EncodedJpeg, CardPrepError> {
    let mut smallest: Option<EncodedJpeg> = None;

    for quality in budget_quality_ladder() {
        let data = encode_jpeg(image, quality)?;
        debug!(quality, bytes = data.len(), max_bytes, "budget encode attempt");

        if data.len() <= max_bytes {
            return Ok(EncodedJpeg { data, quality });
        }
        if smallest.as_ref().map_or(true, |best| data.len() < best.data.len()) {
            smallest = Some(EncodedJpeg { data, quality });
        }
    }

    let smallest = smallest.ok_or_else(|| CardPrepError::EncodeError("empty quality ladder".into()))?;
    warn!(
        bytes = smallest.data.len(),
        max_bytes,
        quality = smallest.quality,
        "byte budget not reached at minimum quality"
    );
    Ok(smallest)
}

/// Enhance (optionally), resize, and encode an already-cropped card.
pub fn finish_card(
    image: RgbImage,
    enhance_config: Option<&EnhanceConfig>,
    max_dimension: u32,
    policy: OutputPolicy,
    snapshots: &Snapshots,
) -> Result<(EncodedJpeg, u32, u32), CardPrepError> {
    let image = match enhance_config {
        Some(config) => enhance(image, config, snapshots),
        None => image,
    };
    let image = resize_to_fit(image, max_dimension);
    let (width, height) = image.dimensions();

    let encoded = match policy {
        OutputPolicy::Fixed { quality } => EncodedJpeg {
            data: encode_jpeg(&image, quality)?,
            quality,
        },
        OutputPolicy::ByteBudget { max_bytes } => encode_within_budget(&image, max_bytes)?,
    };
    Ok((encoded, width, height))
}

/// Everything the pipeline needs besides the input bytes.
pub(crate) struct PipelineSettings<'a> {
    pub media_type: MediaType,
    pub max_dimension: u32,
    pub crop_mode: &'a CropMode,
    pub enhance: Option<&'a EnhanceConfig>,
    pub policy: OutputPolicy,
    pub detector: &'a BorderDetector,
    pub heif_decoder: Option<&'a dyn HeifDecoder>,
    pub snapshots: &'a Snapshots,
}

/// Full pipeline: decode → detect → crop → enhance → resize → encode.
pub(crate) fn process_pipeline(
    input: &[u8],
    settings: &PipelineSettings<'_>,
) -> Result<ProcessedCard, CardPrepError> {
    let decoded = load::decode(input, settings.media_type, settings.heif_decoder)?;
    settings.snapshots.save_rgb(names::LOADED, &decoded);
    let (source_width, source_height) = decoded.dimensions();

    let detection = match settings.crop_mode {
        CropMode::BorderDetection => Some(settings.detector.detect(&decoded, settings.snapshots)),
        CropMode::None => None,
    };
    let crop_region = detection
        .as_ref()
        .and_then(|d| d.region())
        .unwrap_or(CropRegion::full(source_width, source_height));

    let cropped = crop_image(&decoded, crop_region);
    settings.snapshots.save_rgb(names::CROPPED, &cropped);

    let (encoded, width, height) = finish_card(
        cropped,
        settings.enhance,
        settings.max_dimension,
        settings.policy,
        settings.snapshots,
    )?;

    debug!(
        width,
        height,
        bytes = encoded.data.len(),
        quality = encoded.quality,
        "card processed"
    );

    Ok(ProcessedCard {
        data: encoded.data,
        media_type: MediaType::Jpeg,
        width,
        height,
        original_size: input.len(),
        crop_region,
        detection,
        quality_used: encoded.quality,
    })
}
