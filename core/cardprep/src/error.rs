use thiserror::Error;

/// Errors that can occur while preprocessing a card photo.
#[derive(Debug, Error)]
pub enum CardPrepError {
    /// The input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// The input format is not supported, or HEIC arrived without a decoder.
    #[error("unsupported image format")]
    UnsupportedFormat,

    /// The decoded image has zero width or height.
    #[error("image dimensions are zero")]
    ZeroDimensions,

    /// JPEG encoding failed.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// Quality is outside 1–100.
    #[error("quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    /// Max dimension is zero.
    #[error("max dimension must be > 0")]
    InvalidMaxDimension,

    /// A detection, enhancement, or budget setting is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
