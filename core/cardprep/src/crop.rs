//! Crop regions and the cropper.

use image::RgbImage;
use tracing::warn;

/// Axis-aligned rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRegion {
    /// The whole `width` × `height` frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Grow `bbox` by `padding` on each side, then clamp to the image.
    ///
    /// The origin is clamped first and the size is grown by the full
    /// `2 × padding` before being clamped against the remaining extent.
    pub fn padded(bbox: CropRegion, padding: u32, image_width: u32, image_height: u32) -> Self {
        let x = bbox.x.saturating_sub(padding).min(image_width);
        let y = bbox.y.saturating_sub(padding).min(image_height);
        let width = bbox
            .width
            .saturating_add(padding.saturating_mul(2))
            .min(image_width - x);
        let height = bbox
            .height
            .saturating_add(padding.saturating_mul(2))
            .min(image_height - y);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip to `[0, image_width] × [0, image_height]`.
    pub fn clamp_to(self, image_width: u32, image_height: u32) -> Self {
        let x = self.x.min(image_width);
        let y = self.y.min(image_height);
        Self {
            x,
            y,
            width: self.width.min(image_width - x),
            height: self.height.min(image_height - y),
        }
    }

    /// Whether the region lies entirely inside the image.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }

    /// Pixel count.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Copy out the pixels inside `region`, clamped to the image bounds.
///
/// A region that clamps to zero width or height cannot be cropped; the
/// full frame is returned instead and a warning is logged.
pub fn crop_image(image: &RgbImage, region: CropRegion) -> RgbImage {
    let (width, height) = image.dimensions();
    let clamped = region.clamp_to(width, height);

    if clamped.width == 0 || clamped.height == 0 {
        warn!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "crop region is empty inside the image, keeping the full frame"
        );
        return image.clone();
    }
    if clamped == CropRegion::full(width, height) {
        return image.clone();
    }

    image::imageops::crop_imm(image, clamped.x, clamped.y, clamped.width, clamped.height).to_image()
}
