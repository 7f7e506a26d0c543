//! Photometric enhancement for text recognition.
//!
//! Each adjustment blends the image with a "degenerate" version of itself,
//! the way photo editors implement contrast/sharpness/brightness sliders:
//! `out = degenerate + factor × (image − degenerate)`.

use image::{Rgb, RgbImage};

use crate::border::rec601_luma;
use crate::config::EnhanceConfig;
use crate::snapshots::{names, Snapshots};

/// Contrast, sharpness, brightness, then unsharp mask, each feeding the next.
pub fn enhance(image: RgbImage, config: &EnhanceConfig, snapshots: &Snapshots) -> RgbImage {
    let image = adjust_contrast(&image, config.contrast);
    snapshots.save_rgb(names::CONTRAST, &image);

    let image = adjust_sharpness(&image, config.sharpness);
    snapshots.save_rgb(names::SHARPNESS, &image);

    let image = adjust_brightness(&image, config.brightness);
    let image = unsharp_mask(
        &image,
        config.unsharp_radius,
        config.unsharp_percent,
        config.unsharp_threshold,
    );
    snapshots.save_rgb(names::ENHANCED, &image);

    image
}

/// Blend against a flat gray at the image's mean luminance.
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luma(image);
    map_channels(image, |value| blend(mean, value as f32, factor))
}

/// Blend against a 3×3 smoothed copy. Border pixels are left as-is.
pub fn adjust_sharpness(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image.clone();
    }

    let mut output = image.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut smoothed = [0.0f32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                    let neighbor = image.get_pixel(x + dx - 1, y + dy - 1);
                    for (acc, value) in smoothed.iter_mut().zip(neighbor.0) {
                        *acc += weight * value as f32;
                    }
                }
            }
            let original = image.get_pixel(x, y).0;
            let pixel = std::array::from_fn(|c| blend(smoothed[c] / 13.0, original[c] as f32, factor));
            output.put_pixel(x, y, Rgb(pixel));
        }
    }
    output
}

/// Blend against black, i.e. scale every channel.
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    map_channels(image, |value| blend(0.0, value as f32, factor))
}

/// Add back `percent`% of the difference from a Gaussian blur of `radius`,
/// skipping channel differences smaller than `threshold`.
pub fn unsharp_mask(image: &RgbImage, radius: f32, percent: u32, threshold: u8) -> RgbImage {
    let blurred = image::imageops::blur(image, radius);
    let mut output = RgbImage::new(image.width(), image.height());

    for ((src, soft), dst) in image.pixels().zip(blurred.pixels()).zip(output.pixels_mut()) {
        *dst = Rgb(std::array::from_fn(|c| {
            let value = src.0[c] as i32;
            let diff = value - soft.0[c] as i32;
            if diff.unsigned_abs() < threshold as u32 {
                src.0[c]
            } else {
                (value + diff * percent as i32 / 100).clamp(0, 255) as u8
            }
        }));
    }
    output
}

/// Mean Rec. 601 luminance, rounded to a whole level.
fn mean_luma(image: &RgbImage) -> f32 {
    let pixel_count = image.width() as u64 * image.height() as u64;
    if pixel_count == 0 {
        return 0.0;
    }
    let total: u64 = image
        .pixels()
        .map(|p| rec601_luma(p.0) as u64)
        .sum();
    (total as f64 / pixel_count as f64).round() as f32
}

fn blend(degenerate: f32, value: f32, factor: f32) -> u8 {
    (degenerate + factor * (value - degenerate)).round().clamp(0.0, 255.0) as u8
}

fn map_channels(image: &RgbImage, f: impl Fn(u8) -> u8) -> RgbImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = f(*channel);
        }
    }
    output
}
