//! Card border detection.
//!
//! The detector runs an ordered chain of [`BorderStrategy`] implementations
//! over the grayscale frame and takes the first one that yields a card-like
//! contour. The default chain is [`AdaptiveThresholdStrategy`] followed by
//! [`EdgeContourStrategy`]. A strategy error is logged and treated the same
//! as "nothing found", so detection never fails the pipeline.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::crop::CropRegion;
use crate::snapshots::{names, Snapshots};

/// Smallest frame either strategy will look at.
const MIN_DETECTION_SIDE: u32 = 3;

/// Strategy-local failure. Never escapes [`BorderDetector::detect`].
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Either side is below the smallest frame the filters accept.
    #[error("image is too small for border detection: {0}x{1}")]
    ImageTooSmall(u32, u32),

    /// Any other strategy-specific failure.
    #[error("{0}")]
    Other(String),
}

/// A closed outline with the attributes used to judge whether it is the card.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourCandidate {
    /// Polygon area enclosed by the contour, in pixels².
    pub area: f64,
    /// Axis-aligned bounding box of the same contour.
    pub bounding_box: CropRegion,
    /// `width / height` of the bounding box; `None` when the height is zero.
    pub aspect_ratio: Option<f64>,
    /// Vertex count of the polygon approximation, when it was computed.
    pub corner_count: Option<usize>,
}

impl ContourCandidate {
    /// Build a candidate from an area and bounding box.
    pub fn new(area: f64, bounding_box: CropRegion) -> Self {
        let aspect_ratio = if bounding_box.height == 0 {
            None
        } else {
            Some(bounding_box.width as f64 / bounding_box.height as f64)
        };
        Self {
            area,
            bounding_box,
            aspect_ratio,
            corner_count: None,
        }
    }

    /// Derive area and bounding box from contour points. `None` for an empty contour.
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let bounding_box = CropRegion {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        };
        Some(Self::new(polygon_area(points), bounding_box))
    }

    /// Area within `[min_area_ratio, max_area_ratio]` of the image area.
    pub fn area_admits(&self, config: &DetectionConfig, image_area: f64) -> bool {
        self.area >= config.min_area_ratio * image_area
            && self.area <= config.max_area_ratio * image_area
    }

    /// Aspect ratio strictly inside `(min_aspect_ratio, max_aspect_ratio)`.
    /// An undefined aspect ratio never passes.
    pub fn aspect_admits(&self, config: &DetectionConfig) -> bool {
        match self.aspect_ratio {
            Some(ratio) => config.min_aspect_ratio < ratio && ratio < config.max_aspect_ratio,
            None => false,
        }
    }
}

/// Outcome of border detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// A card outline was found. `region` is padded and clamped to the frame.
    Detected {
        /// Padded, clamped crop region.
        region: CropRegion,
        /// [`BorderStrategy::name`] of the strategy that found it.
        strategy: &'static str,
        /// The winning contour before padding.
        candidate: ContourCandidate,
    },
    /// No strategy produced a confident candidate; use the whole frame.
    NotDetected,
}

impl Detection {
    /// The crop region, if a card was found.
    pub fn region(&self) -> Option<CropRegion> {
        match self {
            Self::Detected { region, .. } => Some(*region),
            Self::NotDetected => None,
        }
    }

    /// Whether a card was found.
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }
}

/// One way of finding the card outline in a grayscale frame.
///
/// Implement this to add a detection method and pass it to
/// [`BorderDetector::with_strategies`].
pub trait BorderStrategy: Send + Sync {
    /// Short stable identifier, reported in [`Detection::Detected`].
    fn name(&self) -> &'static str;

    /// Return the winning candidate, `Ok(None)` when nothing qualifies.
    fn locate(
        &self,
        gray: &GrayImage,
        config: &DetectionConfig,
        snapshots: &Snapshots,
    ) -> Result<Option<ContourCandidate>, DetectionError>;
}

/// Bilateral smoothing, inverted local-adaptive binarization, then outer
/// contours that approximate to a quadrilateral.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveThresholdStrategy;

impl AdaptiveThresholdStrategy {
    /// Reported as the `strategy` of a [`Detection::Detected`].
    pub const NAME: &'static str = "adaptive-threshold";
}

impl BorderStrategy for AdaptiveThresholdStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn locate(
        &self,
        gray: &GrayImage,
        config: &DetectionConfig,
        snapshots: &Snapshots,
    ) -> Result<Option<ContourCandidate>, DetectionError> {
        ensure_detectable(gray)?;

        let filtered = bilateral_filter(
            gray,
            config.bilateral_diameter,
            config.bilateral_sigma_color,
            config.bilateral_sigma_space,
        );
        snapshots.save_gray(names::FILTERED, &filtered);

        let binary = adaptive_threshold_inv(&filtered, config.adaptive_sigma(), config.adaptive_offset);
        snapshots.save_gray(names::THRESHOLD, &binary);

        let contours = outer_contours(&binary);
        let image_area = gray.width() as f64 * gray.height() as f64;

        let mut candidates = Vec::new();
        for contour in &contours {
            let Some(mut candidate) = ContourCandidate::from_points(&contour.points) else {
                continue;
            };
            if !candidate.area_admits(config, image_area) {
                continue;
            }
            let corners = polygon_corners(&contour.points, config.polygon_epsilon_ratio);
            candidate.corner_count = Some(corners);
            if corners != 4 || !candidate.aspect_admits(config) {
                continue;
            }
            candidates.push(candidate);
        }

        debug!(
            contours = contours.len(),
            quadrilaterals = candidates.len(),
            "adaptive threshold contour search"
        );
        Ok(select_largest(candidates))
    }
}

/// Canny edges and dilation to close gaps, then outer contours filtered by
/// area and aspect ratio only.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeContourStrategy;

impl EdgeContourStrategy {
    /// Reported as the `strategy` of a [`Detection::Detected`].
    pub const NAME: &'static str = "edge-contours";
}

impl BorderStrategy for EdgeContourStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn locate(
        &self,
        gray: &GrayImage,
        config: &DetectionConfig,
        snapshots: &Snapshots,
    ) -> Result<Option<ContourCandidate>, DetectionError> {
        ensure_detectable(gray)?;

        // canny smooths internally (sigma 1.4); no separate pre-blur.
        let edges = canny(gray, config.canny_low, config.canny_high);
        snapshots.save_gray(names::EDGES, &edges);

        let mut dilated = edges;
        for _ in 0..config.dilate_iterations {
            dilated = dilate(&dilated, Norm::LInf, 1);
        }
        snapshots.save_gray(names::DILATED, &dilated);

        let contours = outer_contours(&dilated);
        let image_area = gray.width() as f64 * gray.height() as f64;

        let candidates: Vec<ContourCandidate> = contours
            .iter()
            .filter_map(|contour| ContourCandidate::from_points(&contour.points))
            .filter(|candidate| candidate.area_admits(config, image_area))
            .filter(|candidate| candidate.aspect_admits(config))
            .collect();

        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            "edge contour search"
        );
        Ok(select_largest(candidates))
    }
}

/// Ordered chain of border strategies; the first success wins.
pub struct BorderDetector {
    config: DetectionConfig,
    strategies: Vec<Box<dyn BorderStrategy>>,
}

impl BorderDetector {
    /// Adaptive threshold first, edge contours as fallback.
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_strategies(
            config,
            vec![
                Box::new(AdaptiveThresholdStrategy),
                Box::new(EdgeContourStrategy),
            ],
        )
    }

    /// Use a caller-supplied chain, tried in order.
    pub fn with_strategies(config: DetectionConfig, strategies: Vec<Box<dyn BorderStrategy>>) -> Self {
        Self { config, strategies }
    }

    /// Thresholds shared by every strategy.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Locate the card. Always returns; a miss is [`Detection::NotDetected`].
    ///
    /// An invalid [`DetectionConfig`] is treated as a miss rather than
    /// handed to the filters.
    pub fn detect(&self, image: &RgbImage, snapshots: &Snapshots) -> Detection {
        let (width, height) = image.dimensions();
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "invalid detection config, using the full frame");
            return Detection::NotDetected;
        }

        let gray = to_gray(image);
        snapshots.save_gray(names::GRAY, &gray);

        for strategy in &self.strategies {
            match strategy.locate(&gray, &self.config, snapshots) {
                Ok(Some(candidate)) => {
                    let region =
                        CropRegion::padded(candidate.bounding_box, self.config.padding_px, width, height);
                    info!(
                        strategy = strategy.name(),
                        x = region.x,
                        y = region.y,
                        width = region.width,
                        height = region.height,
                        area_ratio = candidate.area / (width as f64 * height as f64),
                        "card border detected"
                    );
                    return Detection::Detected {
                        region,
                        strategy: strategy.name(),
                        candidate,
                    };
                }
                Ok(None) => debug!(strategy = strategy.name(), "no card-like contour"),
                Err(e) => warn!(strategy = strategy.name(), error = %e, "border strategy failed"),
            }
        }

        warn!(width, height, "no card border found, using the full frame");
        Detection::NotDetected
    }
}

impl Default for BorderDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

/// Rec. 601 luma, rounded to the nearest level.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([rec601_luma(image.get_pixel(x, y).0)])
    })
}

pub(crate) fn rec601_luma([r, g, b]: [u8; 3]) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

fn ensure_detectable(gray: &GrayImage) -> Result<(), DetectionError> {
    let (width, height) = gray.dimensions();
    if width < MIN_DETECTION_SIDE || height < MIN_DETECTION_SIDE {
        return Err(DetectionError::ImageTooSmall(width, height));
    }
    Ok(())
}

/// Keep the largest candidate by area.
pub(crate) fn select_largest(candidates: Vec<ContourCandidate>) -> Option<ContourCandidate> {
    candidates.into_iter().max_by(|a, b| {
        a.area
            .partial_cmp(&b.area)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Outer borders with no enclosing contour.
fn outer_contours(binary: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}

/// Shoelace area of the closed polygon through `points`.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Vertex count after Douglas-Peucker simplification of the closed contour
/// with a tolerance of `epsilon_ratio` × perimeter.
///
/// The contour is split at the point farthest from its start and each open
/// half is simplified separately; the two shared endpoints count once.
fn polygon_corners(points: &[Point<i32>], epsilon_ratio: f64) -> usize {
    if points.len() < 3 {
        return points.len();
    }
    let epsilon = arc_length(points, true) * epsilon_ratio;
    if !(epsilon > 0.0) {
        return points.len();
    }

    let start = points[0];
    let (far, _) = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (dx, dy) = ((p.x - start.x) as i64, (p.y - start.y) as i64);
            (i, dx * dx + dy * dy)
        })
        .max_by_key(|&(_, dist_sq)| dist_sq)
        .unwrap_or((0, 0));
    if far == 0 {
        return 1;
    }

    let outbound = &points[..=far];
    let inbound: Vec<Point<i32>> = points[far..]
        .iter()
        .copied()
        .chain(std::iter::once(start))
        .collect();

    let outbound = approximate_polygon_dp(outbound, epsilon, false);
    let inbound = approximate_polygon_dp(&inbound, epsilon, false);
    outbound.len() + inbound.len() - 2
}

/// Edge-preserving smoothing over a circular window of `diameter`.
fn bilateral_filter(image: &GrayImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let radius = (diameter / 2).max(1) as i64;

    let color_weights: Vec<f32> = (0..256)
        .map(|d| (-((d * d) as f32) / (2.0 * sigma_color * sigma_color)).exp())
        .collect();

    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > radius * radius {
                continue;
            }
            let weight = (-(dist_sq as f32) / (2.0 * sigma_space * sigma_space)).exp();
            window.push((dx, dy, weight));
        }
    }

    let src = image.as_raw();
    let (w, h) = (width as i64, height as i64);
    let mut output = GrayImage::new(width, height);

    for y in 0..h {
        for x in 0..w {
            let center = src[(y * w + x) as usize] as i32;
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for &(dx, dy, space_weight) in &window {
                let nx = (x + dx).clamp(0, w - 1);
                let ny = (y + dy).clamp(0, h - 1);
                let value = src[(ny * w + nx) as usize] as i32;
                let weight = space_weight * color_weights[(value - center).unsigned_abs() as usize];
                sum += value as f32 * weight;
                weight_sum += weight;
            }

            let filtered = (sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            output.put_pixel(x as u32, y as u32, Luma([filtered]));
        }
    }

    output
}

/// Inverted Gaussian-weighted adaptive threshold: a pixel is foreground
/// (255) when it is not brighter than its local mean minus `offset`.
fn adaptive_threshold_inv(image: &GrayImage, sigma: f32, offset: i16) -> GrayImage {
    let local_mean = gaussian_blur_f32(image, sigma);
    let mut output = GrayImage::new(image.width(), image.height());

    for ((src, mean), dst) in image
        .pixels()
        .zip(local_mean.pixels())
        .zip(output.pixels_mut())
    {
        let threshold = mean.0[0] as i16 - offset;
        *dst = if src.0[0] as i16 > threshold {
            Luma([0])
        } else {
            Luma([255])
        };
    }

    output
}
