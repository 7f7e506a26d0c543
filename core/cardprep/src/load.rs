//! Image loading: media-type detection, decoding, EXIF orientation, and
//! normalization to 8-bit RGB.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::CardPrepError;

/// HEIF brands written by phone cameras in the `ftyp` box.
const HEIF_BRANDS: [&[u8; 4]; 8] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// Input encodings accepted by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// JPEG / JFIF.
    Jpeg,
    /// PNG.
    Png,
    /// WebP (lossy or lossless).
    Webp,
    /// HEIC/HEIF camera output. Decoding requires a [`HeifDecoder`].
    Heic,
}

impl MediaType {
    /// Parse a MIME type such as `image/jpeg`. Parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                Some(Self::Heic)
            }
            _ => None,
        }
    }

    /// The canonical MIME type string.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Heic => "image/heic",
        }
    }

    /// Detect the media type from the leading bytes of the payload.
    pub fn sniff(input: &[u8]) -> Result<Self, CardPrepError> {
        if is_heif(input) {
            return Ok(Self::Heic);
        }
        match image::guess_format(input) {
            Ok(ImageFormat::Jpeg) => Ok(Self::Jpeg),
            Ok(ImageFormat::Png) => Ok(Self::Png),
            Ok(ImageFormat::WebP) => Ok(Self::Webp),
            Ok(_) => Err(CardPrepError::UnsupportedFormat),
            Err(e) => Err(CardPrepError::DecodeError(e.to_string())),
        }
    }
}

fn is_heif(input: &[u8]) -> bool {
    input.len() >= 12 && &input[4..8] == b"ftyp" && HEIF_BRANDS.iter().any(|b| &input[8..12] == *b)
}

/// Decoding shim for camera-native HEIC/HEIF payloads.
///
/// The `image` crate has no HEIF support, so callers that receive HEIC
/// photos provide a decoder backed by libheif or a platform codec. The
/// returned image does not need orientation applied; the loader reads the
/// EXIF orientation from the container itself.
pub trait HeifDecoder: Send + Sync {
    /// Decode a complete HEIF file.
    fn decode(&self, input: &[u8]) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>>;
}

/// Decode `input` into an upright, three-channel RGB buffer.
pub fn decode(
    input: &[u8],
    media_type: MediaType,
    heif_decoder: Option<&dyn HeifDecoder>,
) -> Result<RgbImage, CardPrepError> {
    let image = match media_type {
        MediaType::Heic => heif_decoder
            .ok_or(CardPrepError::UnsupportedFormat)?
            .decode(input)
            .map_err(|e| CardPrepError::DecodeError(e.to_string()))?,
        _ => image::load_from_memory(input).map_err(|e| CardPrepError::DecodeError(e.to_string()))?,
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(CardPrepError::ZeroDimensions);
    }

    let orientation = read_exif_orientation(input);
    debug!(
        width = image.width(),
        height = image.height(),
        orientation,
        media_type = media_type.mime(),
        "decoded input image"
    );

    Ok(to_rgb(&apply_orientation(image, orientation)))
}

/// Read the EXIF orientation tag. Returns 1 (upright) when absent.
pub fn read_exif_orientation(input: &[u8]) -> u32 {
    let mut cursor = Cursor::new(input);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(_) => return 1,
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

/// Rotate/flip so that pixel coordinates match the scene as photographed.
///
/// 1 = upright, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Normalize any color model to 8-bit RGB, compositing alpha over white.
pub(crate) fn to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([over_white(r), over_white(g), over_white(b)]));
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, Rgb, Rgba};

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    /// Baseline JPEG with an APP1 Exif segment carrying `orientation`.
    fn jpeg_with_orientation(img: &RgbImage, orientation: u16) -> Vec<u8> {
        let mut plain = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut plain, 90)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
            .unwrap();

        // Big-endian TIFF header, one IFD entry: Orientation (0x0112), SHORT, count 1.
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\0\x2a");
        tiff.extend_from_slice(&8u32.to_be_bytes());
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());

        let mut app1 = vec![0xFF, 0xE1];
        app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&tiff);

        let mut jpeg = plain[..2].to_vec();
        jpeg.extend_from_slice(&app1);
        jpeg.extend_from_slice(&plain[2..]);
        jpeg
    }

    fn heic_header() -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0; 12]);
        bytes
    }

    struct SolidHeif;

    impl HeifDecoder for SolidHeif {
        fn decode(
            &self,
            _input: &[u8],
        ) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]))))
        }
    }

    struct BrokenHeif;

    impl HeifDecoder for BrokenHeif {
        fn decode(
            &self,
            _input: &[u8],
        ) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
            Err("truncated hvcC box".into())
        }
    }

    #[test]
    fn mime_parsing() {
        assert_eq!(MediaType::from_mime("image/jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("IMAGE/JPG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("image/png; charset=binary"), Some(MediaType::Png));
        assert_eq!(MediaType::from_mime("image/heif"), Some(MediaType::Heic));
        assert_eq!(MediaType::from_mime("application/pdf"), None);
        assert_eq!(MediaType::Heic.mime(), "image/heic");
    }

    #[test]
    fn sniff_png() {
        let png = png_bytes(&RgbImage::new(4, 4));
        assert_eq!(MediaType::sniff(&png).unwrap(), MediaType::Png);
    }

    #[test]
    fn sniff_heic_brand() {
        assert_eq!(MediaType::sniff(&heic_header()).unwrap(), MediaType::Heic);
    }

    #[test]
    fn sniff_garbage_fails() {
        assert!(MediaType::sniff(b"definitely not an image").is_err());
    }

    #[test]
    fn decode_invalid_bytes_is_decode_error() {
        let result = decode(b"not an image", MediaType::Jpeg, None);
        assert!(matches!(result, Err(CardPrepError::DecodeError(_))));
    }

    #[test]
    fn heic_without_shim_is_unsupported() {
        let result = decode(&heic_header(), MediaType::Heic, None);
        assert!(matches!(result, Err(CardPrepError::UnsupportedFormat)));
    }

    #[test]
    fn heic_with_shim_decodes() {
        let rgb = decode(&heic_header(), MediaType::Heic, Some(&SolidHeif)).unwrap();
        assert_eq!(rgb.dimensions(), (6, 4));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn heic_shim_failure_is_decode_error() {
        let result = decode(&heic_header(), MediaType::Heic, Some(&BrokenHeif));
        assert!(matches!(result, Err(CardPrepError::DecodeError(_))));
    }

    #[test]
    fn png_without_exif_is_upright() {
        let png = png_bytes(&RgbImage::new(4, 4));
        assert_eq!(read_exif_orientation(&png), 1);
    }

    #[test]
    fn exif_orientation_is_read_from_jpeg() {
        let jpeg = jpeg_with_orientation(&RgbImage::new(60, 40), 6);
        assert_eq!(read_exif_orientation(&jpeg), 6);
    }

    #[test]
    fn decode_applies_exif_rotation() {
        let mut img = RgbImage::from_pixel(60, 40, Rgb([255, 255, 255]));
        // Dark block in the top-left corner of the stored frame.
        for y in 0..10 {
            for x in 0..10 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let jpeg = jpeg_with_orientation(&img, 6);

        let upright = decode(&jpeg, MediaType::Jpeg, None).unwrap();
        assert_eq!(upright.dimensions(), (40, 60));
        // 90° clockwise moves the top-left corner to the top-right.
        assert!(upright.get_pixel(35, 4).0[0] < 64);
        assert!(upright.get_pixel(4, 4).0[0] > 192);
    }

    #[test]
    fn orientation_rotate90_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(6, 4));
        let rotated = apply_orientation(img, 6);
        assert_eq!((rotated.width(), rotated.height()), (4, 6));
    }

    #[test]
    fn orientation_mirror_moves_pixel() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let mirrored = apply_orientation(DynamicImage::ImageRgb8(img), 2).to_rgb8();
        assert_eq!(mirrored.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn orientation_unknown_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(6, 4));
        let same = apply_orientation(img, 42);
        assert_eq!((same.width(), same.height()), (6, 4));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, Rgba([255, 0, 0, 0]));
        let rgb = to_rgb(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn grayscale_expands_to_three_channels() {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
        let rgb = to_rgb(&DynamicImage::ImageLuma8(gray));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([77, 77, 77]));
    }
}
