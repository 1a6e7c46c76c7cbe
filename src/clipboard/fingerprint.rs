//! Image fingerprints and data-URL encoding.
//!
//! The fingerprint is a dedup key, not an integrity check: it hashes only
//! every `stride`-th byte, so two images that differ solely in skipped
//! bytes collide.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{ImageFormat, RgbaImage};

use super::ImagePayload;
use crate::{ClipdeckError, Result};

pub const DEFAULT_SAMPLE_STRIDE: usize = 100;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Rolling `h * 31 + b` hash over sampled bytes, tagged with the
/// dimensions and byte length.
pub fn image_fingerprint(image: &ImagePayload, stride: usize) -> String {
    let hash = image
        .bytes
        .iter()
        .step_by(stride.max(1))
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(*b)));

    format!(
        "image:{}x{}:{}:{:08x}",
        image.width,
        image.height,
        image.bytes.len(),
        hash
    )
}

/// Encode RGBA pixels as PNG.
pub fn encode_png(image: &ImagePayload) -> Result<Vec<u8>> {
    let width = u32::try_from(image.width).map_err(|_| dimension_error())?;
    let height = u32::try_from(image.height).map_err(|_| dimension_error())?;
    let img = RgbaImage::from_raw(width, height, image.bytes.clone()).ok_or_else(dimension_error)?;

    let mut png_bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

fn dimension_error() -> ClipdeckError {
    ClipdeckError::ImageProcessing(image::ImageError::Limits(image::error::LimitError::from_kind(
        image::error::LimitErrorKind::DimensionError,
    )))
}

pub fn png_data_url(png_bytes: &[u8]) -> String {
    format!("{DATA_URL_PREFIX}{}", BASE64.encode(png_bytes))
}

/// Decode a PNG data-URL back into RGBA pixels.
pub fn decode_data_url(data_url: &str) -> Result<ImagePayload> {
    let encoded = data_url.strip_prefix(DATA_URL_PREFIX).ok_or_else(|| {
        ClipdeckError::Clipboard("Unsupported image data URL".to_string())
    })?;

    let bytes = BASE64.decode(encoded)?;
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgba8();

    Ok(ImagePayload {
        width: img.width() as usize,
        height: img.height() as usize,
        bytes: img.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: usize, height: usize) -> ImagePayload {
        let mut bytes = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                bytes.extend_from_slice(&[v, v, v, 255]);
            }
        }
        ImagePayload {
            width,
            height,
            bytes,
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let img = checkerboard(8, 8);
        assert_eq!(
            image_fingerprint(&img, DEFAULT_SAMPLE_STRIDE),
            image_fingerprint(&img, DEFAULT_SAMPLE_STRIDE)
        );
        assert!(image_fingerprint(&img, 1).starts_with("image:8x8:256:"));
    }

    #[test]
    fn test_fingerprint_sees_sampled_bytes_only() {
        let a = checkerboard(8, 8);
        let mut b = a.clone();
        // byte 1 is skipped with a stride of 100, byte 100 is sampled
        b.bytes[1] ^= 0xff;
        assert_eq!(image_fingerprint(&a, 100), image_fingerprint(&b, 100));

        b.bytes[100] ^= 0xff;
        assert_ne!(image_fingerprint(&a, 100), image_fingerprint(&b, 100));
    }

    #[test]
    fn test_zero_stride_is_treated_as_one() {
        let img = checkerboard(2, 2);
        assert_eq!(image_fingerprint(&img, 0), image_fingerprint(&img, 1));
    }

    #[test]
    fn test_data_url_restores_pixels() {
        let img = checkerboard(4, 3);
        let png = encode_png(&img).unwrap();
        let url = png_data_url(&png);
        assert!(url.starts_with("data:image/png;base64,"));

        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_bad_dimensions_are_rejected() {
        let img = ImagePayload {
            width: 10,
            height: 10,
            bytes: vec![0; 12],
        };
        assert!(encode_png(&img).is_err());
        assert!(decode_data_url("data:text/plain,hello").is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_dimensions_do_not_wrap() {
        // u32::MAX + 2 would wrap to a 1x1 image
        let wide = ImagePayload {
            width: (u32::MAX as usize) + 2,
            height: 1,
            bytes: vec![0; 4],
        };
        assert!(matches!(
            encode_png(&wide),
            Err(ClipdeckError::ImageProcessing(_))
        ));
    }
}
