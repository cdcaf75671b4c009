//! Screenshot post-processing
//!
//! Raw captures are decoded, flattened onto an opaque white background when
//! they carry an alpha channel, and re-encoded as PNG with the strongest
//! compression the encoder offers. Normalizing an already normalized image
//! yields byte-identical output.

use std::io::Cursor;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, Rgb, RgbImage};

use crate::{Error, Result};

/// Background used to flatten transparent pixels.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Decode `raw`, flatten transparency and re-encode as optimized PNG.
pub fn normalize(raw: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw)
        .map_err(|e| Error::NormalizeError(format!("Failed to decode screenshot: {}", e)))?;
    let rgb = flatten(img, BACKGROUND);
    encode_png(&rgb)
}

/// Composite `img` over `background`, dropping the alpha channel.
pub fn flatten(img: DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            let fg = src[c] as u32;
            let bg = background[c] as u32;
            dst[c] = ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8;
        }
    }
    out
}

fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut bytes),
        CompressionType::Best,
        FilterType::Adaptive,
    );
    encoder
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| Error::NormalizeError(format!("Failed to encode PNG: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png_of(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn transparent_input_becomes_opaque_with_same_dimensions() {
        let mut img = RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 1, Rgba([200, 10, 10, 255]));
        img.put_pixel(2, 2, Rgba([0, 0, 0, 128]));
        let raw = png_of(DynamicImage::ImageRgba8(img));

        let out = normalize(&raw).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
        assert!(!decoded.color().has_alpha());

        let rgb = decoded.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([200, 10, 10]));
        // half-transparent black over white is mid grey
        assert_eq!(rgb.get_pixel(2, 2), &Rgb([127, 127, 127]));
    }

    #[test]
    fn normalizing_twice_is_byte_identical() {
        let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 90, (x * 16) as u8]));
        let once = normalize(&png_of(DynamicImage::ImageRgba8(img))).unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn opaque_input_keeps_pixels() {
        let img = RgbImage::from_fn(8, 4, |x, y| Rgb([x as u8, y as u8, 7]));
        let out = normalize(&png_of(DynamicImage::ImageRgb8(img.clone()))).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn corrupt_input_is_a_normalize_error() {
        let err = normalize(b"\x89PNG\r\n\x1a\nnot really").unwrap_err();
        assert!(matches!(err, Error::NormalizeError(_)));
    }
}
