use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde::Deserialize;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Images whose longer side is below this are upscaled to it.
    pub target_long_side: u32,
    /// Percent of the histogram clipped at each end before stretching.
    pub cutoff: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self { target_long_side: 1800, cutoff: 0.0 }
    }
}

/// Decode an uploaded JPEG / PNG / WEBP / … into a bitmap.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Grayscale → contrast stretch → 3×3 median → upscale.
pub fn prepare_for_ocr(img: &DynamicImage, opts: &PreprocessOptions) -> GrayImage {
    let gray = img.to_luma8();
    let stretched = autocontrast(&gray, opts.cutoff);
    let smoothed = imageproc::filter::median_filter(&stretched, 1, 1);
    upscale_to(smoothed, opts.target_long_side)
}

/// Remap intensities so the darkest kept level becomes 0 and the lightest 255.
pub fn autocontrast(gray: &GrayImage, cutoff: f32) -> GrayImage {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let clip = (total as f64 * f64::from(cutoff.clamp(0.0, 49.0)) / 100.0) as u64;
    let lo = clipped_bound(histogram.iter().enumerate(), clip);
    let hi = clipped_bound(histogram.iter().enumerate().rev(), clip);

    let (Some(lo), Some(hi)) = (lo, hi) else {
        return gray.clone();
    };
    if hi <= lo {
        // Uniform image, nothing to stretch.
        return gray.clone();
    }

    let range = (hi - lo) as u32;
    let mut lut = [0u8; 256];
    for (level, out) in lut.iter_mut().enumerate() {
        *out = if level <= lo {
            0
        } else if level >= hi {
            255
        } else {
            ((level - lo) as u32 * 255 / range) as u8
        };
    }

    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lut[gray.get_pixel(x, y)[0] as usize]])
    })
}

/// First level, walking from one end, where more than `clip` pixels have been
/// seen.
fn clipped_bound<'a>(
    levels: impl Iterator<Item = (usize, &'a u64)>,
    clip: u64,
) -> Option<usize> {
    let mut seen = 0u64;
    for (level, &count) in levels {
        seen += count;
        if seen > clip {
            return Some(level);
        }
    }
    None
}

/// Uniformly enlarge so the longer side equals `target`. Never shrinks.
pub fn upscale_to(gray: GrayImage, target: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let long = w.max(h);
    if long == 0 || long >= target {
        return gray;
    }
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(target) + u64::from(long) / 2) / u64::from(long);
        (scaled as u32).max(1)
    };
    let (nw, nh) = if w >= h { (target, scale(h)) } else { (scale(w), target) };
    image::imageops::resize(&gray, nw, nh, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_gray(width: u32, height: u32, value: u8) -> GrayImage {
        ImageBuffer::from_fn(width, height, |_, _| Luma([value]))
    }

    fn no_upscale() -> PreprocessOptions {
        PreprocessOptions { target_long_side: 0, cutoff: 0.0 }
    }

    #[test]
    fn uniform_image_is_left_alone() {
        let img = solid_gray(10, 10, 128);
        let out = autocontrast(&img, 0.0);
        assert!(out.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn narrow_range_stretches_to_full_range() {
        let img: GrayImage = ImageBuffer::from_fn(100, 1, |x, _| Luma([(100 + x / 2) as u8]));
        let out = autocontrast(&img, 0.0);
        let min = out.pixels().map(|p| p[0]).min().unwrap();
        let max = out.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn cutoff_ignores_outlier_pixels() {
        // 98 mid-gray pixels plus one black and one white outlier.
        let img: GrayImage = ImageBuffer::from_fn(100, 1, |x, _| match x {
            0 => Luma([0]),
            99 => Luma([255]),
            x if x < 50 => Luma([100]),
            _ => Luma([150]),
        });
        let out = autocontrast(&img, 2.0);
        assert_eq!(out.get_pixel(10, 0)[0], 0);
        assert_eq!(out.get_pixel(60, 0)[0], 255);
    }

    #[test]
    fn color_input_becomes_single_channel() {
        let rgb: RgbImage = ImageBuffer::from_pixel(20, 10, Rgb([200, 30, 30]));
        let out = prepare_for_ocr(&DynamicImage::ImageRgb8(rgb), &no_upscale());
        assert_eq!(out.dimensions(), (20, 10));
    }

    #[test]
    fn median_removes_isolated_speckle() {
        let mut img = solid_gray(9, 9, 255);
        img.put_pixel(4, 4, Luma([0]));
        // Keep one dark corner so contrast stretch has a real range.
        img.put_pixel(0, 0, Luma([0]));
        let out = prepare_for_ocr(&DynamicImage::ImageLuma8(img), &no_upscale());
        assert_eq!(out.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn small_image_is_upscaled_to_target() {
        let img = DynamicImage::ImageLuma8(solid_gray(400, 200, 90));
        let out = prepare_for_ocr(&img, &PreprocessOptions::default());
        assert_eq!(out.dimensions(), (1800, 900));
    }

    #[test]
    fn portrait_image_scales_on_height() {
        let out = upscale_to(solid_gray(300, 900, 10), 1800);
        assert_eq!(out.dimensions(), (600, 1800));
    }

    #[test]
    fn large_image_keeps_its_dimensions() {
        let img = DynamicImage::ImageLuma8(solid_gray(2400, 1000, 200));
        let out = prepare_for_ocr(&img, &PreprocessOptions::default());
        assert_eq!(out.dimensions(), (2400, 1000));
    }

    #[test]
    fn image_at_threshold_is_untouched() {
        let out = upscale_to(solid_gray(1800, 50, 10), 1800);
        assert_eq!(out.dimensions(), (1800, 50));
    }

    #[test]
    fn encode_then_decode_keeps_size() {
        let img = DynamicImage::ImageLuma8(solid_gray(4, 3, 100));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let back = decode_image(&png).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(PreprocessError::Decode(_))
        ));
    }
}
