use crate::parallel::{add_counters, fold_rows};
use crate::types::{AnalysisError, AnalysisResult, Image};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Sobel gradient magnitude above which a pixel counts as an edge
pub const EDGE_MAGNITUDE_THRESHOLD: f32 = 100.0;

/// Resampling filter for [`resize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
        }
    }
}

/// Output container for [`encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Png,
    Jpeg,
}

/// Basic image statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStatistics {
    /// Population variance of all samples
    pub variance: f64,
    pub mean_per_channel: Vec<f64>,
    /// Fraction of pixels whose gradient magnitude exceeds the edge threshold
    pub edge_density: f64,
}

/// Decode an encoded raster into a 3-channel RGB image
///
/// Grayscale inputs are expanded, alpha is dropped and 16-bit samples are
/// reduced to 8 bits. Floating point (HDR) buffers are rejected.
pub fn decode(bytes: &[u8]) -> AnalysisResult<Image> {
    if bytes.is_empty() {
        return Err(AnalysisError::Decode("Empty image buffer".to_string()));
    }

    let dynamic = image::load_from_memory(bytes)
        .map_err(|e| AnalysisError::Decode(format!("Failed to decode image: {}", e)))?;

    let color = dynamic.color();
    let rgb = match dynamic {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            return Err(AnalysisError::Decode(format!(
                "Unsupported color space: {:?}",
                color
            )));
        }
        DynamicImage::ImageRgb8(img) => img,
        other => other.to_rgb8(),
    };

    let (width, height) = rgb.dimensions();
    log::debug!("Decoded {}x{} image ({} bytes)", width, height, bytes.len());

    Image::from_raw(width as usize, height as usize, 3, rgb.into_raw())
        .map_err(|e| AnalysisError::Decode(e.to_string()))
}

/// Encode an image into PNG or JPEG bytes
pub fn encode(image: &Image, format: EncodeFormat) -> AnalysisResult<Vec<u8>> {
    let dynamic = to_dynamic(image)?;
    let image_format = match format {
        EncodeFormat::Png => ImageFormat::Png,
        EncodeFormat::Jpeg => ImageFormat::Jpeg,
    };

    let mut buffer = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut buffer, image_format)
        .map_err(|e| AnalysisError::Decode(format!("Failed to encode image: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Resample an image to the given dimensions
pub fn resize(image: &Image, width: usize, height: usize, filter: ResizeFilter) -> AnalysisResult<Image> {
    if width == 0 || height == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Resize target must be non-zero, got {}x{}",
            width, height
        )));
    }
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }

    log::debug!(
        "Resizing {}x{} -> {}x{} ({:?})",
        image.width(), image.height(), width, height, filter
    );

    let (w, h) = (width as u32, height as u32);
    match to_dynamic(image)? {
        DynamicImage::ImageLuma8(gray) => {
            let resized = image::imageops::resize(&gray, w, h, filter.filter_type());
            Image::from_raw(width, height, 1, resized.into_raw())
        }
        other => {
            let rgb = other.to_rgb8();
            let resized = image::imageops::resize(&rgb, w, h, filter.filter_type());
            Image::from_raw(width, height, 3, resized.into_raw())
        }
    }
}

fn to_dynamic(image: &Image) -> AnalysisResult<DynamicImage> {
    let (w, h) = (image.width() as u32, image.height() as u32);
    let raw = image.samples().to_vec();
    let dynamic = if image.channels() == 1 {
        GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8)
    };
    dynamic.ok_or_else(|| AnalysisError::InvalidInput("Image buffer does not match its dimensions".to_string()))
}

/// Per-pixel luminance as the mean of the channels
pub fn luminance(image: &Image) -> Array2<f32> {
    let channels = image.channels();
    let pixels = image.pixels();
    Array2::from_shape_fn((image.height(), image.width()), |(y, x)| {
        let sum: u32 = (0..channels).map(|c| pixels[[y, x, c]] as u32).sum();
        sum as f32 / channels as f32
    })
}

/// Compute variance, per-channel means and edge density
pub fn statistics(image: &Image) -> ImageStatistics {
    let channels = image.channels();
    let width = image.width();

    // [sum, sum of squares, per-channel sums...]
    let totals = fold_rows(
        image.height(),
        [0u64; 5],
        |y| {
            let mut acc = [0u64; 5];
            for (i, &v) in image.row(y).iter().enumerate() {
                let v = v as u64;
                acc[0] += v;
                acc[1] += v * v;
                acc[2 + i % channels] += v;
            }
            acc
        },
        add_counters,
    );

    let n = (image.pixel_count() * channels) as u128;
    let (sum, sum_sq) = (totals[0] as u128, totals[1] as u128);
    // Exact integer form of E[x^2] - E[x]^2, never negative
    let variance = (n * sum_sq - sum * sum) as f64 / (n * n) as f64;

    let pixel_count = (width * image.height()) as f64;
    let mean_per_channel = (0..channels)
        .map(|c| totals[2 + c] as f64 / pixel_count)
        .collect();

    let edges = edge_mask(image);
    let edge_pixels = edges.iter().filter(|&&e| e).count();

    ImageStatistics {
        variance,
        mean_per_channel,
        edge_density: edge_pixels as f64 / pixel_count,
    }
}

/// Pixels whose Sobel gradient magnitude on luminance exceeds the edge threshold
///
/// Border pixels are never edges.
pub fn edge_mask(image: &Image) -> Array2<bool> {
    let lum = luminance(image);
    let (rows, cols) = lum.dim();
    let mut mask = Array2::from_elem((rows, cols), false);
    if rows < 3 || cols < 3 {
        return mask;
    }

    for i in 1..rows - 1 {
        for j in 1..cols - 1 {
            let gx = (lum[[i - 1, j + 1]] + 2.0 * lum[[i, j + 1]] + lum[[i + 1, j + 1]])
                - (lum[[i - 1, j - 1]] + 2.0 * lum[[i, j - 1]] + lum[[i + 1, j - 1]]);
            let gy = (lum[[i + 1, j - 1]] + 2.0 * lum[[i + 1, j]] + lum[[i + 1, j + 1]])
                - (lum[[i - 1, j - 1]] + 2.0 * lum[[i - 1, j]] + lum[[i - 1, j + 1]]);
            mask[[i, j]] = (gx * gx + gy * gy).sqrt() > EDGE_MAGNITUDE_THRESHOLD;
        }
    }

    mask
}

/// RGB to HSV in the 8-bit OpenCV convention: H in [0, 180), S and V in [0, 255]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    if delta == 0.0 {
        return (0.0, s, v);
    }

    let mut h = if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    (h / 2.0, s, v)
}
