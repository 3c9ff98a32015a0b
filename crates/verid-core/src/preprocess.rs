//! Image normalization ahead of text recognition and face detection.
//!
//! Documents are binarized and deskewed so line segmentation and pattern
//! extraction see upright, high-contrast text. Faces only get a grayscale
//! conversion and a bounded downscale; binarization would destroy the
//! features the detector and encoder rely on.

use thiserror::Error;

/// What the prepared image will be used for downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Document,
    Face,
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessConfig {
    /// Minimum shorter side for a document image to be considered legible.
    pub min_document_side: u32,
    /// Minimum shorter side for a face image to be resolvable.
    pub min_face_side: u32,
    /// Longer side above which face images are downscaled.
    pub max_face_side: u32,
    /// Window (pixels, odd) for the adaptive mean threshold.
    pub threshold_window: u32,
    /// Subtracted from the window mean before comparison.
    pub threshold_bias: i16,
    /// Skew search range, degrees either side of horizontal.
    pub max_skew_degrees: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_document_side: 200,
            min_face_side: 64,
            max_face_side: 1280,
            threshold_window: 25,
            threshold_bias: 10,
            max_skew_degrees: 15.0,
        }
    }
}

/// Which normalization steps were applied when building a [`PreparedImage`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreprocessSteps {
    pub grayscale: bool,
    pub thresholded: bool,
    /// Detected skew that was corrected, in degrees. `None` when the image
    /// was already within tolerance.
    pub deskewed_degrees: Option<f32>,
    pub resized: bool,
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("unsupported or corrupt image: {0}")]
    UnsupportedFormat(#[from] image::ImageError),
    #[error("image {width}x{height} below minimum side of {min_side} px")]
    ImageTooSmall {
        width: u32,
        height: u32,
        min_side: u32,
    },
}

/// Canonical single-channel raster handed between pipeline stages.
///
/// Never mutated after creation; every stage that transforms pixels
/// produces a new instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    purpose: Purpose,
    steps: PreprocessSteps,
}

impl PreparedImage {
    /// Wrap an existing 8-bit grayscale buffer. Intended for alternate
    /// backends and tests; `pixels.len()` must equal `width * height`.
    pub fn from_luma(pixels: Vec<u8>, width: u32, height: u32, purpose: Purpose) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            pixels,
            width,
            height,
            purpose,
            steps: PreprocessSteps {
                grayscale: true,
                ..PreprocessSteps::default()
            },
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn steps(&self) -> PreprocessSteps {
        self.steps
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Normalizes raw image bytes into a [`PreparedImage`] for one purpose.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode and normalize `bytes` for the given purpose.
    pub fn prepare(&self, bytes: &[u8], purpose: Purpose) -> Result<PreparedImage, PreprocessError> {
        let decoded = image::load_from_memory(bytes)?;
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();

        let min_side = match purpose {
            Purpose::Document => self.config.min_document_side,
            Purpose::Face => self.config.min_face_side,
        };
        if width.min(height) < min_side {
            return Err(PreprocessError::ImageTooSmall {
                width,
                height,
                min_side,
            });
        }

        match purpose {
            Purpose::Document => self.prepare_document(gray.into_raw(), width, height),
            Purpose::Face => self.prepare_face(gray.into_raw(), width, height),
        }
    }

    fn prepare_document(
        &self,
        gray: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<PreparedImage, PreprocessError> {
        let binary = adaptive_threshold(
            &gray,
            width as usize,
            height as usize,
            self.config.threshold_window as usize,
            self.config.threshold_bias,
        );

        let angle = estimate_skew(
            &binary,
            width as usize,
            height as usize,
            self.config.max_skew_degrees,
        );

        // Rotations under a quarter degree do more resampling damage than
        // the skew they remove.
        let (pixels, deskewed) = if angle.abs() >= 0.25 {
            let rotated =
                rotate_about_center(&binary, width as usize, height as usize, -angle, 255);
            (rotated, Some(angle))
        } else {
            (binary, None)
        };

        tracing::debug!(width, height, skew = ?deskewed, "document prepared");

        Ok(PreparedImage {
            pixels,
            width,
            height,
            purpose: Purpose::Document,
            steps: PreprocessSteps {
                grayscale: true,
                thresholded: true,
                deskewed_degrees: deskewed,
                resized: false,
            },
        })
    }

    fn prepare_face(
        &self,
        gray: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<PreparedImage, PreprocessError> {
        let max_side = self.config.max_face_side;
        let longer = width.max(height);

        let (pixels, width, height, resized) = if longer > max_side {
            let scale = max_side as f32 / longer as f32;
            let new_w = ((width as f32 * scale).round() as u32).max(1);
            let new_h = ((height as f32 * scale).round() as u32).max(1);
            let shrunk = resize_bilinear(
                &gray,
                width as usize,
                height as usize,
                new_w as usize,
                new_h as usize,
            );
            (shrunk, new_w, new_h, true)
        } else {
            (gray, width, height, false)
        };

        tracing::debug!(width, height, resized, "face image prepared");

        Ok(PreparedImage {
            pixels,
            width,
            height,
            purpose: Purpose::Face,
            steps: PreprocessSteps {
                grayscale: true,
                thresholded: false,
                deskewed_degrees: None,
                resized,
            },
        })
    }
}

/// Mean-window adaptive threshold over an integral image.
///
/// Output convention: ink is 0, background is 255.
pub(crate) fn adaptive_threshold(
    gray: &[u8],
    width: usize,
    height: usize,
    window: usize,
    bias: i16,
) -> Vec<u8> {
    let half = (window.max(3) / 2) as isize;
    let integral = integral_image(gray, width, height);

    // Sum over the inclusive rectangle [x0, x1] x [y0, y1] using the
    // (width+1) x (height+1) integral table.
    let rect_sum = |x0: usize, y0: usize, x1: usize, y1: usize| -> u64 {
        let w1 = width + 1;
        integral[(y1 + 1) * w1 + (x1 + 1)] + integral[y0 * w1 + x0]
            - integral[y0 * w1 + (x1 + 1)]
            - integral[(y1 + 1) * w1 + x0]
    };

    let mut out = vec![0u8; width * height];
    for y in 0..height {
        let y0 = (y as isize - half).max(0) as usize;
        let y1 = (y as isize + half).min(height as isize - 1) as usize;
        for x in 0..width {
            let x0 = (x as isize - half).max(0) as usize;
            let x1 = (x as isize + half).min(width as isize - 1) as usize;

            let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as u64;
            let mean = (rect_sum(x0, y0, x1, y1) / count) as i16;
            let pixel = gray[y * width + x] as i16;

            out[y * width + x] = if pixel < mean - bias { 0 } else { 255 };
        }
    }
    out
}

/// (width+1) x (height+1) summed-area table with a zero first row/column.
fn integral_image(gray: &[u8], width: usize, height: usize) -> Vec<u64> {
    let w1 = width + 1;
    let mut integral = vec![0u64; w1 * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += gray[y * width + x] as u64;
            integral[(y + 1) * w1 + (x + 1)] = integral[y * w1 + (x + 1)] + row_sum;
        }
    }
    integral
}

/// Estimate document skew by maximizing the sharpness of the horizontal
/// ink-projection profile over candidate angles.
///
/// Returns the angle (degrees) by which text lines are rotated away from
/// horizontal; rotating the image by the negated result levels them.
pub(crate) fn estimate_skew(binary: &[u8], width: usize, height: usize, max_degrees: f32) -> f32 {
    const STEP_DEGREES: f32 = 0.5;

    // Collect ink coordinates once; subsample large images.
    let stride = if width * height > 1_000_000 { 2 } else { 1 };
    let mut ink = Vec::new();
    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            if binary[y * width + x] < 128 {
                ink.push((x as f32, y as f32));
            }
        }
    }
    if ink.len() < 16 {
        return 0.0;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = 0u64;
    let bins = height + width + 2;

    let steps = (2.0 * max_degrees / STEP_DEGREES).round() as i32;
    for i in 0..=steps {
        let angle = -max_degrees + i as f32 * STEP_DEGREES;
        let (sin, cos) = angle.to_radians().sin_cos();
        let offset = width as f32 * sin.abs();

        let mut histogram = vec![0u32; bins];
        for &(x, y) in &ink {
            let projected = y * cos - x * sin + offset;
            let bin = projected.round().max(0.0) as usize;
            if bin < bins {
                histogram[bin] += 1;
            }
        }

        // Sum of squared bin counts peaks when rows collapse onto few bins.
        let score: u64 = histogram.iter().map(|&c| (c as u64) * (c as u64)).sum();
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    best_angle
}

/// Rotate image content by `degrees` about the image center, bilinear
/// sampling, out-of-bounds filled with `background`.
pub(crate) fn rotate_about_center(
    pixels: &[u8],
    width: usize,
    height: usize,
    degrees: f32,
    background: u8,
) -> Vec<u8> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let mut out = vec![background; width * height];
    for oy in 0..height {
        for ox in 0..width {
            let dx = ox as f32 - cx;
            let dy = oy as f32 - cy;
            // Inverse rotation maps output pixels back to source.
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;

            out[oy * width + ox] =
                sample_bilinear(pixels, width, height, sx, sy).unwrap_or(background);
        }
    }
    out
}

/// Bilinear sample at a fractional coordinate; `None` when fully outside.
fn sample_bilinear(pixels: &[u8], width: usize, height: usize, sx: f32, sy: f32) -> Option<u8> {
    if sx < -1.0 || sy < -1.0 || sx > width as f32 || sy > height as f32 {
        return None;
    }

    let x0 = sx.floor() as i32;
    let y0 = sy.floor() as i32;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let fetch = |x: i32, y: i32| -> Option<f32> {
        if x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height {
            Some(pixels[y as usize * width + x as usize] as f32)
        } else {
            None
        }
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);
    if tl.is_none() && tr.is_none() && bl.is_none() && br.is_none() {
        return None;
    }

    // Missing corners fall back to the nearest present one.
    let any = tl.or(tr).or(bl).or(br).unwrap_or(0.0);
    let tl = tl.unwrap_or(any);
    let tr = tr.unwrap_or(any);
    let bl = bl.unwrap_or(any);
    let br = br.unwrap_or(any);

    let value = tl * (1.0 - fx) * (1.0 - fy)
        + tr * fx * (1.0 - fy)
        + bl * (1.0 - fx) * fy
        + br * fx * fy;
    Some(value.round().clamp(0.0, 255.0) as u8)
}

/// Bilinear resize of a grayscale buffer.
pub(crate) fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut out = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let value = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            out[y * new_w + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat};
    use std::io::Cursor;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        png_bytes(&GrayImage::from_pixel(width, height, image::Luma([255])))
    }

    /// White page with black horizontal stripes every `period` rows.
    fn striped(width: usize, height: usize, period: usize) -> Vec<u8> {
        let mut pixels = vec![255u8; width * height];
        for y in (10..height - 10).step_by(period) {
            for dy in 0..3 {
                for x in 10..width - 10 {
                    pixels[(y + dy) * width + x] = 0;
                }
            }
        }
        pixels
    }

    #[test]
    fn test_garbage_bytes_unsupported() {
        let pre = ImagePreprocessor::default();
        let err = pre.prepare(b"definitely not an image", Purpose::Document);
        assert!(matches!(err, Err(PreprocessError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_too_small_document() {
        let pre = ImagePreprocessor::default();
        let err = pre.prepare(&white_png(100, 100), Purpose::Document);
        assert!(matches!(
            err,
            Err(PreprocessError::ImageTooSmall { min_side: 200, .. })
        ));
    }

    #[test]
    fn test_small_image_acceptable_as_face() {
        // 100 px is below the document minimum but above the face minimum.
        let pre = ImagePreprocessor::default();
        let prepared = pre.prepare(&white_png(100, 100), Purpose::Face).unwrap();
        assert_eq!(prepared.purpose(), Purpose::Face);
        assert!(!prepared.steps().thresholded);
    }

    #[test]
    fn test_face_downscaled_to_bound() {
        let pre = ImagePreprocessor::new(PreprocessConfig {
            max_face_side: 256,
            ..PreprocessConfig::default()
        });
        let prepared = pre.prepare(&white_png(512, 256), Purpose::Face).unwrap();
        assert_eq!(prepared.width(), 256);
        assert_eq!(prepared.height(), 128);
        assert!(prepared.steps().resized);
    }

    #[test]
    fn test_document_steps_recorded() {
        let pre = ImagePreprocessor::default();
        let prepared = pre.prepare(&white_png(300, 300), Purpose::Document).unwrap();
        let steps = prepared.steps();
        assert!(steps.grayscale);
        assert!(steps.thresholded);
        assert!(steps.deskewed_degrees.is_none());
    }

    #[test]
    fn test_prepare_deterministic() {
        let pre = ImagePreprocessor::default();
        let bytes = white_png(300, 240);
        let a = pre.prepare(&bytes, Purpose::Document).unwrap();
        let b = pre.prepare(&bytes, Purpose::Document).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_adaptive_threshold_separates_text() {
        // Dark glyph block on a mid-gray background.
        let w = 64;
        let h = 64;
        let mut gray = vec![160u8; w * h];
        for y in 20..30 {
            for x in 20..44 {
                gray[y * w + x] = 30;
            }
        }
        let binary = adaptive_threshold(&gray, w, h, 25, 10);
        assert_eq!(binary[25 * w + 30], 0, "glyph pixels become ink");
        assert_eq!(binary[5 * w + 5], 255, "background stays white");
    }

    #[test]
    fn test_estimate_skew_level_page() {
        let w = 400;
        let h = 300;
        let page = striped(w, h, 24);
        let angle = estimate_skew(&page, w, h, 15.0);
        assert!(angle.abs() < 0.75, "level page reported skew {angle}");
    }

    #[test]
    fn test_estimate_skew_recovers_rotation() {
        let w = 400;
        let h = 300;
        let page = striped(w, h, 24);
        let rotated = rotate_about_center(&page, w, h, 5.0, 255);
        let angle = estimate_skew(&rotated, w, h, 15.0);
        assert!(
            (angle - 5.0).abs() <= 1.0,
            "expected ~5 degrees, estimated {angle}"
        );
    }

    #[test]
    fn test_deskew_roundtrip_restores_rows() {
        let w = 400;
        let h = 300;
        let page = striped(w, h, 24);
        let rotated = rotate_about_center(&page, w, h, 6.0, 255);
        let angle = estimate_skew(&rotated, w, h, 15.0);
        let restored = rotate_about_center(&rotated, w, h, -angle, 255);
        let residual = estimate_skew(&restored, w, h, 15.0);
        assert!(residual.abs() <= 1.0, "residual skew {residual}");
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let w = 50;
        let h = 40;
        let pixels: Vec<u8> = (0..w * h).map(|i| (i % 251) as u8).collect();
        let rotated = rotate_about_center(&pixels, w, h, 0.0, 255);
        assert_eq!(rotated, pixels);
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![128u8; 100 * 100];
        let out = resize_bilinear(&src, 100, 100, 37, 53);
        assert!(out.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resize_dimensions() {
        let src = vec![0u8; 64 * 32];
        let out = resize_bilinear(&src, 64, 32, 16, 8);
        assert_eq!(out.len(), 16 * 8);
    }

    #[test]
    fn test_from_luma_accessors() {
        let img = PreparedImage::from_luma(vec![7u8; 12], 4, 3, Purpose::Document);
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 3);
        assert_eq!(img.pixel(3, 2), 7);
        assert!(img.steps().grayscale);
    }
}
