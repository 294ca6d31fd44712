//! Canny edge detection producing the edge-based interval mask.
//!
//! Pipeline, all stages on the full image:
//!
//! 1. grayscale
//! 2. Gaussian blur (sigma 1.3)
//! 3. Sobel `Gx` / `Gy`
//! 4. gradient magnitude and direction, tracking the global maximum
//! 5. non-maximum suppression: local maxima along the quantized gradient
//!    direction become white, everything else keeps its clamped magnitude
//! 6. double threshold relative to the brightest suppressed value
//! 7. single-pass hysteresis over the 8-neighbourhood
//!
//! The result is a strictly black/white image (edges white), which after
//! inversion is a valid [`crate::mask::Mask`] source: edges become masked
//! and break intervals.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{filter_clamped, gaussian_blur_f32};
use imageproc::kernel;

use crate::color::clamp_u8;
use crate::imaging;
use crate::types::{RgbaImage, SortError};

/// Standard deviation of the pre-detection blur.
pub const BLUR_SIGMA: f32 = 1.3;

/// Strong threshold as a fraction of the brightest suppressed value.
const UPPER_RATIO: f64 = 0.09;

/// Weak threshold as a fraction of the strong threshold.
const LOWER_RATIO: f64 = 0.05;

const STRONG: u8 = 255;
const WEAK: u8 = 75;

/// Per-pixel gradient magnitude and direction (radians).
struct Gradient {
    width: u32,
    height: u32,
    magnitude: Vec<f64>,
    direction: Vec<f64>,
    max_magnitude: f64,
}

impl Gradient {
    fn from_sobel(gx: &Image<Luma<i16>>, gy: &Image<Luma<i16>>) -> Self {
        let (width, height) = gx.dimensions();
        let mut magnitude = Vec::with_capacity(gx.len());
        let mut direction = Vec::with_capacity(gx.len());
        let mut max_magnitude = 0.0f64;

        for (h, v) in gx.pixels().zip(gy.pixels()) {
            let x = f64::from(h.0[0]);
            let y = f64::from(v.0[0]);
            let m = y.hypot(x);
            max_magnitude = max_magnitude.max(m);
            magnitude.push(m);
            direction.push(y.atan2(x));
        }

        Self {
            width,
            height,
            magnitude,
            direction,
            max_magnitude,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn magnitude_at(&self, x: u32, y: u32) -> f64 {
        self.magnitude[self.index(x, y)]
    }
}

/// Run the full detector on a grayscale image. Edges are 255, the rest 0.
#[must_use = "returns the binary edge map"]
pub fn detect_edges(gray: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, BLUR_SIGMA);

    let gx: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_VERTICAL_3X3);
    let gradient = Gradient::from_sobel(&gx, &gy);
    tracing::trace!(
        max_magnitude = gradient.max_magnitude,
        "computed sobel gradient"
    );

    let thinned = non_maximum_suppression(&gradient);
    let thresholded = double_threshold(&thinned);
    hysteresis(&thresholded)
}

/// Edge-detect a color image and return the edge map as opaque gray RGBA.
///
/// With `invert`, edges are black and everything else white, which is the
/// form the sorter uses as a mask.
///
/// # Errors
///
/// Returns [`SortError::InvalidImage`] if the image has no pixels.
pub fn perform_edge_detection(image: &RgbaImage, invert: bool) -> Result<RgbaImage, SortError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SortError::InvalidImage(
            "cannot detect edges in an empty image".to_string(),
        ));
    }

    let gray = image::imageops::grayscale(image);
    let edges = detect_edges(&gray);
    let rgba = RgbaImage::from_fn(edges.width(), edges.height(), |x, y| {
        let v = edges.get_pixel(x, y).0[0];
        image::Rgba([v, v, v, u8::MAX])
    });

    Ok(if invert { imaging::invert(&rgba) } else { rgba })
}

/// Quantize a gradient direction (radians) into one of four edge-normal
/// buckets, in degrees: 0, 45, 90 or 135.
fn direction_bucket(radians: f64) -> u16 {
    let mut angle = radians.to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if angle >= 180.0 {
        angle -= 180.0;
    }

    if (22.5..67.5).contains(&angle) {
        45
    } else if (67.5..112.5).contains(&angle) {
        90
    } else if (112.5..157.5).contains(&angle) {
        135
    } else {
        0
    }
}

fn non_maximum_suppression(gradient: &Gradient) -> GrayImage {
    let (w, h) = (gradient.width, gradient.height);
    GrayImage::from_fn(w, h, |x, y| {
        let magnitude = gradient.magnitude_at(x, y);
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return Luma([clamp_u8(magnitude)]);
        }

        let (n1, n2) = match direction_bucket(gradient.direction[gradient.index(x, y)]) {
            45 => (
                gradient.magnitude_at(x + 1, y + 1),
                gradient.magnitude_at(x - 1, y - 1),
            ),
            90 => (
                gradient.magnitude_at(x, y - 1),
                gradient.magnitude_at(x, y + 1),
            ),
            135 => (
                gradient.magnitude_at(x - 1, y + 1),
                gradient.magnitude_at(x + 1, y - 1),
            ),
            _ => (
                gradient.magnitude_at(x - 1, y),
                gradient.magnitude_at(x + 1, y),
            ),
        };

        if magnitude > n1 && magnitude > n2 {
            Luma([STRONG])
        } else {
            Luma([clamp_u8(magnitude)])
        }
    })
}

/// Classify every pixel as strong, weak or background.
///
/// An image without any gradient has no edges at all; without this guard
/// both thresholds would be zero and every pixel would count as strong.
fn double_threshold(thinned: &GrayImage) -> GrayImage {
    let max_gray = thinned.pixels().map(|p| p.0[0]).max().unwrap_or(0);
    if max_gray == 0 {
        return GrayImage::new(thinned.width(), thinned.height());
    }

    let upper = f64::from(max_gray) * UPPER_RATIO;
    let lower = upper * LOWER_RATIO;

    let mut out = thinned.clone();
    for pixel in out.pixels_mut() {
        let v = f64::from(pixel.0[0]);
        pixel.0[0] = if v >= upper {
            STRONG
        } else if v >= lower {
            WEAK
        } else {
            0
        };
    }
    out
}

/// Promote weak pixels touching a strong pixel; drop the remaining weak ones.
fn hysteresis(thresholded: &GrayImage) -> GrayImage {
    let (w, h) = thresholded.dimensions();
    let is_strong = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && x < i64::from(w)
            && y < i64::from(h)
            && thresholded.get_pixel(x as u32, y as u32).0[0] == STRONG
    };

    GrayImage::from_fn(w, h, |x, y| match thresholded.get_pixel(x, y).0[0] {
        STRONG => Luma([STRONG]),
        WEAK => {
            let (x, y) = (i64::from(x), i64::from(y));
            let promoted = (-1..=1)
                .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
                .filter(|&(dx, dy)| dx != 0 || dy != 0)
                .any(|(dx, dy)| is_strong(x + dx, y + dy));
            Luma([if promoted { STRONG } else { 0 }])
        }
        _ => Luma([0]),
    })
}
