//! Whole-image buffer utilities: rotation with revert, workspace trimming,
//! scaling, inversion, blending, averaging, and format conversion.
//!
//! Right-angle rotations go through [`image::imageops`] and are lossless.
//! Other angles use [`imageproc`]'s projective warp with nearest-neighbour
//! sampling into an enlarged, transparent canvas, so a binary mask stays
//! binary after rotation.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use crate::color;
use crate::types::{BlendMode, Color, RgbaImage, SortError};

/// Fill used for canvas area outside the rotated image.
pub const TRANSPARENT: Color = Rgba([0, 0, 0, 0]);

/// Largest distance, in pixels, the scanned crop origin may drift from the
/// geometric centre before the centre is used instead.
const TRIM_SCAN_TOLERANCE: u32 = 2;

/// Convert any decoded image to 8-bit non-premultiplied RGBA.
#[must_use]
pub fn to_rgba(image: &DynamicImage) -> RgbaImage {
    image.to_rgba8()
}

/// Decode raw image bytes (PNG, JPEG, BMP or WebP) into RGBA.
///
/// # Errors
///
/// Returns [`SortError::InvalidImage`] if `bytes` is empty and
/// [`SortError::ImageDecode`] if the format is unrecognized or the data is
/// corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, SortError> {
    if bytes.is_empty() {
        return Err(SortError::InvalidImage("no image data".to_string()));
    }
    let img = image::load_from_memory(bytes)?;
    Ok(to_rgba(&img))
}

/// Everything needed to undo a rotation: the angle that was applied and
/// the size of the image before it was rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationRevert {
    angle: i32,
    width: u32,
    height: u32,
}

impl RotationRevert {
    /// The normalized angle that was applied.
    #[must_use]
    pub const fn angle(&self) -> i32 {
        self.angle
    }

    /// The size of the image before rotation.
    #[must_use]
    pub const fn original_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Rotate a processed image back and crop it to the original rectangle.
    #[must_use]
    pub fn revert(&self, rotated: &RgbaImage) -> RgbaImage {
        let back = rotate(rotated, -self.angle);
        trim_transparent_workspace(&back, self.width, self.height)
    }
}

/// Rotate `image` by `angle` degrees clockwise and return the rotated image
/// together with the record needed to revert it.
#[must_use]
pub fn rotate_with_revert(image: &RgbaImage, angle: i32) -> (RgbaImage, RotationRevert) {
    let angle = angle.rem_euclid(360);
    let revert = RotationRevert {
        angle,
        width: image.width(),
        height: image.height(),
    };
    (rotate(image, angle), revert)
}

/// Rotate `image` by `angle` degrees clockwise.
///
/// Arbitrary angles enlarge the canvas to the rotated bounding box; the
/// area outside the source is transparent.
#[must_use]
pub fn rotate(image: &RgbaImage, angle: i32) -> RgbaImage {
    match angle.rem_euclid(360) {
        0 => image.clone(),
        90 => imageops::rotate90(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate270(image),
        other => rotate_expanding(image, other),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn rotate_expanding(image: &RgbaImage, degrees: i32) -> RgbaImage {
    let theta = f64::from(degrees).to_radians();
    let (sin, cos) = theta.sin_cos();
    let w = f64::from(image.width());
    let h = f64::from(image.height());

    let out_w = (w.mul_add(cos.abs(), h * sin.abs()) - 1e-9).ceil().max(1.0) as u32;
    let out_h = (w.mul_add(sin.abs(), h * cos.abs()) - 1e-9).ceil().max(1.0) as u32;

    let projection = Projection::translate(out_w as f32 / 2.0, out_h as f32 / 2.0)
        * Projection::rotate(theta as f32)
        * Projection::translate(-(w as f32) / 2.0, -(h as f32) / 2.0);

    let mut out = RgbaImage::from_pixel(out_w, out_h, TRANSPARENT);
    warp_into(
        image,
        &projection,
        Interpolation::Nearest,
        TRANSPARENT,
        &mut out,
    );
    out
}

/// Crop a reverted rotation workspace back to a `width` x `height` image.
///
/// The crop origin is found by scanning for the first row and the first
/// column holding a non-transparent pixel. If that origin does not fit,
/// or strays from the centred position (the source itself had a
/// transparent border), the centred origin is used.
#[must_use]
pub fn trim_transparent_workspace(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if (w, h) == (width, height) {
        return image.clone();
    }
    let width = width.min(w);
    let height = height.min(h);

    let centre_x = (w - width) / 2;
    let centre_y = (h - height) / 2;

    let first_row = (0..h).find(|&y| (0..w).any(|x| image.get_pixel(x, y)[3] != 0));
    let first_col = (0..w).find(|&x| (0..h).any(|y| image.get_pixel(x, y)[3] != 0));

    let (x, y) = match (first_col, first_row) {
        (Some(x), Some(y))
            if x + width <= w
                && y + height <= h
                && x.abs_diff(centre_x) <= TRIM_SCAN_TOLERANCE
                && y.abs_diff(centre_y) <= TRIM_SCAN_TOLERANCE =>
        {
            (x, y)
        }
        _ => (centre_x, centre_y),
    };

    imageops::crop_imm(image, x, y, width, height).to_image()
}

/// The dimensions of `image` after scaling by `factor`: `floor(w * factor)`
/// by `floor(h * factor)`.
///
/// # Errors
///
/// Returns [`SortError::InvalidOptions`] if `factor` is outside `(0, 1]`
/// and [`SortError::InvalidImage`] if a scaled side would be empty.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> Result<(u32, u32), SortError> {
    if !(factor > 0.0 && factor <= 1.0) {
        return Err(SortError::InvalidOptions(format!(
            "scale {factor} is outside (0, 1]"
        )));
    }
    let w = (f64::from(width) * factor).floor() as u32;
    let h = (f64::from(height) * factor).floor() as u32;
    if w == 0 || h == 0 {
        return Err(SortError::InvalidImage(format!(
            "scaling {width}x{height} by {factor} leaves an empty image"
        )));
    }
    Ok((w, h))
}

/// Scale a color image by `factor` with a triangle (bilinear) filter.
///
/// # Errors
///
/// See [`scaled_dimensions`].
pub fn scale(image: &RgbaImage, factor: f64) -> Result<RgbaImage, SortError> {
    scale_with(image, factor, FilterType::Triangle)
}

/// Scale a mask image by `factor` with nearest-neighbour sampling, keeping
/// every pixel pure black or pure white.
///
/// # Errors
///
/// See [`scaled_dimensions`].
pub fn scale_mask(mask: &RgbaImage, factor: f64) -> Result<RgbaImage, SortError> {
    scale_with(mask, factor, FilterType::Nearest)
}

fn scale_with(image: &RgbaImage, factor: f64, filter: FilterType) -> Result<RgbaImage, SortError> {
    let (w, h) = scaled_dimensions(image.width(), image.height(), factor)?;
    if (w, h) == image.dimensions() {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, w, h, filter))
}

/// Invert the color channels of an image, keeping alpha.
#[must_use]
pub fn invert(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = !pixel[0];
        pixel[1] = !pixel[1];
        pixel[2] = !pixel[2];
    }
    out
}

/// Blend two equally sized images pixel by pixel.
///
/// # Errors
///
/// Returns [`SortError::ImageSizeMismatch`] if the sizes differ.
pub fn blend_images(
    a: &RgbaImage,
    b: &RgbaImage,
    mode: BlendMode,
) -> Result<RgbaImage, SortError> {
    if a.dimensions() != b.dimensions() {
        return Err(SortError::size_mismatch(a.dimensions(), b.dimensions()));
    }
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        *dst = color::blend(*dst, *src, mode);
    }
    Ok(out)
}

/// Channel-wise integer mean of a non-empty set of colors.
///
/// # Errors
///
/// Returns [`SortError::OutOfRange`] if `colors` is empty.
#[allow(clippy::cast_possible_truncation)]
pub fn average_color(colors: &[Color]) -> Result<Color, SortError> {
    if colors.is_empty() {
        return Err(SortError::OutOfRange(
            "cannot average an empty set of colors".to_string(),
        ));
    }
    let mut sums = [0u64; 4];
    for c in colors {
        for (sum, channel) in sums.iter_mut().zip(c.0) {
            *sum += u64::from(channel);
        }
    }
    let n = colors.len() as u64;
    Ok(Rgba(sums.map(|sum| (sum / n) as u8)))
}

/// Average a set of equally long columns into a single column.
///
/// # Errors
///
/// Returns [`SortError::OutOfRange`] on an empty set and
/// [`SortError::ImageSizeMismatch`] on columns of differing lengths.
pub fn average_columns(columns: &[Vec<Color>]) -> Result<Vec<Color>, SortError> {
    average_sequences(columns)
}

/// Average a set of equally long rows into a single row.
///
/// # Errors
///
/// Returns [`SortError::OutOfRange`] on an empty set and
/// [`SortError::ImageSizeMismatch`] on rows of differing lengths.
pub fn average_rows(rows: &[Vec<Color>]) -> Result<Vec<Color>, SortError> {
    average_sequences(rows)
}

#[allow(clippy::cast_possible_truncation)]
fn average_sequences(sequences: &[Vec<Color>]) -> Result<Vec<Color>, SortError> {
    let Some(first) = sequences.first() else {
        return Err(SortError::OutOfRange(
            "cannot average an empty set of sequences".to_string(),
        ));
    };
    let len = first.len();
    if let Some(ragged) = sequences.iter().find(|s| s.len() != len) {
        return Err(SortError::size_mismatch(
            (len as u32, 1),
            (ragged.len() as u32, 1),
        ));
    }

    let mut column = Vec::with_capacity(sequences.len());
    (0..len)
        .map(|i| {
            column.clear();
            column.extend(sequences.iter().map(|s| s[i]));
            average_color(&column)
        })
        .collect()
}
