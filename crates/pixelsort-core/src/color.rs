//! Color and scalar kernels: perceived brightness, HSL conversion,
//! interpolation, clamping, and per-pixel blending.
//!
//! Everything here is a pure function of its inputs and is called from
//! the strip workers' inner loop, so nothing allocates.

use crate::types::{BlendMode, Color, SortError};

/// Break point of the CIE L* curve, `(6/29)^3`.
const CIE_EPSILON: f64 = 216.0 / 24389.0;

/// Slope of the linear segment of the CIE L* curve, `(29/3)^3`.
const CIE_KAPPA: f64 = 24389.0 / 27.0;

/// A color in HSL space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Hue in whole degrees, `0..=360`. Zero for achromatic colors.
    pub hue: u16,
    /// Saturation in `[0, 1]`.
    pub saturation: f64,
    /// Lightness in `[0, 1]`.
    pub lightness: f64,
}

/// Undo the sRGB transfer curve for one 8-bit channel.
fn linearize(channel: u8) -> f64 {
    let v = f64::from(channel) / 255.0;
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Perceived brightness (CIE L* scaled to `[0, 1]`) of a color.
///
/// Luminance is computed on linearized sRGB with the Rec. 709
/// coefficients, then mapped through the piecewise L* curve.
#[must_use]
pub fn perceived_brightness(c: Color) -> f64 {
    let [r, g, b, _] = c.0;
    let y = 0.0722f64.mul_add(
        linearize(b),
        0.2126f64.mul_add(linearize(r), 0.7152 * linearize(g)),
    );

    let l = if y <= CIE_EPSILON {
        y * CIE_KAPPA / 100.0
    } else {
        y.cbrt().mul_add(116.0, -16.0) / 100.0
    };
    clamp_unit(l)
}

/// Convert a color to HSL. Alpha is ignored.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgba_to_hsl(c: Color) -> Hsl {
    let [r, g, b, _] = c.0;
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    let lightness = (max + min) / 2.0;

    if chroma == 0.0 {
        return Hsl {
            hue: 0,
            saturation: 0.0,
            lightness,
        };
    }

    let saturation = if lightness > 0.5 {
        chroma / (2.0 - max - min)
    } else {
        chroma / (max + min)
    };

    #[allow(clippy::float_cmp)]
    let sector = if max == r {
        (g - b) / chroma + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / chroma + 2.0
    } else {
        (r - g) / chroma + 4.0
    };

    Hsl {
        hue: (sector * 60.0).round().clamp(0.0, 360.0) as u16,
        saturation: clamp_unit(saturation),
        lightness: clamp_unit(lightness),
    }
}

/// Hue of a color in whole degrees.
#[must_use]
pub fn hue(c: Color) -> u16 {
    rgba_to_hsl(c).hue
}

/// HSL saturation of a color.
#[must_use]
pub fn saturation(c: Color) -> f64 {
    rgba_to_hsl(c).saturation
}

/// Product of the three color channels normalized to `[0, 1]`.
#[must_use]
pub fn absolute_color(c: Color) -> f64 {
    let [r, g, b, _] = c.0;
    f64::from(r) * f64::from(g) * f64::from(b) / (255.0 * 255.0 * 255.0)
}

/// Linear interpolation between `a` and `b`.
///
/// # Errors
///
/// Returns [`SortError::OutOfRange`] if `t` is not in `[0, 1]`.
pub fn lerp(a: f64, b: f64, t: f64) -> Result<f64, SortError> {
    if !(0.0..=1.0).contains(&t) {
        return Err(SortError::OutOfRange(format!(
            "interpolation factor {t} is outside [0, 1]"
        )));
    }
    Ok(t.mul_add(b - a, a))
}

/// Channel-wise linear interpolation between two colors, alpha included.
///
/// # Errors
///
/// Returns [`SortError::OutOfRange`] if `t` is not in `[0, 1]`.
pub fn lerp_color(a: Color, b: Color, t: f64) -> Result<Color, SortError> {
    let mut out = [0u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        *channel = clamp_u8(lerp(f64::from(a.0[i]), f64::from(b.0[i]), t)?);
    }
    Ok(image::Rgba(out))
}

/// Clamp a value into `[0, 1]`. NaN maps to 0.
#[must_use]
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Round and clamp a value into the `u8` range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_u8(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Blend two colors channel-wise. The result is always opaque.
#[must_use]
pub fn blend(a: Color, b: Color, mode: BlendMode) -> Color {
    let pick = match mode {
        BlendMode::Lighten => u8::max,
        BlendMode::Darken => u8::min,
    };
    image::Rgba([
        pick(a.0[0], b.0[0]),
        pick(a.0[1], b.0[1]),
        pick(a.0[2], b.0[2]),
        u8::MAX,
    ])
}
