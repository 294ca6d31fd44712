//! Sorting a single strip (one row or one column) of the working image.
//!
//! The strip is read from the source buffer at `start, start + step, ...`
//! and written, in scan order, into a contiguous output slice of
//! `count * 4` bytes. Row passes hand in the destination row directly;
//! column passes hand in a column of a scratch buffer.

use rand::Rng;

use crate::color;
use crate::interval::{DEFAULT_CAPACITY, Interval, Weight, WeightKind};
use crate::mask::Mask;
use crate::parallel::CancellationToken;
use crate::types::{Color, IntervalDeterminant, SorterOptions, SortError};

/// Bytes per RGBA pixel.
pub const PIXEL_BYTES: usize = 4;

/// Location of a strip inside a row-major RGBA buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strip {
    /// Byte offset of the first pixel.
    pub start: usize,
    /// Byte distance between consecutive pixels.
    pub step: usize,
    /// Number of pixels.
    pub count: usize,
}

impl Strip {
    /// Row `y` of an image `width` pixels wide.
    #[must_use]
    pub const fn row(y: usize, width: usize) -> Self {
        Self {
            start: y * width * PIXEL_BYTES,
            step: PIXEL_BYTES,
            count: width,
        }
    }

    /// Column `x` of an image `width` by `height` pixels.
    #[must_use]
    pub const fn column(x: usize, width: usize, height: usize) -> Self {
        Self {
            start: x * PIXEL_BYTES,
            step: width * PIXEL_BYTES,
            count: height,
        }
    }
}

/// Read-only inputs shared by every strip of a pass.
#[derive(Debug, Clone, Copy)]
pub struct StripContext<'a> {
    pub options: &'a SorterOptions,
    pub mask: &'a Mask,
    pub cancel: &'a CancellationToken,
}

/// Sort one strip of `src` into `out`.
///
/// # Errors
///
/// Returns [`SortError::SortingCancelled`] as soon as the token is
/// cancelled, and [`SortError::OutOfBounds`] if the strip or the mask does
/// not cover the source buffer.
pub fn sort_strip<R: Rng + ?Sized>(
    ctx: &StripContext<'_>,
    strip: Strip,
    src: &[u8],
    out: &mut [u8],
    rng: &mut R,
) -> Result<(), SortError> {
    if out.len() < strip.count * PIXEL_BYTES {
        return Err(SortError::OutOfRange(format!(
            "strip of {} pixels does not fit a {} byte output",
            strip.count,
            out.len()
        )));
    }

    match WeightKind::from(ctx.options.sort_determinant) {
        WeightKind::Integer(weight) => run(ctx, strip, src, out, Interval::new(weight), rng),
        WeightKind::Normalized(weight) => run(ctx, strip, src, out, Interval::new(weight), rng),
    }
}

fn run<W: Weight, R: Rng + ?Sized>(
    ctx: &StripContext<'_>,
    strip: Strip,
    src: &[u8],
    out: &mut [u8],
    mut interval: Interval<W>,
    rng: &mut R,
) -> Result<(), SortError> {
    let options = ctx.options;
    let direction = options.sort_direction;
    let painting = options.interval_painting;

    let mut max_length = randomized_max_length(
        options.interval_length,
        options.interval_length_random_factor,
        rng,
    );
    let mut sorted = Vec::with_capacity(DEFAULT_CAPACITY);

    for i in 0..strip.count {
        ctx.cancel.check()?;

        let offset = strip.start + i * strip.step;
        let pixel = read_pixel(src, offset, strip)?;
        let masked = ctx.mask.is_masked(offset / PIXEL_BYTES)?;

        let flush = pixel[3] < u8::MAX
            || (max_length != 0 && interval.count() >= max_length)
            || (options.use_mask && masked)
            || !meets_interval_determinant(pixel, options, masked);

        if !flush {
            interval.append(pixel);
            continue;
        }

        if interval.any() {
            let n = interval.count();
            interval.sort_to_buffer(direction, painting, &mut sorted, rng)?;
            write_run(out, i - n, &sorted);
            max_length = randomized_max_length(
                options.interval_length,
                options.interval_length_random_factor,
                rng,
            );
        }
        write_run(out, i, &[pixel]);
    }

    if interval.any() {
        let n = interval.count();
        interval.sort_to_buffer(direction, painting, &mut sorted, rng)?;
        write_run(out, strip.count - n, &sorted);
    }

    Ok(())
}

/// Whether `pixel` may join the current interval.
///
/// Threshold determinants are inclusive on both sides. `Mask` and
/// `EdgeDetection` ignore the thresholds and accept unmasked pixels.
#[must_use]
pub fn meets_interval_determinant(pixel: Color, options: &SorterOptions, masked: bool) -> bool {
    let lower = options.interval_determinant_lower_threshold;
    let upper = options.interval_determinant_upper_threshold;
    let value = match options.interval_determinant {
        IntervalDeterminant::Brightness => color::perceived_brightness(pixel),
        IntervalDeterminant::Hue => f64::from(color::hue(pixel)) / 360.0,
        IntervalDeterminant::Saturation => color::saturation(pixel),
        IntervalDeterminant::AbsoluteColor => color::absolute_color(pixel),
        IntervalDeterminant::Mask | IntervalDeterminant::EdgeDetection => return !masked,
    };
    (lower..=upper).contains(&value)
}

/// Interval length cap for the next interval: `length` jittered uniformly
/// by up to `random_factor` in either direction, never below 1. Zero in
/// either argument disables the jitter; a zero `length` means unlimited.
#[must_use]
pub fn randomized_max_length<R: Rng + ?Sized>(
    length: usize,
    random_factor: usize,
    rng: &mut R,
) -> usize {
    if length == 0 || random_factor == 0 {
        return length;
    }
    let length = i64::try_from(length).unwrap_or(i64::MAX);
    let factor = i64::try_from(random_factor).unwrap_or(i64::MAX);
    let jittered = length.saturating_add(rng.gen_range(-factor..=factor));
    usize::try_from(jittered.max(1)).unwrap_or(1)
}

fn read_pixel(src: &[u8], offset: usize, strip: Strip) -> Result<Color, SortError> {
    src.get(offset..offset + PIXEL_BYTES)
        .map(|bytes| image::Rgba([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or_else(|| {
            SortError::OutOfRange(format!(
                "strip {strip:?} reads past the end of a {} byte source",
                src.len()
            ))
        })
}

/// Write `colors` into `out` starting at pixel `index`.
fn write_run(out: &mut [u8], index: usize, colors: &[Color]) {
    let start = index * PIXEL_BYTES;
    let end = start + colors.len() * PIXEL_BYTES;
    for (dst, c) in out[start..end].chunks_exact_mut(PIXEL_BYTES).zip(colors) {
        dst.copy_from_slice(&c.0);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::types::{IntervalPainting, RgbaImage, SortDirection};

    const B: Color = image::Rgba([0, 0, 0, 255]);
    const W: Color = image::Rgba([255, 255, 255, 255]);
    const G: Color = image::Rgba([128, 128, 128, 255]);
    const CLEAR: Color = image::Rgba([255, 255, 255, 0]);

    fn bytes(colors: &[Color]) -> Vec<u8> {
        colors.iter().flat_map(|c| c.0).collect()
    }

    fn colors(bytes: &[u8]) -> Vec<Color> {
        bytes
            .chunks_exact(4)
            .map(|p| image::Rgba([p[0], p[1], p[2], p[3]]))
            .collect()
    }

    fn sort_row(options: &SorterOptions, mask: &Mask, row: &[Color]) -> Vec<Color> {
        let src = bytes(row);
        let mut out = vec![0; src.len()];
        let cancel = CancellationToken::new();
        let ctx = StripContext {
            options,
            mask,
            cancel: &cancel,
        };
        sort_strip(
            &ctx,
            Strip::row(0, row.len()),
            &src,
            &mut out,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        colors(&out)
    }

    #[test]
    fn whole_row_is_one_interval() {
        let out = sort_row(&SorterOptions::default(), &Mask::empty(), &[W, B, W, B, W]);
        assert_eq!(out, vec![B, B, W, W, W]);
    }

    #[test]
    fn transparent_pixel_splits_and_passes_through() {
        let out = sort_row(
            &SorterOptions::default(),
            &Mask::empty(),
            &[W, B, CLEAR, W, G, B],
        );
        assert_eq!(out, vec![B, W, CLEAR, B, G, W]);
    }

    #[test]
    fn threshold_excludes_pixels_outside_range() {
        let options = SorterOptions {
            interval_determinant_lower_threshold: 0.2,
            ..SorterOptions::default()
        };
        // Black is below the threshold and splits the strip.
        let out = sort_row(&options, &Mask::empty(), &[W, G, B, W, G]);
        assert_eq!(out, vec![G, W, B, G, W]);
    }

    #[test]
    fn interval_length_caps_runs() {
        let options = SorterOptions {
            sort_direction: SortDirection::Descending,
            interval_length: 2,
            ..SorterOptions::default()
        };
        // [B, G] is cut at the third pixel, which passes through unsorted.
        let out = sort_row(&options, &Mask::empty(), &[B, G, B, B, W]);
        assert_eq!(out, vec![G, B, B, W, B]);
    }

    #[test]
    fn masked_pixels_stay_put() {
        let mask_image =
            RgbaImage::from_fn(5, 1, |x, _| if x == 2 { B } else { W });
        let mask = Mask::new(&mask_image).unwrap();
        let options = SorterOptions {
            use_mask: true,
            sort_direction: SortDirection::Descending,
            ..SorterOptions::default()
        };
        let out = sort_row(&options, &mask, &[B, W, G, B, W]);
        assert_eq!(out, vec![W, B, G, W, B]);
    }

    #[test]
    fn mask_determinant_ignores_thresholds() {
        let mask_image =
            RgbaImage::from_fn(4, 1, |x, _| if x == 1 { B } else { W });
        let mask = Mask::new(&mask_image).unwrap();
        let options = SorterOptions {
            interval_determinant: IntervalDeterminant::Mask,
            interval_determinant_lower_threshold: 0.9,
            ..SorterOptions::default()
        };
        let out = sort_row(&options, &mask, &[W, G, W, B]);
        assert_eq!(out, vec![W, G, B, W]);
    }

    #[test]
    fn repeat_painting_fills_each_interval() {
        let options = SorterOptions {
            interval_painting: IntervalPainting::Repeat,
            ..SorterOptions::default()
        };
        let out = sort_row(&options, &Mask::empty(), &[G, W, B]);
        assert_eq!(out, vec![G, G, G]);
    }

    #[test]
    fn column_strip_reads_with_row_stride() {
        // 2x3 image; column 1 is [W, B, G] top to bottom.
        let img = RgbaImage::from_fn(2, 3, |x, y| match (x, y) {
            (1, 0) => W,
            (1, 1) => B,
            (1, 2) => G,
            _ => W,
        });
        let options = SorterOptions::default();
        let mask = Mask::empty();
        let cancel = CancellationToken::new();
        let ctx = StripContext {
            options: &options,
            mask: &mask,
            cancel: &cancel,
        };
        let mut out = vec![0; 3 * 4];
        sort_strip(
            &ctx,
            Strip::column(1, 2, 3),
            img.as_raw(),
            &mut out,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert_eq!(colors(&out), vec![B, G, W]);
    }

    #[test]
    fn cancellation_stops_the_strip() {
        let options = SorterOptions::default();
        let mask = Mask::empty();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = StripContext {
            options: &options,
            mask: &mask,
            cancel: &cancel,
        };
        let src = bytes(&[W, B]);
        let mut out = vec![0; src.len()];
        let result = sort_strip(
            &ctx,
            Strip::row(0, 2),
            &src,
            &mut out,
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(SortError::SortingCancelled)));
    }

    #[test]
    fn undersized_output_is_rejected() {
        let options = SorterOptions::default();
        let mask = Mask::empty();
        let cancel = CancellationToken::new();
        let ctx = StripContext {
            options: &options,
            mask: &mask,
            cancel: &cancel,
        };
        let src = bytes(&[W, B]);
        let mut out = vec![0; 4];
        assert!(
            sort_strip(
                &ctx,
                Strip::row(0, 2),
                &src,
                &mut out,
                &mut StdRng::seed_from_u64(0)
            )
            .is_err()
        );
    }

    #[test]
    fn hue_determinant_uses_fraction_of_turn() {
        let red = image::Rgba([255, 0, 0, 255]);
        let blue = image::Rgba([0, 0, 255, 255]);
        let options = SorterOptions {
            interval_determinant: IntervalDeterminant::Hue,
            interval_determinant_upper_threshold: 0.5,
            ..SorterOptions::default()
        };
        assert!(meets_interval_determinant(red, &options, false));
        // Blue sits at 240 degrees, two thirds of a turn.
        assert!(!meets_interval_determinant(blue, &options, false));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let options = SorterOptions {
            interval_determinant: IntervalDeterminant::AbsoluteColor,
            interval_determinant_lower_threshold: 1.0,
            ..SorterOptions::default()
        };
        assert!(meets_interval_determinant(W, &options, false));
        assert!(!meets_interval_determinant(G, &options, false));
    }

    #[test]
    fn randomized_length() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(randomized_max_length(0, 5, &mut rng), 0);
        assert_eq!(randomized_max_length(7, 0, &mut rng), 7);
        for _ in 0..100 {
            let n = randomized_max_length(3, 10, &mut rng);
            assert!((1..=13).contains(&n));
        }
    }
}
