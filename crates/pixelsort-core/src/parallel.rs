//! Parallel strip passes over the working image.
//!
//! Every strip of a pass is an independent rayon task writing to its own
//! chunk of output. Rows are written straight into the destination; columns
//! go to a column-major scratch buffer first and are scattered back once
//! every column has finished. Failures (including cancellation) are funneled
//! through an [`ErrorTrap`], and tasks that start after a failure skip
//! their strip.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::strip::{self, PIXEL_BYTES, Strip, StripContext};
use crate::trap::ErrorTrap;
use crate::types::{Axis, RgbaImage, SortError};

/// Shared cancel flag polled by strip workers.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(SortingCancelled)` once the flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::SortingCancelled`] if [`CancellationToken::cancel`]
    /// has been called on this token or any clone of it.
    pub fn check(&self) -> Result<(), SortError> {
        if self.is_cancelled() {
            Err(SortError::SortingCancelled)
        } else {
            Ok(())
        }
    }
}

/// Run one pass along `axis`, reading `src` and writing `dst`.
///
/// # Errors
///
/// See [`sort_rows`] and [`sort_columns`].
pub fn sort_pass(
    ctx: &StripContext<'_>,
    axis: Axis,
    src: &RgbaImage,
    dst: &mut RgbaImage,
) -> Result<(), SortError> {
    match axis {
        Axis::Rows => sort_rows(ctx, src, dst),
        Axis::Columns => sort_columns(ctx, src, dst),
    }
}

/// Sort every row of `src` into `dst`, one task per row.
///
/// # Errors
///
/// Returns [`SortError::ImageSizeMismatch`] if the buffers differ in size,
/// otherwise the first error raised by any row.
pub fn sort_rows(
    ctx: &StripContext<'_>,
    src: &RgbaImage,
    dst: &mut RgbaImage,
) -> Result<(), SortError> {
    check_sizes(src, dst)?;
    let (width, height) = (src.width() as usize, src.height() as usize);
    if width == 0 || height == 0 {
        return Ok(());
    }

    let source: &[u8] = src.as_raw();
    let out: &mut [u8] = dst;
    let trap = ErrorTrap::new();

    out.par_chunks_mut(width * PIXEL_BYTES)
        .enumerate()
        .for_each(|(y, row)| {
            if trap.is_set() {
                return;
            }
            let mut rng = rand::thread_rng();
            if let Err(e) = strip::sort_strip(ctx, Strip::row(y, width), source, row, &mut rng) {
                trap.set(e);
            }
        });

    trap.into_result()
}

/// Sort every column of `src` into `dst`, one task per column.
///
/// # Errors
///
/// Returns [`SortError::ImageSizeMismatch`] if the buffers differ in size,
/// otherwise the first error raised by any column. `dst` is left untouched
/// on error.
pub fn sort_columns(
    ctx: &StripContext<'_>,
    src: &RgbaImage,
    dst: &mut RgbaImage,
) -> Result<(), SortError> {
    check_sizes(src, dst)?;
    let (width, height) = (src.width() as usize, src.height() as usize);
    if width == 0 || height == 0 {
        return Ok(());
    }

    let source: &[u8] = src.as_raw();
    let column_bytes = height * PIXEL_BYTES;
    let mut scratch = vec![0u8; width * column_bytes];
    let trap = ErrorTrap::new();

    scratch
        .par_chunks_mut(column_bytes)
        .enumerate()
        .for_each(|(x, column)| {
            if trap.is_set() {
                return;
            }
            let mut rng = rand::thread_rng();
            let strip = Strip::column(x, width, height);
            if let Err(e) = strip::sort_strip(ctx, strip, source, column, &mut rng) {
                trap.set(e);
            }
        });
    trap.into_result()?;

    let row_bytes = width * PIXEL_BYTES;
    let out: &mut [u8] = dst;
    for (x, column) in scratch.chunks_exact(column_bytes).enumerate() {
        for (y, pixel) in column.chunks_exact(PIXEL_BYTES).enumerate() {
            let offset = y * row_bytes + x * PIXEL_BYTES;
            out[offset..offset + PIXEL_BYTES].copy_from_slice(pixel);
        }
    }
    Ok(())
}

fn check_sizes(src: &RgbaImage, dst: &RgbaImage) -> Result<(), SortError> {
    if src.dimensions() == dst.dimensions() {
        Ok(())
    } else {
        Err(SortError::size_mismatch(src.dimensions(), dst.dimensions()))
    }
}
