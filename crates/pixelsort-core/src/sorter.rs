//! Stateless sorter: every call runs the full scale, edge, rotate, sort,
//! revert and blend sequence from scratch.

use std::time::Instant;

use crate::canny;
use crate::imaging::{self, RotationRevert};
use crate::mask::Mask;
use crate::parallel::{self, CancellationToken};
use crate::strip::StripContext;
use crate::types::{IntervalDeterminant, RgbaImage, SortError, SorterOptions};

/// A validated source image, optional mask and option set.
#[derive(Debug, Clone)]
pub struct Sorter {
    image: RgbaImage,
    mask: Option<RgbaImage>,
    options: SorterOptions,
}

impl Sorter {
    /// Validate the inputs and build a sorter.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidImage`] for an empty image,
    /// [`SortError::InvalidOptions`] if the options fail validation, and
    /// [`SortError::InvalidMaskImage`] if the mask is not pure black and
    /// white or does not match the image size.
    pub fn new(
        image: RgbaImage,
        mask: Option<RgbaImage>,
        options: SorterOptions,
    ) -> Result<Self, SortError> {
        validate_inputs(&image, mask.as_ref())?;
        options.validate(mask.is_some())?;
        Ok(Self {
            image,
            mask,
            options,
        })
    }

    #[must_use]
    pub const fn options(&self) -> &SorterOptions {
        &self.options
    }

    /// Sort the image.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while scaling, detecting edges or
    /// sorting.
    pub fn sort(&self) -> Result<RgbaImage, SortError> {
        self.sort_with_cancellation(&CancellationToken::new())
    }

    /// Sort the image, stopping early once `cancel` is raised.
    ///
    /// # Errors
    ///
    /// As [`Sorter::sort`], plus [`SortError::SortingCancelled`].
    #[tracing::instrument(skip_all, fields(
        width = self.image.width(),
        height = self.image.height(),
    ))]
    pub fn sort_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, SortError> {
        let start = Instant::now();
        let options = &self.options;

        let (source, mask_image) = if options.needs_scaling() {
            tracing::debug!(scale = options.scale, "scaling source");
            let mask = self
                .mask
                .as_ref()
                .map(|m| imaging::scale_mask(m, options.scale))
                .transpose()?;
            (imaging::scale(&self.image, options.scale)?, mask)
        } else {
            (self.image.clone(), self.mask.clone())
        };
        cancel.check()?;

        let mask_image = if options.interval_determinant == IntervalDeterminant::EdgeDetection {
            tracing::debug!("detecting edges");
            Some(canny::perform_edge_detection(&source, true)?)
        } else {
            mask_image
        };
        cancel.check()?;

        let angle = options.normalized_angle();
        let (rotated, revert) = imaging::rotate_with_revert(&source, angle);
        let rotated_mask = mask_image.map(|m| imaging::rotate(&m, angle));
        let mask = build_mask(rotated_mask.as_ref(), rotated.dimensions())?;

        let sorted = run_cycles(&rotated, &mask, options, cancel)?;
        let result = finish(&sorted, &revert, &source, options)?;

        tracing::debug!(elapsed = ?start.elapsed(), "sort complete");
        Ok(result)
    }
}

/// Reject empty images and masks that are invalid or sized differently
/// from the image.
pub(crate) fn validate_inputs(image: &RgbaImage, mask: Option<&RgbaImage>) -> Result<(), SortError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SortError::InvalidImage(format!(
            "image is {}x{}",
            image.width(),
            image.height()
        )));
    }
    if let Some(mask) = mask {
        if mask.dimensions() != image.dimensions() {
            return Err(SortError::InvalidMaskImage(format!(
                "mask is {}x{} but the image is {}x{}",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            )));
        }
        Mask::new(mask)?;
    }
    Ok(())
}

/// Parse the working mask, which must cover the working image exactly.
pub(crate) fn build_mask(
    image: Option<&RgbaImage>,
    dimensions: (u32, u32),
) -> Result<Mask, SortError> {
    match image {
        Some(image) if image.dimensions() != dimensions => {
            Err(SortError::InvalidMaskImage(format!(
                "mask is {}x{} but the working image is {}x{}",
                image.width(),
                image.height(),
                dimensions.0,
                dimensions.1
            )))
        }
        Some(image) => Mask::new(image),
        None => Ok(Mask::empty()),
    }
}

/// Run every cycle of strip passes over `source` and return the result.
///
/// Between passes of a cycle, and between cycles, the destination is
/// copied back into the source so the next pass sees the previous output.
pub(crate) fn run_cycles(
    source: &RgbaImage,
    mask: &Mask,
    options: &SorterOptions,
    cancel: &CancellationToken,
) -> Result<RgbaImage, SortError> {
    let ctx = StripContext {
        options,
        mask,
        cancel,
    };
    let mut src = source.clone();
    let mut dst = source.clone();

    for cycle in 0..options.cycles {
        for (i, &axis) in options.sort_order.passes().iter().enumerate() {
            if i > 0 {
                src.copy_from_slice(&dst);
            }
            tracing::debug!(cycle, ?axis, "strip pass");
            parallel::sort_pass(&ctx, axis, &src, &mut dst)?;
        }
        if cycle + 1 < options.cycles {
            src.copy_from_slice(&dst);
        }
    }
    Ok(dst)
}

/// Undo the rotation and apply blending against the unsorted source.
pub(crate) fn finish(
    sorted: &RgbaImage,
    revert: &RotationRevert,
    source: &RgbaImage,
    options: &SorterOptions,
) -> Result<RgbaImage, SortError> {
    let reverted = if revert.angle() == 0 {
        sorted.clone()
    } else {
        tracing::debug!(angle = revert.angle(), "reverting rotation");
        revert.revert(sorted)
    };

    match options.blending.mode() {
        Some(mode) => {
            tracing::debug!(?mode, "blending with source");
            imaging::blend_images(&reverted, source, mode)
        }
        None => Ok(reverted),
    }
}
