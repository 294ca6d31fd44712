//! pixelsort-core: Pixel sorting engine (sans-IO).
//!
//! Reorders runs of pixels along rows and/or columns of an RGBA image:
//! optional scale -> optional edge mask -> optional rotation ->
//! parallel strip sorting (repeated for each cycle) -> revert rotation ->
//! optional blend with the unsorted source.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! `RgbaImage` buffers. Decoding from bytes is offered by
//! [`imaging::decode_rgba`]; file handling lives in the `pixelsort` binary.

pub mod buffered;
pub mod canny;
pub mod color;
pub mod imaging;
pub mod interval;
pub mod mask;
pub mod parallel;
pub mod sorter;
pub mod strip;
pub mod trap;
pub mod types;

pub use buffered::{BufferedSorter, BufferedState, SortCanceller};
pub use canny::perform_edge_detection;
pub use mask::Mask;
pub use parallel::CancellationToken;
pub use sorter::Sorter;
pub use types::{
    Blending, Color, IntervalDeterminant, IntervalPainting, RgbaImage, SortDeterminant,
    SortDirection, SortError, SortOrder, SorterOptions,
};

/// Build a [`Sorter`] for `image`, an optional black/white `mask` of the
/// same size, and `options`.
///
/// # Errors
///
/// See [`Sorter::new`].
pub fn create_sorter(
    image: RgbaImage,
    mask: Option<RgbaImage>,
    options: SorterOptions,
) -> Result<Sorter, SortError> {
    Sorter::new(image, mask, options)
}

/// Build a [`BufferedSorter`] for `image` and an optional mask.
///
/// # Errors
///
/// See [`BufferedSorter::new`].
pub fn create_buffered_sorter(
    image: RgbaImage,
    mask: Option<RgbaImage>,
) -> Result<BufferedSorter, SortError> {
    BufferedSorter::new(image, mask)
}

/// Parse a black/white image into a [`Mask`].
///
/// # Errors
///
/// Returns [`SortError::InvalidMaskImage`] if any pixel is neither pure
/// black nor pure white.
pub fn create_mask(image: &RgbaImage) -> Result<Mask, SortError> {
    Mask::new(image)
}

/// A mask that exempts nothing.
#[must_use]
pub const fn create_empty_mask() -> Mask {
    Mask::empty()
}
