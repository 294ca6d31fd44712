//! Binary mask: decides which pixels are exempt from sorting.
//!
//! A mask is built from an image whose pixels are all pure black (masked)
//! or pure white (unmasked). Anything else is rejected at construction, so
//! lookups never have to interpret intermediate values.

use crate::color;
use crate::types::{RgbaImage, SortError};

/// Which pixels of the working image are masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    inner: Option<MaskBits>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MaskBits {
    width: u32,
    height: u32,
    masked: Vec<bool>,
}

impl Mask {
    /// Parse a black/white image into a mask.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidMaskImage`] if any pixel has non-zero
    /// saturation or a lightness other than 0 or 1.
    pub fn new(image: &RgbaImage) -> Result<Self, SortError> {
        let mut masked = Vec::with_capacity(image.len() / 4);
        for (x, y, pixel) in image.enumerate_pixels() {
            let hsl = color::rgba_to_hsl(*pixel);
            #[allow(clippy::float_cmp)]
            let valid = hsl.saturation == 0.0 && (hsl.lightness == 0.0 || hsl.lightness == 1.0);
            if !valid {
                return Err(SortError::InvalidMaskImage(format!(
                    "pixel ({x}, {y}) = {:?} is neither pure black nor pure white",
                    pixel.0
                )));
            }
            masked.push(hsl.lightness == 0.0);
        }

        Ok(Self {
            inner: Some(MaskBits {
                width: image.width(),
                height: image.height(),
                masked,
            }),
        })
    }

    /// A mask that leaves every pixel unmasked.
    #[must_use]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// Whether this is the empty mask.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Size of the mask image, or `None` for the empty mask.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.as_ref().map(|bits| (bits.width, bits.height))
    }

    /// Number of masked pixels.
    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |bits| bits.masked.iter().filter(|&&m| m).count())
    }

    /// Whether the pixel at `(x, y)` is masked.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::OutOfBounds`] if `(x, y)` lies outside the mask.
    /// The empty mask answers `false` for every coordinate.
    pub fn is_masked_at(&self, x: usize, y: usize) -> Result<bool, SortError> {
        let Some(bits) = &self.inner else {
            return Ok(false);
        };
        if x >= bits.width as usize || y >= bits.height as usize {
            return Err(bits.out_of_bounds(x, y));
        }
        Ok(bits.masked[y * bits.width as usize + x])
    }

    /// Whether the pixel at row-major `index` is masked.
    ///
    /// Callers holding a byte offset into an RGBA buffer pass `offset / 4`.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::OutOfBounds`] if `index` lies outside the mask.
    /// The empty mask answers `false` for every index.
    pub fn is_masked(&self, index: usize) -> Result<bool, SortError> {
        let Some(bits) = &self.inner else {
            return Ok(false);
        };
        bits.masked.get(index).copied().ok_or_else(|| {
            let width = (bits.width as usize).max(1);
            bits.out_of_bounds(index % width, index / width)
        })
    }
}

impl Default for Mask {
    fn default() -> Self {
        Self::empty()
    }
}

impl MaskBits {
    const fn out_of_bounds(&self, x: usize, y: usize) -> SortError {
        SortError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        }
    }
}
