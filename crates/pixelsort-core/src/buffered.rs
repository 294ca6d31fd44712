//! Buffered sorter: the same pipeline as [`crate::sorter::Sorter`], but
//! intermediate images are memoized between calls so that re-sorting with
//! a different direction, painting or threshold skips the scale, edge and
//! rotate stages.
//!
//! Each slot remembers the scale and angle it was built for and is reused
//! only when the running sort asks for the same ones:
//!
//! | slot     | reused when            |
//! |----------|------------------------|
//! | scaled   | same scale             |
//! | rotated  | same scale and angle   |
//! | edges    | same scale and angle   |
//!
//! An edge slot survives sorts that do not use edge detection, so it is
//! checked against its own key rather than against the previous options.
//! Any failure or cancellation rolls the cache back to empty.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::canny;
use crate::imaging::{self, RotationRevert};
use crate::parallel::CancellationToken;
use crate::sorter;
use crate::types::{IntervalDeterminant, RgbaImage, SortError, SorterOptions};

/// Scale and normalized angle a cached image was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SlotKey {
    scale: f64,
    angle: i32,
}

impl SlotKey {
    const fn of(options: &SorterOptions) -> Self {
        Self {
            scale: options.scale,
            angle: options.normalized_angle(),
        }
    }

    #[allow(clippy::float_cmp)]
    fn same_scale(self, other: Self) -> bool {
        self.scale == other.scale
    }
}

#[derive(Debug, Clone)]
struct ScaledSlot {
    key: SlotKey,
    source: RgbaImage,
    mask: Option<RgbaImage>,
}

#[derive(Debug, Clone)]
struct RotatedSlot {
    key: SlotKey,
    source: RgbaImage,
    mask: Option<RgbaImage>,
    revert: RotationRevert,
}

#[derive(Debug, Clone)]
struct EdgeSlot {
    key: SlotKey,
    image: RgbaImage,
}

/// Memoized intermediate images and the options they were built for.
#[derive(Debug, Clone, Default)]
pub struct BufferedState {
    current: Option<SorterOptions>,
    incoming: Option<SorterOptions>,
    committed: bool,
    scaled: Option<ScaledSlot>,
    rotated: Option<RotatedSlot>,
    edges: Option<EdgeSlot>,
}

impl BufferedState {
    /// Options of the last committed sort.
    #[must_use]
    pub const fn current(&self) -> Option<&SorterOptions> {
        self.current.as_ref()
    }

    /// Whether the last sort completed and was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    #[must_use]
    pub const fn has_scaled(&self) -> bool {
        self.scaled.is_some()
    }

    #[must_use]
    pub const fn has_rotated(&self) -> bool {
        self.rotated.is_some()
    }

    #[must_use]
    pub const fn has_edges(&self) -> bool {
        self.edges.is_some()
    }

    fn apply(&mut self, options: SorterOptions) {
        self.incoming = Some(options);
        self.committed = false;
    }

    fn commit(&mut self) {
        if let Some(incoming) = self.incoming.take() {
            self.current = Some(incoming);
        }
        self.committed = true;
    }

    fn rollback(&mut self) {
        *self = Self::default();
    }
}

/// Cloneable handle that cancels the sort currently running on a
/// [`BufferedSorter`], from any thread.
#[derive(Debug, Clone, Default)]
pub struct SortCanceller {
    running: Arc<Mutex<Option<CancellationToken>>>,
}

impl SortCanceller {
    /// Cancel the running sort.
    ///
    /// Returns `true` if a sort was running and has now been asked to stop,
    /// `false` if no sort is running or it was already cancelled.
    pub fn cancel(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    fn disarm(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A sorter bound to one image (and optional mask) that can be re-run
/// with different options, reusing work where the options allow.
#[derive(Debug)]
pub struct BufferedSorter {
    image: RgbaImage,
    mask: Option<RgbaImage>,
    state: BufferedState,
    canceller: SortCanceller,
}

impl BufferedSorter {
    /// # Errors
    ///
    /// Returns [`SortError::InvalidImage`] for an empty image and
    /// [`SortError::InvalidMaskImage`] for an invalid or mis-sized mask.
    pub fn new(image: RgbaImage, mask: Option<RgbaImage>) -> Result<Self, SortError> {
        sorter::validate_inputs(&image, mask.as_ref())?;
        Ok(Self {
            image,
            mask,
            state: BufferedState::default(),
            canceller: SortCanceller::default(),
        })
    }

    /// Read-only view of the cache.
    #[must_use]
    pub const fn state(&self) -> &BufferedState {
        &self.state
    }

    /// A handle that can cancel a sort running on this sorter.
    #[must_use]
    pub fn canceller(&self) -> SortCanceller {
        self.canceller.clone()
    }

    /// Cancel the running sort. See [`SortCanceller::cancel`].
    pub fn cancel_sort(&self) -> bool {
        self.canceller.cancel()
    }

    /// Sort the image with `options`.
    ///
    /// On success the cache is committed for the next call; on any error
    /// it is rolled back to empty.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidOptions`] before doing any work if the
    /// options are invalid, [`SortError::SortingCancelled`] if the sort was
    /// cancelled, or the first error raised while sorting.
    #[tracing::instrument(skip_all, fields(
        width = self.image.width(),
        height = self.image.height(),
    ))]
    pub fn sort(&mut self, options: SorterOptions) -> Result<RgbaImage, SortError> {
        options.validate(self.mask.is_some())?;
        let start = Instant::now();

        let cancel = self.canceller.arm();
        self.state.apply(options.clone());
        let result = self.run(&options, &cancel);
        self.canceller.disarm();

        // A cancel that landed after the last strip check still wins.
        let result = result.and_then(|image| cancel.check().map(|()| image));

        match result {
            Ok(image) => {
                self.state.commit();
                tracing::debug!(elapsed = ?start.elapsed(), "sort committed");
                Ok(image)
            }
            Err(e) => {
                if matches!(e, SortError::SortingCancelled) {
                    tracing::debug!("sort cancelled, rolling back");
                } else {
                    tracing::warn!(error = %e, "sort failed, rolling back");
                }
                self.state.rollback();
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        options: &SorterOptions,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, SortError> {
        let key = SlotKey::of(options);

        let scaled = self.scaled(options, key)?;
        cancel.check()?;

        let rotated = self.rotated(&scaled, key);
        cancel.check()?;

        let mask_image = if options.interval_determinant == IntervalDeterminant::EdgeDetection {
            Some(self.edges(&scaled.source, key)?)
        } else {
            rotated.mask.clone()
        };
        let mask = sorter::build_mask(mask_image.as_ref(), rotated.source.dimensions())?;

        let sorted = sorter::run_cycles(&rotated.source, &mask, options, cancel)?;
        sorter::finish(&sorted, &rotated.revert, &scaled.source, options)
    }

    fn scaled(&mut self, options: &SorterOptions, key: SlotKey) -> Result<ScaledSlot, SortError> {
        if let Some(slot) = &self.state.scaled
            && slot.key.same_scale(key)
        {
            tracing::trace!("scaled cache hit");
            return Ok(slot.clone());
        }

        tracing::debug!(scale = options.scale, "scaled cache miss");
        let slot = if options.needs_scaling() {
            ScaledSlot {
                key,
                source: imaging::scale(&self.image, options.scale)?,
                mask: self
                    .mask
                    .as_ref()
                    .map(|m| imaging::scale_mask(m, options.scale))
                    .transpose()?,
            }
        } else {
            ScaledSlot {
                key,
                source: self.image.clone(),
                mask: self.mask.clone(),
            }
        };
        self.state.scaled = Some(slot.clone());
        Ok(slot)
    }

    fn rotated(&mut self, scaled: &ScaledSlot, key: SlotKey) -> RotatedSlot {
        if let Some(slot) = &self.state.rotated
            && slot.key == key
        {
            tracing::trace!("rotated cache hit");
            return slot.clone();
        }

        let angle = key.angle;
        tracing::debug!(angle, "rotated cache miss");
        let (source, revert) = imaging::rotate_with_revert(&scaled.source, angle);
        let mask = scaled.mask.as_ref().map(|m| imaging::rotate(m, angle));
        let slot = RotatedSlot {
            key,
            source,
            mask,
            revert,
        };
        self.state.rotated = Some(slot.clone());
        slot
    }

    fn edges(&mut self, scaled_source: &RgbaImage, key: SlotKey) -> Result<RgbaImage, SortError> {
        if let Some(slot) = &self.state.edges
            && slot.key == key
        {
            tracing::trace!("edge cache hit");
            return Ok(slot.image.clone());
        }

        tracing::debug!("edge cache miss, detecting edges");
        let detected = canny::perform_edge_detection(scaled_source, true)?;
        let image = imaging::rotate(&detected, key.angle);
        self.state.edges = Some(EdgeSlot {
            key,
            image: image.clone(),
        });
        Ok(image)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::sorter::Sorter;
    use crate::types::{SortDirection, SortOrder};

    const B: image::Rgba<u8> = image::Rgba([0, 0, 0, 255]);
    const W: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);

    fn stripes(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| if (x + y / 2) % 2 == 0 { W } else { B })
    }

    #[test]
    fn first_sort_fills_and_commits_the_cache() {
        let mut sorter = BufferedSorter::new(stripes(6, 6), None).unwrap();
        assert!(!sorter.state().is_committed());
        sorter.sort(SorterOptions::default()).unwrap();
        let state = sorter.state();
        assert!(state.is_committed());
        assert!(state.has_scaled());
        assert!(state.has_rotated());
        assert!(!state.has_edges());
        assert_eq!(state.current(), Some(&SorterOptions::default()));
    }

    #[test]
    fn cached_sorts_match_stateless_sorts() {
        let image = stripes(7, 5);
        let mut buffered = BufferedSorter::new(image.clone(), None).unwrap();
        let runs = [
            SorterOptions {
                angle: 90,
                ..SorterOptions::default()
            },
            SorterOptions {
                angle: 90,
                sort_direction: SortDirection::Descending,
                sort_order: SortOrder::VerticalThenHorizontal,
                ..SorterOptions::default()
            },
            SorterOptions {
                angle: 90,
                interval_determinant: IntervalDeterminant::EdgeDetection,
                ..SorterOptions::default()
            },
            SorterOptions {
                angle: 90,
                interval_determinant: IntervalDeterminant::EdgeDetection,
                sort_direction: SortDirection::Descending,
                ..SorterOptions::default()
            },
        ];
        for options in runs {
            let cached = buffered.sort(options.clone()).unwrap();
            let fresh = Sorter::new(image.clone(), None, options).unwrap().sort().unwrap();
            assert_eq!(cached, fresh);
        }
        assert!(buffered.state().has_edges());
    }

    #[test]
    fn changing_the_angle_rebuilds_rotation() {
        let image = stripes(6, 4);
        let mut buffered = BufferedSorter::new(image.clone(), None).unwrap();
        buffered.sort(SorterOptions::default()).unwrap();
        let options = SorterOptions {
            angle: 270,
            ..SorterOptions::default()
        };
        let cached = buffered.sort(options.clone()).unwrap();
        let fresh = Sorter::new(image, None, options).unwrap().sort().unwrap();
        assert_eq!(cached, fresh);
        assert_eq!(buffered.state().current().map(|o| o.angle), Some(270));
    }

    #[test]
    fn invalid_options_leave_the_cache_alone() {
        let mut sorter = BufferedSorter::new(stripes(4, 4), None).unwrap();
        sorter.sort(SorterOptions::default()).unwrap();
        let bad = SorterOptions {
            use_mask: true,
            ..SorterOptions::default()
        };
        assert!(matches!(sorter.sort(bad), Err(SortError::InvalidOptions(_))));
        assert!(sorter.state().is_committed());
        assert!(sorter.state().has_scaled());
    }

    #[test]
    fn rollback_clears_everything() {
        let mut state = BufferedState::default();
        state.apply(SorterOptions::default());
        state.commit();
        state.scaled = Some(ScaledSlot {
            key: SlotKey::of(&SorterOptions::default()),
            source: RgbaImage::new(1, 1),
            mask: None,
        });
        state.rollback();
        assert!(state.current().is_none());
        assert!(!state.has_scaled());
        assert!(!state.is_committed());
    }

    #[test]
    fn slot_keys_normalize_the_angle() {
        let base = SlotKey::of(&SorterOptions::default());
        let full_turn = SlotKey::of(&SorterOptions {
            angle: 360,
            ..SorterOptions::default()
        });
        assert_eq!(base, full_turn);

        let half = SlotKey::of(&SorterOptions {
            scale: 0.5,
            ..SorterOptions::default()
        });
        assert!(!base.same_scale(half));
        assert_ne!(base, half);
    }

    #[test]
    fn edge_slot_follows_scale_and_angle_changes() {
        let image = RgbaImage::from_fn(40, 30, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 { W } else { B }
        });
        let mut buffered = BufferedSorter::new(image.clone(), None).unwrap();
        let edges = |scale, angle| SorterOptions {
            scale,
            angle,
            interval_determinant: IntervalDeterminant::EdgeDetection,
            ..SorterOptions::default()
        };
        let plain = |scale, angle| SorterOptions {
            scale,
            angle,
            ..SorterOptions::default()
        };
        let runs = [
            edges(1.0, 0),
            plain(0.5, 0),
            edges(0.5, 0),
            plain(0.5, 90),
            edges(0.5, 90),
            plain(1.0, 90),
            edges(1.0, 90),
            edges(1.0, 0),
        ];
        for options in runs {
            let cached = buffered.sort(options.clone()).unwrap();
            let fresh = Sorter::new(image.clone(), None, options.clone())
                .unwrap()
                .sort()
                .unwrap();
            assert_eq!(cached, fresh, "{options:?}");
        }
        let slot = buffered.state.edges.as_ref().unwrap();
        assert_eq!(slot.key, SlotKey::of(&edges(1.0, 0)));
        assert_eq!(slot.image.dimensions(), (40, 30));
    }

    #[test]
    fn cancel_without_a_running_sort_returns_false() {
        let mut sorter = BufferedSorter::new(stripes(4, 4), None).unwrap();
        assert!(!sorter.cancel_sort());
        sorter.sort(SorterOptions::default()).unwrap();
        assert!(!sorter.cancel_sort());
    }

    #[test]
    fn canceller_is_true_once_per_sort() {
        let canceller = SortCanceller::default();
        let token = canceller.arm();
        assert!(canceller.cancel());
        assert!(token.is_cancelled());
        assert!(!canceller.cancel());
        canceller.disarm();
        assert!(!canceller.cancel());
    }

    #[test]
    fn cancelled_sort_rolls_back() {
        let mut sorter = BufferedSorter::new(stripes(64, 64), None).unwrap();
        sorter.sort(SorterOptions::default()).unwrap();

        let canceller = sorter.canceller();
        let options = SorterOptions {
            cycles: 10_000,
            ..SorterOptions::default()
        };
        let (sorter, result) = std::thread::scope(|s| {
            let handle = s.spawn(move || {
                let result = sorter.sort(options);
                (sorter, result)
            });
            while !handle.is_finished() && !canceller.cancel() {
                std::thread::yield_now();
            }
            handle.join().unwrap()
        });
        assert!(matches!(result, Err(SortError::SortingCancelled)));
        assert!(!sorter.state().is_committed());
        assert!(!sorter.state().has_scaled());
        assert!(sorter.state().current().is_none());
    }
}
