//! Intervals: runs of pixels collected along a strip and emitted back in
//! sorted or painted form.
//!
//! An [`Interval`] is generic over its weight type so that integer keys
//! (hue, single channels) and normalized keys (brightness, saturation,
//! absolute color) share one implementation. The weight function is fixed
//! at construction; [`WeightKind`] picks it once per strip.

use std::cmp::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::color;
use crate::imaging;
use crate::types::{Color, IntervalPainting, SortDeterminant, SortDirection, SortError};

/// Capacity reserved for a fresh interval.
pub const DEFAULT_CAPACITY: usize = 75;

/// A sortable interval weight.
pub trait Weight: Copy {
    /// Total order used for sorting.
    fn compare(self, other: Self) -> Ordering;

    /// The weight as a float, for midpoint lookups.
    fn as_f64(self) -> f64;
}

impl Weight for u16 {
    fn compare(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Weight for f64 {
    fn compare(self, other: Self) -> Ordering {
        self.total_cmp(&other)
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// Weight function of a sort determinant, split by weight type.
#[derive(Debug, Clone, Copy)]
pub enum WeightKind {
    /// Integer weights such as hue degrees or channel values.
    Integer(fn(Color) -> u16),
    /// Weights normalized to `[0, 1]`.
    Normalized(fn(Color) -> f64),
}

impl From<SortDeterminant> for WeightKind {
    fn from(determinant: SortDeterminant) -> Self {
        match determinant {
            SortDeterminant::Brightness => Self::Normalized(color::perceived_brightness),
            SortDeterminant::Hue => Self::Integer(color::hue),
            SortDeterminant::Saturation => Self::Normalized(color::saturation),
            SortDeterminant::AbsoluteColor => Self::Normalized(color::absolute_color),
            SortDeterminant::RedChannel => Self::Integer(|c| u16::from(c.0[0])),
            SortDeterminant::GreenChannel => Self::Integer(|c| u16::from(c.0[1])),
            SortDeterminant::BlueChannel => Self::Integer(|c| u16::from(c.0[2])),
        }
    }
}

/// Direction with `Random` already decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Ascending,
    Descending,
    Shuffle,
}

fn resolve<R: Rng + ?Sized>(direction: SortDirection, rng: &mut R) -> Resolved {
    match direction {
        SortDirection::Ascending => Resolved::Ascending,
        SortDirection::Descending => Resolved::Descending,
        SortDirection::Shuffle => Resolved::Shuffle,
        SortDirection::Random => {
            if rng.gen_bool(0.5) {
                Resolved::Ascending
            } else {
                Resolved::Descending
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry<W> {
    color: Color,
    weight: W,
}

/// An append-only run of pixels in scan order, each paired with its weight.
#[derive(Debug, Clone)]
pub struct Interval<W: Weight> {
    items: Vec<Entry<W>>,
    weight: fn(Color) -> W,
}

impl<W: Weight> Interval<W> {
    /// An empty interval with [`DEFAULT_CAPACITY`] reserved.
    #[must_use]
    pub fn new(weight: fn(Color) -> W) -> Self {
        Self::with_capacity(weight, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(weight: fn(Color) -> W, capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            weight,
        }
    }

    /// Append a pixel; its weight is computed now.
    pub fn append(&mut self, color: Color) {
        let weight = (self.weight)(color);
        self.items.push(Entry { color, weight });
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Whether the interval holds at least one pixel.
    #[must_use]
    pub fn any(&self) -> bool {
        !self.items.is_empty()
    }

    /// Sort or paint the interval into `out`, replacing its contents with
    /// exactly [`Interval::count`] colors, and empty the interval.
    ///
    /// # Errors
    ///
    /// Propagates [`SortError::OutOfRange`] from the color kernels; this
    /// does not happen for well-formed intervals.
    pub fn sort_to_buffer<R: Rng + ?Sized>(
        &mut self,
        direction: SortDirection,
        painting: IntervalPainting,
        out: &mut Vec<Color>,
        rng: &mut R,
    ) -> Result<(), SortError> {
        out.clear();
        let count = self.items.len();

        if count <= 1 {
            out.extend(self.items.drain(..).map(|e| e.color));
            return Ok(());
        }

        match painting {
            IntervalPainting::Repeat => {
                let first = self.items[0].color;
                out.resize(count, first);
            }
            IntervalPainting::Average => {
                out.extend(self.items.iter().map(|e| e.color));
                let mean = imaging::average_color(out)?;
                out.clear();
                out.resize(count, mean);
            }
            IntervalPainting::Fill => {
                match resolve(direction, rng) {
                    Resolved::Ascending => {
                        self.items.sort_by(|a, b| a.weight.compare(b.weight));
                    }
                    Resolved::Descending => {
                        self.items.sort_by(|a, b| b.weight.compare(a.weight));
                    }
                    Resolved::Shuffle => self.items.shuffle(rng),
                }
                out.extend(self.items.iter().map(|e| e.color));
            }
            IntervalPainting::Gradient => {
                let (a, b, c) = match resolve(direction, rng) {
                    Resolved::Ascending => self.gradient_stops(Ordering::Less)?,
                    Resolved::Descending => self.gradient_stops(Ordering::Greater)?,
                    Resolved::Shuffle => {
                        self.items.shuffle(rng);
                        (
                            self.items[0].color,
                            self.items[(count - 1) / 2].color,
                            self.items[count - 1].color,
                        )
                    }
                };
                paint_gradient(a, b, c, count, out)?;
            }
        }

        self.items.clear();
        Ok(())
    }

    /// Start, middle and end colors of a gradient. `start` is the extreme
    /// the direction begins from: `Less` picks the minimum weight first.
    fn gradient_stops(&self, start: Ordering) -> Result<(Color, Color, Color), SortError> {
        let pick = |wanted: Ordering| {
            self.items
                .iter()
                .copied()
                .reduce(|best, e| {
                    if e.weight.compare(best.weight) == wanted {
                        e
                    } else {
                        best
                    }
                })
        };
        let (Some(a), Some(c)) = (pick(start), pick(start.reverse())) else {
            return Err(SortError::OutOfRange(
                "gradient of an empty interval".to_string(),
            ));
        };

        let middle = color::lerp(a.weight.as_f64(), c.weight.as_f64(), 0.5)?;
        let b = self
            .items
            .iter()
            .copied()
            .min_by(|x, y| {
                let dx = (x.weight.as_f64() - middle).abs();
                let dy = (y.weight.as_f64() - middle).abs();
                dx.total_cmp(&dy)
            })
            .unwrap_or(a);

        Ok((a.color, b.color, c.color))
    }
}

/// Emit `count` colors along the quadratic blend `a -> b -> c`.
#[allow(clippy::cast_precision_loss)]
fn paint_gradient(
    a: Color,
    b: Color,
    c: Color,
    count: usize,
    out: &mut Vec<Color>,
) -> Result<(), SortError> {
    let last = (count - 1) as f64;
    for i in 0..count {
        let t = i as f64 / last;
        let ab = color::lerp_color(a, b, t)?;
        let bc = color::lerp_color(b, c, t)?;
        out.push(color::lerp_color(ab, bc, t)?);
    }
    Ok(())
}
