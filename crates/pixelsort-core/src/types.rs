//! Shared types for the pixel sorting engine: the option record, its
//! enumerations, and the error type returned by every fallible operation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hand buffers to the
/// engine without depending on `image` directly.
pub use image::RgbaImage;

/// A single non-premultiplied RGBA pixel.
pub type Color = image::Rgba<u8>;

/// Scalar used to order pixels inside an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDeterminant {
    /// Perceived (CIE L*) brightness.
    #[default]
    Brightness,
    /// HSL hue in whole degrees.
    Hue,
    /// HSL saturation.
    Saturation,
    /// Product of the three colour channels.
    AbsoluteColor,
    /// Red channel value.
    RedChannel,
    /// Green channel value.
    GreenChannel,
    /// Blue channel value.
    BlueChannel,
}

/// Predicate deciding whether a pixel may join the current interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalDeterminant {
    /// Perceived brightness within the thresholds.
    #[default]
    Brightness,
    /// Hue (as a fraction of a full turn) within the thresholds.
    Hue,
    /// Saturation within the thresholds.
    Saturation,
    /// Any pixel not covered by the user-supplied mask.
    Mask,
    /// Any pixel not on a detected edge.
    EdgeDetection,
    /// Normalized channel product within the thresholds.
    AbsoluteColor,
}

/// Order in which an interval is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
    /// Uniform random permutation.
    Shuffle,
    /// Ascending or descending, decided per interval by a fair coin.
    Random,
}

/// How the sorted interval is painted back onto the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalPainting {
    /// The sorted pixels themselves.
    #[default]
    Fill,
    /// A quadratic colour blend through the extremes and the median weight.
    Gradient,
    /// The first pixel of the interval, repeated.
    Repeat,
    /// The channel-wise mean of the interval, repeated.
    Average,
}

/// Which strip axes are sorted, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Horizontal,
    Vertical,
    HorizontalThenVertical,
    VerticalThenHorizontal,
}

/// Axis of a single strip pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// One strip per row.
    Rows,
    /// One strip per column.
    Columns,
}

impl SortOrder {
    /// The strip passes making up one cycle, in execution order.
    #[must_use]
    pub const fn passes(self) -> &'static [Axis] {
        match self {
            Self::Horizontal => &[Axis::Rows],
            Self::Vertical => &[Axis::Columns],
            Self::HorizontalThenVertical => &[Axis::Rows, Axis::Columns],
            Self::VerticalThenHorizontal => &[Axis::Columns, Axis::Rows],
        }
    }
}

/// Post-sort blending against the unsorted (scaled) source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Blending {
    #[default]
    None,
    /// Channel-wise maximum.
    Lighten,
    /// Channel-wise minimum.
    Darken,
}

/// Blend operation applied per pixel. Unlike [`Blending`] there is no
/// "none" variant, so a blend call can never be handed a no-op mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Lighten,
    Darken,
}

impl Blending {
    /// The per-pixel blend mode, or `None` when blending is disabled.
    #[must_use]
    pub const fn mode(self) -> Option<BlendMode> {
        match self {
            Self::None => Option::None,
            Self::Lighten => Some(BlendMode::Lighten),
            Self::Darken => Some(BlendMode::Darken),
        }
    }
}

macro_rules! display_kebab {
    ($($ty:ty => { $($variant:ident => $name:literal),+ $(,)? })+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    match self {
                        $(Self::$variant => f.write_str($name),)+
                    }
                }
            }
        )+
    };
}

display_kebab! {
    SortDeterminant => {
        Brightness => "brightness",
        Hue => "hue",
        Saturation => "saturation",
        AbsoluteColor => "absolute-color",
        RedChannel => "red-channel",
        GreenChannel => "green-channel",
        BlueChannel => "blue-channel",
    }
    IntervalDeterminant => {
        Brightness => "brightness",
        Hue => "hue",
        Saturation => "saturation",
        Mask => "mask",
        EdgeDetection => "edge-detection",
        AbsoluteColor => "absolute-color",
    }
    SortDirection => {
        Ascending => "ascending",
        Descending => "descending",
        Shuffle => "shuffle",
        Random => "random",
    }
    IntervalPainting => {
        Fill => "fill",
        Gradient => "gradient",
        Repeat => "repeat",
        Average => "average",
    }
    SortOrder => {
        Horizontal => "horizontal",
        Vertical => "vertical",
        HorizontalThenVertical => "horizontal-then-vertical",
        VerticalThenHorizontal => "vertical-then-horizontal",
    }
    Blending => {
        None => "none",
        Lighten => "lighten",
        Darken => "darken",
    }
}

/// Options for a single sort invocation.
///
/// Every field has a default, and partial JSON records deserialize by
/// filling the missing fields from [`SorterOptions::default`].
///
/// Call [`SorterOptions::validate`] (the sorter constructors do) before
/// handing options to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SorterOptions {
    /// Weight used to order pixels inside an interval.
    pub sort_determinant: SortDeterminant,

    /// Predicate that decides where intervals start and stop.
    pub interval_determinant: IntervalDeterminant,

    /// Inclusive lower bound for threshold-based interval determinants.
    /// Must lie in `[0, 1]` and not exceed the upper threshold.
    pub interval_determinant_lower_threshold: f64,

    /// Inclusive upper bound for threshold-based interval determinants.
    pub interval_determinant_upper_threshold: f64,

    pub sort_direction: SortDirection,

    pub interval_painting: IntervalPainting,

    pub sort_order: SortOrder,

    pub blending: Blending,

    /// Rotation applied before sorting, in whole degrees. Normalized
    /// modulo 360; positive values rotate clockwise.
    pub angle: i32,

    /// Number of full sort passes. At least 1.
    pub cycles: u32,

    /// Working scale in `(0, 1]`.
    pub scale: f64,

    /// Exempt masked pixels from sorting. Requires a mask.
    pub use_mask: bool,

    /// Maximum interval length in pixels; 0 means unlimited.
    pub interval_length: usize,

    /// Random jitter (in pixels, both directions) applied to
    /// `interval_length` each time an interval is cut; 0 disables it.
    pub interval_length_random_factor: usize,
}

impl SorterOptions {
    pub const DEFAULT_LOWER_THRESHOLD: f64 = 0.0;
    pub const DEFAULT_UPPER_THRESHOLD: f64 = 1.0;
    pub const DEFAULT_ANGLE: i32 = 0;
    pub const DEFAULT_CYCLES: u32 = 1;
    pub const DEFAULT_SCALE: f64 = 1.0;
    pub const DEFAULT_INTERVAL_LENGTH: usize = 0;
    pub const DEFAULT_INTERVAL_LENGTH_RANDOM_FACTOR: usize = 0;

    /// The rotation angle normalized into `0..360`.
    #[must_use]
    pub const fn normalized_angle(&self) -> i32 {
        self.angle.rem_euclid(360)
    }

    /// Whether the working image must be rescaled.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn needs_scaling(&self) -> bool {
        self.scale != 1.0
    }

    /// Check the options against each other and against the presence of
    /// a mask.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidOptions`] when a threshold lies outside
    /// `[0, 1]`, the lower threshold is not below the upper one, `cycles` is zero, `scale`
    /// lies outside `(0, 1]`, or a mask is required but missing.
    pub fn validate(&self, has_mask: bool) -> Result<(), SortError> {
        let lower = self.interval_determinant_lower_threshold;
        let upper = self.interval_determinant_upper_threshold;

        if !(0.0..=1.0).contains(&lower) {
            return Err(SortError::InvalidOptions(format!(
                "lower threshold {lower} is outside [0, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&upper) {
            return Err(SortError::InvalidOptions(format!(
                "upper threshold {upper} is outside [0, 1]"
            )));
        }
        if lower >= upper {
            return Err(SortError::InvalidOptions(format!(
                "lower threshold {lower} must be below upper threshold {upper}"
            )));
        }
        if self.cycles == 0 {
            return Err(SortError::InvalidOptions(
                "cycles must be at least 1".to_string(),
            ));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(SortError::InvalidOptions(format!(
                "scale {} is outside (0, 1]",
                self.scale
            )));
        }
        if self.use_mask && !has_mask {
            return Err(SortError::InvalidOptions(
                "mask usage requested but no mask was provided".to_string(),
            ));
        }
        if self.interval_determinant == IntervalDeterminant::Mask && !has_mask {
            return Err(SortError::InvalidOptions(
                "mask interval determinant requires a mask".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SorterOptions {
    fn default() -> Self {
        Self {
            sort_determinant: SortDeterminant::default(),
            interval_determinant: IntervalDeterminant::default(),
            interval_determinant_lower_threshold: Self::DEFAULT_LOWER_THRESHOLD,
            interval_determinant_upper_threshold: Self::DEFAULT_UPPER_THRESHOLD,
            sort_direction: SortDirection::default(),
            interval_painting: IntervalPainting::default(),
            sort_order: SortOrder::default(),
            blending: Blending::default(),
            angle: Self::DEFAULT_ANGLE,
            cycles: Self::DEFAULT_CYCLES,
            scale: Self::DEFAULT_SCALE,
            use_mask: false,
            interval_length: Self::DEFAULT_INTERVAL_LENGTH,
            interval_length_random_factor: Self::DEFAULT_INTERVAL_LENGTH_RANDOM_FACTOR,
        }
    }
}

/// Errors that can occur while preparing or running a sort.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Option validation failed.
    #[error("invalid sorter options: {0}")]
    InvalidOptions(String),

    /// The mask contains a non black/white pixel or has the wrong size.
    #[error("invalid mask image: {0}")]
    InvalidMaskImage(String),

    /// The input image cannot be processed (e.g. zero-sized).
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Two images that must share dimensions do not.
    #[error("image size mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    ImageSizeMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    /// A mask lookup fell outside the image.
    #[error("mask lookup out of bounds: ({x}, {y}) in {width}x{height}")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: u32,
        height: u32,
    },

    /// A color operation received an argument outside its domain.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// The sort was cancelled before it finished.
    #[error("sorting cancelled")]
    SortingCancelled,

    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
}

impl SortError {
    /// Build an [`SortError::ImageSizeMismatch`] from two image sizes.
    #[must_use]
    pub const fn size_mismatch(left: (u32, u32), right: (u32, u32)) -> Self {
        Self::ImageSizeMismatch {
            left_width: left.0,
            left_height: left.1,
            right_width: right.0,
            right_height: right.1,
        }
    }
}
