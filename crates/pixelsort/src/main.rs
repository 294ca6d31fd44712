//! pixelsort: command-line driver for the pixel sorting engine.
//!
//! Decodes an image (and optional black/white mask), sorts it with the
//! options given on the command line and writes the result as PNG or JPEG.
//!
//! # Usage
//!
//! ```text
//! pixelsort image <DETERMINANT> --image-file-path <PATH> [OPTIONS]
//! ```
//!
//! `DETERMINANT` picks the key pixels are sorted by: `brightness`, `hue`,
//! `saturation`, `absolute`, `red`, `green` or `blue`.

#![allow(clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use image::{DynamicImage, ImageFormat};
use pixelsort_core::{
    Blending, IntervalDeterminant, IntervalPainting, RgbaImage, SortDeterminant, SortDirection,
    SortOrder, SorterOptions, imaging,
};
use tracing::Level;

/// Pixel sorting for still images.
#[derive(Parser)]
#[command(name = "pixelsort", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sort a single image.
    Image {
        #[command(subcommand)]
        determinant: Determinant,
    },
}

/// Key the pixels of each interval are ordered by.
#[derive(Subcommand)]
enum Determinant {
    /// Perceived brightness.
    Brightness(SortArgs),
    /// Hue angle.
    Hue(SortArgs),
    /// HSL saturation.
    Saturation(SortArgs),
    /// Product of the colour channels.
    Absolute(SortArgs),
    /// Red channel.
    Red(SortArgs),
    /// Green channel.
    Green(SortArgs),
    /// Blue channel.
    Blue(SortArgs),
}

impl Determinant {
    fn into_parts(self) -> (SortDeterminant, SortArgs) {
        match self {
            Self::Brightness(args) => (SortDeterminant::Brightness, args),
            Self::Hue(args) => (SortDeterminant::Hue, args),
            Self::Saturation(args) => (SortDeterminant::Saturation, args),
            Self::Absolute(args) => (SortDeterminant::AbsoluteColor, args),
            Self::Red(args) => (SortDeterminant::RedChannel, args),
            Self::Green(args) => (SortDeterminant::GreenChannel, args),
            Self::Blue(args) => (SortDeterminant::BlueChannel, args),
        }
    }
}

#[derive(Args)]
struct SortArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    #[arg(long)]
    image_file_path: PathBuf,

    /// Path to a pure black/white mask the size of the input image.
    #[arg(long)]
    mask_file_path: Option<PathBuf>,

    /// Where to write the result. Defaults to `<input>-sorted.<format>`
    /// next to the input.
    #[arg(long)]
    output_file_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Png)]
    output_format: OutputFormat,

    #[arg(long, value_enum, default_value_t = Direction::Ascending)]
    direction: Direction,

    #[arg(long, value_enum, default_value_t = Order::Horizontal)]
    order: Order,

    /// Predicate deciding where intervals start and stop.
    #[arg(long, value_enum, default_value_t = Split::Brightness)]
    interval_determinant: Split,

    /// Inclusive lower bound for threshold-based interval determinants.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_LOWER_THRESHOLD, value_parser = unit_interval)]
    interval_lower_threshold: f64,

    /// Inclusive upper bound for threshold-based interval determinants.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_UPPER_THRESHOLD, value_parser = unit_interval)]
    interval_upper_threshold: f64,

    /// Rotation in degrees, clockwise, applied before sorting.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_ANGLE, allow_negative_numbers = true)]
    angle: i32,

    /// Keep masked (black) pixels of the mask in place.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    mask: bool,

    /// Maximum interval length in pixels; 0 for unlimited.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_INTERVAL_LENGTH)]
    interval_max_length: usize,

    /// Random jitter applied to the maximum interval length.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_INTERVAL_LENGTH_RANDOM_FACTOR)]
    interval_length_random_factor: usize,

    /// Working scale in (0, 1].
    #[arg(long, default_value_t = SorterOptions::DEFAULT_SCALE, value_parser = scale_factor)]
    scale: f64,

    #[arg(long, value_enum, default_value_t = Blend::None)]
    blending: Blend,

    /// Number of times the sort passes are repeated.
    #[arg(long, default_value_t = SorterOptions::DEFAULT_CYCLES, value_parser = clap::value_parser!(u32).range(1..))]
    cycles: u32,

    #[arg(long, value_enum, default_value_t = Painting::Fill)]
    painting: Painting,

    /// Full sorter options as a JSON string.
    ///
    /// When provided, the determinant subcommand and all sorting flags
    /// are ignored. Missing fields take their defaults.
    #[arg(long)]
    options_json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Jpg,
    Png,
}

impl OutputFormat {
    const fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Ascending,
    Descending,
    Random,
    Shuffle,
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Horizontal,
    Vertical,
    HorizontalVertical,
    VerticalHorizontal,
}

#[derive(Clone, Copy, ValueEnum)]
enum Split {
    Brightness,
    Hue,
    Saturation,
    Mask,
    Edge,
    Absolute,
}

#[derive(Clone, Copy, ValueEnum)]
enum Blend {
    None,
    Lighten,
    Darken,
}

#[derive(Clone, Copy, ValueEnum)]
enum Painting {
    Fill,
    Gradient,
    Repeat,
    Average,
}

fn unit_interval(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is not in [0, 1]"))
    }
}

fn scale_factor(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if v > 0.0 && v <= 1.0 {
        Ok(v)
    } else {
        Err(format!("{v} is not in (0, 1]"))
    }
}

/// Build [`SorterOptions`] from the sort determinant and flags.
///
/// If `--options-json` is provided, the JSON is parsed directly and every
/// other sorting flag is ignored.
fn options_from_args(
    sort_determinant: SortDeterminant,
    args: &SortArgs,
) -> anyhow::Result<SorterOptions> {
    if let Some(ref json) = args.options_json {
        return serde_json::from_str(json).context("parsing --options-json");
    }

    Ok(SorterOptions {
        sort_determinant,
        interval_determinant: match args.interval_determinant {
            Split::Brightness => IntervalDeterminant::Brightness,
            Split::Hue => IntervalDeterminant::Hue,
            Split::Saturation => IntervalDeterminant::Saturation,
            Split::Mask => IntervalDeterminant::Mask,
            Split::Edge => IntervalDeterminant::EdgeDetection,
            Split::Absolute => IntervalDeterminant::AbsoluteColor,
        },
        interval_determinant_lower_threshold: args.interval_lower_threshold,
        interval_determinant_upper_threshold: args.interval_upper_threshold,
        sort_direction: match args.direction {
            Direction::Ascending => SortDirection::Ascending,
            Direction::Descending => SortDirection::Descending,
            Direction::Random => SortDirection::Random,
            Direction::Shuffle => SortDirection::Shuffle,
        },
        interval_painting: match args.painting {
            Painting::Fill => IntervalPainting::Fill,
            Painting::Gradient => IntervalPainting::Gradient,
            Painting::Repeat => IntervalPainting::Repeat,
            Painting::Average => IntervalPainting::Average,
        },
        sort_order: match args.order {
            Order::Horizontal => SortOrder::Horizontal,
            Order::Vertical => SortOrder::Vertical,
            Order::HorizontalVertical => SortOrder::HorizontalThenVertical,
            Order::VerticalHorizontal => SortOrder::VerticalThenHorizontal,
        },
        blending: match args.blending {
            Blend::None => Blending::None,
            Blend::Lighten => Blending::Lighten,
            Blend::Darken => Blending::Darken,
        },
        angle: args.angle,
        cycles: args.cycles,
        scale: args.scale,
        use_mask: args.mask,
        interval_length: args.interval_max_length,
        interval_length_random_factor: args.interval_length_random_factor,
    })
}

/// `<dir>/<stem>-sorted.<ext>` for an input at `<dir>/<stem>.<anything>`.
fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}-sorted.{}", format.extension()))
}

fn load_image(path: &Path) -> anyhow::Result<RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    imaging::decode_rgba(&bytes).with_context(|| format!("decoding {}", path.display()))
}

fn save_image(image: RgbaImage, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let result = match format {
        // JPEG has no alpha channel.
        OutputFormat::Jpg => DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .save_with_format(path, ImageFormat::Jpeg),
        OutputFormat::Png => image.save_with_format(path, ImageFormat::Png),
    };
    result.with_context(|| format!("writing {}", path.display()))
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Command::Image { determinant } = cli.command;
    let (sort_determinant, args) = determinant.into_parts();
    let options = options_from_args(sort_determinant, &args)?;
    tracing::debug!(?options, "resolved options");

    let source = load_image(&args.image_file_path)?;
    let mask = args
        .mask_file_path
        .as_deref()
        .map(load_image)
        .transpose()?;
    tracing::info!(
        width = source.width(),
        height = source.height(),
        mask = mask.is_some(),
        "loaded {}",
        args.image_file_path.display()
    );

    let start = Instant::now();
    let sorted = pixelsort_core::create_sorter(source, mask, options)?.sort()?;
    tracing::info!(elapsed = ?start.elapsed(), "sorted");

    let output = args
        .output_file_path
        .clone()
        .unwrap_or_else(|| default_output_path(&args.image_file_path, args.output_format));
    save_image(sorted, &output, args.output_format)?;
    tracing::info!("wrote {}", output.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
