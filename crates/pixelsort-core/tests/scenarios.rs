//! Integration tests: the reference scenarios on a 5x5 striped image and the
//! engine-wide properties (sizes, ordering, caps, masks, cycles, rotation
//! and caching).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pixelsort_core::color::perceived_brightness;
use pixelsort_core::imaging;
use pixelsort_core::{
    Color, IntervalDeterminant, IntervalPainting, RgbaImage, SortDeterminant, SortDirection,
    SortOrder, SorterOptions, create_buffered_sorter, create_sorter,
};

const BLACK: Color = image::Rgba([0, 0, 0, 255]);
const WHITE: Color = image::Rgba([255, 255, 255, 255]);

/// 5x5, white at even x and black at odd x.
fn striped() -> RgbaImage {
    RgbaImage::from_fn(5, 5, |x, _| if x % 2 == 0 { WHITE } else { BLACK })
}

/// A deterministic, colourful test image.
#[allow(clippy::cast_possible_truncation)]
fn noise(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ (x * y).wrapping_mul(31);
        image::Rgba([
            (v % 251) as u8,
            ((v / 3) % 241) as u8,
            ((v / 7) % 239) as u8,
            255,
        ])
    })
}

fn s1() -> SorterOptions {
    SorterOptions {
        sort_determinant: SortDeterminant::Brightness,
        interval_determinant: IntervalDeterminant::Brightness,
        interval_determinant_lower_threshold: 0.0,
        interval_determinant_upper_threshold: 1.0,
        sort_direction: SortDirection::Ascending,
        interval_painting: IntervalPainting::Fill,
        sort_order: SortOrder::Horizontal,
        cycles: 1,
        angle: 0,
        ..SorterOptions::default()
    }
}

fn sort(image: &RgbaImage, mask: Option<&RgbaImage>, options: SorterOptions) -> RgbaImage {
    create_sorter(image.clone(), mask.cloned(), options)
        .unwrap()
        .sort()
        .unwrap()
}

fn row(image: &RgbaImage, y: u32) -> Vec<Color> {
    (0..image.width()).map(|x| *image.get_pixel(x, y)).collect()
}

fn column(image: &RgbaImage, x: u32) -> Vec<Color> {
    (0..image.height()).map(|y| *image.get_pixel(x, y)).collect()
}

// --- Scenarios ---

#[test]
fn s1_rows_sort_blacks_first() {
    let out = sort(&striped(), None, s1());
    for y in 0..5 {
        assert_eq!(row(&out, y), vec![BLACK, BLACK, WHITE, WHITE, WHITE]);
    }
}

#[test]
fn s2_vertical_leaves_constant_columns() {
    let src = striped();
    let out = sort(
        &src,
        None,
        SorterOptions {
            sort_order: SortOrder::Vertical,
            ..s1()
        },
    );
    for x in 0..5 {
        assert_eq!(column(&out, x), column(&src, x));
    }
}

#[test]
fn s3_extra_cycles_change_nothing() {
    let once = sort(&striped(), None, s1());
    let thrice = sort(&striped(), None, SorterOptions { cycles: 3, ..s1() });
    assert_eq!(once, thrice);
}

#[test]
fn s4_interval_length_two() {
    let out = sort(
        &striped(),
        None,
        SorterOptions {
            interval_length: 2,
            ..s1()
        },
    );
    // W B | W (cut) | B W  ->  B W W B W
    for y in 0..5 {
        assert_eq!(row(&out, y), vec![BLACK, WHITE, WHITE, BLACK, WHITE]);
    }
}

#[test]
fn s5_mask_equal_to_input_freezes_the_image() {
    let src = striped();
    let out = sort(
        &src,
        Some(&src),
        SorterOptions {
            use_mask: true,
            sort_direction: SortDirection::Descending,
            ..s1()
        },
    );
    assert_eq!(out, src);
}

#[test]
fn s6_shuffle_preserves_row_multisets() {
    let src = noise(17, 9);
    let out = sort(
        &src,
        None,
        SorterOptions {
            sort_direction: SortDirection::Shuffle,
            interval_length: 0,
            ..s1()
        },
    );
    for y in 0..src.height() {
        let mut before: Vec<[u8; 4]> = row(&src, y).iter().map(|c| c.0).collect();
        let mut after: Vec<[u8; 4]> = row(&out, y).iter().map(|c| c.0).collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after, "row {y}");
    }
}

// --- Properties ---

#[test]
fn dimensions_are_preserved_without_scale() {
    let src = noise(13, 8);
    let variants = [
        s1(),
        SorterOptions {
            sort_order: SortOrder::VerticalThenHorizontal,
            interval_painting: IntervalPainting::Gradient,
            ..s1()
        },
        SorterOptions {
            sort_determinant: SortDeterminant::Saturation,
            interval_determinant: IntervalDeterminant::Hue,
            interval_determinant_upper_threshold: 0.4,
            interval_painting: IntervalPainting::Average,
            interval_length: 3,
            interval_length_random_factor: 2,
            sort_direction: SortDirection::Random,
            ..s1()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::EdgeDetection,
            sort_order: SortOrder::HorizontalThenVertical,
            cycles: 2,
            ..s1()
        },
    ];
    for options in variants {
        assert_eq!(sort(&src, None, options).dimensions(), (13, 8));
    }
}

#[test]
fn scaled_output_is_floored() {
    let src = noise(10, 7);
    for (scale, expected) in [(0.5, (5, 3)), (0.3, (3, 2)), (1.0, (10, 7))] {
        let out = sort(&src, None, SorterOptions { scale, ..s1() });
        assert_eq!(out.dimensions(), expected, "scale {scale}");
    }
}

#[test]
fn full_threshold_rows_are_brightness_sorted() {
    let out = sort(&noise(23, 11), None, s1());
    for y in 0..out.height() {
        let brightness: Vec<f64> = row(&out, y).into_iter().map(perceived_brightness).collect();
        assert!(
            brightness.windows(2).all(|w| w[0] <= w[1]),
            "row {y} is not non-decreasing: {brightness:?}"
        );
    }
}

#[test]
fn interval_cap_bounds_every_run() {
    // Strictly darkening rows: every ascending run in the output comes from
    // a single interval.
    #[allow(clippy::cast_possible_truncation)]
    let src = RgbaImage::from_fn(12, 3, |x, _| {
        let v = 250 - (x * 20) as u8;
        image::Rgba([v, v, v, 255])
    });
    for k in 1..=4 {
        let out = sort(
            &src,
            None,
            SorterOptions {
                interval_length: k,
                ..s1()
            },
        );
        for y in 0..3 {
            let values: Vec<u8> = row(&out, y).iter().map(|c| c[0]).collect();
            let mut run = 1;
            for w in values.windows(2) {
                run = if w[1] > w[0] { run + 1 } else { 1 };
                assert!(run <= k, "cap {k}, row {values:?}");
            }
        }
    }
}

#[test]
fn masked_pixels_are_untouched() {
    let src = noise(16, 12);
    let mask = RgbaImage::from_fn(16, 12, |x, y| {
        if (x / 3 + y) % 2 == 0 { BLACK } else { WHITE }
    });
    for order in [
        SortOrder::Horizontal,
        SortOrder::Vertical,
        SortOrder::HorizontalThenVertical,
    ] {
        let out = sort(
            &src,
            Some(&mask),
            SorterOptions {
                use_mask: true,
                sort_order: order,
                sort_direction: SortDirection::Descending,
                ..s1()
            },
        );
        for (x, y, m) in mask.enumerate_pixels() {
            if *m == BLACK {
                assert_eq!(out.get_pixel(x, y), src.get_pixel(x, y), "({x}, {y})");
            }
        }
    }
}

#[test]
fn ascending_fill_is_idempotent_across_cycles() {
    let src = noise(14, 9);
    for order in [SortOrder::Horizontal, SortOrder::Vertical] {
        let one = sort(&src, None, SorterOptions { sort_order: order, ..s1() });
        for cycles in [2, 5] {
            let many = sort(
                &src,
                None,
                SorterOptions {
                    sort_order: order,
                    cycles,
                    ..s1()
                },
            );
            assert_eq!(one, many, "{order} with {cycles} cycles");
        }
    }
}

#[test]
fn right_angle_rotation_round_trips() {
    let src = noise(7, 4);
    for angle in [90, 180, 270] {
        let (rotated, revert) = imaging::rotate_with_revert(&src, angle);
        assert_ne!(rotated, src);
        assert_eq!(revert.revert(&rotated), src, "angle {angle}");
    }
}

#[test]
fn buffered_sorts_match_independent_sorts() {
    let src = noise(20, 14);
    let mask = RgbaImage::from_fn(20, 14, |x, _| if x % 5 == 0 { BLACK } else { WHITE });
    let mut buffered = create_buffered_sorter(src.clone(), Some(mask.clone())).unwrap();

    let base = SorterOptions {
        scale: 0.5,
        angle: 45,
        ..s1()
    };
    let runs = [
        base.clone(),
        SorterOptions {
            sort_direction: SortDirection::Descending,
            use_mask: true,
            ..base.clone()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::Mask,
            sort_determinant: SortDeterminant::GreenChannel,
            ..base.clone()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::EdgeDetection,
            sort_order: SortOrder::VerticalThenHorizontal,
            ..base.clone()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::EdgeDetection,
            interval_painting: IntervalPainting::Gradient,
            ..base.clone()
        },
        SorterOptions {
            scale: 1.0,
            angle: 0,
            ..base.clone()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::EdgeDetection,
            angle: 0,
            ..base.clone()
        },
        SorterOptions {
            interval_determinant: IntervalDeterminant::EdgeDetection,
            ..base
        },
    ];

    for options in runs {
        let cached = buffered.sort(options.clone()).unwrap();
        let fresh = sort(&src, Some(&mask), options.clone());
        assert_eq!(cached, fresh, "{options:?}");
    }
    assert!(buffered.state().has_edges());
}

#[test]
fn cancel_before_sort_returns_false() {
    let sorter = create_buffered_sorter(striped(), None).unwrap();
    assert!(!sorter.cancel_sort());
    assert!(!sorter.canceller().cancel());
}

#[test]
fn options_from_json_drive_a_sort() {
    let options: SorterOptions = serde_json::from_str(
        r#"{"sortDirection":"descending","sortOrder":"horizontal","intervalLength":0}"#,
    )
    .unwrap();
    let out = sort(&striped(), None, options);
    for y in 0..5 {
        assert_eq!(row(&out, y), vec![WHITE, WHITE, WHITE, BLACK, BLACK]);
    }
}
