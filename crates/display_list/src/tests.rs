use std::borrow::Cow;
use std::f32::consts::SQRT_2;
use std::sync::Arc;

use geometry::{ClipOp, Path, Point, Rect, RoundRect, rect_ltrb};

use super::*;

fn assert_rect_near(actual: Rect, expected: Rect) {
    let near = |a: f32, b: f32| (a - b).abs() <= 1e-4;
    assert!(
        near(actual.min.x, expected.min.x)
            && near(actual.min.y, expected.min.y)
            && near(actual.max.x, expected.max.x)
            && near(actual.max.y, expected.max.y),
        "expected {expected:?}, got {actual:?}"
    );
}

fn build(record: impl FnOnce(&mut DisplayListBuilder)) -> Arc<DisplayList> {
    let mut builder = DisplayListBuilder::new();
    record(&mut builder);
    builder.build().expect("balanced recording")
}

fn ops_of(display_list: &DisplayList) -> Vec<Op<'_>> {
    display_list
        .ops()
        .collect::<Result<Vec<_>, _>>()
        .expect("well-formed tape")
}

#[test]
fn empty_list_has_no_ops_and_empty_bounds() {
    let display_list = DisplayListBuilder::new().build().expect("empty build");
    assert_eq!(display_list.bytes(false), 0);
    assert_eq!(display_list.op_count(false), 0);
    assert!(display_list.is_empty());
    assert!(display_list.bounds().is_empty());
}

#[test]
fn recorded_ops_replay_in_order() {
    let oval = Arc::new(Path::from_oval(&rect_ltrb(0.0, 0.0, 10.0, 10.0)));
    let points = [Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
    let display_list = build(|builder| {
        builder.set_color(Color::RED);
        builder.save();
        builder.translate(10.0, 20.0);
        builder.clip_rect(&rect_ltrb(0.0, 0.0, 50.0, 50.0), ClipOp::Intersect, true);
        builder.draw_rect(&rect_ltrb(1.0, 2.0, 3.0, 4.0));
        builder.draw_path(&oval);
        builder.draw_points(PointMode::Lines, &points);
        builder.restore();
    });

    let expected = vec![
        Op::SetColor(Color::RED),
        Op::Save,
        Op::Translate { tx: 10.0, ty: 20.0 },
        Op::ClipRect {
            rect: rect_ltrb(0.0, 0.0, 50.0, 50.0),
            op: ClipOp::Intersect,
            is_aa: true,
        },
        Op::DrawRect(rect_ltrb(1.0, 2.0, 3.0, 4.0)),
        Op::DrawPath(&oval),
        Op::DrawPoints {
            mode: PointMode::Lines,
            points: Cow::Borrowed(&points[..]),
        },
        Op::Restore,
    ];
    assert_eq!(ops_of(&display_list), expected);
    assert_eq!(display_list.op_count(false), expected.len());
}

#[test]
fn redundant_attributes_and_identity_transforms_are_elided() {
    let display_list = build(|builder| {
        builder.set_color(Color::BLACK);
        builder.set_stroke_width(0.0);
        builder.set_color_filter(None);
        builder.translate(0.0, 0.0);
        builder.scale(1.0, 1.0);
        builder.rotate(360.0);
        builder.skew(0.0, 0.0);
        builder.transform_2d_affine(1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        builder.transform_full_perspective(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        builder.translate(f32::NAN, 1.0);
        builder.set_color(Color::RED);
        builder.set_color(Color::RED);
    });
    assert_eq!(ops_of(&display_list), vec![Op::SetColor(Color::RED)]);
}

#[test]
fn affine_transforms_are_recorded_in_their_simplest_form() {
    let display_list = build(|builder| {
        builder.transform_2d_affine(1.0, 0.0, 5.0, 0.0, 1.0, 7.0);
        builder.transform_2d_affine(2.0, 0.0, 0.0, 0.0, 3.0, 0.0);
        builder.transform_full_perspective(
            1.0, 2.0, 0.0, 3.0, //
            4.0, 5.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        builder.transform_full_perspective(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.001, 0.0, 1.0,
        );
    });
    assert_eq!(
        ops_of(&display_list),
        vec![
            Op::Translate { tx: 5.0, ty: 7.0 },
            Op::Scale { sx: 2.0, sy: 3.0 },
            Op::Transform2DAffine([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Op::TransformFullPerspective([
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.001, 0.0, 1.0,
            ]),
        ]
    );
}

#[test]
fn rect_shaped_clips_are_recorded_as_clip_rect() {
    let rect = rect_ltrb(10.0, 10.0, 30.0, 40.0);
    let display_list = build(|builder| {
        builder.clip_path(&Arc::new(Path::from_rect(&rect)), ClipOp::Difference, false);
        builder.clip_rrect(&RoundRect::from_rect(rect), ClipOp::Intersect, true);
    });
    assert_eq!(
        ops_of(&display_list),
        vec![
            Op::ClipRect {
                rect,
                op: ClipOp::Difference,
                is_aa: false,
            },
            Op::ClipRect {
                rect,
                op: ClipOp::Intersect,
                is_aa: true,
            },
        ]
    );
}

#[test]
fn unbalanced_restore_poisons_the_builder() {
    let mut builder = DisplayListBuilder::new();
    builder.restore();
    builder.draw_rect(&rect_ltrb(0.0, 0.0, 1.0, 1.0));
    assert_eq!(builder.error(), Some(BuildError::UnbalancedSaveRestore));
    assert_eq!(builder.op_count(), 0);
    assert_eq!(builder.build(), Err(BuildError::UnbalancedSaveRestore));

    let display_list = builder.build().expect("builder starts over after a failed build");
    assert!(display_list.is_empty());
}

#[test]
fn try_restore_reports_without_poisoning() {
    let mut builder = DisplayListBuilder::new();
    assert_eq!(builder.try_restore(), Err(BuildError::UnbalancedSaveRestore));
    assert_eq!(builder.error(), None);

    builder.save();
    assert_eq!(builder.save_count(), 2);
    assert_eq!(builder.try_restore(), Ok(()));
    assert_eq!(builder.save_count(), 1);
}

#[test]
fn build_closes_pending_saves() {
    let display_list = build(|builder| {
        builder.save();
        builder.save_layer(None, false, None);
        builder.draw_rect(&rect_ltrb(0.0, 0.0, 5.0, 5.0));
    });
    let ops = ops_of(&display_list);
    assert_eq!(ops.len(), 5);
    assert_eq!(ops[3..], [Op::Restore, Op::Restore]);
}

#[test]
fn build_resets_the_builder_but_keeps_its_cull_rect() {
    let cull_rect = rect_ltrb(0.0, 0.0, 100.0, 100.0);
    let mut builder = DisplayListBuilder::with_cull_rect(cull_rect);
    builder.set_color(Color::RED);
    builder.draw_paint();
    let first = builder.build().expect("first build");

    assert_eq!(builder.op_count(), 0);
    assert_eq!(builder.current_attributes(), &Paint::default());
    builder.draw_rect(&rect_ltrb(1.0, 1.0, 2.0, 2.0));
    let second = builder.build().expect("second build");

    assert_eq!(first.cull_rect(), Some(cull_rect));
    assert_eq!(second.cull_rect(), Some(cull_rect));
    assert_eq!(first.op_count(false), 2);
    assert_eq!(second.op_count(false), 1);
    assert_ne!(first.unique_id(), 0);
    assert_ne!(first.unique_id(), second.unique_id());
}

fn rich_list() -> Arc<DisplayList> {
    let image = Arc::new(Image::new(7, 64, 32));
    let nested = build(|builder| builder.draw_oval(&rect_ltrb(0.0, 0.0, 8.0, 8.0)));
    let blur = Arc::new(ImageFilter::Blur {
        sigma_x: 2.0,
        sigma_y: 2.0,
        tile_mode: TileMode::Decal,
    });
    let vertices = Arc::new(Vertices::new(
        VertexMode::Triangles,
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ],
        None,
        Some(vec![Color::RED, Color::GREEN, Color::BLUE]),
        None,
    ));
    let blob = Arc::new(TextBlob::new(vec![1, 2, 3], rect_ltrb(0.0, -10.0, 30.0, 2.0)));
    let shadow_path = Arc::new(Path::from_oval(&rect_ltrb(0.0, 0.0, 20.0, 10.0)));

    build(|builder| {
        builder.set_anti_alias(true);
        builder.set_draw_style(DrawStyle::StrokeAndFill);
        builder.set_stroke_width(3.0);
        builder.set_stroke_cap(StrokeCap::Round);
        builder.set_stroke_join(StrokeJoin::Bevel);
        builder.set_mask_filter(Some(&Arc::new(MaskFilter::Blur {
            style: BlurStyle::Normal,
            sigma: 1.5,
        })));
        builder.set_image_filter(Some(&blur));
        builder.save_layer(Some(&rect_ltrb(0.0, 0.0, 200.0, 200.0)), true, Some(&blur));
        builder.set_image_filter(None);
        builder.rotate(30.0);
        builder.skew(0.25, 0.0);
        builder.clip_rrect(
            &RoundRect::from_rect_xy(rect_ltrb(0.0, 0.0, 150.0, 150.0), 5.0, 5.0),
            ClipOp::Intersect,
            true,
        );
        builder.draw_line(Point::new(0.0, 0.0), Point::new(5.0, 9.0));
        builder.draw_circle(Point::new(40.0, 40.0), 6.0);
        builder.draw_arc(&rect_ltrb(0.0, 0.0, 20.0, 20.0), 0.0, 90.0, true);
        builder.draw_drrect(
            &RoundRect::from_rect_xy(rect_ltrb(0.0, 0.0, 40.0, 40.0), 4.0, 4.0),
            &RoundRect::from_rect_xy(rect_ltrb(5.0, 5.0, 35.0, 35.0), 2.0, 2.0),
        );
        builder.draw_vertices(&vertices, BlendMode::Modulate);
        builder.draw_image(&image, Point::new(3.0, 4.0), ImageSampling::Linear, true);
        builder.draw_image_rect(
            &image,
            &rect_ltrb(0.0, 0.0, 32.0, 32.0),
            &rect_ltrb(50.0, 50.0, 80.0, 90.0),
            ImageSampling::Nearest,
            false,
            SrcRectConstraint::Strict,
        );
        builder.draw_image_nine(
            &image,
            &rect_ltrb(8.0, 8.0, 24.0, 24.0),
            &rect_ltrb(0.0, 100.0, 60.0, 160.0),
            ImageSampling::Linear,
            true,
        );
        builder.draw_atlas(
            &image,
            &[
                RsTransform::new(1.0, 0.0, 10.0, 10.0),
                RsTransform::new(0.0, 1.0, 40.0, 10.0),
            ],
            &[rect_ltrb(0.0, 0.0, 8.0, 8.0), rect_ltrb(8.0, 0.0, 16.0, 8.0)],
            &[Color::WHITE, Color::RED],
            BlendMode::DstIn,
            ImageSampling::Nearest,
            None,
            true,
        );
        builder.draw_display_list(&nested, 0.5);
        builder.draw_text_blob(&blob, 12.0, 30.0);
        builder.draw_shadow(&shadow_path, Color::BLACK, 4.0, false, 2.0);
        builder.draw_color(Color::BLUE, BlendMode::Multiply);
        builder.restore();
    })
}

#[test]
fn dispatching_into_a_builder_copies_the_list() {
    let original = rich_list();
    let mut builder = DisplayListBuilder::new();
    original
        .dispatch(&mut builder)
        .expect("well-formed tape replays");
    let copy = builder.build().expect("copy builds");

    assert_eq!(*copy, *original);
    assert_ne!(copy.unique_id(), original.unique_id());
    assert_eq!(copy.bounds(), original.bounds());
}

#[test]
fn nested_lists_count_toward_totals() {
    let inner = build(|builder| builder.draw_rect(&rect_ltrb(0.0, 0.0, 10.0, 10.0)));
    let outer = build(|builder| {
        builder.translate(5.0, 5.0);
        builder.draw_display_list(&inner, 1.0);
    });
    assert_eq!(outer.op_count(false), 2);
    assert_eq!(outer.op_count(true), 3);
    assert_eq!(outer.bytes(true), outer.bytes(false) + inner.bytes(false));
    assert_rect_near(outer.bounds(), rect_ltrb(5.0, 5.0, 15.0, 15.0));
}

#[test]
fn equal_recordings_compare_equal() {
    let record = |builder: &mut DisplayListBuilder| {
        builder.set_color(Color::GREEN);
        builder.draw_circle(Point::new(1.0, 2.0), 3.0);
    };
    let first = build(record);
    let second = build(record);
    let different = build(|builder| builder.draw_circle(Point::new(1.0, 2.0), 4.0));
    assert_eq!(*first, *second);
    assert_ne!(*first, *different);
}

#[test]
fn fill_bounds_cover_geometry() {
    let display_list = build(|builder| builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0)));
    assert_rect_near(display_list.bounds(), rect_ltrb(10.0, 10.0, 20.0, 20.0));
}

#[test]
fn stroked_rect_pads_for_miter_joins() {
    let miter = build(|builder| {
        builder.set_draw_style(DrawStyle::Stroke);
        builder.set_stroke_width(4.0);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
    });
    let pad = 2.0 * SQRT_2;
    assert_rect_near(
        miter.bounds(),
        rect_ltrb(10.0 - pad, 10.0 - pad, 20.0 + pad, 20.0 + pad),
    );

    let bevel = build(|builder| {
        builder.set_draw_style(DrawStyle::Stroke);
        builder.set_stroke_width(4.0);
        builder.set_stroke_join(StrokeJoin::Bevel);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
    });
    assert_rect_near(bevel.bounds(), rect_ltrb(8.0, 8.0, 22.0, 22.0));
}

#[test]
fn lines_are_stroked_regardless_of_draw_style() {
    let display_list = build(|builder| {
        builder.set_stroke_width(2.0);
        builder.draw_line(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(-1.0, -1.0, 11.0, 1.0));
}

#[test]
fn hairlines_pad_one_device_pixel() {
    let display_list = build(|builder| {
        builder.set_draw_style(DrawStyle::Stroke);
        builder.scale(2.0, 2.0);
        builder.draw_rect(&rect_ltrb(0.0, 0.0, 10.0, 10.0));
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(-1.0, -1.0, 21.0, 21.0));
}

#[test]
fn mask_and_image_filters_pad_draw_bounds() {
    let display_list = build(|builder| {
        builder.set_mask_filter(Some(&Arc::new(MaskFilter::Blur {
            style: BlurStyle::Normal,
            sigma: 1.0,
        })));
        builder.set_image_filter(Some(&Arc::new(ImageFilter::Dilate {
            radius_x: 2.0,
            radius_y: 2.0,
        })));
        builder.draw_rect(&rect_ltrb(0.0, 0.0, 10.0, 10.0));
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(-5.0, -5.0, 15.0, 15.0));
}

#[test]
fn clips_narrow_bounds() {
    let display_list = build(|builder| {
        builder.clip_rect(&rect_ltrb(0.0, 0.0, 15.0, 15.0), ClipOp::Intersect, false);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(10.0, 10.0, 15.0, 15.0));
}

#[test]
fn unbounded_draws_resolve_to_the_clip() {
    let display_list = build(|builder| {
        builder.save();
        builder.clip_rect(&rect_ltrb(5.0, 5.0, 25.0, 25.0), ClipOp::Intersect, false);
        builder.draw_paint();
        builder.restore();
        builder.draw_rect(&rect_ltrb(30.0, 30.0, 40.0, 40.0));
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(5.0, 5.0, 40.0, 40.0));
}

#[test]
fn recorded_cull_rect_bounds_unbounded_and_overhanging_ops() {
    let cull_rect = rect_ltrb(0.0, 0.0, 100.0, 100.0);
    let mut builder = DisplayListBuilder::with_cull_rect(cull_rect);
    builder.draw_paint();
    let display_list = builder.build().expect("balanced recording");
    assert_rect_near(display_list.bounds(), cull_rect);

    let mut builder = DisplayListBuilder::with_cull_rect(cull_rect);
    builder.draw_rect(&rect_ltrb(50.0, 60.0, 150.0, 90.0));
    let display_list = builder.build().expect("balanced recording");
    assert_rect_near(display_list.bounds(), rect_ltrb(50.0, 60.0, 100.0, 90.0));
}

#[test]
fn save_layer_explicit_bounds_are_used_directly() {
    let display_list = build(|builder| {
        builder.save_layer(Some(&rect_ltrb(0.0, 0.0, 30.0, 30.0)), false, None);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
        builder.restore();
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(0.0, 0.0, 30.0, 30.0));
}

#[test]
fn save_layer_with_clearing_blend_covers_the_clip() {
    let display_list = build(|builder| {
        builder.clip_rect(&rect_ltrb(0.0, 0.0, 100.0, 100.0), ClipOp::Intersect, false);
        builder.set_blend_mode(BlendMode::SrcIn);
        builder.save_layer(None, true, None);
        builder.set_blend_mode(BlendMode::SrcOver);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
        builder.restore();
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(0.0, 0.0, 100.0, 100.0));

    let ignored_paint = build(|builder| {
        builder.set_blend_mode(BlendMode::SrcIn);
        builder.save_layer(None, false, None);
        builder.set_blend_mode(BlendMode::SrcOver);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
        builder.restore();
    });
    assert_rect_near(ignored_paint.bounds(), rect_ltrb(10.0, 10.0, 20.0, 20.0));
}

#[test]
fn save_layer_filter_expands_child_bounds() {
    let display_list = build(|builder| {
        builder.set_image_filter(Some(&Arc::new(ImageFilter::Blur {
            sigma_x: 2.0,
            sigma_y: 2.0,
            tile_mode: TileMode::Decal,
        })));
        builder.save_layer(None, true, None);
        builder.set_image_filter(None);
        builder.draw_rect(&rect_ltrb(10.0, 10.0, 20.0, 20.0));
        builder.restore();
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(4.0, 4.0, 26.0, 26.0));
}

#[test]
fn backdrop_filters_cover_the_clip() {
    let blur = Arc::new(ImageFilter::Blur {
        sigma_x: 1.0,
        sigma_y: 1.0,
        tile_mode: TileMode::Clamp,
    });
    let display_list = build(|builder| {
        builder.clip_rect(&rect_ltrb(0.0, 0.0, 50.0, 50.0), ClipOp::Intersect, false);
        builder.save_layer(Some(&rect_ltrb(10.0, 10.0, 20.0, 20.0)), false, Some(&blur));
        builder.restore();
    });
    assert_rect_near(display_list.bounds(), rect_ltrb(0.0, 0.0, 50.0, 50.0));
}

#[test]
fn bounds_are_stable_across_calls_and_dispatch() {
    let display_list = rich_list();
    let first = display_list.bounds();
    let mut builder = DisplayListBuilder::new();
    display_list
        .dispatch(&mut builder)
        .expect("well-formed tape replays");
    let second = display_list.bounds();
    assert_eq!(first.min.x.to_bits(), second.min.x.to_bits());
    assert_eq!(first.min.y.to_bits(), second.min.y.to_bits());
    assert_eq!(first.max.x.to_bits(), second.max.x.to_bits());
    assert_eq!(first.max.y.to_bits(), second.max.y.to_bits());
}

#[test]
fn lists_can_be_read_from_many_threads() {
    let display_list = rich_list();
    let expected_ops = display_list.op_count(false);
    let expected_bounds = display_list.bounds();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let display_list = Arc::clone(&display_list);
            scope.spawn(move || {
                assert_eq!(display_list.ops().count(), expected_ops);
                assert_eq!(display_list.bounds(), expected_bounds);
            });
        }
    });
}

#[test]
fn raw_tapes_are_validated() {
    let display_list = build(|builder| builder.draw_rect(&rect_ltrb(0.0, 0.0, 4.0, 4.0)));
    let words = display_list.words().to_vec();

    let adopted = DisplayList::from_raw_parts(words.clone(), Vec::new()).expect("valid tape");
    assert_eq!(adopted, *display_list);

    let truncated = words[..3].to_vec();
    assert_eq!(
        DisplayList::from_raw_parts(truncated, Vec::new()),
        Err(DispatchError::MalformedTape { offset: 0 })
    );

    let mut unknown = words;
    unknown.push(0xFF | 1 << 8);
    assert_eq!(
        DisplayList::from_raw_parts(unknown, Vec::new()),
        Err(DispatchError::UnknownOpcode {
            offset: 20,
            opcode: 0xFF,
        })
    );
}

#[test]
fn dispatch_range_replays_whole_records_only() {
    let display_list = build(|builder| {
        builder.draw_rect(&rect_ltrb(0.0, 0.0, 4.0, 4.0));
        builder.draw_oval(&rect_ltrb(1.0, 1.0, 3.0, 3.0));
    });
    assert_eq!(display_list.bytes(false), 40);

    let mut builder = DisplayListBuilder::new();
    display_list
        .dispatch_range(&mut builder, 20, 40)
        .expect("record boundaries");
    let tail = builder.build().expect("tail builds");
    assert_eq!(
        ops_of(&tail),
        vec![Op::DrawOval(rect_ltrb(1.0, 1.0, 3.0, 3.0))]
    );

    let mut builder = DisplayListBuilder::new();
    assert_eq!(
        display_list.dispatch_range(&mut builder, 8, 40),
        Err(DispatchError::RangeNotOnRecordBoundary { offset: 8 })
    );
    assert_eq!(
        display_list.dispatch_range(&mut builder, 0, 44),
        Err(DispatchError::RangeNotOnRecordBoundary { offset: 44 })
    );
    assert_eq!(
        display_list.dispatch_range(&mut builder, 20, 0),
        Err(DispatchError::RangeNotOnRecordBoundary { offset: 20 })
    );
}
