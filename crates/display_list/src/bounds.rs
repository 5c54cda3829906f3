//! Conservative paint bounds of a display list.
//!
//! Each draw op contributes the bounds of its geometry, padded for the
//! stroke, mask filter and image filter of the current paint, mapped to
//! device space and clipped to the current cull rect. Contributions that
//! cannot be bounded resolve to the cull rect. Save layers accumulate their
//! children separately so the layer's own image filter and compositing
//! paint can be applied on restore.

use std::f32::consts::SQRT_2;
use std::sync::Arc;

use bitflags::bitflags;
use geometry::{
    ClipOp, Matrix, Path, Point, Rect, RectExt, RoundRect, bounds_of_points,
    empty_rect, rect_ltrb,
};
use matrix_clip::MatrixClipTracker;

use crate::attributes::{
    Color, DrawStyle, ImageSampling, Paint, PointMode, RsTransform, SrcRectConstraint,
    StrokeCap, StrokeJoin,
};
use crate::effects::{
    ColorFilter, ColorSource, Image, ImageFilter, MaskFilter, PathEffect, TextBlob, Vertices,
};
use crate::{BlendMode, DisplayList, Dispatcher};

/// Minimum stroke half-width used for padding, in local units.
const MIN_STROKE_HALF_WIDTH: f32 = 0.01;
/// Light geometry used to bound shadows.
const SHADOW_LIGHT_HEIGHT: f32 = 600.0;
const SHADOW_LIGHT_RADIUS: f32 = 800.0;

bitflags! {
    /// How the current paint affects the bounds of a draw op.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct OpFlags: u32 {
        /// The op draws geometry the draw style and stroke apply to.
        const GEOMETRIC = 1 << 0;
        /// The op strokes its geometry regardless of the draw style.
        const STROKED_ALWAYS = 1 << 1;
        /// Stroked segments may meet at right-angle joins.
        const JOINS = 1 << 2;
        /// Stroked segments may meet at arbitrarily sharp joins.
        const ACUTE_JOINS = 1 << 3;
        /// Open contours carry caps.
        const CAPS = 1 << 4;
        /// Caps may sit at the end of non-axis-aligned segments.
        const DIAGONAL_CAPS = 1 << 5;
        const APPLIES_MASK_FILTER = 1 << 6;
        const APPLIES_IMAGE_FILTER = 1 << 7;
        const IGNORES_PAINT = 1 << 8;

        const FILLED_SHAPE = Self::GEOMETRIC.bits()
            | Self::APPLIES_MASK_FILTER.bits()
            | Self::APPLIES_IMAGE_FILTER.bits();
        const IMAGE = Self::APPLIES_MASK_FILTER.bits() | Self::APPLIES_IMAGE_FILTER.bits();
    }
}

impl OpFlags {
    fn strokes(self, style: DrawStyle) -> bool {
        self.contains(OpFlags::STROKED_ALWAYS)
            || (self.contains(OpFlags::GEOMETRIC) && style.strokes())
    }
}

/// One save or save layer scope.
#[derive(Debug)]
struct LayerData {
    is_save_layer: bool,
    /// Device bounds drawn inside this scope, already clipped.
    accumulator: Rect,
    /// The compositing paint may touch pixels outside the drawn content.
    unbounded: bool,
    /// Device-space bounds given to `save_layer`.
    explicit_bounds: Option<Rect>,
    image_filter: Option<Arc<ImageFilter>>,
    layer_matrix: Matrix,
}

impl LayerData {
    fn new(is_save_layer: bool, layer_matrix: Matrix) -> Self {
        Self {
            is_save_layer,
            accumulator: empty_rect(),
            unbounded: false,
            explicit_bounds: None,
            image_filter: None,
            layer_matrix,
        }
    }

    fn accumulate(&mut self, device_bounds: &Rect) {
        self.accumulator = self.accumulator.join_rect(device_bounds);
    }
}

pub struct BoundsCalculator {
    tracker: MatrixClipTracker,
    paint: Paint,
    root: LayerData,
    layers: Vec<LayerData>,
}

impl BoundsCalculator {
    pub fn new(cull_rect: Rect) -> Self {
        Self {
            tracker: MatrixClipTracker::new(cull_rect, &Matrix::identity()),
            paint: Paint::default(),
            root: LayerData::new(false, Matrix::identity()),
            layers: Vec::new(),
        }
    }

    /// Closes any scopes left open and returns the accumulated bounds.
    pub fn finish(mut self) -> Rect {
        while !self.layers.is_empty() {
            self.restore();
        }
        if self.root.accumulator.is_empty() {
            empty_rect()
        } else {
            self.root.accumulator
        }
    }

    fn current_layer(&mut self) -> &mut LayerData {
        self.layers.last_mut().unwrap_or(&mut self.root)
    }

    fn accumulate_device(&mut self, device_bounds: Rect) {
        let clipped = device_bounds.intersect_rect(&self.tracker.device_cull_rect());
        if !clipped.is_empty() {
            self.current_layer().accumulate(&clipped);
        }
    }

    fn accumulate_unbounded(&mut self) {
        let cull_rect = self.tracker.device_cull_rect();
        if !cull_rect.is_empty() {
            self.current_layer().accumulate(&cull_rect);
        }
    }

    fn accumulate_op_bounds(&mut self, local_bounds: Rect, flags: OpFlags) {
        match self.adjust_bounds_for_paint(local_bounds, flags) {
            Some((bounds, hairline)) => {
                if bounds.is_empty() && !hairline {
                    return;
                }
                let mut device_bounds = self.tracker.map_rect(&bounds);
                if hairline {
                    device_bounds = device_bounds.outset_by(1.0, 1.0);
                }
                self.accumulate_device(device_bounds);
            }
            None => self.accumulate_unbounded(),
        }
    }

    /// Pads `bounds` for the current paint. Returns `None` when the result
    /// cannot be bounded, and whether a one-pixel hairline outset is still
    /// owed in device space.
    fn adjust_bounds_for_paint(&self, mut bounds: Rect, flags: OpFlags) -> Option<(Rect, bool)> {
        if flags.contains(OpFlags::IGNORES_PAINT) {
            return Some((bounds, false));
        }

        let mut hairline = false;
        if flags.strokes(self.paint.draw_style) {
            if let Some(effect) = &self.paint.path_effect {
                bounds = effect.effect_bounds(&bounds)?;
            }
            let mut multiplier: f32 = 1.0;
            if self.paint.stroke_join == StrokeJoin::Miter {
                if flags.contains(OpFlags::ACUTE_JOINS) {
                    multiplier = multiplier.max(self.paint.stroke_miter);
                } else if flags.contains(OpFlags::JOINS) {
                    multiplier = multiplier.max(SQRT_2);
                }
            }
            if self.paint.stroke_cap == StrokeCap::Square && flags.contains(OpFlags::DIAGONAL_CAPS)
            {
                multiplier = multiplier.max(SQRT_2);
            }
            if self.paint.stroke_width > 0.0 {
                let half_width = (self.paint.stroke_width * 0.5).max(MIN_STROKE_HALF_WIDTH);
                let pad = half_width * multiplier;
                bounds = bounds.outset_by(pad, pad);
            } else {
                hairline = true;
            }
        }

        if flags.contains(OpFlags::APPLIES_MASK_FILTER) {
            if let Some(mask_filter) = &self.paint.mask_filter {
                let outset = mask_filter.outset();
                bounds = bounds.outset_by(outset, outset);
            }
        }

        if flags.contains(OpFlags::APPLIES_IMAGE_FILTER) {
            if let Some(image_filter) = &self.paint.image_filter {
                bounds = image_filter.map_local_bounds(&bounds)?;
            }
        }

        Some((bounds, hairline))
    }

    fn image_flags(render_with_attributes: bool) -> OpFlags {
        if render_with_attributes {
            OpFlags::IMAGE
        } else {
            OpFlags::IGNORES_PAINT
        }
    }
}

impl Dispatcher for BoundsCalculator {
    fn set_anti_alias(&mut self, anti_alias: bool) {
        self.paint.anti_alias = anti_alias;
    }

    fn set_dither(&mut self, dither: bool) {
        self.paint.dither = dither;
    }

    fn set_invert_colors(&mut self, invert: bool) {
        self.paint.invert_colors = invert;
    }

    fn set_stroke_cap(&mut self, cap: StrokeCap) {
        self.paint.stroke_cap = cap;
    }

    fn set_stroke_join(&mut self, join: StrokeJoin) {
        self.paint.stroke_join = join;
    }

    fn set_draw_style(&mut self, style: DrawStyle) {
        self.paint.draw_style = style;
    }

    fn set_stroke_width(&mut self, width: f32) {
        self.paint.stroke_width = width;
    }

    fn set_stroke_miter(&mut self, limit: f32) {
        self.paint.stroke_miter = limit;
    }

    fn set_color(&mut self, color: Color) {
        self.paint.color = color;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.paint.blend_mode = mode;
    }

    fn set_color_source(&mut self, source: Option<&Arc<ColorSource>>) {
        self.paint.color_source = source.cloned();
    }

    fn set_color_filter(&mut self, filter: Option<&Arc<ColorFilter>>) {
        self.paint.color_filter = filter.cloned();
    }

    fn set_image_filter(&mut self, filter: Option<&Arc<ImageFilter>>) {
        self.paint.image_filter = filter.cloned();
    }

    fn set_mask_filter(&mut self, filter: Option<&Arc<MaskFilter>>) {
        self.paint.mask_filter = filter.cloned();
    }

    fn set_path_effect(&mut self, effect: Option<&Arc<PathEffect>>) {
        self.paint.path_effect = effect.cloned();
    }

    fn save(&mut self) {
        self.tracker.save();
        self.layers
            .push(LayerData::new(false, self.tracker.matrix_3x3()));
    }

    fn save_layer(
        &mut self,
        bounds: Option<&Rect>,
        with_paint: bool,
        backdrop: Option<&Arc<ImageFilter>>,
    ) {
        if backdrop.is_some() {
            // The backdrop filter reads and rewrites everything under the clip.
            self.accumulate_unbounded();
        }

        let mut layer = LayerData::new(true, self.tracker.matrix_3x3());
        if with_paint {
            layer.unbounded = !self.paint.nops_on_transparent_black();
            layer.image_filter = self.paint.image_filter.clone();
        }
        layer.explicit_bounds = bounds.map(|bounds| self.tracker.map_rect(bounds));

        self.tracker.save();
        if let Some(bounds) = bounds {
            self.tracker.clip_rect(bounds, ClipOp::Intersect, false);
        }
        self.layers.push(layer);
    }

    fn restore(&mut self) {
        let Some(layer) = self.layers.pop() else {
            return;
        };
        self.tracker.restore();

        if !layer.is_save_layer {
            self.current_layer().accumulate(&layer.accumulator);
            return;
        }

        let layer_bounds = match layer.explicit_bounds {
            Some(explicit_bounds) => Some(explicit_bounds),
            None if layer.unbounded => None,
            None => match &layer.image_filter {
                Some(filter) => filter.map_device_bounds(&layer.accumulator, &layer.layer_matrix),
                None => Some(layer.accumulator),
            },
        };
        match layer_bounds {
            Some(bounds) if !bounds.is_empty() => self.accumulate_device(bounds),
            Some(_) => {}
            None => self.accumulate_unbounded(),
        }
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.tracker.translate(tx, ty);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.tracker.scale(sx, sy);
    }

    fn rotate(&mut self, degrees: f32) {
        self.tracker.rotate(degrees);
    }

    fn skew(&mut self, sx: f32, sy: f32) {
        self.tracker.skew(sx, sy);
    }

    fn transform_2d_affine(&mut self, mxx: f32, mxy: f32, mxt: f32, myx: f32, myy: f32, myt: f32) {
        self.tracker.transform_2d_affine(mxx, mxy, mxt, myx, myy, myt);
    }

    fn transform_full_perspective(
        &mut self,
        mxx: f32,
        mxy: f32,
        mxz: f32,
        mxt: f32,
        myx: f32,
        myy: f32,
        myz: f32,
        myt: f32,
        mzx: f32,
        mzy: f32,
        mzz: f32,
        mzt: f32,
        mwx: f32,
        mwy: f32,
        mwz: f32,
        mwt: f32,
    ) {
        self.tracker.transform_full_perspective(
            mxx, mxy, mxz, mxt, myx, myy, myz, myt, mzx, mzy, mzz, mzt, mwx, mwy, mwz, mwt,
        );
    }

    fn transform_reset(&mut self) {
        self.tracker.set_identity();
    }

    fn clip_rect(&mut self, rect: &Rect, op: ClipOp, is_aa: bool) {
        self.tracker.clip_rect(rect, op, is_aa);
    }

    fn clip_rrect(&mut self, rrect: &RoundRect, op: ClipOp, is_aa: bool) {
        self.tracker.clip_rrect(rrect, op, is_aa);
    }

    fn clip_path(&mut self, path: &Arc<Path>, op: ClipOp, is_aa: bool) {
        self.tracker.clip_path(path, op, is_aa);
    }

    fn draw_paint(&mut self) {
        self.accumulate_unbounded();
    }

    fn draw_color(&mut self, _color: Color, _mode: BlendMode) {
        self.accumulate_unbounded();
    }

    fn draw_line(&mut self, p0: Point, p1: Point) {
        let bounds = bounds_of_points(&[p0, p1]);
        let mut flags = OpFlags::FILLED_SHAPE | OpFlags::STROKED_ALWAYS | OpFlags::CAPS;
        if p0.x != p1.x && p0.y != p1.y {
            flags |= OpFlags::DIAGONAL_CAPS;
        }
        self.accumulate_op_bounds(bounds, flags);
    }

    fn draw_rect(&mut self, rect: &Rect) {
        self.accumulate_op_bounds(rect.sorted(), OpFlags::FILLED_SHAPE | OpFlags::JOINS);
    }

    fn draw_oval(&mut self, bounds: &Rect) {
        self.accumulate_op_bounds(bounds.sorted(), OpFlags::FILLED_SHAPE);
    }

    fn draw_circle(&mut self, center: Point, radius: f32) {
        let bounds = rect_ltrb(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        );
        self.accumulate_op_bounds(bounds.sorted(), OpFlags::FILLED_SHAPE);
    }

    fn draw_rrect(&mut self, rrect: &RoundRect) {
        let flags = if rrect.is_rect() {
            OpFlags::FILLED_SHAPE | OpFlags::JOINS
        } else {
            OpFlags::FILLED_SHAPE
        };
        self.accumulate_op_bounds(rrect.bounds(), flags);
    }

    fn draw_drrect(&mut self, outer: &RoundRect, _inner: &RoundRect) {
        let flags = if outer.is_rect() {
            OpFlags::FILLED_SHAPE | OpFlags::JOINS
        } else {
            OpFlags::FILLED_SHAPE
        };
        self.accumulate_op_bounds(outer.bounds(), flags);
    }

    fn draw_path(&mut self, path: &Arc<Path>) {
        if path.is_inverse_fill_type() {
            self.accumulate_unbounded();
            return;
        }
        let flags = OpFlags::FILLED_SHAPE
            | OpFlags::JOINS
            | OpFlags::ACUTE_JOINS
            | OpFlags::CAPS
            | OpFlags::DIAGONAL_CAPS;
        self.accumulate_op_bounds(path.bounds(), flags);
    }

    fn draw_arc(
        &mut self,
        oval_bounds: &Rect,
        _start_degrees: f32,
        _sweep_degrees: f32,
        use_center: bool,
    ) {
        let flags = if use_center {
            OpFlags::FILLED_SHAPE | OpFlags::JOINS | OpFlags::ACUTE_JOINS
        } else {
            OpFlags::FILLED_SHAPE | OpFlags::CAPS | OpFlags::DIAGONAL_CAPS
        };
        self.accumulate_op_bounds(oval_bounds.sorted(), flags);
    }

    fn draw_points(&mut self, mode: PointMode, points: &[Point]) {
        if points.is_empty() {
            return;
        }
        let flags = match mode {
            PointMode::Points => OpFlags::FILLED_SHAPE | OpFlags::STROKED_ALWAYS | OpFlags::CAPS,
            PointMode::Lines => {
                OpFlags::FILLED_SHAPE
                    | OpFlags::STROKED_ALWAYS
                    | OpFlags::CAPS
                    | OpFlags::DIAGONAL_CAPS
            }
            PointMode::Polygon => {
                OpFlags::FILLED_SHAPE
                    | OpFlags::STROKED_ALWAYS
                    | OpFlags::JOINS
                    | OpFlags::ACUTE_JOINS
                    | OpFlags::CAPS
                    | OpFlags::DIAGONAL_CAPS
            }
        };
        self.accumulate_op_bounds(bounds_of_points(points), flags);
    }

    fn draw_vertices(&mut self, vertices: &Arc<Vertices>, _mode: BlendMode) {
        self.accumulate_op_bounds(vertices.bounds(), OpFlags::APPLIES_IMAGE_FILTER);
    }

    fn draw_image(
        &mut self,
        image: &Arc<Image>,
        point: Point,
        _sampling: ImageSampling,
        render_with_attributes: bool,
    ) {
        let bounds = image.bounds().offset_by(point.x, point.y);
        self.accumulate_op_bounds(bounds, Self::image_flags(render_with_attributes));
    }

    fn draw_image_rect(
        &mut self,
        _image: &Arc<Image>,
        _src: &Rect,
        dst: &Rect,
        _sampling: ImageSampling,
        render_with_attributes: bool,
        _constraint: SrcRectConstraint,
    ) {
        self.accumulate_op_bounds(dst.sorted(), Self::image_flags(render_with_attributes));
    }

    fn draw_image_nine(
        &mut self,
        _image: &Arc<Image>,
        _center: &Rect,
        dst: &Rect,
        _sampling: ImageSampling,
        render_with_attributes: bool,
    ) {
        self.accumulate_op_bounds(dst.sorted(), Self::image_flags(render_with_attributes));
    }

    fn draw_atlas(
        &mut self,
        _atlas: &Arc<Image>,
        xforms: &[RsTransform],
        tex: &[Rect],
        _colors: &[Color],
        _mode: BlendMode,
        _sampling: ImageSampling,
        cull_rect: Option<&Rect>,
        render_with_attributes: bool,
    ) {
        let bounds = match cull_rect {
            Some(cull_rect) => cull_rect.sorted(),
            None => {
                let corners: Vec<Point> = xforms
                    .iter()
                    .zip(tex)
                    .flat_map(|(xform, tex)| xform.quad(tex.width_f(), tex.height_f()))
                    .collect();
                bounds_of_points(&corners)
            }
        };
        self.accumulate_op_bounds(bounds, Self::image_flags(render_with_attributes));
    }

    fn draw_display_list(&mut self, display_list: &Arc<DisplayList>, _opacity: f32) {
        self.accumulate_op_bounds(display_list.bounds(), OpFlags::IGNORES_PAINT);
    }

    fn draw_text_blob(&mut self, blob: &Arc<TextBlob>, x: f32, y: f32) {
        let bounds = blob.bounds().offset_by(x, y);
        self.accumulate_op_bounds(bounds, OpFlags::FILLED_SHAPE);
    }

    fn draw_shadow(
        &mut self,
        path: &Arc<Path>,
        _color: Color,
        elevation: f32,
        _transparent_occluder: bool,
        dpr: f32,
    ) {
        let outset = dpr * elevation * (1.0 + SHADOW_LIGHT_RADIUS / SHADOW_LIGHT_HEIGHT);
        let bounds = path.bounds().outset_by(outset, outset);
        self.accumulate_op_bounds(bounds, OpFlags::IGNORES_PAINT);
    }
}
