use std::borrow::Cow;
use std::sync::Arc;

use geometry::{ClipOp, M44, Matrix, Path, Point, Rect, RoundRect};

use crate::attributes::{
    Color, DrawStyle, ImageSampling, Paint, PointMode, RsTransform, SrcRectConstraint,
    StrokeCap, StrokeJoin,
};
use crate::effects::{
    ColorFilter, ColorSource, Image, ImageFilter, MaskFilter, PathEffect, TextBlob, Vertices,
};
use crate::op::{Op, TapeWriter};
use crate::{BlendMode, BuildError, DisplayList, Dispatcher};

/// Records drawing commands into a tape.
///
/// The builder is itself a [`Dispatcher`], so replaying a list into it
/// copies the list. Attribute setters that repeat the current value and
/// transforms that leave the matrix unchanged are not recorded.
///
/// A `restore()` without a pending save poisons the builder: later calls
/// are ignored and `build()` returns the error.
#[derive(Debug, Default)]
pub struct DisplayListBuilder {
    tape: TapeWriter,
    op_count: usize,
    nested_op_count: usize,
    nested_bytes: usize,
    save_depth: usize,
    attributes: Paint,
    cull_rect: Option<Rect>,
    error: Option<BuildError>,
}

impl DisplayListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cull rect is carried onto every list this builder produces.
    pub fn with_cull_rect(cull_rect: Rect) -> Self {
        Self {
            cull_rect: Some(cull_rect),
            ..Self::default()
        }
    }

    pub fn current_attributes(&self) -> &Paint {
        &self.attributes
    }

    /// Number of open scopes plus one, matching the canvas convention.
    pub fn save_count(&self) -> usize {
        self.save_depth + 1
    }

    pub fn op_count(&self) -> usize {
        self.op_count
    }

    pub fn bytes_written(&self) -> usize {
        self.tape.words.len() * 4
    }

    pub fn error(&self) -> Option<BuildError> {
        self.error
    }

    /// Like `restore()`, but reports an unbalanced call to the caller
    /// instead of poisoning the builder.
    pub fn try_restore(&mut self) -> Result<(), BuildError> {
        if self.save_depth == 0 {
            return Err(BuildError::UnbalancedSaveRestore);
        }
        self.restore();
        Ok(())
    }

    pub fn transform(&mut self, matrix: &Matrix) {
        self.transform_2d_affine(
            matrix.m11, matrix.m21, matrix.m31, matrix.m12, matrix.m22, matrix.m32,
        );
    }

    pub fn transform_m44(&mut self, matrix: &M44) {
        self.transform_full_perspective(
            matrix.m11, matrix.m21, matrix.m31, matrix.m41, //
            matrix.m12, matrix.m22, matrix.m32, matrix.m42, //
            matrix.m13, matrix.m23, matrix.m33, matrix.m43, //
            matrix.m14, matrix.m24, matrix.m34, matrix.m44,
        );
    }

    /// Records whichever setters are needed to make `paint` current.
    pub fn set_attributes_from_paint(&mut self, paint: &Paint) {
        self.set_anti_alias(paint.anti_alias);
        self.set_dither(paint.dither);
        self.set_invert_colors(paint.invert_colors);
        self.set_color(paint.color);
        self.set_blend_mode(paint.blend_mode);
        self.set_draw_style(paint.draw_style);
        self.set_stroke_cap(paint.stroke_cap);
        self.set_stroke_join(paint.stroke_join);
        self.set_stroke_width(paint.stroke_width);
        self.set_stroke_miter(paint.stroke_miter);
        self.set_color_source(paint.color_source.as_ref());
        self.set_color_filter(paint.color_filter.as_ref());
        self.set_image_filter(paint.image_filter.as_ref());
        self.set_mask_filter(paint.mask_filter.as_ref());
        self.set_path_effect(paint.path_effect.as_ref());
    }

    /// Freezes the recording. Scopes still open are closed first. The
    /// builder is left empty and ready for a new recording with the same
    /// cull rect.
    pub fn build(&mut self) -> Result<Arc<DisplayList>, BuildError> {
        let fresh = Self {
            cull_rect: self.cull_rect,
            ..Self::default()
        };
        let mut finished = std::mem::replace(self, fresh);
        while finished.error.is_none() && finished.save_depth > 0 {
            finished.restore();
        }
        if let Some(error) = finished.error {
            return Err(error);
        }

        let TapeWriter { words, objects } = finished.tape;
        let display_list = DisplayList::new(
            words,
            objects,
            finished.op_count,
            finished.nested_op_count,
            finished.nested_bytes,
            finished.cull_rect,
        );
        tracing::trace!(
            unique_id = display_list.unique_id(),
            op_count = display_list.op_count(false),
            bytes = display_list.bytes(false),
            "built display list"
        );
        Ok(Arc::new(display_list))
    }

    fn record(&mut self, op: Op<'_>) {
        if self.error.is_some() {
            return;
        }
        match self.tape.encode(&op) {
            Ok(()) => self.op_count += 1,
            Err(error) => {
                tracing::error!(%error, opcode = ?op.opcode(), "display list recording failed");
                self.error = Some(error);
            }
        }
    }
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|value| value.is_finite())
}

impl Dispatcher for DisplayListBuilder {
    fn set_anti_alias(&mut self, anti_alias: bool) {
        if self.attributes.anti_alias != anti_alias {
            self.attributes.anti_alias = anti_alias;
            self.record(Op::SetAntiAlias(anti_alias));
        }
    }

    fn set_dither(&mut self, dither: bool) {
        if self.attributes.dither != dither {
            self.attributes.dither = dither;
            self.record(Op::SetDither(dither));
        }
    }

    fn set_invert_colors(&mut self, invert: bool) {
        if self.attributes.invert_colors != invert {
            self.attributes.invert_colors = invert;
            self.record(Op::SetInvertColors(invert));
        }
    }

    fn set_stroke_cap(&mut self, cap: StrokeCap) {
        if self.attributes.stroke_cap != cap {
            self.attributes.stroke_cap = cap;
            self.record(Op::SetStrokeCap(cap));
        }
    }

    fn set_stroke_join(&mut self, join: StrokeJoin) {
        if self.attributes.stroke_join != join {
            self.attributes.stroke_join = join;
            self.record(Op::SetStrokeJoin(join));
        }
    }

    fn set_draw_style(&mut self, style: DrawStyle) {
        if self.attributes.draw_style != style {
            self.attributes.draw_style = style;
            self.record(Op::SetDrawStyle(style));
        }
    }

    fn set_stroke_width(&mut self, width: f32) {
        if self.attributes.stroke_width != width {
            self.attributes.stroke_width = width;
            self.record(Op::SetStrokeWidth(width));
        }
    }

    fn set_stroke_miter(&mut self, limit: f32) {
        if self.attributes.stroke_miter != limit {
            self.attributes.stroke_miter = limit;
            self.record(Op::SetStrokeMiter(limit));
        }
    }

    fn set_color(&mut self, color: Color) {
        if self.attributes.color != color {
            self.attributes.color = color;
            self.record(Op::SetColor(color));
        }
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        if self.attributes.blend_mode != mode {
            self.attributes.blend_mode = mode;
            self.record(Op::SetBlendMode(mode));
        }
    }

    fn set_color_source(&mut self, source: Option<&Arc<ColorSource>>) {
        if self.attributes.color_source.as_ref() != source {
            self.attributes.color_source = source.cloned();
            self.record(Op::SetColorSource(source));
        }
    }

    fn set_color_filter(&mut self, filter: Option<&Arc<ColorFilter>>) {
        if self.attributes.color_filter.as_ref() != filter {
            self.attributes.color_filter = filter.cloned();
            self.record(Op::SetColorFilter(filter));
        }
    }

    fn set_image_filter(&mut self, filter: Option<&Arc<ImageFilter>>) {
        if self.attributes.image_filter.as_ref() != filter {
            self.attributes.image_filter = filter.cloned();
            self.record(Op::SetImageFilter(filter));
        }
    }

    fn set_mask_filter(&mut self, filter: Option<&Arc<MaskFilter>>) {
        if self.attributes.mask_filter.as_ref() != filter {
            self.attributes.mask_filter = filter.cloned();
            self.record(Op::SetMaskFilter(filter));
        }
    }

    fn set_path_effect(&mut self, effect: Option<&Arc<PathEffect>>) {
        if self.attributes.path_effect.as_ref() != effect {
            self.attributes.path_effect = effect.cloned();
            self.record(Op::SetPathEffect(effect));
        }
    }

    fn save(&mut self) {
        self.save_depth += 1;
        self.record(Op::Save);
    }

    fn save_layer(
        &mut self,
        bounds: Option<&Rect>,
        with_paint: bool,
        backdrop: Option<&Arc<ImageFilter>>,
    ) {
        self.save_depth += 1;
        self.record(Op::SaveLayer {
            bounds: bounds.copied(),
            with_paint,
            backdrop,
        });
    }

    fn restore(&mut self) {
        if self.save_depth == 0 {
            if self.error.is_none() {
                tracing::error!("restore called without a matching save");
                self.error = Some(BuildError::UnbalancedSaveRestore);
            }
            return;
        }
        self.save_depth -= 1;
        self.record(Op::Restore);
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        if all_finite(&[tx, ty]) && (tx != 0.0 || ty != 0.0) {
            self.record(Op::Translate { tx, ty });
        }
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        if all_finite(&[sx, sy]) && (sx != 1.0 || sy != 1.0) {
            self.record(Op::Scale { sx, sy });
        }
    }

    fn rotate(&mut self, degrees: f32) {
        if degrees.is_finite() && degrees % 360.0 != 0.0 {
            self.record(Op::Rotate { degrees });
        }
    }

    fn skew(&mut self, sx: f32, sy: f32) {
        if all_finite(&[sx, sy]) && (sx != 0.0 || sy != 0.0) {
            self.record(Op::Skew { sx, sy });
        }
    }

    fn transform_2d_affine(&mut self, mxx: f32, mxy: f32, mxt: f32, myx: f32, myy: f32, myt: f32) {
        let values = [mxx, mxy, mxt, myx, myy, myt];
        if !all_finite(&values) {
            return;
        }
        if mxy == 0.0 && myx == 0.0 {
            if mxx == 1.0 && myy == 1.0 {
                self.translate(mxt, myt);
                return;
            }
            if mxt == 0.0 && myt == 0.0 {
                self.scale(mxx, myy);
                return;
            }
        }
        self.record(Op::Transform2DAffine(values));
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
        let values = [
            mxx, mxy, mxz, mxt, myx, myy, myz, myt, mzx, mzy, mzz, mzt, mwx, mwy, mwz, mwt,
        ];
        if !all_finite(&values) {
            return;
        }
        let is_2d_affine = mxz == 0.0
            && myz == 0.0
            && mzx == 0.0
            && mzy == 0.0
            && mzz == 1.0
            && mzt == 0.0
            && mwx == 0.0
            && mwy == 0.0
            && mwz == 0.0
            && mwt == 1.0;
        if is_2d_affine {
            self.transform_2d_affine(mxx, mxy, mxt, myx, myy, myt);
        } else {
            self.record(Op::TransformFullPerspective(values));
        }
    }

    fn transform_reset(&mut self) {
        self.record(Op::TransformReset);
    }

    fn clip_rect(&mut self, rect: &Rect, op: ClipOp, is_aa: bool) {
        self.record(Op::ClipRect {
            rect: *rect,
            op,
            is_aa,
        });
    }

    fn clip_rrect(&mut self, rrect: &RoundRect, op: ClipOp, is_aa: bool) {
        if rrect.is_rect() {
            self.clip_rect(&rrect.rect(), op, is_aa);
        } else {
            self.record(Op::ClipRRect {
                rrect: *rrect,
                op,
                is_aa,
            });
        }
    }

    fn clip_path(&mut self, path: &Arc<Path>, op: ClipOp, is_aa: bool) {
        if !path.is_inverse_fill_type() {
            if let Some(rect) = path.as_rect() {
                self.clip_rect(&rect, op, is_aa);
                return;
            }
        }
        self.record(Op::ClipPath { path, op, is_aa });
    }

    fn draw_paint(&mut self) {
        self.record(Op::DrawPaint);
    }

    fn draw_color(&mut self, color: Color, mode: BlendMode) {
        self.record(Op::DrawColor { color, mode });
    }

    fn draw_line(&mut self, p0: Point, p1: Point) {
        self.record(Op::DrawLine { p0, p1 });
    }

    fn draw_rect(&mut self, rect: &Rect) {
        self.record(Op::DrawRect(*rect));
    }

    fn draw_oval(&mut self, bounds: &Rect) {
        self.record(Op::DrawOval(*bounds));
    }

    fn draw_circle(&mut self, center: Point, radius: f32) {
        self.record(Op::DrawCircle { center, radius });
    }

    fn draw_rrect(&mut self, rrect: &RoundRect) {
        if rrect.is_rect() {
            self.draw_rect(&rrect.rect());
        } else {
            self.record(Op::DrawRRect(*rrect));
        }
    }

    fn draw_drrect(&mut self, outer: &RoundRect, inner: &RoundRect) {
        self.record(Op::DrawDRRect {
            outer: *outer,
            inner: *inner,
        });
    }

    fn draw_path(&mut self, path: &Arc<Path>) {
        self.record(Op::DrawPath(path));
    }

    fn draw_arc(
        &mut self,
        oval_bounds: &Rect,
        start_degrees: f32,
        sweep_degrees: f32,
        use_center: bool,
    ) {
        self.record(Op::DrawArc {
            oval_bounds: *oval_bounds,
            start_degrees,
            sweep_degrees,
            use_center,
        });
    }

    fn draw_points(&mut self, mode: PointMode, points: &[Point]) {
        if points.is_empty() {
            return;
        }
        self.record(Op::DrawPoints {
            mode,
            points: Cow::Borrowed(points),
        });
    }

    fn draw_vertices(&mut self, vertices: &Arc<Vertices>, mode: BlendMode) {
        self.record(Op::DrawVertices { vertices, mode });
    }

    fn draw_image(
        &mut self,
        image: &Arc<Image>,
        point: Point,
        sampling: ImageSampling,
        render_with_attributes: bool,
    ) {
        self.record(Op::DrawImage {
            image,
            point,
            sampling,
            render_with_attributes,
        });
    }

    fn draw_image_rect(
        &mut self,
        image: &Arc<Image>,
        src: &Rect,
        dst: &Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
        constraint: SrcRectConstraint,
    ) {
        self.record(Op::DrawImageRect {
            image,
            src: *src,
            dst: *dst,
            sampling,
            render_with_attributes,
            constraint,
        });
    }

    fn draw_image_nine(
        &mut self,
        image: &Arc<Image>,
        center: &Rect,
        dst: &Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
    ) {
        self.record(Op::DrawImageNine {
            image,
            center: *center,
            dst: *dst,
            sampling,
            render_with_attributes,
        });
    }

    fn draw_atlas(
        &mut self,
        atlas: &Arc<Image>,
        xforms: &[RsTransform],
        tex: &[Rect],
        colors: &[Color],
        mode: BlendMode,
        sampling: ImageSampling,
        cull_rect: Option<&Rect>,
        render_with_attributes: bool,
    ) {
        let mut count = xforms.len().min(tex.len());
        if !colors.is_empty() {
            count = count.min(colors.len());
        }
        if count == 0 {
            return;
        }
        let colors = if colors.is_empty() {
            colors
        } else {
            &colors[..count]
        };
        self.record(Op::DrawAtlas {
            atlas,
            xforms: Cow::Borrowed(&xforms[..count]),
            tex: Cow::Borrowed(&tex[..count]),
            colors: Cow::Borrowed(colors),
            mode,
            sampling,
            cull_rect: cull_rect.copied(),
            render_with_attributes,
        });
    }

    fn draw_display_list(&mut self, display_list: &Arc<DisplayList>, opacity: f32) {
        if self.error.is_some() {
            return;
        }
        self.nested_op_count += display_list.op_count(true);
        self.nested_bytes += display_list.bytes(true);
        self.record(Op::DrawDisplayList {
            display_list,
            opacity,
        });
    }

    fn draw_text_blob(&mut self, blob: &Arc<TextBlob>, x: f32, y: f32) {
        self.record(Op::DrawTextBlob { blob, x, y });
    }

    fn draw_shadow(
        &mut self,
        path: &Arc<Path>,
        color: Color,
        elevation: f32,
        transparent_occluder: bool,
        dpr: f32,
    ) {
        self.record(Op::DrawShadow {
            path,
            color,
            elevation,
            transparent_occluder,
            dpr,
        });
    }
}
