//! The replay contract for display lists.
//!
//! A tape is replayed by calling exactly one method per record, in record
//! order. Draw methods carry geometry only; the paint they use is whatever
//! the preceding attribute setters established. Attribute state is not part
//! of the save/restore stack.

use std::sync::Arc;

use geometry::{ClipOp, Path, Point, Rect, RoundRect};

use crate::attributes::{
    Color, DrawStyle, ImageSampling, PointMode, RsTransform, SrcRectConstraint, StrokeCap,
    StrokeJoin,
};
use crate::effects::{
    ColorFilter, ColorSource, Image, ImageFilter, MaskFilter, PathEffect, TextBlob, Vertices,
};
use crate::{BlendMode, DisplayList};

pub trait Dispatcher {
    fn set_anti_alias(&mut self, anti_alias: bool);
    fn set_dither(&mut self, dither: bool);
    fn set_invert_colors(&mut self, invert: bool);
    fn set_stroke_cap(&mut self, cap: StrokeCap);
    fn set_stroke_join(&mut self, join: StrokeJoin);
    fn set_draw_style(&mut self, style: DrawStyle);
    /// Zero selects a one-device-pixel hairline.
    fn set_stroke_width(&mut self, width: f32);
    fn set_stroke_miter(&mut self, limit: f32);
    fn set_color(&mut self, color: Color);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_color_source(&mut self, source: Option<&Arc<ColorSource>>);
    fn set_color_filter(&mut self, filter: Option<&Arc<ColorFilter>>);
    fn set_image_filter(&mut self, filter: Option<&Arc<ImageFilter>>);
    fn set_mask_filter(&mut self, filter: Option<&Arc<MaskFilter>>);
    fn set_path_effect(&mut self, effect: Option<&Arc<PathEffect>>);

    fn save(&mut self);
    /// Without `bounds` the layer covers the current clip. With `with_paint`
    /// the current paint is applied when the layer is composited on restore.
    fn save_layer(
        &mut self,
        bounds: Option<&Rect>,
        with_paint: bool,
        backdrop: Option<&Arc<ImageFilter>>,
    );
    fn restore(&mut self);

    fn translate(&mut self, tx: f32, ty: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn rotate(&mut self, degrees: f32);
    fn skew(&mut self, sx: f32, sy: f32);
    fn transform_2d_affine(&mut self, mxx: f32, mxy: f32, mxt: f32, myx: f32, myy: f32, myt: f32);
    #[allow(clippy::too_many_arguments)]
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
    );
    /// Replaces the current transform with identity.
    fn transform_reset(&mut self);

    fn clip_rect(&mut self, rect: &Rect, op: ClipOp, is_aa: bool);
    fn clip_rrect(&mut self, rrect: &RoundRect, op: ClipOp, is_aa: bool);
    fn clip_path(&mut self, path: &Arc<Path>, op: ClipOp, is_aa: bool);

    fn draw_paint(&mut self);
    fn draw_color(&mut self, color: Color, mode: BlendMode);
    fn draw_line(&mut self, p0: Point, p1: Point);
    fn draw_rect(&mut self, rect: &Rect);
    fn draw_oval(&mut self, bounds: &Rect);
    fn draw_circle(&mut self, center: Point, radius: f32);
    fn draw_rrect(&mut self, rrect: &RoundRect);
    fn draw_drrect(&mut self, outer: &RoundRect, inner: &RoundRect);
    fn draw_path(&mut self, path: &Arc<Path>);
    fn draw_arc(
        &mut self,
        oval_bounds: &Rect,
        start_degrees: f32,
        sweep_degrees: f32,
        use_center: bool,
    );
    fn draw_points(&mut self, mode: PointMode, points: &[Point]);
    fn draw_vertices(&mut self, vertices: &Arc<Vertices>, mode: BlendMode);
    fn draw_image(
        &mut self,
        image: &Arc<Image>,
        point: Point,
        sampling: ImageSampling,
        render_with_attributes: bool,
    );
    fn draw_image_rect(
        &mut self,
        image: &Arc<Image>,
        src: &Rect,
        dst: &Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
        constraint: SrcRectConstraint,
    );
    fn draw_image_nine(
        &mut self,
        image: &Arc<Image>,
        center: &Rect,
        dst: &Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
    );
    /// `colors` is either empty or holds one color per sprite.
    #[allow(clippy::too_many_arguments)]
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
    );
    fn draw_display_list(&mut self, display_list: &Arc<DisplayList>, opacity: f32);
    fn draw_text_blob(&mut self, blob: &Arc<TextBlob>, x: f32, y: f32);
    fn draw_shadow(
        &mut self,
        path: &Arc<Path>,
        color: Color,
        elevation: f32,
        transparent_occluder: bool,
        dpr: f32,
    );
}
