//! Tape records.
//!
//! Record layout, in 32-bit words:
//! | header | fixed payload | trailing array words |
//! header = | record length in words, header included (24) | opcode (8) |
//!          31                                            8 7          0
//!
//! Payloads are `#[repr(C)]` structs of `f32`/`u32` fields so they can be
//! copied in and out of the word buffer with `bytemuck`. Enum and bool
//! fields are stored as `u32`. Shared objects are stored in a side table and
//! referenced by index.

use std::borrow::Cow;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use geometry::{ClipOp, Path, Point, Rect, RoundRect, Size, empty_rect, rect_ltrb};

use crate::attributes::{
    Color, DrawStyle, ImageSampling, PointMode, RsTransform, SrcRectConstraint, StrokeCap,
    StrokeJoin,
};
use crate::effects::{
    ColorFilter, ColorSource, Image, ImageFilter, MaskFilter, PathEffect, TextBlob, Vertices,
};
use crate::{BlendMode, BuildError, DispatchError, DisplayList, Dispatcher};

const OPCODE_BITS: u32 = 8;
const OPCODE_MASK: u32 = (1 << OPCODE_BITS) - 1;
pub(crate) const MAX_RECORD_WORDS: usize = (1 << (32 - OPCODE_BITS)) - 1;

const SAVE_LAYER_HAS_BOUNDS: u32 = 1 << 0;
const SAVE_LAYER_WITH_PAINT: u32 = 1 << 1;
const SAVE_LAYER_HAS_BACKDROP: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    SetAntiAlias,
    SetDither,
    SetInvertColors,
    SetStrokeCap,
    SetStrokeJoin,
    SetDrawStyle,
    SetStrokeWidth,
    SetStrokeMiter,
    SetColor,
    SetBlendMode,
    SetColorSource,
    ClearColorSource,
    SetColorFilter,
    ClearColorFilter,
    SetImageFilter,
    ClearImageFilter,
    SetMaskFilter,
    ClearMaskFilter,
    SetPathEffect,
    ClearPathEffect,

    Save,
    SaveLayer,
    Restore,

    Translate,
    Scale,
    Rotate,
    Skew,
    Transform2DAffine,
    TransformFullPerspective,
    TransformReset,

    ClipRect,
    ClipRRect,
    ClipPath,

    DrawPaint,
    DrawColor,
    DrawLine,
    DrawRect,
    DrawOval,
    DrawCircle,
    DrawRRect,
    DrawDRRect,
    DrawPath,
    DrawArc,
    DrawPoints,
    DrawVertices,
    DrawImage,
    DrawImageRect,
    DrawImageNine,
    DrawAtlas,
    DrawDisplayList,
    DrawTextBlob,
    DrawShadow,
}

impl OpCode {
    pub const ALL: [OpCode; 52] = [
        OpCode::SetAntiAlias,
        OpCode::SetDither,
        OpCode::SetInvertColors,
        OpCode::SetStrokeCap,
        OpCode::SetStrokeJoin,
        OpCode::SetDrawStyle,
        OpCode::SetStrokeWidth,
        OpCode::SetStrokeMiter,
        OpCode::SetColor,
        OpCode::SetBlendMode,
        OpCode::SetColorSource,
        OpCode::ClearColorSource,
        OpCode::SetColorFilter,
        OpCode::ClearColorFilter,
        OpCode::SetImageFilter,
        OpCode::ClearImageFilter,
        OpCode::SetMaskFilter,
        OpCode::ClearMaskFilter,
        OpCode::SetPathEffect,
        OpCode::ClearPathEffect,
        OpCode::Save,
        OpCode::SaveLayer,
        OpCode::Restore,
        OpCode::Translate,
        OpCode::Scale,
        OpCode::Rotate,
        OpCode::Skew,
        OpCode::Transform2DAffine,
        OpCode::TransformFullPerspective,
        OpCode::TransformReset,
        OpCode::ClipRect,
        OpCode::ClipRRect,
        OpCode::ClipPath,
        OpCode::DrawPaint,
        OpCode::DrawColor,
        OpCode::DrawLine,
        OpCode::DrawRect,
        OpCode::DrawOval,
        OpCode::DrawCircle,
        OpCode::DrawRRect,
        OpCode::DrawDRRect,
        OpCode::DrawPath,
        OpCode::DrawArc,
        OpCode::DrawPoints,
        OpCode::DrawVertices,
        OpCode::DrawImage,
        OpCode::DrawImageRect,
        OpCode::DrawImageNine,
        OpCode::DrawAtlas,
        OpCode::DrawDisplayList,
        OpCode::DrawTextBlob,
        OpCode::DrawShadow,
    ];
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(value as usize).copied().ok_or(value)
    }
}

pub(crate) fn record_header(opcode: OpCode, words: usize) -> u32 {
    opcode as u32 | (words as u32) << OPCODE_BITS
}

/// Splits a header word into its opcode byte and record length in words.
pub(crate) fn split_header(header: u32) -> (u8, usize) {
    (
        (header & OPCODE_MASK) as u8,
        (header >> OPCODE_BITS) as usize,
    )
}

/// Reference-counted objects kept beside the tape.
#[derive(Debug, Clone, PartialEq)]
pub enum TapeObject {
    ColorSource(Arc<ColorSource>),
    ColorFilter(Arc<ColorFilter>),
    ImageFilter(Arc<ImageFilter>),
    MaskFilter(Arc<MaskFilter>),
    PathEffect(Arc<PathEffect>),
    Path(Arc<Path>),
    Image(Arc<Image>),
    Vertices(Arc<Vertices>),
    TextBlob(Arc<TextBlob>),
    DisplayList(Arc<DisplayList>),
}

pub(crate) trait TapeObjectKind: Sized {
    fn wrap(object: &Arc<Self>) -> TapeObject;
    fn unwrap(object: &TapeObject) -> Option<&Arc<Self>>;
}

macro_rules! tape_object_kind {
    ($($variant:ident => $kind:ty),+ $(,)?) => {
        $(
            impl TapeObjectKind for $kind {
                fn wrap(object: &Arc<Self>) -> TapeObject {
                    TapeObject::$variant(Arc::clone(object))
                }

                fn unwrap(object: &TapeObject) -> Option<&Arc<Self>> {
                    match object {
                        TapeObject::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )+
    };
}

tape_object_kind!(
    ColorSource => ColorSource,
    ColorFilter => ColorFilter,
    ImageFilter => ImageFilter,
    MaskFilter => MaskFilter,
    PathEffect => PathEffect,
    Path => Path,
    Image => Image,
    Vertices => Vertices,
    TextBlob => TextBlob,
    DisplayList => DisplayList,
);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LtrbPayload {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl LtrbPayload {
    fn from_rect(rect: &Rect) -> Self {
        Self {
            left: rect.min.x,
            top: rect.min.y,
            right: rect.max.x,
            bottom: rect.max.y,
        }
    }

    fn rect(&self) -> Rect {
        rect_ltrb(self.left, self.top, self.right, self.bottom)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RRectPayload {
    rect: LtrbPayload,
    radii: [f32; 8],
}

impl RRectPayload {
    fn from_rrect(rrect: &RoundRect) -> Self {
        let mut radii = [0.0; 8];
        for (corner, radius) in rrect.radii().iter().enumerate() {
            radii[corner * 2] = radius.width;
            radii[corner * 2 + 1] = radius.height;
        }
        Self {
            rect: LtrbPayload::from_rect(&rrect.rect()),
            radii,
        }
    }

    fn rrect(&self) -> RoundRect {
        let radii = [0, 1, 2, 3].map(|corner| {
            Size::new(self.radii[corner * 2], self.radii[corner * 2 + 1])
        });
        RoundRect::from_parts_unchecked(self.rect.rect(), radii)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ValuePayload {
    value: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScalarPayload {
    value: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PairPayload {
    x: f32,
    y: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AffinePayload {
    values: [f32; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PerspectivePayload {
    values: [f32; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SaveLayerPayload {
    flags: u32,
    backdrop: u32,
    bounds: LtrbPayload,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ClipRectPayload {
    rect: LtrbPayload,
    op: u32,
    is_aa: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ClipRRectPayload {
    rrect: RRectPayload,
    op: u32,
    is_aa: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ClipPathPayload {
    path: u32,
    op: u32,
    is_aa: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ColorModePayload {
    color: u32,
    mode: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LinePayload {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CirclePayload {
    x: f32,
    y: f32,
    radius: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DRRectPayload {
    outer: RRectPayload,
    inner: RRectPayload,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ArcPayload {
    oval: LtrbPayload,
    start_degrees: f32,
    sweep_degrees: f32,
    use_center: u32,
}

/// Followed by `count` x/y pairs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PointsPayload {
    mode: u32,
    count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct VerticesPayload {
    vertices: u32,
    mode: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ImagePayload {
    image: u32,
    x: f32,
    y: f32,
    sampling: u32,
    render_with_attributes: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ImageRectPayload {
    image: u32,
    sampling: u32,
    render_with_attributes: u32,
    constraint: u32,
    src: LtrbPayload,
    dst: LtrbPayload,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ImageNinePayload {
    image: u32,
    sampling: u32,
    render_with_attributes: u32,
    center: LtrbPayload,
    dst: LtrbPayload,
}

/// Followed by `count` transforms, `count` texture rects and, when
/// `has_colors` is set, `count` colors.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AtlasPayload {
    atlas: u32,
    count: u32,
    has_colors: u32,
    mode: u32,
    sampling: u32,
    render_with_attributes: u32,
    has_cull_rect: u32,
    cull_rect: LtrbPayload,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DisplayListPayload {
    display_list: u32,
    opacity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TextBlobPayload {
    blob: u32,
    x: f32,
    y: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShadowPayload {
    path: u32,
    color: u32,
    elevation: f32,
    dpr: f32,
    transparent_occluder: u32,
}

macro_rules! assert_word_multiple {
    ($($payload:ty),+ $(,)?) => {
        $(static_assertions::const_assert_eq!(std::mem::size_of::<$payload>() % 4, 0);)+
    };
}

assert_word_multiple!(
    LtrbPayload,
    RRectPayload,
    ValuePayload,
    ScalarPayload,
    PairPayload,
    AffinePayload,
    PerspectivePayload,
    SaveLayerPayload,
    ClipRectPayload,
    ClipRRectPayload,
    ClipPathPayload,
    ColorModePayload,
    LinePayload,
    CirclePayload,
    DRRectPayload,
    ArcPayload,
    PointsPayload,
    VerticesPayload,
    ImagePayload,
    ImageRectPayload,
    ImageNinePayload,
    AtlasPayload,
    DisplayListPayload,
    TextBlobPayload,
    ShadowPayload,
);
static_assertions::assert_eq_size!(RsTransform, [u32; 4]);
static_assertions::assert_eq_size!(Color, u32);
static_assertions::assert_eq_size!(RRectPayload, [u32; 12]);

const fn words_of<T>() -> usize {
    std::mem::size_of::<T>() / 4
}

fn clip_op_word(op: ClipOp) -> u32 {
    match op {
        ClipOp::Intersect => 0,
        ClipOp::Difference => 1,
    }
}

fn clip_op_from_word(word: u32) -> Option<ClipOp> {
    match word {
        0 => Some(ClipOp::Intersect),
        1 => Some(ClipOp::Difference),
        _ => None,
    }
}

/// One decoded record. Object references and trailing arrays borrow from
/// the list they were read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Op<'a> {
    SetAntiAlias(bool),
    SetDither(bool),
    SetInvertColors(bool),
    SetStrokeCap(StrokeCap),
    SetStrokeJoin(StrokeJoin),
    SetDrawStyle(DrawStyle),
    SetStrokeWidth(f32),
    SetStrokeMiter(f32),
    SetColor(Color),
    SetBlendMode(BlendMode),
    SetColorSource(Option<&'a Arc<ColorSource>>),
    SetColorFilter(Option<&'a Arc<ColorFilter>>),
    SetImageFilter(Option<&'a Arc<ImageFilter>>),
    SetMaskFilter(Option<&'a Arc<MaskFilter>>),
    SetPathEffect(Option<&'a Arc<PathEffect>>),

    Save,
    SaveLayer {
        bounds: Option<Rect>,
        with_paint: bool,
        backdrop: Option<&'a Arc<ImageFilter>>,
    },
    Restore,

    Translate {
        tx: f32,
        ty: f32,
    },
    Scale {
        sx: f32,
        sy: f32,
    },
    Rotate {
        degrees: f32,
    },
    Skew {
        sx: f32,
        sy: f32,
    },
    /// `[mxx, mxy, mxt, myx, myy, myt]`
    Transform2DAffine([f32; 6]),
    /// Row-major 4x4 parameters.
    TransformFullPerspective([f32; 16]),
    TransformReset,

    ClipRect {
        rect: Rect,
        op: ClipOp,
        is_aa: bool,
    },
    ClipRRect {
        rrect: RoundRect,
        op: ClipOp,
        is_aa: bool,
    },
    ClipPath {
        path: &'a Arc<Path>,
        op: ClipOp,
        is_aa: bool,
    },

    DrawPaint,
    DrawColor {
        color: Color,
        mode: BlendMode,
    },
    DrawLine {
        p0: Point,
        p1: Point,
    },
    DrawRect(Rect),
    DrawOval(Rect),
    DrawCircle {
        center: Point,
        radius: f32,
    },
    DrawRRect(RoundRect),
    DrawDRRect {
        outer: RoundRect,
        inner: RoundRect,
    },
    DrawPath(&'a Arc<Path>),
    DrawArc {
        oval_bounds: Rect,
        start_degrees: f32,
        sweep_degrees: f32,
        use_center: bool,
    },
    DrawPoints {
        mode: PointMode,
        points: Cow<'a, [Point]>,
    },
    DrawVertices {
        vertices: &'a Arc<Vertices>,
        mode: BlendMode,
    },
    DrawImage {
        image: &'a Arc<Image>,
        point: Point,
        sampling: ImageSampling,
        render_with_attributes: bool,
    },
    DrawImageRect {
        image: &'a Arc<Image>,
        src: Rect,
        dst: Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
        constraint: SrcRectConstraint,
    },
    DrawImageNine {
        image: &'a Arc<Image>,
        center: Rect,
        dst: Rect,
        sampling: ImageSampling,
        render_with_attributes: bool,
    },
    DrawAtlas {
        atlas: &'a Arc<Image>,
        xforms: Cow<'a, [RsTransform]>,
        tex: Cow<'a, [Rect]>,
        colors: Cow<'a, [Color]>,
        mode: BlendMode,
        sampling: ImageSampling,
        cull_rect: Option<Rect>,
        render_with_attributes: bool,
    },
    DrawDisplayList {
        display_list: &'a Arc<DisplayList>,
        opacity: f32,
    },
    DrawTextBlob {
        blob: &'a Arc<TextBlob>,
        x: f32,
        y: f32,
    },
    DrawShadow {
        path: &'a Arc<Path>,
        color: Color,
        elevation: f32,
        transparent_occluder: bool,
        dpr: f32,
    },
}

impl Op<'_> {
    pub fn opcode(&self) -> OpCode {
        match self {
            Op::SetAntiAlias(_) => OpCode::SetAntiAlias,
            Op::SetDither(_) => OpCode::SetDither,
            Op::SetInvertColors(_) => OpCode::SetInvertColors,
            Op::SetStrokeCap(_) => OpCode::SetStrokeCap,
            Op::SetStrokeJoin(_) => OpCode::SetStrokeJoin,
            Op::SetDrawStyle(_) => OpCode::SetDrawStyle,
            Op::SetStrokeWidth(_) => OpCode::SetStrokeWidth,
            Op::SetStrokeMiter(_) => OpCode::SetStrokeMiter,
            Op::SetColor(_) => OpCode::SetColor,
            Op::SetBlendMode(_) => OpCode::SetBlendMode,
            Op::SetColorSource(Some(_)) => OpCode::SetColorSource,
            Op::SetColorSource(None) => OpCode::ClearColorSource,
            Op::SetColorFilter(Some(_)) => OpCode::SetColorFilter,
            Op::SetColorFilter(None) => OpCode::ClearColorFilter,
            Op::SetImageFilter(Some(_)) => OpCode::SetImageFilter,
            Op::SetImageFilter(None) => OpCode::ClearImageFilter,
            Op::SetMaskFilter(Some(_)) => OpCode::SetMaskFilter,
            Op::SetMaskFilter(None) => OpCode::ClearMaskFilter,
            Op::SetPathEffect(Some(_)) => OpCode::SetPathEffect,
            Op::SetPathEffect(None) => OpCode::ClearPathEffect,
            Op::Save => OpCode::Save,
            Op::SaveLayer { .. } => OpCode::SaveLayer,
            Op::Restore => OpCode::Restore,
            Op::Translate { .. } => OpCode::Translate,
            Op::Scale { .. } => OpCode::Scale,
            Op::Rotate { .. } => OpCode::Rotate,
            Op::Skew { .. } => OpCode::Skew,
            Op::Transform2DAffine(_) => OpCode::Transform2DAffine,
            Op::TransformFullPerspective(_) => OpCode::TransformFullPerspective,
            Op::TransformReset => OpCode::TransformReset,
            Op::ClipRect { .. } => OpCode::ClipRect,
            Op::ClipRRect { .. } => OpCode::ClipRRect,
            Op::ClipPath { .. } => OpCode::ClipPath,
            Op::DrawPaint => OpCode::DrawPaint,
            Op::DrawColor { .. } => OpCode::DrawColor,
            Op::DrawLine { .. } => OpCode::DrawLine,
            Op::DrawRect(_) => OpCode::DrawRect,
            Op::DrawOval(_) => OpCode::DrawOval,
            Op::DrawCircle { .. } => OpCode::DrawCircle,
            Op::DrawRRect(_) => OpCode::DrawRRect,
            Op::DrawDRRect { .. } => OpCode::DrawDRRect,
            Op::DrawPath(_) => OpCode::DrawPath,
            Op::DrawArc { .. } => OpCode::DrawArc,
            Op::DrawPoints { .. } => OpCode::DrawPoints,
            Op::DrawVertices { .. } => OpCode::DrawVertices,
            Op::DrawImage { .. } => OpCode::DrawImage,
            Op::DrawImageRect { .. } => OpCode::DrawImageRect,
            Op::DrawImageNine { .. } => OpCode::DrawImageNine,
            Op::DrawAtlas { .. } => OpCode::DrawAtlas,
            Op::DrawDisplayList { .. } => OpCode::DrawDisplayList,
            Op::DrawTextBlob { .. } => OpCode::DrawTextBlob,
            Op::DrawShadow { .. } => OpCode::DrawShadow,
        }
    }

    /// Invokes the dispatcher method that corresponds to this record.
    pub fn dispatch<D: Dispatcher + ?Sized>(&self, dispatcher: &mut D) {
        match self {
            Op::SetAntiAlias(value) => dispatcher.set_anti_alias(*value),
            Op::SetDither(value) => dispatcher.set_dither(*value),
            Op::SetInvertColors(value) => dispatcher.set_invert_colors(*value),
            Op::SetStrokeCap(cap) => dispatcher.set_stroke_cap(*cap),
            Op::SetStrokeJoin(join) => dispatcher.set_stroke_join(*join),
            Op::SetDrawStyle(style) => dispatcher.set_draw_style(*style),
            Op::SetStrokeWidth(width) => dispatcher.set_stroke_width(*width),
            Op::SetStrokeMiter(limit) => dispatcher.set_stroke_miter(*limit),
            Op::SetColor(color) => dispatcher.set_color(*color),
            Op::SetBlendMode(mode) => dispatcher.set_blend_mode(*mode),
            Op::SetColorSource(source) => dispatcher.set_color_source(*source),
            Op::SetColorFilter(filter) => dispatcher.set_color_filter(*filter),
            Op::SetImageFilter(filter) => dispatcher.set_image_filter(*filter),
            Op::SetMaskFilter(filter) => dispatcher.set_mask_filter(*filter),
            Op::SetPathEffect(effect) => dispatcher.set_path_effect(*effect),
            Op::Save => dispatcher.save(),
            Op::SaveLayer {
                bounds,
                with_paint,
                backdrop,
            } => dispatcher.save_layer(bounds.as_ref(), *with_paint, *backdrop),
            Op::Restore => dispatcher.restore(),
            Op::Translate { tx, ty } => dispatcher.translate(*tx, *ty),
            Op::Scale { sx, sy } => dispatcher.scale(*sx, *sy),
            Op::Rotate { degrees } => dispatcher.rotate(*degrees),
            Op::Skew { sx, sy } => dispatcher.skew(*sx, *sy),
            Op::Transform2DAffine(m) => {
                dispatcher.transform_2d_affine(m[0], m[1], m[2], m[3], m[4], m[5])
            }
            Op::TransformFullPerspective(m) => dispatcher.transform_full_perspective(
                m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12],
                m[13], m[14], m[15],
            ),
            Op::TransformReset => dispatcher.transform_reset(),
            Op::ClipRect { rect, op, is_aa } => dispatcher.clip_rect(rect, *op, *is_aa),
            Op::ClipRRect { rrect, op, is_aa } => dispatcher.clip_rrect(rrect, *op, *is_aa),
            Op::ClipPath { path, op, is_aa } => dispatcher.clip_path(path, *op, *is_aa),
            Op::DrawPaint => dispatcher.draw_paint(),
            Op::DrawColor { color, mode } => dispatcher.draw_color(*color, *mode),
            Op::DrawLine { p0, p1 } => dispatcher.draw_line(*p0, *p1),
            Op::DrawRect(rect) => dispatcher.draw_rect(rect),
            Op::DrawOval(bounds) => dispatcher.draw_oval(bounds),
            Op::DrawCircle { center, radius } => dispatcher.draw_circle(*center, *radius),
            Op::DrawRRect(rrect) => dispatcher.draw_rrect(rrect),
            Op::DrawDRRect { outer, inner } => dispatcher.draw_drrect(outer, inner),
            Op::DrawPath(path) => dispatcher.draw_path(path),
            Op::DrawArc {
                oval_bounds,
                start_degrees,
                sweep_degrees,
                use_center,
            } => dispatcher.draw_arc(oval_bounds, *start_degrees, *sweep_degrees, *use_center),
            Op::DrawPoints { mode, points } => dispatcher.draw_points(*mode, points),
            Op::DrawVertices { vertices, mode } => dispatcher.draw_vertices(vertices, *mode),
            Op::DrawImage {
                image,
                point,
                sampling,
                render_with_attributes,
            } => dispatcher.draw_image(image, *point, *sampling, *render_with_attributes),
            Op::DrawImageRect {
                image,
                src,
                dst,
                sampling,
                render_with_attributes,
                constraint,
            } => dispatcher.draw_image_rect(
                image,
                src,
                dst,
                *sampling,
                *render_with_attributes,
                *constraint,
            ),
            Op::DrawImageNine {
                image,
                center,
                dst,
                sampling,
                render_with_attributes,
            } => dispatcher.draw_image_nine(image, center, dst, *sampling, *render_with_attributes),
            Op::DrawAtlas {
                atlas,
                xforms,
                tex,
                colors,
                mode,
                sampling,
                cull_rect,
                render_with_attributes,
            } => dispatcher.draw_atlas(
                atlas,
                xforms,
                tex,
                colors,
                *mode,
                *sampling,
                cull_rect.as_ref(),
                *render_with_attributes,
            ),
            Op::DrawDisplayList {
                display_list,
                opacity,
            } => dispatcher.draw_display_list(display_list, *opacity),
            Op::DrawTextBlob { blob, x, y } => dispatcher.draw_text_blob(blob, *x, *y),
            Op::DrawShadow {
                path,
                color,
                elevation,
                transparent_occluder,
                dpr,
            } => dispatcher.draw_shadow(path, *color, *elevation, *transparent_occluder, *dpr),
        }
    }
}

/// Append side of a tape.
#[derive(Debug, Default)]
pub(crate) struct TapeWriter {
    pub(crate) words: Vec<u32>,
    pub(crate) objects: Vec<TapeObject>,
}

impl TapeWriter {
    fn object<T: TapeObjectKind>(&mut self, object: &Arc<T>) -> u32 {
        let index = self.objects.len() as u32;
        self.objects.push(T::wrap(object));
        index
    }

    fn optional_object<T: TapeObjectKind>(&mut self, object: Option<&Arc<T>>) -> u32 {
        object.map_or(u32::MAX, |object| self.object(object))
    }

    fn push(&mut self, opcode: OpCode, head: &[u32], trailing: &[u32]) -> Result<(), BuildError> {
        let words = 1 + head.len() + trailing.len();
        if words > MAX_RECORD_WORDS {
            return Err(BuildError::RecordTooLarge { words });
        }
        self.words.reserve(words);
        self.words.push(record_header(opcode, words));
        self.words.extend_from_slice(head);
        self.words.extend_from_slice(trailing);
        Ok(())
    }

    fn push_fixed<T: Pod>(&mut self, opcode: OpCode, payload: &T) -> Result<(), BuildError> {
        self.push(opcode, bytemuck::cast_slice(std::slice::from_ref(payload)), &[])
    }

    fn push_value(&mut self, opcode: OpCode, value: u32) -> Result<(), BuildError> {
        self.push_fixed(opcode, &ValuePayload { value })
    }

    /// Appends one record; objects it references are added to the table.
    pub(crate) fn encode(&mut self, op: &Op<'_>) -> Result<(), BuildError> {
        let opcode = op.opcode();
        match op {
            Op::SetAntiAlias(value) | Op::SetDither(value) | Op::SetInvertColors(value) => {
                self.push_value(opcode, *value as u32)
            }
            Op::SetStrokeCap(cap) => self.push_value(opcode, *cap as u32),
            Op::SetStrokeJoin(join) => self.push_value(opcode, *join as u32),
            Op::SetDrawStyle(style) => self.push_value(opcode, *style as u32),
            Op::SetStrokeWidth(value) | Op::SetStrokeMiter(value) => {
                self.push_fixed(opcode, &ScalarPayload { value: *value })
            }
            Op::SetColor(color) => self.push_value(opcode, color.0),
            Op::SetBlendMode(mode) => self.push_value(opcode, *mode as u32),
            Op::SetColorSource(Some(source)) => {
                let index = self.object(*source);
                self.push_value(opcode, index)
            }
            Op::SetColorFilter(Some(filter)) => {
                let index = self.object(*filter);
                self.push_value(opcode, index)
            }
            Op::SetImageFilter(Some(filter)) => {
                let index = self.object(*filter);
                self.push_value(opcode, index)
            }
            Op::SetMaskFilter(Some(filter)) => {
                let index = self.object(*filter);
                self.push_value(opcode, index)
            }
            Op::SetPathEffect(Some(effect)) => {
                let index = self.object(*effect);
                self.push_value(opcode, index)
            }
            Op::SetColorSource(None)
            | Op::SetColorFilter(None)
            | Op::SetImageFilter(None)
            | Op::SetMaskFilter(None)
            | Op::SetPathEffect(None)
            | Op::Save
            | Op::Restore
            | Op::TransformReset
            | Op::DrawPaint => self.push(opcode, &[], &[]),
            Op::SaveLayer {
                bounds,
                with_paint,
                backdrop,
            } => {
                let mut flags = 0;
                if bounds.is_some() {
                    flags |= SAVE_LAYER_HAS_BOUNDS;
                }
                if *with_paint {
                    flags |= SAVE_LAYER_WITH_PAINT;
                }
                if backdrop.is_some() {
                    flags |= SAVE_LAYER_HAS_BACKDROP;
                }
                let payload = SaveLayerPayload {
                    flags,
                    backdrop: self.optional_object(*backdrop),
                    bounds: LtrbPayload::from_rect(&bounds.unwrap_or_else(empty_rect)),
                };
                self.push_fixed(opcode, &payload)
            }
            Op::Translate { tx: x, ty: y }
            | Op::Scale { sx: x, sy: y }
            | Op::Skew { sx: x, sy: y } => self.push_fixed(opcode, &PairPayload { x: *x, y: *y }),
            Op::Rotate { degrees } => self.push_fixed(opcode, &ScalarPayload { value: *degrees }),
            Op::Transform2DAffine(values) => {
                self.push_fixed(opcode, &AffinePayload { values: *values })
            }
            Op::TransformFullPerspective(values) => {
                self.push_fixed(opcode, &PerspectivePayload { values: *values })
            }
            Op::ClipRect { rect, op, is_aa } => self.push_fixed(
                opcode,
                &ClipRectPayload {
                    rect: LtrbPayload::from_rect(rect),
                    op: clip_op_word(*op),
                    is_aa: *is_aa as u32,
                },
            ),
            Op::ClipRRect { rrect, op, is_aa } => self.push_fixed(
                opcode,
                &ClipRRectPayload {
                    rrect: RRectPayload::from_rrect(rrect),
                    op: clip_op_word(*op),
                    is_aa: *is_aa as u32,
                },
            ),
            Op::ClipPath { path, op, is_aa } => {
                let payload = ClipPathPayload {
                    path: self.object(*path),
                    op: clip_op_word(*op),
                    is_aa: *is_aa as u32,
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawColor { color, mode } => self.push_fixed(
                opcode,
                &ColorModePayload {
                    color: color.0,
                    mode: *mode as u32,
                },
            ),
            Op::DrawLine { p0, p1 } => self.push_fixed(
                opcode,
                &LinePayload {
                    x0: p0.x,
                    y0: p0.y,
                    x1: p1.x,
                    y1: p1.y,
                },
            ),
            Op::DrawRect(rect) | Op::DrawOval(rect) => {
                self.push_fixed(opcode, &LtrbPayload::from_rect(rect))
            }
            Op::DrawCircle { center, radius } => self.push_fixed(
                opcode,
                &CirclePayload {
                    x: center.x,
                    y: center.y,
                    radius: *radius,
                },
            ),
            Op::DrawRRect(rrect) => self.push_fixed(opcode, &RRectPayload::from_rrect(rrect)),
            Op::DrawDRRect { outer, inner } => self.push_fixed(
                opcode,
                &DRRectPayload {
                    outer: RRectPayload::from_rrect(outer),
                    inner: RRectPayload::from_rrect(inner),
                },
            ),
            Op::DrawPath(path) => {
                let index = self.object(*path);
                self.push_value(opcode, index)
            }
            Op::DrawArc {
                oval_bounds,
                start_degrees,
                sweep_degrees,
                use_center,
            } => self.push_fixed(
                opcode,
                &ArcPayload {
                    oval: LtrbPayload::from_rect(oval_bounds),
                    start_degrees: *start_degrees,
                    sweep_degrees: *sweep_degrees,
                    use_center: *use_center as u32,
                },
            ),
            Op::DrawPoints { mode, points } => {
                let head = PointsPayload {
                    mode: *mode as u32,
                    count: points.len() as u32,
                };
                let trailing: Vec<u32> = points
                    .iter()
                    .flat_map(|point| [point.x.to_bits(), point.y.to_bits()])
                    .collect();
                self.push(
                    opcode,
                    bytemuck::cast_slice(std::slice::from_ref(&head)),
                    &trailing,
                )
            }
            Op::DrawVertices { vertices, mode } => {
                let payload = VerticesPayload {
                    vertices: self.object(*vertices),
                    mode: *mode as u32,
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawImage {
                image,
                point,
                sampling,
                render_with_attributes,
            } => {
                let payload = ImagePayload {
                    image: self.object(*image),
                    x: point.x,
                    y: point.y,
                    sampling: *sampling as u32,
                    render_with_attributes: *render_with_attributes as u32,
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawImageRect {
                image,
                src,
                dst,
                sampling,
                render_with_attributes,
                constraint,
            } => {
                let payload = ImageRectPayload {
                    image: self.object(*image),
                    sampling: *sampling as u32,
                    render_with_attributes: *render_with_attributes as u32,
                    constraint: *constraint as u32,
                    src: LtrbPayload::from_rect(src),
                    dst: LtrbPayload::from_rect(dst),
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawImageNine {
                image,
                center,
                dst,
                sampling,
                render_with_attributes,
            } => {
                let payload = ImageNinePayload {
                    image: self.object(*image),
                    sampling: *sampling as u32,
                    render_with_attributes: *render_with_attributes as u32,
                    center: LtrbPayload::from_rect(center),
                    dst: LtrbPayload::from_rect(dst),
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawAtlas {
                atlas,
                xforms,
                tex,
                colors,
                mode,
                sampling,
                cull_rect,
                render_with_attributes,
            } => {
                let head = AtlasPayload {
                    atlas: self.object(*atlas),
                    count: xforms.len() as u32,
                    has_colors: !colors.is_empty() as u32,
                    mode: *mode as u32,
                    sampling: *sampling as u32,
                    render_with_attributes: *render_with_attributes as u32,
                    has_cull_rect: cull_rect.is_some() as u32,
                    cull_rect: LtrbPayload::from_rect(&cull_rect.unwrap_or_else(empty_rect)),
                };
                let mut trailing: Vec<u32> =
                    Vec::with_capacity(xforms.len() * 8 + colors.len());
                trailing.extend_from_slice(bytemuck::cast_slice(&xforms[..]));
                for rect in tex.iter() {
                    let payload = LtrbPayload::from_rect(rect);
                    trailing.extend_from_slice(bytemuck::cast_slice(std::slice::from_ref(
                        &payload,
                    )));
                }
                trailing.extend_from_slice(bytemuck::cast_slice(&colors[..]));
                self.push(
                    opcode,
                    bytemuck::cast_slice(std::slice::from_ref(&head)),
                    &trailing,
                )
            }
            Op::DrawDisplayList {
                display_list,
                opacity,
            } => {
                let payload = DisplayListPayload {
                    display_list: self.object(*display_list),
                    opacity: *opacity,
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawTextBlob { blob, x, y } => {
                let payload = TextBlobPayload {
                    blob: self.object(*blob),
                    x: *x,
                    y: *y,
                };
                self.push_fixed(opcode, &payload)
            }
            Op::DrawShadow {
                path,
                color,
                elevation,
                transparent_occluder,
                dpr,
            } => {
                let payload = ShadowPayload {
                    path: self.object(*path),
                    color: color.0,
                    elevation: *elevation,
                    dpr: *dpr,
                    transparent_occluder: *transparent_occluder as u32,
                };
                self.push_fixed(opcode, &payload)
            }
        }
    }
}

/// Read side of a tape. Every accessor checks framing against the word
/// buffer and object table, so a corrupted tape fails instead of reading
/// out of bounds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TapeReader<'a> {
    words: &'a [u32],
    objects: &'a [TapeObject],
}

impl<'a> TapeReader<'a> {
    pub(crate) fn new(words: &'a [u32], objects: &'a [TapeObject]) -> Self {
        Self { words, objects }
    }

    /// Length in words of the record starting at `word_offset`, checked
    /// against the end of the tape.
    pub(crate) fn record_len(&self, word_offset: usize) -> Result<usize, DispatchError> {
        let malformed = DispatchError::MalformedTape {
            offset: word_offset * 4,
        };
        let header = *self.words.get(word_offset).ok_or(malformed)?;
        let (_, length) = split_header(header);
        if length == 0 || length > self.words.len() - word_offset {
            return Err(malformed);
        }
        Ok(length)
    }

    /// Decodes the record at `word_offset`; returns it with the offset of
    /// the next record.
    pub(crate) fn decode(&self, word_offset: usize) -> Result<(Op<'a>, usize), DispatchError> {
        let length = self.record_len(word_offset)?;
        let offset = word_offset * 4;
        let (opcode_byte, _) = split_header(self.words[word_offset]);
        let opcode = OpCode::try_from(opcode_byte).map_err(|opcode| {
            DispatchError::UnknownOpcode { offset, opcode }
        })?;
        let record = Record {
            payload: &self.words[word_offset + 1..word_offset + length],
            objects: self.objects,
            offset,
        };
        Ok((record.decode(opcode)?, word_offset + length))
    }
}

struct Record<'a> {
    payload: &'a [u32],
    objects: &'a [TapeObject],
    offset: usize,
}

impl<'a> Record<'a> {
    fn malformed(&self) -> DispatchError {
        DispatchError::MalformedTape {
            offset: self.offset,
        }
    }

    fn empty(&self) -> Result<(), DispatchError> {
        if self.payload.is_empty() {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    /// Reads the fixed head and returns the words that follow it.
    fn head<T: Pod>(&self) -> Result<(T, &'a [u32]), DispatchError> {
        let head_words = words_of::<T>();
        if self.payload.len() < head_words {
            return Err(self.malformed());
        }
        let (head, trailing) = self.payload.split_at(head_words);
        let head = bytemuck::try_pod_read_unaligned(bytemuck::cast_slice(head))
            .map_err(|_| self.malformed())?;
        Ok((head, trailing))
    }

    fn fixed<T: Pod>(&self) -> Result<T, DispatchError> {
        let (head, trailing) = self.head::<T>()?;
        if trailing.is_empty() {
            Ok(head)
        } else {
            Err(self.malformed())
        }
    }

    fn flag(&self, value: u32) -> Result<bool, DispatchError> {
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(self.malformed()),
        }
    }

    fn value<T>(&self, value: Option<T>) -> Result<T, DispatchError> {
        value.ok_or_else(|| self.malformed())
    }

    fn object<T: TapeObjectKind>(&self, index: u32) -> Result<&'a Arc<T>, DispatchError> {
        let object = self.objects.get(index as usize).ok_or(
            DispatchError::ObjectIndexOutOfRange {
                offset: self.offset,
                index,
            },
        )?;
        T::unwrap(object).ok_or(DispatchError::ObjectTypeMismatch {
            offset: self.offset,
            index,
        })
    }

    fn object_value<T: TapeObjectKind>(&self) -> Result<&'a Arc<T>, DispatchError> {
        let payload = self.fixed::<ValuePayload>()?;
        self.object(payload.value)
    }

    fn clip(&self, op: u32, is_aa: u32) -> Result<(ClipOp, bool), DispatchError> {
        Ok((self.value(clip_op_from_word(op))?, self.flag(is_aa)?))
    }

    fn decode(&self, opcode: OpCode) -> Result<Op<'a>, DispatchError> {
        let op = match opcode {
            OpCode::SetAntiAlias => {
                Op::SetAntiAlias(self.flag(self.fixed::<ValuePayload>()?.value)?)
            }
            OpCode::SetDither => Op::SetDither(self.flag(self.fixed::<ValuePayload>()?.value)?),
            OpCode::SetInvertColors => {
                Op::SetInvertColors(self.flag(self.fixed::<ValuePayload>()?.value)?)
            }
            OpCode::SetStrokeCap => Op::SetStrokeCap(
                self.value(StrokeCap::from_index(self.fixed::<ValuePayload>()?.value))?,
            ),
            OpCode::SetStrokeJoin => Op::SetStrokeJoin(
                self.value(StrokeJoin::from_index(self.fixed::<ValuePayload>()?.value))?,
            ),
            OpCode::SetDrawStyle => Op::SetDrawStyle(
                self.value(DrawStyle::from_index(self.fixed::<ValuePayload>()?.value))?,
            ),
            OpCode::SetStrokeWidth => Op::SetStrokeWidth(self.fixed::<ScalarPayload>()?.value),
            OpCode::SetStrokeMiter => Op::SetStrokeMiter(self.fixed::<ScalarPayload>()?.value),
            OpCode::SetColor => Op::SetColor(Color(self.fixed::<ValuePayload>()?.value)),
            OpCode::SetBlendMode => Op::SetBlendMode(
                self.value(BlendMode::from_index(self.fixed::<ValuePayload>()?.value))?,
            ),
            OpCode::SetColorSource => Op::SetColorSource(Some(self.object_value()?)),
            OpCode::SetColorFilter => Op::SetColorFilter(Some(self.object_value()?)),
            OpCode::SetImageFilter => Op::SetImageFilter(Some(self.object_value()?)),
            OpCode::SetMaskFilter => Op::SetMaskFilter(Some(self.object_value()?)),
            OpCode::SetPathEffect => Op::SetPathEffect(Some(self.object_value()?)),
            OpCode::ClearColorSource => {
                self.empty()?;
                Op::SetColorSource(None)
            }
            OpCode::ClearColorFilter => {
                self.empty()?;
                Op::SetColorFilter(None)
            }
            OpCode::ClearImageFilter => {
                self.empty()?;
                Op::SetImageFilter(None)
            }
            OpCode::ClearMaskFilter => {
                self.empty()?;
                Op::SetMaskFilter(None)
            }
            OpCode::ClearPathEffect => {
                self.empty()?;
                Op::SetPathEffect(None)
            }
            OpCode::Save => {
                self.empty()?;
                Op::Save
            }
            OpCode::SaveLayer => {
                let payload = self.fixed::<SaveLayerPayload>()?;
                let known_flags =
                    SAVE_LAYER_HAS_BOUNDS | SAVE_LAYER_WITH_PAINT | SAVE_LAYER_HAS_BACKDROP;
                if payload.flags & !known_flags != 0 {
                    return Err(self.malformed());
                }
                let backdrop = if payload.flags & SAVE_LAYER_HAS_BACKDROP != 0 {
                    Some(self.object(payload.backdrop)?)
                } else {
                    None
                };
                Op::SaveLayer {
                    bounds: (payload.flags & SAVE_LAYER_HAS_BOUNDS != 0)
                        .then(|| payload.bounds.rect()),
                    with_paint: payload.flags & SAVE_LAYER_WITH_PAINT != 0,
                    backdrop,
                }
            }
            OpCode::Restore => {
                self.empty()?;
                Op::Restore
            }
            OpCode::Translate => {
                let payload = self.fixed::<PairPayload>()?;
                Op::Translate {
                    tx: payload.x,
                    ty: payload.y,
                }
            }
            OpCode::Scale => {
                let payload = self.fixed::<PairPayload>()?;
                Op::Scale {
                    sx: payload.x,
                    sy: payload.y,
                }
            }
            OpCode::Rotate => Op::Rotate {
                degrees: self.fixed::<ScalarPayload>()?.value,
            },
            OpCode::Skew => {
                let payload = self.fixed::<PairPayload>()?;
                Op::Skew {
                    sx: payload.x,
                    sy: payload.y,
                }
            }
            OpCode::Transform2DAffine => {
                Op::Transform2DAffine(self.fixed::<AffinePayload>()?.values)
            }
            OpCode::TransformFullPerspective => {
                Op::TransformFullPerspective(self.fixed::<PerspectivePayload>()?.values)
            }
            OpCode::TransformReset => {
                self.empty()?;
                Op::TransformReset
            }
            OpCode::ClipRect => {
                let payload = self.fixed::<ClipRectPayload>()?;
                let (op, is_aa) = self.clip(payload.op, payload.is_aa)?;
                Op::ClipRect {
                    rect: payload.rect.rect(),
                    op,
                    is_aa,
                }
            }
            OpCode::ClipRRect => {
                let payload = self.fixed::<ClipRRectPayload>()?;
                let (op, is_aa) = self.clip(payload.op, payload.is_aa)?;
                Op::ClipRRect {
                    rrect: payload.rrect.rrect(),
                    op,
                    is_aa,
                }
            }
            OpCode::ClipPath => {
                let payload = self.fixed::<ClipPathPayload>()?;
                let (op, is_aa) = self.clip(payload.op, payload.is_aa)?;
                Op::ClipPath {
                    path: self.object(payload.path)?,
                    op,
                    is_aa,
                }
            }
            OpCode::DrawPaint => {
                self.empty()?;
                Op::DrawPaint
            }
            OpCode::DrawColor => {
                let payload = self.fixed::<ColorModePayload>()?;
                Op::DrawColor {
                    color: Color(payload.color),
                    mode: self.value(BlendMode::from_index(payload.mode))?,
                }
            }
            OpCode::DrawLine => {
                let payload = self.fixed::<LinePayload>()?;
                Op::DrawLine {
                    p0: Point::new(payload.x0, payload.y0),
                    p1: Point::new(payload.x1, payload.y1),
                }
            }
            OpCode::DrawRect => Op::DrawRect(self.fixed::<LtrbPayload>()?.rect()),
            OpCode::DrawOval => Op::DrawOval(self.fixed::<LtrbPayload>()?.rect()),
            OpCode::DrawCircle => {
                let payload = self.fixed::<CirclePayload>()?;
                Op::DrawCircle {
                    center: Point::new(payload.x, payload.y),
                    radius: payload.radius,
                }
            }
            OpCode::DrawRRect => Op::DrawRRect(self.fixed::<RRectPayload>()?.rrect()),
            OpCode::DrawDRRect => {
                let payload = self.fixed::<DRRectPayload>()?;
                Op::DrawDRRect {
                    outer: payload.outer.rrect(),
                    inner: payload.inner.rrect(),
                }
            }
            OpCode::DrawPath => Op::DrawPath(self.object_value()?),
            OpCode::DrawArc => {
                let payload = self.fixed::<ArcPayload>()?;
                Op::DrawArc {
                    oval_bounds: payload.oval.rect(),
                    start_degrees: payload.start_degrees,
                    sweep_degrees: payload.sweep_degrees,
                    use_center: self.flag(payload.use_center)?,
                }
            }
            OpCode::DrawPoints => {
                let (payload, trailing) = self.head::<PointsPayload>()?;
                let expected = (payload.count as usize)
                    .checked_mul(2)
                    .ok_or_else(|| self.malformed())?;
                if trailing.len() != expected {
                    return Err(self.malformed());
                }
                let values: &[f32] =
                    bytemuck::try_cast_slice(trailing).map_err(|_| self.malformed())?;
                Op::DrawPoints {
                    mode: self.value(PointMode::from_index(payload.mode))?,
                    points: Cow::Owned(
                        values
                            .chunks_exact(2)
                            .map(|pair| Point::new(pair[0], pair[1]))
                            .collect(),
                    ),
                }
            }
            OpCode::DrawVertices => {
                let payload = self.fixed::<VerticesPayload>()?;
                Op::DrawVertices {
                    vertices: self.object(payload.vertices)?,
                    mode: self.value(BlendMode::from_index(payload.mode))?,
                }
            }
            OpCode::DrawImage => {
                let payload = self.fixed::<ImagePayload>()?;
                Op::DrawImage {
                    image: self.object(payload.image)?,
                    point: Point::new(payload.x, payload.y),
                    sampling: self.value(ImageSampling::from_index(payload.sampling))?,
                    render_with_attributes: self.flag(payload.render_with_attributes)?,
                }
            }
            OpCode::DrawImageRect => {
                let payload = self.fixed::<ImageRectPayload>()?;
                Op::DrawImageRect {
                    image: self.object(payload.image)?,
                    src: payload.src.rect(),
                    dst: payload.dst.rect(),
                    sampling: self.value(ImageSampling::from_index(payload.sampling))?,
                    render_with_attributes: self.flag(payload.render_with_attributes)?,
                    constraint: self.value(SrcRectConstraint::from_index(payload.constraint))?,
                }
            }
            OpCode::DrawImageNine => {
                let payload = self.fixed::<ImageNinePayload>()?;
                Op::DrawImageNine {
                    image: self.object(payload.image)?,
                    center: payload.center.rect(),
                    dst: payload.dst.rect(),
                    sampling: self.value(ImageSampling::from_index(payload.sampling))?,
                    render_with_attributes: self.flag(payload.render_with_attributes)?,
                }
            }
            OpCode::DrawAtlas => self.decode_atlas()?,
            OpCode::DrawDisplayList => {
                let payload = self.fixed::<DisplayListPayload>()?;
                Op::DrawDisplayList {
                    display_list: self.object(payload.display_list)?,
                    opacity: payload.opacity,
                }
            }
            OpCode::DrawTextBlob => {
                let payload = self.fixed::<TextBlobPayload>()?;
                Op::DrawTextBlob {
                    blob: self.object(payload.blob)?,
                    x: payload.x,
                    y: payload.y,
                }
            }
            OpCode::DrawShadow => {
                let payload = self.fixed::<ShadowPayload>()?;
                Op::DrawShadow {
                    path: self.object(payload.path)?,
                    color: Color(payload.color),
                    elevation: payload.elevation,
                    transparent_occluder: self.flag(payload.transparent_occluder)?,
                    dpr: payload.dpr,
                }
            }
        };
        Ok(op)
    }

    fn decode_atlas(&self) -> Result<Op<'a>, DispatchError> {
        let (payload, trailing) = self.head::<AtlasPayload>()?;
        let count = payload.count as usize;
        let has_colors = self.flag(payload.has_colors)?;
        let rect_words = count.checked_mul(4).ok_or_else(|| self.malformed())?;
        let color_words = if has_colors { count } else { 0 };
        if trailing.len() != rect_words * 2 + color_words {
            return Err(self.malformed());
        }
        let (xform_words, rest) = trailing.split_at(rect_words);
        let (tex_words, color_words) = rest.split_at(rect_words);
        let xforms: &'a [RsTransform] =
            bytemuck::try_cast_slice(xform_words).map_err(|_| self.malformed())?;
        let tex_values: &[f32] =
            bytemuck::try_cast_slice(tex_words).map_err(|_| self.malformed())?;
        let colors: &'a [Color] =
            bytemuck::try_cast_slice(color_words).map_err(|_| self.malformed())?;
        Ok(Op::DrawAtlas {
            atlas: self.object(payload.atlas)?,
            xforms: Cow::Borrowed(xforms),
            tex: Cow::Owned(
                tex_values
                    .chunks_exact(4)
                    .map(|ltrb| rect_ltrb(ltrb[0], ltrb[1], ltrb[2], ltrb[3]))
                    .collect(),
            ),
            colors: Cow::Borrowed(colors),
            mode: self.value(BlendMode::from_index(payload.mode))?,
            sampling: self.value(ImageSampling::from_index(payload.sampling))?,
            cull_rect: self
                .flag(payload.has_cull_rect)?
                .then(|| payload.cull_rect.rect()),
            render_with_attributes: self.flag(payload.render_with_attributes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_matches_discriminants() {
        for (index, opcode) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*opcode as usize, index);
            assert_eq!(OpCode::try_from(index as u8), Ok(*opcode));
        }
        assert_eq!(OpCode::try_from(52), Err(52));
    }

    #[test]
    fn header_packs_opcode_and_length() {
        let header = record_header(OpCode::DrawRect, 5);
        assert_eq!(split_header(header), (OpCode::DrawRect as u8, 5));
        assert_eq!(header, OpCode::DrawRect as u32 | 5 << 8);
    }

    #[test]
    fn fixed_records_have_exact_word_lengths() {
        let mut writer = TapeWriter::default();
        writer
            .encode(&Op::DrawRect(rect_ltrb(1.0, 2.0, 3.0, 4.0)))
            .expect("encode rect");
        writer.encode(&Op::Save).expect("encode save");
        assert_eq!(writer.words.len(), 5 + 1);
        assert_eq!(split_header(writer.words[0]).1, 5);
        assert_eq!(split_header(writer.words[5]), (OpCode::Save as u8, 1));
    }

    #[test]
    fn points_record_carries_trailing_pairs() {
        let points = [Point::new(1.0, 2.0), Point::new(3.0, 4.0), Point::new(5.0, 6.0)];
        let mut writer = TapeWriter::default();
        writer
            .encode(&Op::DrawPoints {
                mode: PointMode::Polygon,
                points: Cow::Borrowed(&points),
            })
            .expect("encode points");
        assert_eq!(writer.words.len(), 1 + 2 + 6);

        let reader = TapeReader::new(&writer.words, &writer.objects);
        let (op, next) = reader.decode(0).expect("decode points");
        assert_eq!(next, writer.words.len());
        assert_eq!(
            op,
            Op::DrawPoints {
                mode: PointMode::Polygon,
                points: Cow::Borrowed(&points),
            }
        );
    }

    #[test]
    fn truncated_record_is_malformed() {
        let mut writer = TapeWriter::default();
        writer
            .encode(&Op::Translate { tx: 1.0, ty: 2.0 })
            .expect("encode translate");
        let truncated = &writer.words[..2];
        let reader = TapeReader::new(truncated, &[]);
        assert_eq!(
            reader.decode(0),
            Err(DispatchError::MalformedTape { offset: 0 })
        );
    }

    #[test]
    fn object_references_are_checked() {
        let path = Arc::new(Path::from_rect(&rect_ltrb(0.0, 0.0, 1.0, 1.0)));
        let mut writer = TapeWriter::default();
        writer.encode(&Op::DrawPath(&path)).expect("encode path");

        let reader = TapeReader::new(&writer.words, &[]);
        assert_eq!(
            reader.decode(0).map(|(op, _)| op.opcode()),
            Err(DispatchError::ObjectIndexOutOfRange {
                offset: 0,
                index: 0
            })
        );

        let wrong_kind = [TapeObject::Image(Arc::new(Image::new(1, 2, 2)))];
        let reader = TapeReader::new(&writer.words, &wrong_kind);
        assert_eq!(
            reader.decode(0).map(|(op, _)| op.opcode()),
            Err(DispatchError::ObjectTypeMismatch {
                offset: 0,
                index: 0
            })
        );
    }

    #[test]
    fn out_of_range_enum_value_is_malformed() {
        let words = [
            record_header(OpCode::SetStrokeCap, 2),
            7,
            record_header(OpCode::SetAntiAlias, 2),
            1,
        ];
        let reader = TapeReader::new(&words, &[]);
        assert_eq!(
            reader.decode(0),
            Err(DispatchError::MalformedTape { offset: 0 })
        );
        assert_eq!(reader.decode(2), Ok((Op::SetAntiAlias(true), 4)));
    }

    #[test]
    fn atlas_record_round_trips_borrowed_arrays() {
        let atlas = Arc::new(Image::new(9, 64, 64));
        let xforms = [
            RsTransform::new(1.0, 0.0, 10.0, 10.0),
            RsTransform::new(0.0, 1.0, 40.0, 10.0),
        ];
        let tex = [rect_ltrb(0.0, 0.0, 8.0, 8.0), rect_ltrb(8.0, 0.0, 16.0, 8.0)];
        let colors = [Color::RED, Color::BLUE];
        let op = Op::DrawAtlas {
            atlas: &atlas,
            xforms: Cow::Borrowed(&xforms),
            tex: Cow::Borrowed(&tex),
            colors: Cow::Borrowed(&colors),
            mode: BlendMode::Modulate,
            sampling: ImageSampling::Linear,
            cull_rect: Some(rect_ltrb(0.0, 0.0, 100.0, 100.0)),
            render_with_attributes: true,
        };
        let mut writer = TapeWriter::default();
        writer.encode(&op).expect("encode atlas");
        let reader = TapeReader::new(&writer.words, &writer.objects);
        let (decoded, _) = reader.decode(0).expect("decode atlas");
        assert_eq!(decoded, op);
    }
}
