//! Paint attribute values carried by state-setter records.

use std::sync::Arc;

use crate::BlendMode;
use crate::effects::{ColorFilter, ColorSource, ImageFilter, MaskFilter, PathEffect};

/// 32-bit ARGB color.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0x0000_0000);
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const RED: Color = Color(0xFFFF_0000);
    pub const GREEN: Color = Color(0xFF00_FF00);
    pub const BLUE: Color = Color(0xFF00_00FF);

    pub const fn from_argb(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Color((alpha as u32) << 24 | (red as u32) << 16 | (green as u32) << 8 | blue as u32)
    }

    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    pub const fn is_transparent(self) -> bool {
        self.alpha() == 0
    }

    pub const fn is_opaque(self) -> bool {
        self.alpha() == 0xFF
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        Color((self.0 & 0x00FF_FFFF) | (alpha as u32) << 24)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

macro_rules! indexed_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn from_index(index: u32) -> Option<Self> {
                Self::ALL.get(index as usize).copied()
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum StrokeCap {
    #[default]
    Butt,
    Round,
    Square,
}
indexed_enum!(StrokeCap { Butt, Round, Square });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum StrokeJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}
indexed_enum!(StrokeJoin { Miter, Round, Bevel });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DrawStyle {
    #[default]
    Fill,
    Stroke,
    StrokeAndFill,
}
indexed_enum!(DrawStyle { Fill, Stroke, StrokeAndFill });

impl DrawStyle {
    pub const fn strokes(self) -> bool {
        !matches!(self, DrawStyle::Fill)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PointMode {
    /// Each point is drawn as a dot sized by the stroke width.
    Points,
    /// Consecutive pairs of points are drawn as separate segments.
    Lines,
    /// Every point is joined to the next one.
    Polygon,
}
indexed_enum!(PointMode { Points, Lines, Polygon });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ImageSampling {
    #[default]
    Nearest,
    Linear,
    MipmapLinear,
    Cubic,
}
indexed_enum!(ImageSampling { Nearest, Linear, MipmapLinear, Cubic });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum VertexMode {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}
indexed_enum!(VertexMode { Triangles, TriangleStrip, TriangleFan });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SrcRectConstraint {
    Strict,
    #[default]
    Fast,
}
indexed_enum!(SrcRectConstraint { Strict, Fast });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TileMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
    Decal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BlurStyle {
    #[default]
    Normal,
    Solid,
    Outer,
    Inner,
}

/// A rotation-scale plus translation, as used by atlas sprites:
/// `x' = scos * x - ssin * y + tx`, `y' = ssin * x + scos * y + ty`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RsTransform {
    pub scos: f32,
    pub ssin: f32,
    pub tx: f32,
    pub ty: f32,
}

impl RsTransform {
    pub const fn new(scos: f32, ssin: f32, tx: f32, ty: f32) -> Self {
        Self { scos, ssin, tx, ty }
    }

    pub fn from_radians(scale: f32, radians: f32, tx: f32, ty: f32) -> Self {
        Self::new(scale * radians.cos(), scale * radians.sin(), tx, ty)
    }

    /// Corners of a `width` x `height` sprite placed by this transform.
    pub fn quad(&self, width: f32, height: f32) -> [geometry::Point; 4] {
        let map = |x: f32, y: f32| {
            geometry::Point::new(
                self.scos * x - self.ssin * y + self.tx,
                self.ssin * x + self.scos * y + self.ty,
            )
        };
        [
            map(0.0, 0.0),
            map(width, 0.0),
            map(width, height),
            map(0.0, height),
        ]
    }
}

/// Every attribute a draw op may pick up from the current paint.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub anti_alias: bool,
    pub dither: bool,
    pub invert_colors: bool,
    pub color: Color,
    pub blend_mode: BlendMode,
    pub draw_style: DrawStyle,
    pub stroke_cap: StrokeCap,
    pub stroke_join: StrokeJoin,
    pub stroke_width: f32,
    pub stroke_miter: f32,
    pub color_source: Option<Arc<ColorSource>>,
    pub color_filter: Option<Arc<ColorFilter>>,
    pub image_filter: Option<Arc<ImageFilter>>,
    pub mask_filter: Option<Arc<MaskFilter>>,
    pub path_effect: Option<Arc<PathEffect>>,
}

impl Paint {
    pub const DEFAULT_MITER_LIMIT: f32 = 4.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// True when a layer composited with this paint cannot change pixels
    /// outside the content drawn into it.
    pub fn nops_on_transparent_black(&self) -> bool {
        let image_filter_nops = self
            .image_filter
            .as_ref()
            .is_none_or(|filter| !filter.modifies_transparent_black());
        let color_filter_nops = self
            .color_filter
            .as_ref()
            .is_none_or(|filter| !filter.modifies_transparent_black());
        image_filter_nops && color_filter_nops && self.blend_mode.nops_on_transparent_source()
    }
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            anti_alias: false,
            dither: false,
            invert_colors: false,
            color: Color::BLACK,
            blend_mode: BlendMode::SrcOver,
            draw_style: DrawStyle::Fill,
            stroke_cap: StrokeCap::Butt,
            stroke_join: StrokeJoin::Miter,
            stroke_width: 0.0,
            stroke_miter: Self::DEFAULT_MITER_LIMIT,
            color_source: None,
            color_filter: None,
            image_filter: None,
            mask_filter: None,
            path_effect: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_channels_unpack_argb() {
        let color = Color::from_argb(0x80, 0x10, 0x20, 0x30);
        assert_eq!(color, Color(0x8010_2030));
        assert_eq!(color.alpha(), 0x80);
        assert_eq!(color.red(), 0x10);
        assert_eq!(color.green(), 0x20);
        assert_eq!(color.blue(), 0x30);
        assert!(color.with_alpha(0).is_transparent());
        assert!(Color::RED.is_opaque());
    }

    #[test]
    fn indexed_enums_reject_out_of_range_values() {
        assert_eq!(StrokeCap::from_index(2), Some(StrokeCap::Square));
        assert_eq!(StrokeCap::from_index(3), None);
        assert_eq!(PointMode::from_index(1), Some(PointMode::Lines));
        assert_eq!(ImageSampling::from_index(u32::MAX), None);
    }

    #[test]
    fn default_paint_nops_on_transparent_black() {
        let mut paint = Paint::default();
        assert!(paint.nops_on_transparent_black());
        paint.blend_mode = BlendMode::Src;
        assert!(!paint.nops_on_transparent_black());
        paint.blend_mode = BlendMode::SrcOver;
        paint.color_filter = Some(Arc::new(ColorFilter::Blend {
            color: Color::RED,
            mode: BlendMode::SrcOver,
        }));
        assert!(!paint.nops_on_transparent_black());
    }

    #[test]
    fn rs_transform_places_sprite_quad() {
        let transform = RsTransform::new(2.0, 0.0, 10.0, 20.0);
        assert_eq!(
            transform.quad(3.0, 4.0),
            [
                geometry::Point::new(10.0, 20.0),
                geometry::Point::new(16.0, 20.0),
                geometry::Point::new(16.0, 28.0),
                geometry::Point::new(10.0, 28.0),
            ]
        );
    }
}
