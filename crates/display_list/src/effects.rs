//! Shared effect and content objects referenced from the tape.
//!
//! These are immutable once created and are held behind `Arc` both by the
//! builder's current paint and by the object table of a built list.

use std::sync::Arc;

use geometry::{Matrix, MatrixExt, Point, Rect, RectExt, bounds_of_points, empty_rect};

use crate::attributes::{BlurStyle, Color, ImageSampling, TileMode, VertexMode};
use crate::BlendMode;

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSource {
    Color(Color),
    LinearGradient {
        start: Point,
        end: Point,
        colors: Vec<Color>,
        stops: Vec<f32>,
        tile_mode: TileMode,
    },
    RadialGradient {
        center: Point,
        radius: f32,
        colors: Vec<Color>,
        stops: Vec<f32>,
        tile_mode: TileMode,
    },
    Image {
        image: Arc<Image>,
        horizontal_tile_mode: TileMode,
        vertical_tile_mode: TileMode,
        sampling: ImageSampling,
        matrix: Option<Matrix>,
    },
}

impl ColorSource {
    pub fn is_opaque(&self) -> bool {
        match self {
            ColorSource::Color(color) => color.is_opaque(),
            ColorSource::LinearGradient {
                colors, tile_mode, ..
            }
            | ColorSource::RadialGradient {
                colors, tile_mode, ..
            } => *tile_mode != TileMode::Decal && colors.iter().all(|color| color.is_opaque()),
            ColorSource::Image { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorFilter {
    Blend { color: Color, mode: BlendMode },
    /// Row-major 4x5 color matrix; the fifth column is an additive offset.
    Matrix([f32; 20]),
    SrgbToLinearGamma,
    LinearToSrgbGamma,
}

impl ColorFilter {
    /// True when a transparent-black input pixel produces a visible output.
    pub fn modifies_transparent_black(&self) -> bool {
        match self {
            ColorFilter::Blend { color, mode } => {
                mode.writes_source_over_transparent_destination() && !color.is_transparent()
            }
            ColorFilter::Matrix(values) => {
                values[4] != 0.0 || values[9] != 0.0 || values[14] != 0.0 || values[19] != 0.0
            }
            ColorFilter::SrgbToLinearGamma | ColorFilter::LinearToSrgbGamma => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageFilter {
    Blur {
        sigma_x: f32,
        sigma_y: f32,
        tile_mode: TileMode,
    },
    Dilate {
        radius_x: f32,
        radius_y: f32,
    },
    Erode {
        radius_x: f32,
        radius_y: f32,
    },
    Offset {
        dx: f32,
        dy: f32,
    },
    Matrix {
        matrix: Matrix,
        sampling: ImageSampling,
    },
    ColorFilter(Arc<ColorFilter>),
    Compose {
        outer: Arc<ImageFilter>,
        inner: Arc<ImageFilter>,
    },
}

impl ImageFilter {
    pub fn modifies_transparent_black(&self) -> bool {
        match self {
            ImageFilter::ColorFilter(filter) => filter.modifies_transparent_black(),
            ImageFilter::Compose { outer, inner } => {
                outer.modifies_transparent_black() || inner.modifies_transparent_black()
            }
            _ => false,
        }
    }

    /// Bounds of the filter output for input content covering `input`, in
    /// the same local space. `None` means the output is unbounded.
    pub fn map_local_bounds(&self, input: &Rect) -> Option<Rect> {
        match self {
            ImageFilter::Blur {
                sigma_x, sigma_y, ..
            } => Some(input.outset_by(sigma_x * 3.0, sigma_y * 3.0)),
            ImageFilter::Dilate { radius_x, radius_y } => {
                Some(input.outset_by(*radius_x, *radius_y))
            }
            ImageFilter::Erode { radius_x, radius_y } => {
                let eroded = input.outset_by(-radius_x, -radius_y);
                Some(if eroded.is_empty() {
                    empty_rect()
                } else {
                    eroded
                })
            }
            ImageFilter::Offset { dx, dy } => Some(input.offset_by(*dx, *dy)),
            ImageFilter::Matrix { matrix, .. } => Some(matrix.map_rect(input)),
            ImageFilter::ColorFilter(filter) => {
                if filter.modifies_transparent_black() {
                    None
                } else {
                    Some(*input)
                }
            }
            ImageFilter::Compose { outer, inner } => {
                let inner_bounds = inner.map_local_bounds(input)?;
                outer.map_local_bounds(&inner_bounds)
            }
        }
    }

    /// Device-space variant of [`Self::map_local_bounds`] for content drawn
    /// under `ctm`. A singular `ctm` is reported as unbounded.
    pub fn map_device_bounds(&self, input: &Rect, ctm: &Matrix) -> Option<Rect> {
        let inverse = ctm.inverse()?;
        let local_input = inverse.map_rect(input);
        let local_output = self.map_local_bounds(&local_input)?;
        Some(ctm.map_rect(&local_output))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskFilter {
    Blur { style: BlurStyle, sigma: f32 },
}

impl MaskFilter {
    pub fn outset(&self) -> f32 {
        match self {
            MaskFilter::Blur { sigma, .. } => sigma * 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathEffect {
    Dash { intervals: Vec<f32>, phase: f32 },
}

impl PathEffect {
    /// Bounds of the geometry after the effect; `None` when it cannot be
    /// bounded from the input.
    pub fn effect_bounds(&self, input: &Rect) -> Option<Rect> {
        match self {
            PathEffect::Dash { .. } => Some(*input),
        }
    }
}

/// A decoded image referenced by draw records. Pixels are owned elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Image {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn bounds(&self) -> Rect {
        geometry::rect_ltrb(0.0, 0.0, self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertices {
    mode: VertexMode,
    positions: Vec<Point>,
    texture_coordinates: Option<Vec<Point>>,
    colors: Option<Vec<Color>>,
    indices: Option<Vec<u16>>,
    bounds: Rect,
}

impl Vertices {
    pub fn new(
        mode: VertexMode,
        positions: Vec<Point>,
        texture_coordinates: Option<Vec<Point>>,
        colors: Option<Vec<Color>>,
        indices: Option<Vec<u16>>,
    ) -> Self {
        let bounds = bounds_of_points(&positions);
        Self {
            mode,
            positions,
            texture_coordinates,
            colors,
            indices,
            bounds,
        }
    }

    pub fn mode(&self) -> VertexMode {
        self.mode
    }

    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    pub fn texture_coordinates(&self) -> Option<&[Point]> {
        self.texture_coordinates.as_deref()
    }

    pub fn colors(&self) -> Option<&[Color]> {
        self.colors.as_deref()
    }

    pub fn indices(&self) -> Option<&[u16]> {
        self.indices.as_deref()
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }
}

/// Shaped text. Glyph outlines are resolved by the renderer; the bounds
/// are computed at shaping time, relative to the blob origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlob {
    glyphs: Vec<u16>,
    bounds: Rect,
}

impl TextBlob {
    pub fn new(glyphs: Vec<u16>, bounds: Rect) -> Self {
        Self { glyphs, bounds }
    }

    pub fn glyphs(&self) -> &[u16] {
        &self.glyphs
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::rect_ltrb;

    #[test]
    fn blend_color_filter_over_transparent_black() {
        let visible = ColorFilter::Blend {
            color: Color::RED,
            mode: BlendMode::SrcOver,
        };
        assert!(visible.modifies_transparent_black());

        let transparent = ColorFilter::Blend {
            color: Color::TRANSPARENT,
            mode: BlendMode::SrcOver,
        };
        assert!(!transparent.modifies_transparent_black());

        let masked = ColorFilter::Blend {
            color: Color::RED,
            mode: BlendMode::SrcIn,
        };
        assert!(!masked.modifies_transparent_black());
    }

    #[test]
    fn matrix_color_filter_with_offset_modifies_transparent_black() {
        let mut values = [0.0; 20];
        values[0] = 1.0;
        values[6] = 1.0;
        values[12] = 1.0;
        values[18] = 1.0;
        assert!(!ColorFilter::Matrix(values).modifies_transparent_black());
        values[19] = 0.5;
        assert!(ColorFilter::Matrix(values).modifies_transparent_black());
    }

    #[test]
    fn image_filters_map_local_bounds() {
        let input = rect_ltrb(10.0, 10.0, 20.0, 20.0);
        let blur = ImageFilter::Blur {
            sigma_x: 1.0,
            sigma_y: 2.0,
            tile_mode: TileMode::Decal,
        };
        assert_eq!(
            blur.map_local_bounds(&input),
            Some(rect_ltrb(7.0, 4.0, 23.0, 26.0))
        );

        let erode = ImageFilter::Erode {
            radius_x: 6.0,
            radius_y: 1.0,
        };
        assert_eq!(erode.map_local_bounds(&input), Some(empty_rect()));

        let compose = ImageFilter::Compose {
            outer: Arc::new(ImageFilter::Offset { dx: 5.0, dy: 0.0 }),
            inner: Arc::new(ImageFilter::Dilate {
                radius_x: 1.0,
                radius_y: 1.0,
            }),
        };
        assert_eq!(
            compose.map_local_bounds(&input),
            Some(rect_ltrb(14.0, 9.0, 26.0, 21.0))
        );
    }

    #[test]
    fn color_filter_that_floods_transparent_pixels_is_unbounded() {
        let flood = ImageFilter::ColorFilter(Arc::new(ColorFilter::Blend {
            color: Color::BLUE,
            mode: BlendMode::Src,
        }));
        assert!(flood.modifies_transparent_black());
        assert_eq!(flood.map_local_bounds(&rect_ltrb(0.0, 0.0, 1.0, 1.0)), None);

        let compose = ImageFilter::Compose {
            outer: Arc::new(flood),
            inner: Arc::new(ImageFilter::Offset { dx: 1.0, dy: 1.0 }),
        };
        assert_eq!(compose.map_local_bounds(&rect_ltrb(0.0, 0.0, 1.0, 1.0)), None);
    }

    #[test]
    fn device_bounds_scale_filter_radius_with_ctm() {
        let blur = ImageFilter::Blur {
            sigma_x: 1.0,
            sigma_y: 1.0,
            tile_mode: TileMode::Clamp,
        };
        let ctm = Matrix::scale_matrix(2.0, 2.0);
        assert_eq!(
            blur.map_device_bounds(&rect_ltrb(20.0, 20.0, 40.0, 40.0), &ctm),
            Some(rect_ltrb(14.0, 14.0, 46.0, 46.0))
        );
        assert_eq!(
            blur.map_device_bounds(
                &rect_ltrb(20.0, 20.0, 40.0, 40.0),
                &Matrix::scale_matrix(0.0, 1.0)
            ),
            None
        );
    }

    #[test]
    fn vertices_bounds_cover_positions() {
        let vertices = Vertices::new(
            VertexMode::Triangles,
            vec![
                Point::new(1.0, 5.0),
                Point::new(-3.0, 2.0),
                Point::new(4.0, 9.0),
            ],
            None,
            None,
            None,
        );
        assert_eq!(vertices.bounds(), rect_ltrb(-3.0, 2.0, 4.0, 9.0));
    }
}
