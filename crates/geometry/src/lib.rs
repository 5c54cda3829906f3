//! Geometry vocabulary shared by the display list, the matrix/clip tracker
//! and the diff context.
//!
//! Rectangles are euclid `Box2D` values in left/top/right/bottom form. Affine
//! transforms are `Transform2D` and full transforms are `Transform3D`, both in
//! euclid's row-vector layout. The extension traits below add the operations
//! euclid does not provide directly (Skia-order constructors, corner mapping
//! with perspective clipping, round-out to integer pixels).

mod path;
mod round_rect;

use smallvec::SmallVec;

pub use euclid;
pub use path::{FillType, Path, PathVerb};
pub use round_rect::RoundRect;

pub type Point = euclid::default::Point2D<f32>;
pub type Vector = euclid::default::Vector2D<f32>;
pub type Size = euclid::default::Size2D<f32>;
pub type Rect = euclid::default::Box2D<f32>;
pub type IntRect = euclid::default::Box2D<i32>;
pub type Matrix = euclid::default::Transform2D<f32>;
pub type M44 = euclid::default::Transform3D<f32>;

/// Values below this magnitude are treated as zero when building rotations.
pub const SCALAR_NEARLY_ZERO: f32 = 1.0 / 4096.0;

/// Homogeneous coordinates closer to the camera plane than this are clipped.
const W_CLIP_EPSILON: f32 = 1.0 / 16384.0;

/// The largest cull rect a recording or a diff pass starts from.
pub const MAX_CULL_EXTENT: f32 = 1.0e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipOp {
    Intersect,
    Difference,
}

pub fn rect_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Rect {
    Rect::new(Point::new(left, top), Point::new(right, bottom))
}

pub fn rect_xywh(x: f32, y: f32, width: f32, height: f32) -> Rect {
    rect_ltrb(x, y, x + width, y + height)
}

pub fn int_rect_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> IntRect {
    IntRect::new(
        euclid::default::Point2D::new(left, top),
        euclid::default::Point2D::new(right, bottom),
    )
}

pub fn empty_rect() -> Rect {
    rect_ltrb(0.0, 0.0, 0.0, 0.0)
}

pub fn empty_int_rect() -> IntRect {
    int_rect_ltrb(0, 0, 0, 0)
}

pub fn max_cull_rect() -> Rect {
    rect_ltrb(
        -MAX_CULL_EXTENT,
        -MAX_CULL_EXTENT,
        MAX_CULL_EXTENT,
        MAX_CULL_EXTENT,
    )
}

pub trait RectExt: Sized {
    fn width_f(&self) -> f32;
    fn height_f(&self) -> f32;
    /// Intersection that collapses to the canonical empty rect when disjoint.
    fn intersect_rect(&self, other: &Self) -> Self;
    /// Union that ignores empty operands, matching `SkRect::join`.
    fn join_rect(&self, other: &Self) -> Self;
    /// True only when both rects are non-empty and share interior area.
    fn overlaps(&self, other: &Self) -> bool;
    fn contains_rect(&self, other: &Self) -> bool;
    fn outset_by(&self, dx: f32, dy: f32) -> Self;
    fn offset_by(&self, dx: f32, dy: f32) -> Self;
    fn sorted(&self) -> Self;
    fn is_finite_rect(&self) -> bool;
    /// Smallest integer rect that contains this rect.
    fn round_out_int(&self) -> IntRect;
    /// Nearest integer rect, rounding each edge independently.
    fn round_int(&self) -> IntRect;
    fn corners(&self) -> [Point; 4];
}

impl RectExt for Rect {
    fn width_f(&self) -> f32 {
        self.max.x - self.min.x
    }

    fn height_f(&self) -> f32 {
        self.max.y - self.min.y
    }

    fn intersect_rect(&self, other: &Self) -> Self {
        let intersection = rect_ltrb(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if intersection.is_empty() {
            empty_rect()
        } else {
            intersection
        }
    }

    fn join_rect(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        rect_ltrb(
            self.min.x.min(other.min.x),
            self.min.y.min(other.min.y),
            self.max.x.max(other.max.x),
            self.max.y.max(other.max.y),
        )
    }

    fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    fn contains_rect(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    fn outset_by(&self, dx: f32, dy: f32) -> Self {
        rect_ltrb(
            self.min.x - dx,
            self.min.y - dy,
            self.max.x + dx,
            self.max.y + dy,
        )
    }

    fn offset_by(&self, dx: f32, dy: f32) -> Self {
        rect_ltrb(
            self.min.x + dx,
            self.min.y + dy,
            self.max.x + dx,
            self.max.y + dy,
        )
    }

    fn sorted(&self) -> Self {
        rect_ltrb(
            self.min.x.min(self.max.x),
            self.min.y.min(self.max.y),
            self.min.x.max(self.max.x),
            self.min.y.max(self.max.y),
        )
    }

    fn is_finite_rect(&self) -> bool {
        self.min.x.is_finite()
            && self.min.y.is_finite()
            && self.max.x.is_finite()
            && self.max.y.is_finite()
    }

    fn round_out_int(&self) -> IntRect {
        int_rect_ltrb(
            self.min.x.floor() as i32,
            self.min.y.floor() as i32,
            self.max.x.ceil() as i32,
            self.max.y.ceil() as i32,
        )
    }

    fn round_int(&self) -> IntRect {
        int_rect_ltrb(
            self.min.x.round() as i32,
            self.min.y.round() as i32,
            self.max.x.round() as i32,
            self.max.y.round() as i32,
        )
    }

    fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min.x, self.min.y),
            Point::new(self.max.x, self.min.y),
            Point::new(self.max.x, self.max.y),
            Point::new(self.min.x, self.max.y),
        ]
    }
}

pub trait IntRectExt {
    fn to_f32_rect(&self) -> Rect;
    fn intersect_int_rect(&self, other: &Self) -> Self;
    fn join_int_rect(&self, other: &Self) -> Self;
}

impl IntRectExt for IntRect {
    fn to_f32_rect(&self) -> Rect {
        rect_ltrb(
            self.min.x as f32,
            self.min.y as f32,
            self.max.x as f32,
            self.max.y as f32,
        )
    }

    fn intersect_int_rect(&self, other: &Self) -> Self {
        let intersection = int_rect_ltrb(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if intersection.is_empty() {
            empty_int_rect()
        } else {
            intersection
        }
    }

    fn join_int_rect(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        int_rect_ltrb(
            self.min.x.min(other.min.x),
            self.min.y.min(other.min.y),
            self.max.x.max(other.max.x),
            self.max.y.max(other.max.y),
        )
    }
}

/// Bounds of a set of points; empty input yields the empty rect.
pub fn bounds_of_points(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return empty_rect();
    };
    let mut bounds = Rect::new(*first, *first);
    for point in &points[1..] {
        bounds.min.x = bounds.min.x.min(point.x);
        bounds.min.y = bounds.min.y.min(point.y);
        bounds.max.x = bounds.max.x.max(point.x);
        bounds.max.y = bounds.max.y.max(point.y);
    }
    bounds
}

pub trait MatrixExt: Sized {
    /// Builds an affine matrix from Skia's row-major, column-vector order:
    /// `x' = mxx * x + mxy * y + mxt`, `y' = myx * x + myy * y + myt`.
    fn affine(mxx: f32, mxy: f32, mxt: f32, myx: f32, myy: f32, myt: f32) -> Self;
    fn translate_matrix(tx: f32, ty: f32) -> Self;
    fn scale_matrix(sx: f32, sy: f32) -> Self;
    fn rotate_matrix(degrees: f32) -> Self;
    fn skew_matrix(sx: f32, sy: f32) -> Self;
    /// `self * other`: `other` is applied to points first.
    fn pre_concat(&self, other: &Self) -> Self;
    fn map_point(&self, point: Point) -> Point;
    fn map_rect(&self, rect: &Rect) -> Rect;
    fn is_scale_translate(&self) -> bool;
    fn rect_stays_rect(&self) -> bool;
    fn is_finite_matrix(&self) -> bool;
    fn to_m44(&self) -> M44;
}

impl MatrixExt for Matrix {
    fn affine(mxx: f32, mxy: f32, mxt: f32, myx: f32, myy: f32, myt: f32) -> Self {
        Matrix::new(mxx, myx, mxy, myy, mxt, myt)
    }

    fn translate_matrix(tx: f32, ty: f32) -> Self {
        Matrix::affine(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    fn scale_matrix(sx: f32, sy: f32) -> Self {
        Matrix::affine(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    fn rotate_matrix(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        let mut sine = radians.sin();
        let mut cosine = radians.cos();
        if sine.abs() <= SCALAR_NEARLY_ZERO {
            sine = 0.0;
        }
        if cosine.abs() <= SCALAR_NEARLY_ZERO {
            cosine = 0.0;
        }
        Matrix::affine(cosine, -sine, 0.0, sine, cosine, 0.0)
    }

    fn skew_matrix(sx: f32, sy: f32) -> Self {
        Matrix::affine(1.0, sx, 0.0, sy, 1.0, 0.0)
    }

    fn pre_concat(&self, other: &Self) -> Self {
        other.then(self)
    }

    fn map_point(&self, point: Point) -> Point {
        Point::new(
            point.x * self.m11 + point.y * self.m21 + self.m31,
            point.x * self.m12 + point.y * self.m22 + self.m32,
        )
    }

    fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|corner| self.map_point(corner));
        bounds_of_points(&corners)
    }

    fn is_scale_translate(&self) -> bool {
        self.m12 == 0.0 && self.m21 == 0.0
    }

    fn rect_stays_rect(&self) -> bool {
        if self.m12 == 0.0 && self.m21 == 0.0 {
            self.m11 != 0.0 && self.m22 != 0.0
        } else if self.m11 == 0.0 && self.m22 == 0.0 {
            self.m12 != 0.0 && self.m21 != 0.0
        } else {
            false
        }
    }

    fn is_finite_matrix(&self) -> bool {
        [self.m11, self.m12, self.m21, self.m22, self.m31, self.m32]
            .iter()
            .all(|value| value.is_finite())
    }

    fn to_m44(&self) -> M44 {
        M44::new(
            self.m11, self.m12, 0.0, 0.0, //
            self.m21, self.m22, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            self.m31, self.m32, 0.0, 1.0,
        )
    }
}

pub trait M44Ext: Sized {
    /// Builds a 4x4 matrix from row-major, column-vector parameters.
    #[allow(clippy::too_many_arguments)]
    fn full_perspective(
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
    ) -> Self;
    /// Embeds a 3x3 matrix (with an optional perspective row) into 4x4.
    #[allow(clippy::too_many_arguments)]
    fn from_3x3(
        mxx: f32,
        mxy: f32,
        mxt: f32,
        myx: f32,
        myy: f32,
        myt: f32,
        px: f32,
        py: f32,
        pw: f32,
    ) -> Self;
    fn pre_concat(&self, other: &Self) -> Self;
    /// True when the matrix is exactly a 2D affine transform embedded in 4x4.
    fn is_2d_affine(&self) -> bool;
    fn has_perspective(&self) -> bool;
    /// The affine part that acts on the z=0 plane.
    fn to_affine(&self) -> Matrix;
    fn map_point_homogeneous(&self, point: Point) -> (f32, f32, f32);
    /// Bounds of the projected rect, clipped against the camera plane.
    fn map_rect(&self, rect: &Rect) -> Rect;
    fn is_finite_matrix(&self) -> bool;
}

impl M44Ext for M44 {
    fn full_perspective(
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
    ) -> Self {
        M44::new(
            mxx, myx, mzx, mwx, //
            mxy, myy, mzy, mwy, //
            mxz, myz, mzz, mwz, //
            mxt, myt, mzt, mwt,
        )
    }

    fn from_3x3(
        mxx: f32,
        mxy: f32,
        mxt: f32,
        myx: f32,
        myy: f32,
        myt: f32,
        px: f32,
        py: f32,
        pw: f32,
    ) -> Self {
        M44::full_perspective(
            mxx, mxy, 0.0, mxt, //
            myx, myy, 0.0, myt, //
            0.0, 0.0, 1.0, 0.0, //
            px, py, 0.0, pw,
        )
    }

    fn pre_concat(&self, other: &Self) -> Self {
        other.then(self)
    }

    fn is_2d_affine(&self) -> bool {
        self.m13 == 0.0
            && self.m14 == 0.0
            && self.m23 == 0.0
            && self.m24 == 0.0
            && self.m31 == 0.0
            && self.m32 == 0.0
            && self.m33 == 1.0
            && self.m34 == 0.0
            && self.m43 == 0.0
            && self.m44 == 1.0
    }

    fn has_perspective(&self) -> bool {
        self.m14 != 0.0 || self.m24 != 0.0 || self.m34 != 0.0 || self.m44 != 1.0
    }

    fn to_affine(&self) -> Matrix {
        Matrix::new(self.m11, self.m12, self.m21, self.m22, self.m41, self.m42)
    }

    fn map_point_homogeneous(&self, point: Point) -> (f32, f32, f32) {
        (
            point.x * self.m11 + point.y * self.m21 + self.m41,
            point.x * self.m12 + point.y * self.m22 + self.m42,
            point.x * self.m14 + point.y * self.m24 + self.m44,
        )
    }

    fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|corner| self.map_point_homogeneous(corner));
        if corners.iter().all(|&(_, _, w)| w == 1.0) {
            let points = corners.map(|(x, y, _)| Point::new(x, y));
            return bounds_of_points(&points);
        }

        let mut projected: SmallVec<[Point; 8]> = SmallVec::new();
        for index in 0..corners.len() {
            let current = corners[index];
            let next = corners[(index + 1) % corners.len()];
            if current.2 >= W_CLIP_EPSILON {
                projected.push(Point::new(current.0 / current.2, current.1 / current.2));
            }
            let crosses_plane = (current.2 >= W_CLIP_EPSILON) != (next.2 >= W_CLIP_EPSILON);
            if crosses_plane {
                let t = (W_CLIP_EPSILON - current.2) / (next.2 - current.2);
                let x = current.0 + (next.0 - current.0) * t;
                let y = current.1 + (next.1 - current.1) * t;
                projected.push(Point::new(x / W_CLIP_EPSILON, y / W_CLIP_EPSILON));
            }
        }
        bounds_of_points(&projected)
    }

    fn is_finite_matrix(&self) -> bool {
        self.to_array().iter().all(|value| value.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ignores_empty_operands() {
        let rect = rect_ltrb(10.0, 10.0, 20.0, 20.0);
        assert_eq!(rect.join_rect(&empty_rect()), rect);
        assert_eq!(empty_rect().join_rect(&rect), rect);
        assert_eq!(
            rect.join_rect(&rect_ltrb(0.0, 15.0, 12.0, 30.0)),
            rect_ltrb(0.0, 10.0, 20.0, 30.0)
        );
    }

    #[test]
    fn disjoint_intersection_is_canonical_empty() {
        let left = rect_ltrb(0.0, 0.0, 10.0, 10.0);
        let right = rect_ltrb(20.0, 0.0, 30.0, 10.0);
        assert_eq!(left.intersect_rect(&right), empty_rect());
        assert!(!left.overlaps(&right));
        assert!(!left.overlaps(&rect_ltrb(10.0, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn round_out_covers_fractional_edges() {
        let rect = rect_ltrb(-0.5, 1.25, 9.01, 10.0);
        assert_eq!(rect.round_out_int(), int_rect_ltrb(-1, 1, 10, 10));
    }

    #[test]
    fn skia_order_constructor_maps_points() {
        let matrix = Matrix::affine(2.0, 0.5, 10.0, 0.0, 3.0, 20.0);
        assert_eq!(
            matrix.map_point(Point::new(1.0, 2.0)),
            Point::new(13.0, 26.0)
        );
    }

    #[test]
    fn pre_concat_applies_argument_first() {
        let scale = Matrix::scale_matrix(4.0, 4.0);
        let concatenated = scale.pre_concat(&Matrix::translate_matrix(5.0, 1.0));
        assert_eq!(
            concatenated.map_point(Point::new(0.0, 0.0)),
            Point::new(20.0, 4.0)
        );
    }

    #[test]
    fn quarter_rotation_keeps_rects_axis_aligned() {
        let rotation = Matrix::rotate_matrix(90.0);
        assert!(rotation.rect_stays_rect());
        assert_eq!(
            rotation.map_rect(&rect_ltrb(0.0, 0.0, 10.0, 20.0)),
            rect_ltrb(-20.0, 0.0, 0.0, 10.0)
        );
        assert!(!Matrix::rotate_matrix(45.0).rect_stays_rect());
    }

    #[test]
    fn affine_embedding_round_trips_through_m44() {
        let matrix = Matrix::affine(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        let m44 = matrix.to_m44();
        assert!(m44.is_2d_affine());
        assert!(!m44.has_perspective());
        assert_eq!(m44.to_affine(), matrix);
    }

    #[test]
    fn full_perspective_uses_column_vector_order() {
        let m44 = M44::full_perspective(
            1.0, 0.0, 0.0, 7.0, //
            0.0, 1.0, 0.0, 9.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        assert!(m44.is_2d_affine());
        assert_eq!(
            m44.map_rect(&rect_ltrb(0.0, 0.0, 1.0, 1.0)),
            rect_ltrb(7.0, 9.0, 8.0, 10.0)
        );
    }

    #[test]
    fn perspective_rect_mapping_divides_by_w() {
        let m44 = M44::from_3x3(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0);
        assert!(m44.has_perspective());
        assert_eq!(
            m44.map_rect(&rect_ltrb(0.0, 0.0, 10.0, 10.0)),
            rect_ltrb(0.0, 0.0, 5.0, 5.0)
        );
    }

    #[test]
    fn perspective_behind_camera_is_clipped_not_wrapped() {
        let m44 = M44::from_3x3(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.01, 0.0, 1.0);
        let mapped = m44.map_rect(&rect_ltrb(-200.0, 0.0, 10.0, 10.0));
        assert!(mapped.is_finite_rect());
        assert!(mapped.min.x < -1000.0);
        assert!(mapped.max.x >= 10.0 / 1.1 - 0.001);
    }

    #[test]
    fn int_rect_widens_to_a_joinable_f32_rect() {
        let widened = int_rect_ltrb(-3, 4, 10, 20).to_f32_rect();
        assert_eq!(widened, rect_ltrb(-3.0, 4.0, 10.0, 20.0));
        assert_eq!(
            widened.join_rect(&rect_ltrb(0.0, 0.0, 30.5, 5.0)),
            rect_ltrb(-3.0, 0.0, 30.5, 20.0)
        );
    }
}
