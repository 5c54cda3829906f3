use crate::{Point, Rect, bounds_of_points, rect_ltrb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillType {
    #[default]
    Winding,
    EvenOdd,
    InverseWinding,
    InverseEvenOdd,
}

impl FillType {
    pub const fn is_inverse(self) -> bool {
        matches!(self, FillType::InverseWinding | FillType::InverseEvenOdd)
    }

    pub const fn inverted(self) -> Self {
        match self {
            FillType::Winding => FillType::InverseWinding,
            FillType::EvenOdd => FillType::InverseEvenOdd,
            FillType::InverseWinding => FillType::Winding,
            FillType::InverseEvenOdd => FillType::EvenOdd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathVerb {
    Move,
    Line,
    Quad,
    Cubic,
    Close,
}

impl PathVerb {
    const fn point_count(self) -> usize {
        match self {
            PathVerb::Move | PathVerb::Line => 1,
            PathVerb::Quad => 2,
            PathVerb::Cubic => 3,
            PathVerb::Close => 0,
        }
    }
}

/// Cubic control distance that approximates a quarter circle.
const CUBIC_ARC_FACTOR: f32 = 0.552_284_8;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    verbs: Vec<PathVerb>,
    points: Vec<Point>,
    fill_type: FillType,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: &Rect) -> Self {
        let mut path = Self::new();
        path.move_to(rect.min.x, rect.min.y);
        path.line_to(rect.max.x, rect.min.y);
        path.line_to(rect.max.x, rect.max.y);
        path.line_to(rect.min.x, rect.max.y);
        path.close();
        path
    }

    pub fn from_oval(oval: &Rect) -> Self {
        let center_x = (oval.min.x + oval.max.x) * 0.5;
        let center_y = (oval.min.y + oval.max.y) * 0.5;
        let control_x = (oval.max.x - oval.min.x) * 0.5 * CUBIC_ARC_FACTOR;
        let control_y = (oval.max.y - oval.min.y) * 0.5 * CUBIC_ARC_FACTOR;

        let mut path = Self::new();
        path.move_to(oval.max.x, center_y);
        path.cubic_to(
            oval.max.x,
            center_y + control_y,
            center_x + control_x,
            oval.max.y,
            center_x,
            oval.max.y,
        );
        path.cubic_to(
            center_x - control_x,
            oval.max.y,
            oval.min.x,
            center_y + control_y,
            oval.min.x,
            center_y,
        );
        path.cubic_to(
            oval.min.x,
            center_y - control_y,
            center_x - control_x,
            oval.min.y,
            center_x,
            oval.min.y,
        );
        path.cubic_to(
            center_x + control_x,
            oval.min.y,
            oval.max.x,
            center_y - control_y,
            oval.max.x,
            center_y,
        );
        path.close();
        path
    }

    pub fn move_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.verbs.push(PathVerb::Move);
        self.points.push(Point::new(x, y));
        self
    }

    pub fn line_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.ensure_contour_started();
        self.verbs.push(PathVerb::Line);
        self.points.push(Point::new(x, y));
        self
    }

    pub fn quad_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> &mut Self {
        self.ensure_contour_started();
        self.verbs.push(PathVerb::Quad);
        self.points.extend([Point::new(x1, y1), Point::new(x2, y2)]);
        self
    }

    pub fn cubic_to(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
    ) -> &mut Self {
        self.ensure_contour_started();
        self.verbs.push(PathVerb::Cubic);
        self.points
            .extend([Point::new(x1, y1), Point::new(x2, y2), Point::new(x3, y3)]);
        self
    }

    pub fn close(&mut self) -> &mut Self {
        if matches!(self.verbs.last(), Some(verb) if *verb != PathVerb::Close) {
            self.verbs.push(PathVerb::Close);
        }
        self
    }

    fn ensure_contour_started(&mut self) {
        if matches!(self.verbs.last(), None | Some(PathVerb::Close)) {
            let start = self.points.last().copied().unwrap_or_default();
            self.verbs.push(PathVerb::Move);
            self.points.push(start);
        }
    }

    pub fn set_fill_type(&mut self, fill_type: FillType) -> &mut Self {
        self.fill_type = fill_type;
        self
    }

    pub fn with_fill_type(mut self, fill_type: FillType) -> Self {
        self.fill_type = fill_type;
        self
    }

    pub fn fill_type(&self) -> FillType {
        self.fill_type
    }

    pub fn is_inverse_fill_type(&self) -> bool {
        self.fill_type.is_inverse()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    pub fn verbs(&self) -> &[PathVerb] {
        &self.verbs
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Control-point bounds, ignoring the fill type.
    pub fn bounds(&self) -> Rect {
        bounds_of_points(&self.points)
    }

    /// Returns the rectangle when the path is a single closed axis-aligned
    /// four-sided contour.
    pub fn as_rect(&self) -> Option<Rect> {
        let mut corners: Vec<Point> = Vec::with_capacity(5);
        let mut point_index = 0;
        for (verb_index, verb) in self.verbs.iter().enumerate() {
            match verb {
                PathVerb::Move if verb_index == 0 => {}
                PathVerb::Line => {}
                PathVerb::Close if verb_index + 1 == self.verbs.len() => {}
                _ => return None,
            }
            let count = verb.point_count();
            corners.extend_from_slice(&self.points[point_index..point_index + count]);
            point_index += count;
        }
        if corners.len() == 5 && corners[4] == corners[0] {
            corners.pop();
        }
        if corners.len() != 4 {
            return None;
        }

        let mut horizontal_edges = 0;
        let mut vertical_edges = 0;
        for index in 0..4 {
            let from = corners[index];
            let to = corners[(index + 1) % 4];
            let horizontal = from.y == to.y && from.x != to.x;
            let vertical = from.x == to.x && from.y != to.y;
            match (horizontal, vertical) {
                (true, false) => horizontal_edges += 1,
                (false, true) => vertical_edges += 1,
                _ => return None,
            }
            let next = corners[(index + 2) % 4];
            let next_horizontal = to.y == next.y;
            if horizontal == next_horizontal {
                return None;
            }
        }
        if horizontal_edges != 2 || vertical_edges != 2 {
            return None;
        }
        let bounds = bounds_of_points(&corners);
        Some(rect_ltrb(
            bounds.min.x,
            bounds.min.y,
            bounds.max.x,
            bounds.max.y,
        ))
    }
}
