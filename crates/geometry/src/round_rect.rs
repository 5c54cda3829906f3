use crate::{Rect, RectExt, Size};

/// A rectangle with independent elliptical corners, ordered upper-left,
/// upper-right, lower-right, lower-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundRect {
    rect: Rect,
    radii: [Size; 4],
}

impl RoundRect {
    pub const UPPER_LEFT: usize = 0;
    pub const UPPER_RIGHT: usize = 1;
    pub const LOWER_RIGHT: usize = 2;
    pub const LOWER_LEFT: usize = 3;

    pub fn from_rect(rect: Rect) -> Self {
        Self {
            rect: rect.sorted(),
            radii: [Size::zero(); 4],
        }
    }

    pub fn from_rect_xy(rect: Rect, radius_x: f32, radius_y: f32) -> Self {
        Self::new(rect, [Size::new(radius_x, radius_y); 4])
    }

    /// Radii are clamped to be non-negative and scaled down uniformly when
    /// adjacent corners would overlap along an edge.
    pub fn new(rect: Rect, radii: [Size; 4]) -> Self {
        let rect = rect.sorted();
        let mut radii = radii.map(|radius| {
            if radius.width <= 0.0 || radius.height <= 0.0 {
                Size::zero()
            } else {
                radius
            }
        });

        let width = rect.width_f();
        let height = rect.height_f();
        let mut scale: f32 = 1.0;
        let mut fit = |limit: f32, first: f32, second: f32| {
            let sum = first + second;
            if sum > limit && sum > 0.0 {
                scale = scale.min(limit / sum);
            }
        };
        fit(
            width,
            radii[Self::UPPER_LEFT].width,
            radii[Self::UPPER_RIGHT].width,
        );
        fit(
            width,
            radii[Self::LOWER_LEFT].width,
            radii[Self::LOWER_RIGHT].width,
        );
        fit(
            height,
            radii[Self::UPPER_LEFT].height,
            radii[Self::LOWER_LEFT].height,
        );
        fit(
            height,
            radii[Self::UPPER_RIGHT].height,
            radii[Self::LOWER_RIGHT].height,
        );
        if scale < 1.0 {
            for radius in &mut radii {
                *radius = Size::new(radius.width * scale, radius.height * scale);
            }
        }
        Self { rect, radii }
    }

    /// Reassembles a round rect from values previously read out of
    /// `rect()` and `radii()`, without re-normalizing the radii.
    pub fn from_parts_unchecked(rect: Rect, radii: [Size; 4]) -> Self {
        Self { rect, radii }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn bounds(&self) -> Rect {
        self.rect
    }

    pub fn radii(&self) -> [Size; 4] {
        self.radii
    }

    pub fn radius(&self, corner: usize) -> Size {
        self.radii[corner]
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    pub fn is_rect(&self) -> bool {
        self.radii
            .iter()
            .all(|radius| radius.width == 0.0 || radius.height == 0.0)
    }

    /// The widest full-height band that lies entirely inside the rounded
    /// shape, followed by the tallest full-width band.
    pub fn inscribed_bands(&self) -> (Rect, Rect) {
        let left_inset = self.radii[Self::UPPER_LEFT]
            .width
            .max(self.radii[Self::LOWER_LEFT].width);
        let right_inset = self.radii[Self::UPPER_RIGHT]
            .width
            .max(self.radii[Self::LOWER_RIGHT].width);
        let top_inset = self.radii[Self::UPPER_LEFT]
            .height
            .max(self.radii[Self::UPPER_RIGHT].height);
        let bottom_inset = self.radii[Self::LOWER_LEFT]
            .height
            .max(self.radii[Self::LOWER_RIGHT].height);

        let vertical_band = crate::rect_ltrb(
            self.rect.min.x + left_inset,
            self.rect.min.y,
            self.rect.max.x - right_inset,
            self.rect.max.y,
        );
        let horizontal_band = crate::rect_ltrb(
            self.rect.min.x,
            self.rect.min.y + top_inset,
            self.rect.max.x,
            self.rect.max.y - bottom_inset,
        );
        (vertical_band, horizontal_band)
    }
}
