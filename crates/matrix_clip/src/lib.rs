//! Incremental device-transform and cull-rect tracking.
//!
//! `MatrixClipTracker` follows the save/restore discipline of a recording
//! canvas. Each frame of its stack is either an affine 3x3 matrix or a full
//! 4x4 matrix together with a device-space cull rect. A frame is promoted to
//! 4x4 the first time it receives a transform that cannot be expressed as a
//! 2D affine matrix, and it stays 4x4 until a `restore()` pops back to an
//! earlier affine frame. `set_transform` with an affine matrix on a 4x4 frame
//! keeps the 4x4 representation.
//!
//! Clips only ever shrink the cull rect. Difference clips shrink it when the
//! removed shape provably slices off a whole band of the cull rect; any other
//! configuration leaves the cull rect as a conservative over-approximation.

use geometry::{
    ClipOp, M44, M44Ext, Matrix, MatrixExt, Path, Rect, RectExt, RoundRect, empty_rect,
    max_cull_rect, rect_ltrb,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackerFrame {
    Affine3x3 { matrix: Matrix, cull_rect: Rect },
    Perspective4x4 { matrix: M44, cull_rect: Rect },
}

impl TrackerFrame {
    fn cull_rect(&self) -> Rect {
        match self {
            TrackerFrame::Affine3x3 { cull_rect, .. }
            | TrackerFrame::Perspective4x4 { cull_rect, .. } => *cull_rect,
        }
    }

    fn cull_rect_mut(&mut self) -> &mut Rect {
        match self {
            TrackerFrame::Affine3x3 { cull_rect, .. }
            | TrackerFrame::Perspective4x4 { cull_rect, .. } => cull_rect,
        }
    }

    fn map_rect(&self, rect: &Rect) -> Rect {
        match self {
            TrackerFrame::Affine3x3 { matrix, .. } => matrix.map_rect(rect),
            TrackerFrame::Perspective4x4 { matrix, .. } => matrix.map_rect(rect),
        }
    }

    fn rect_stays_rect(&self) -> bool {
        match self {
            TrackerFrame::Affine3x3 { matrix, .. } => matrix.rect_stays_rect(),
            TrackerFrame::Perspective4x4 { matrix, .. } => {
                !matrix.has_perspective() && matrix.to_affine().rect_stays_rect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatrixClipTracker {
    original: TrackerFrame,
    current: TrackerFrame,
    saved: Vec<TrackerFrame>,
}

impl MatrixClipTracker {
    pub fn new(cull_rect: Rect, matrix: &Matrix) -> Self {
        let frame = TrackerFrame::Affine3x3 {
            matrix: *matrix,
            cull_rect,
        };
        Self {
            original: frame,
            current: frame,
            saved: Vec::new(),
        }
    }

    /// Starts in the affine representation unless `matrix` carries any
    /// out-of-plane or perspective component.
    pub fn new_m44(cull_rect: Rect, matrix: &M44) -> Self {
        let frame = if matrix.is_2d_affine() {
            TrackerFrame::Affine3x3 {
                matrix: matrix.to_affine(),
                cull_rect,
            }
        } else {
            TrackerFrame::Perspective4x4 {
                matrix: *matrix,
                cull_rect,
            }
        };
        Self {
            original: frame,
            current: frame,
            saved: Vec::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(max_cull_rect(), &Matrix::identity())
    }

    pub fn using_4x4_matrix(&self) -> bool {
        matches!(self.current, TrackerFrame::Perspective4x4 { .. })
    }

    /// The affine part of the current transform. For a 4x4 frame this drops
    /// every z and perspective component.
    pub fn matrix_3x3(&self) -> Matrix {
        match &self.current {
            TrackerFrame::Affine3x3 { matrix, .. } => *matrix,
            TrackerFrame::Perspective4x4 { matrix, .. } => matrix.to_affine(),
        }
    }

    pub fn matrix_4x4(&self) -> M44 {
        match &self.current {
            TrackerFrame::Affine3x3 { matrix, .. } => matrix.to_m44(),
            TrackerFrame::Perspective4x4 { matrix, .. } => *matrix,
        }
    }

    pub fn device_cull_rect(&self) -> Rect {
        self.current.cull_rect()
    }

    /// The device cull rect mapped back through the inverse transform.
    ///
    /// A perspective transform yields a non-constricting rect; a singular
    /// transform or an empty cull rect yields the empty rect.
    pub fn local_cull_rect(&self) -> Rect {
        let cull_rect = self.current.cull_rect();
        if cull_rect.is_empty() {
            return empty_rect();
        }
        let affine = match &self.current {
            TrackerFrame::Affine3x3 { matrix, .. } => *matrix,
            TrackerFrame::Perspective4x4 { matrix, .. } => {
                if matrix.has_perspective() {
                    return max_cull_rect();
                }
                matrix.to_affine()
            }
        };
        match affine.inverse() {
            Some(inverse) => inverse.map_rect(&cull_rect),
            None => empty_rect(),
        }
    }

    /// True when `content_bounds`, mapped to device space, cannot touch the
    /// device cull rect.
    pub fn content_culled(&self, content_bounds: &Rect) -> bool {
        let cull_rect = self.current.cull_rect();
        if cull_rect.is_empty() || content_bounds.is_empty() {
            return true;
        }
        let mapped = self.current.map_rect(content_bounds);
        !mapped.overlaps(&cull_rect)
    }

    pub fn map_rect(&self, rect: &Rect) -> Rect {
        self.current.map_rect(rect)
    }

    pub fn save(&mut self) {
        self.saved.push(self.current);
    }

    /// Pops the most recent `save()`. Restoring with nothing saved leaves the
    /// base frame untouched.
    pub fn restore(&mut self) {
        match self.saved.pop() {
            Some(frame) => self.current = frame,
            None => tracing::error!("matrix clip restore without a matching save"),
        }
    }

    /// Current stack depth; a fresh tracker reports 1.
    pub fn save_count(&self) -> usize {
        self.saved.len() + 1
    }

    pub fn restore_to_count(&mut self, count: usize) {
        let count = count.max(1);
        while self.save_count() > count {
            self.restore();
        }
    }

    /// Discards every saved frame and returns to the construction state.
    pub fn reset(&mut self) {
        self.saved.clear();
        self.current = self.original;
    }

    pub fn translate(&mut self, tx: f32, ty: f32) {
        self.pre_concat_affine(&Matrix::translate_matrix(tx, ty));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.pre_concat_affine(&Matrix::scale_matrix(sx, sy));
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.pre_concat_affine(&Matrix::skew_matrix(sx, sy));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.pre_concat_affine(&Matrix::rotate_matrix(degrees));
    }

    pub fn transform(&mut self, matrix: &Matrix) {
        self.pre_concat_affine(matrix);
    }

    pub fn transform_2d_affine(
        &mut self,
        mxx: f32,
        mxy: f32,
        mxt: f32,
        myx: f32,
        myy: f32,
        myt: f32,
    ) {
        self.pre_concat_affine(&Matrix::affine(mxx, mxy, mxt, myx, myy, myt));
    }

    /// Concatenates a 4x4 matrix; always leaves the frame in the 4x4
    /// representation.
    pub fn transform_m44(&mut self, matrix: &M44) {
        self.upgrade_to_4x4();
        if let TrackerFrame::Perspective4x4 { matrix: current, .. } = &mut self.current {
            *current = current.pre_concat(matrix);
        }
    }

    /// Concatenates a row-major 4x4 matrix. Parameters that describe a pure
    /// 2D affine transform keep the current representation.
    #[allow(clippy::too_many_arguments)]
    pub fn transform_full_perspective(
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
        let matrix = M44::full_perspective(
            mxx, mxy, mxz, mxt, myx, myy, myz, myt, mzx, mzy, mzz, mzt, mwx, mwy, mwz, mwt,
        );
        if matrix.is_2d_affine() {
            self.pre_concat_affine(&matrix.to_affine());
        } else {
            self.transform_m44(&matrix);
        }
    }

    /// Replaces the transform. A frame that already uses 4x4 stays 4x4.
    pub fn set_transform(&mut self, matrix: &Matrix) {
        match &mut self.current {
            TrackerFrame::Affine3x3 { matrix: current, .. } => *current = *matrix,
            TrackerFrame::Perspective4x4 { matrix: current, .. } => *current = matrix.to_m44(),
        }
    }

    pub fn set_transform_m44(&mut self, matrix: &M44) {
        self.upgrade_to_4x4();
        if let TrackerFrame::Perspective4x4 { matrix: current, .. } = &mut self.current {
            *current = *matrix;
        }
    }

    pub fn set_identity(&mut self) {
        match &mut self.current {
            TrackerFrame::Affine3x3 { matrix, .. } => *matrix = Matrix::identity(),
            TrackerFrame::Perspective4x4 { matrix, .. } => *matrix = M44::identity(),
        }
    }

    fn pre_concat_affine(&mut self, other: &Matrix) {
        match &mut self.current {
            TrackerFrame::Affine3x3 { matrix, .. } => *matrix = matrix.pre_concat(other),
            TrackerFrame::Perspective4x4 { matrix, .. } => {
                *matrix = matrix.pre_concat(&other.to_m44())
            }
        }
    }

    fn upgrade_to_4x4(&mut self) {
        if let TrackerFrame::Affine3x3 { matrix, cull_rect } = self.current {
            tracing::trace!(depth = self.saved.len(), "matrix clip frame promoted to 4x4");
            self.current = TrackerFrame::Perspective4x4 {
                matrix: matrix.to_m44(),
                cull_rect,
            };
        }
    }

    pub fn clip_rect(&mut self, rect: &Rect, op: ClipOp, is_aa: bool) {
        if self.current.cull_rect().is_empty() {
            return;
        }
        match op {
            ClipOp::Intersect => self.intersect_device_bounds(rect, is_aa),
            ClipOp::Difference => self.subtract_device_bounds(rect, is_aa),
        }
    }

    pub fn clip_rrect(&mut self, rrect: &RoundRect, op: ClipOp, is_aa: bool) {
        match op {
            ClipOp::Intersect => self.clip_rect(&rrect.bounds(), op, is_aa),
            ClipOp::Difference => {
                if rrect.is_rect() {
                    self.clip_rect(&rrect.rect(), op, is_aa);
                    return;
                }
                let (vertical_band, horizontal_band) = rrect.inscribed_bands();
                self.clip_rect(&vertical_band, op, is_aa);
                self.clip_rect(&horizontal_band, op, is_aa);
            }
        }
    }

    /// An inverse-filled path clips with the complement of its drawn area:
    /// intersecting with it cannot shrink the cull rect to a smaller rect,
    /// while subtracting it leaves at most the path's own bounds.
    pub fn clip_path(&mut self, path: &Path, op: ClipOp, is_aa: bool) {
        match (op, path.is_inverse_fill_type()) {
            (ClipOp::Intersect, false) => {
                self.clip_rect(&path.bounds(), ClipOp::Intersect, is_aa);
            }
            (ClipOp::Intersect, true) => {}
            (ClipOp::Difference, true) => {
                self.clip_rect(&path.bounds(), ClipOp::Intersect, is_aa);
            }
            (ClipOp::Difference, false) => {
                if let Some(rect) = path.as_rect() {
                    self.clip_rect(&rect, ClipOp::Difference, is_aa);
                }
            }
        }
    }

    fn intersect_device_bounds(&mut self, rect: &Rect, is_aa: bool) {
        let mut device_rect = self.current.map_rect(rect);
        if has_nan(rect) || has_nan(&device_rect) {
            *self.current.cull_rect_mut() = empty_rect();
            return;
        }
        if is_aa {
            let rounded = device_rect.round_out_int();
            device_rect = rect_ltrb(
                rounded.min.x as f32,
                rounded.min.y as f32,
                rounded.max.x as f32,
                rounded.max.y as f32,
            );
        }
        let cull_rect = self.current.cull_rect_mut();
        *cull_rect = cull_rect.intersect_rect(&device_rect);
    }

    fn subtract_device_bounds(&mut self, rect: &Rect, is_aa: bool) {
        if rect.is_empty() || !self.current.rect_stays_rect() {
            return;
        }
        let mut removed = self.current.map_rect(rect);
        if has_nan(rect) || has_nan(&removed) {
            return;
        }
        if is_aa {
            // Partially covered pixels stay visible, so only whole pixels are removed.
            removed = rect_ltrb(
                removed.min.x.ceil(),
                removed.min.y.ceil(),
                removed.max.x.floor(),
                removed.max.y.floor(),
            );
            if removed.is_empty() {
                return;
            }
        }

        let cull_rect = self.current.cull_rect_mut();
        if removed.min.x <= cull_rect.min.x && removed.max.x >= cull_rect.max.x {
            let mut top = cull_rect.min.y;
            let mut bottom = cull_rect.max.y;
            if removed.min.y <= top {
                top = top.max(removed.max.y);
            }
            if removed.max.y >= bottom {
                bottom = bottom.min(removed.min.y);
            }
            if top < bottom {
                cull_rect.min.y = top;
                cull_rect.max.y = bottom;
            } else {
                *cull_rect = empty_rect();
            }
        } else if removed.min.y <= cull_rect.min.y && removed.max.y >= cull_rect.max.y {
            let mut left = cull_rect.min.x;
            let mut right = cull_rect.max.x;
            if removed.min.x <= left {
                left = left.max(removed.max.x);
            }
            if removed.max.x >= right {
                right = right.min(removed.min.x);
            }
            if left < right {
                cull_rect.min.x = left;
                cull_rect.max.x = right;
            } else {
                *cull_rect = empty_rect();
            }
        }
    }
}

fn has_nan(rect: &Rect) -> bool {
    rect.min.x.is_nan() || rect.min.y.is_nan() || rect.max.x.is_nan() || rect.max.y.is_nan()
}
