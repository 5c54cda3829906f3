//! Frame-to-frame damage computation over a retained layer tree.
//!
//! A tree walker drives one [`DiffContext`] per frame. Each layer opens a
//! subtree, applies its transform and clip, and either reports that it
//! changed (its old paint region becomes damage and everything it paints
//! now is damage too) or reuses the region it painted last frame. At the end
//! of the walk `compute_damage` yields the pixels to repaint and
//! `into_paint_region_map` keeps this frame's regions for the next one.

mod paint_region;

use std::collections::HashMap;
use std::fmt;

use geometry::{
    ClipOp, IntRect, IntRectExt, M44, Matrix, MatrixExt, Rect, RectExt, empty_rect,
    int_rect_ltrb, max_cull_rect,
};
use matrix_clip::MatrixClipTracker;
use serde::Deserialize;
use smallvec::SmallVec;

pub use paint_region::{LayerId, PaintRegion, PaintRegionMap};

/// Maps screen-space bounds of content to the screen-space bounds after a
/// filter applied by an enclosing layer.
pub type FilterBoundsAdjustment = Box<dyn Fn(Rect) -> Rect>;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiffContextConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub device_pixel_ratio: f32,
    /// Layers may be painted from raster cache entries, which are drawn
    /// with whole-pixel translation.
    pub has_raster_cache: bool,
}

impl Default for DiffContextConfig {
    fn default() -> Self {
        Self {
            frame_width: 0,
            frame_height: 0,
            device_pixel_ratio: 1.0,
            has_raster_cache: false,
        }
    }
}

/// Rounds damage outward to a tile grid, per axis. Values of 0 or 1 leave
/// that axis untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DamageAlignment {
    pub horizontal: i32,
    pub vertical: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    /// Pixels that changed since the previous frame.
    pub frame_damage: IntRect,
    /// `frame_damage` plus damage the target buffer has not caught up on.
    pub buffer_damage: IntRect,
}

/// Diagnostic counters for picture comparisons made during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    new_pictures: usize,
    pictures_too_complex_to_compare: usize,
    deep_compare_pictures: usize,
    different_instance_pictures: usize,
    same_instance_pictures: usize,
}

impl Statistics {
    /// A picture with no counterpart in the previous frame.
    pub fn add_new_picture(&mut self) {
        self.new_pictures += 1;
    }

    pub fn add_picture_too_complex_to_compare(&mut self) {
        self.pictures_too_complex_to_compare += 1;
    }

    pub fn add_deep_compare_picture(&mut self) {
        self.deep_compare_pictures += 1;
    }

    /// Deep comparison found the pictures differ.
    pub fn add_different_instance_picture(&mut self) {
        self.different_instance_pictures += 1;
    }

    pub fn add_same_instance_picture(&mut self) {
        self.same_instance_pictures += 1;
    }

    pub fn new_pictures(&self) -> usize {
        self.new_pictures
    }

    pub fn pictures_too_complex_to_compare(&self) -> usize {
        self.pictures_too_complex_to_compare
    }

    pub fn deep_compare_pictures(&self) -> usize {
        self.deep_compare_pictures
    }

    pub fn different_instance_pictures(&self) -> usize {
        self.different_instance_pictures
    }

    pub fn same_instance_pictures(&self) -> usize {
        self.same_instance_pictures
    }

    pub fn log(&self) {
        tracing::debug!(
            new_pictures = self.new_pictures,
            too_complex = self.pictures_too_complex_to_compare,
            deep_compared = self.deep_compare_pictures,
            different_instances = self.different_instance_pictures,
            same_instances = self.same_instance_pictures,
            "diff context statistics"
        );
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    dirty: bool,
    /// Start of this subtree's rects in the arena.
    rect_index: usize,
    integral_transform: bool,
    transform_override: Option<Matrix>,
    has_filter_bounds_adjustment: bool,
    has_texture: bool,
}

impl State {
    fn root() -> Self {
        Self {
            dirty: false,
            rect_index: 0,
            integral_transform: false,
            transform_override: None,
            has_filter_bounds_adjustment: false,
            has_texture: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Readback {
    /// Arena index of the placeholder rect marking the readback's subtree.
    position: usize,
    paint_rect: IntRect,
    readback_rect: IntRect,
}

pub struct DiffContext<'a> {
    config: DiffContextConfig,
    tracker: MatrixClipTracker,
    state: State,
    state_stack: SmallVec<[State; 8]>,
    filter_bounds_adjustments: Vec<FilterBoundsAdjustment>,
    arena_id: u64,
    rects: Vec<Rect>,
    readbacks: Vec<Readback>,
    damage: Rect,
    this_frame: HashMap<LayerId, PaintRegion>,
    last_frame: &'a PaintRegionMap,
    statistics: Statistics,
}

impl fmt::Debug for DiffContext<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DiffContext")
            .field("config", &self.config)
            .field("depth", &self.state_stack.len())
            .field("arena_id", &self.arena_id)
            .field("rects", &self.rects.len())
            .field("damage", &self.damage)
            .finish_non_exhaustive()
    }
}

impl<'a> DiffContext<'a> {
    pub fn new(config: DiffContextConfig, last_frame: &'a PaintRegionMap) -> Self {
        Self {
            config,
            tracker: MatrixClipTracker::new(max_cull_rect(), &Matrix::identity()),
            state: State::root(),
            state_stack: SmallVec::new(),
            filter_bounds_adjustments: Vec::new(),
            arena_id: paint_region::next_arena_id(),
            rects: Vec::new(),
            readbacks: Vec::new(),
            damage: empty_rect(),
            this_frame: HashMap::new(),
            last_frame,
            statistics: Statistics::default(),
        }
    }

    pub fn config(&self) -> &DiffContextConfig {
        &self.config
    }

    pub fn has_raster_cache(&self) -> bool {
        self.config.has_raster_cache
    }

    pub fn frame_device_pixel_ratio(&self) -> f32 {
        self.config.device_pixel_ratio
    }

    pub fn begin_subtree(&mut self) {
        self.state_stack.push(self.state);
        self.tracker.save();

        let had_integral_transform = self.state.integral_transform;
        self.state.rect_index = self.rects.len();
        self.state.has_filter_bounds_adjustment = false;
        self.state.has_texture = false;
        self.state.integral_transform = false;
        if had_integral_transform {
            self.make_transform_integral();
        }
    }

    pub fn end_subtree(&mut self) {
        debug_assert!(
            !self.state_stack.is_empty(),
            "end_subtree without begin_subtree"
        );
        let Some(parent) = self.state_stack.pop() else {
            return;
        };
        if self.state.has_filter_bounds_adjustment {
            self.filter_bounds_adjustments.pop();
        }
        self.tracker.restore();
        self.state = parent;
    }

    pub fn push_transform(&mut self, transform: &Matrix) {
        self.tracker.transform(transform);
    }

    pub fn push_transform_m44(&mut self, transform: &M44) {
        self.tracker.transform_m44(transform);
    }

    /// Layers painted with a transform that differs from the one used for
    /// culling report the paint transform here.
    pub fn set_transform_override(&mut self, transform: &Matrix) {
        self.state.transform_override = Some(*transform);
    }

    /// Narrows the cull rect. Returns false when nothing in the subtree can
    /// be visible.
    pub fn push_cull_rect(&mut self, clip: &Rect) -> bool {
        self.tracker.clip_rect(clip, ClipOp::Intersect, false);
        !self.tracker.device_cull_rect().is_empty()
    }

    /// At most one adjustment per subtree.
    pub fn push_filter_bounds_adjustment(&mut self, adjustment: FilterBoundsAdjustment) {
        debug_assert!(
            !self.state.has_filter_bounds_adjustment,
            "subtree already has a filter bounds adjustment"
        );
        if self.state.has_filter_bounds_adjustment {
            self.filter_bounds_adjustments.pop();
        }
        self.state.has_filter_bounds_adjustment = true;
        self.filter_bounds_adjustments.push(adjustment);
    }

    /// Content of this subtree is painted with its translation snapped to
    /// whole pixels.
    pub fn will_paint_with_integral_transform(&mut self) {
        self.state.integral_transform = true;
    }

    /// Current cull rect in local coordinates.
    pub fn cull_rect(&self) -> Rect {
        self.tracker.local_cull_rect()
    }

    pub fn transform_3x3(&self) -> Matrix {
        self.tracker.matrix_3x3()
    }

    pub fn transform_4x4(&self) -> M44 {
        self.tracker.matrix_4x4()
    }

    pub fn map_rect(&self, rect: &Rect) -> Rect {
        self.tracker.map_rect(rect)
    }

    pub fn is_subtree_dirty(&self) -> bool {
        self.state.dirty
    }

    /// Marks the current subtree as changed. Its region from the previous
    /// frame, if any, becomes damage.
    pub fn mark_subtree_dirty(&mut self, previous_paint_region: Option<PaintRegion>) {
        debug_assert!(!self.state.dirty, "subtree is already dirty");
        if let Some(region) = previous_paint_region {
            self.add_damage_region(&region);
        }
        self.state.dirty = true;
    }

    /// Like `mark_subtree_dirty`, with the previous paint area given as a
    /// single screen-space rect.
    pub fn mark_subtree_dirty_rect(&mut self, previous_paint_rect: &Rect) {
        debug_assert!(!self.state.dirty, "subtree is already dirty");
        self.add_damage(previous_paint_rect);
        self.state.dirty = true;
    }

    pub fn mark_subtree_has_texture_layer(&mut self) {
        for state in &mut self.state_stack {
            state.has_texture = true;
        }
        self.state.has_texture = true;
    }

    /// Records local `rect` as painted by the current subtree. Rects outside
    /// the cull rect are dropped.
    pub fn add_layer_bounds(&mut self, rect: &Rect) {
        let mut painted = self.apply_filter_bounds_adjustment(self.tracker.map_rect(rect));
        if !painted.overlaps(&self.tracker.device_cull_rect()) {
            return;
        }
        if let Some(transform_override) = self.state.transform_override {
            painted = self.apply_filter_bounds_adjustment(transform_override.map_rect(rect));
        } else if self.state.integral_transform {
            self.make_transform_integral();
            painted = self.apply_filter_bounds_adjustment(self.tracker.map_rect(rect));
        }
        self.rects.push(painted);
        if self.state.dirty {
            self.add_damage(&painted);
        }
    }

    /// Reuses the region an unchanged subtree painted last frame.
    pub fn add_existing_paint_region(&mut self, region: &PaintRegion) {
        debug_assert!(
            !self.state.dirty,
            "existing paint region reused in a dirty subtree"
        );
        if region.arena_id == self.arena_id {
            self.rects.extend_from_within(region.start..region.end);
        } else {
            let last_frame = self.last_frame;
            self.rects.extend_from_slice(last_frame.rects(region));
        }
    }

    /// Any damage touching either rect forces both to be repainted.
    pub fn add_readback_region(&mut self, paint_rect: &IntRect, readback_rect: &IntRect) {
        self.readbacks.push(Readback {
            position: self.rects.len(),
            paint_rect: *paint_rect,
            readback_rect: *readback_rect,
        });
        // Placeholder so the readback falls inside the current subtree's
        // range of the arena.
        self.rects.push(empty_rect());
    }

    /// Rects painted since the current subtree began.
    pub fn current_subtree_region(&self) -> PaintRegion {
        let has_readback = self
            .readbacks
            .iter()
            .any(|readback| readback.position >= self.state.rect_index);
        PaintRegion::new(
            self.arena_id,
            self.state.rect_index,
            self.rects.len(),
            has_readback,
            self.state.has_texture,
        )
    }

    pub fn add_damage(&mut self, rect: &Rect) {
        self.damage = self.damage.join_rect(rect);
    }

    pub fn add_damage_region(&mut self, region: &PaintRegion) {
        debug_assert!(region.is_valid(), "damage from an invalid paint region");
        let bounds = self
            .region_rects(region)
            .iter()
            .fold(empty_rect(), |bounds, rect| bounds.join_rect(rect));
        self.add_damage(&bounds);
    }

    /// Resolves a region from this pass or from the previous frame.
    pub fn region_rects(&self, region: &PaintRegion) -> &[Rect] {
        if region.arena_id == self.arena_id {
            self.rects.get(region.start..region.end).unwrap_or(&[])
        } else {
            self.last_frame.rects(region)
        }
    }

    pub fn set_layer_paint_region(&mut self, layer: LayerId, region: PaintRegion) {
        self.this_frame.insert(layer, region);
    }

    pub fn get_old_layer_paint_region(&self, layer: LayerId) -> Option<PaintRegion> {
        self.last_frame.get(layer)
    }

    pub fn statistics(&mut self) -> &mut Statistics {
        &mut self.statistics
    }

    /// Damage accumulated so far plus `additional_damage`, rounded out to
    /// whole pixels and clipped to the frame.
    pub fn compute_damage(
        &self,
        additional_damage: &IntRect,
        alignment: Option<DamageAlignment>,
    ) -> Damage {
        let mut frame_damage = self.damage;
        let mut buffer_damage = additional_damage.to_f32_rect().join_rect(&self.damage);

        for readback in &self.readbacks {
            let paint_rect = readback.paint_rect.to_f32_rect();
            let readback_rect = readback.readback_rect.to_f32_rect();
            if paint_rect.overlaps(&frame_damage) || readback_rect.overlaps(&frame_damage) {
                frame_damage = frame_damage.join_rect(&readback_rect).join_rect(&paint_rect);
                buffer_damage = buffer_damage.join_rect(&readback_rect).join_rect(&paint_rect);
            }
        }

        let frame_clip = self.frame_rect();
        let mut damage = Damage {
            frame_damage: round_out(&frame_damage).intersect_int_rect(&frame_clip),
            buffer_damage: round_out(&buffer_damage).intersect_int_rect(&frame_clip),
        };
        if let Some(alignment) = alignment {
            damage.frame_damage = self.align_rect(&damage.frame_damage, alignment);
            damage.buffer_damage = self.align_rect(&damage.buffer_damage, alignment);
        }
        damage
    }

    /// Ends the pass, keeping this frame's regions for the next one.
    pub fn into_paint_region_map(self) -> PaintRegionMap {
        debug_assert!(
            self.state_stack.is_empty(),
            "diff pass ended with open subtrees"
        );
        self.statistics.log();
        PaintRegionMap::from_parts(self.arena_id, self.rects, self.this_frame)
    }

    fn frame_rect(&self) -> IntRect {
        int_rect_ltrb(
            0,
            0,
            clamp_to_i32(self.config.frame_width),
            clamp_to_i32(self.config.frame_height),
        )
    }

    fn align_rect(&self, rect: &IntRect, alignment: DamageAlignment) -> IntRect {
        if rect.is_empty() {
            return *rect;
        }
        let frame = self.frame_rect();
        let (left, right) = align_span(rect.min.x, rect.max.x, alignment.horizontal, frame.max.x);
        let (top, bottom) = align_span(rect.min.y, rect.max.y, alignment.vertical, frame.max.y);
        int_rect_ltrb(left, top, right, bottom)
    }

    fn apply_filter_bounds_adjustment(&self, rect: Rect) -> Rect {
        self.filter_bounds_adjustments
            .iter()
            .rev()
            .fold(rect, |rect, adjustment| adjustment(rect))
    }

    fn make_transform_integral(&mut self) {
        if self.tracker.using_4x4_matrix() {
            return;
        }
        let matrix = self.tracker.matrix_3x3();
        if !matrix.is_scale_translate() {
            return;
        }
        let snapped = Matrix::new(
            matrix.m11,
            matrix.m12,
            matrix.m21,
            matrix.m22,
            matrix.m31.round(),
            matrix.m32.round(),
        );
        self.tracker.set_transform(&snapped);
    }
}

fn clamp_to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn round_out(rect: &Rect) -> IntRect {
    if rect.is_empty() {
        return geometry::empty_int_rect();
    }
    rect.round_out_int()
}

/// Floors `start` and ceils `end` to multiples of `alignment`, keeping `end`
/// within `limit`.
fn align_span(start: i32, end: i32, alignment: i32, limit: i32) -> (i32, i32) {
    if alignment <= 1 {
        return (start, end);
    }
    let start = start - start.rem_euclid(alignment);
    let remainder = end.rem_euclid(alignment);
    let end = if remainder == 0 {
        end
    } else {
        end.saturating_add(alignment - remainder)
    };
    (start, end.min(limit))
}
