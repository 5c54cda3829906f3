use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use geometry::{Rect, RectExt, empty_rect};

/// Stable identity of a retained layer across frames.
pub type LayerId = u64;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_arena_id() -> u64 {
    NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed)
}

/// The screen-space rects one subtree painted in one frame.
///
/// A region is a key into the rect arena of the diff pass that produced it:
/// `[start, end)` of that arena. It stays meaningful for as long as that
/// arena lives, first inside the `DiffContext` and then inside the
/// `PaintRegionMap` handed to the next frame. Resolving it against any
/// other arena is a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PaintRegion {
    pub(crate) arena_id: u64,
    pub(crate) start: usize,
    pub(crate) end: usize,
    has_readback: bool,
    has_texture: bool,
}

impl PaintRegion {
    pub(crate) fn new(
        arena_id: u64,
        start: usize,
        end: usize,
        has_readback: bool,
        has_texture: bool,
    ) -> Self {
        Self {
            arena_id,
            start,
            end,
            has_readback,
            has_texture,
        }
    }

    /// False for the default region, which refers to no arena.
    pub fn is_valid(&self) -> bool {
        self.arena_id != 0
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Some layer in the subtree reads back what is painted below it.
    pub fn has_readback(&self) -> bool {
        self.has_readback
    }

    pub fn has_texture(&self) -> bool {
        self.has_texture
    }
}

/// Rects produced by a finished diff pass together with the region each
/// layer painted, keyed by layer id. Feeds the next frame's pass.
#[derive(Debug, Default)]
pub struct PaintRegionMap {
    arena_id: u64,
    rects: Vec<Rect>,
    regions: HashMap<LayerId, PaintRegion>,
}

impl PaintRegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        arena_id: u64,
        rects: Vec<Rect>,
        regions: HashMap<LayerId, PaintRegion>,
    ) -> Self {
        Self {
            arena_id,
            rects,
            regions,
        }
    }

    pub(crate) fn arena_id(&self) -> u64 {
        self.arena_id
    }

    pub fn get(&self, layer: LayerId) -> Option<PaintRegion> {
        self.regions.get(&layer).copied()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The rects `region` refers to. `region` must come from this map.
    pub fn rects(&self, region: &PaintRegion) -> &[Rect] {
        debug_assert!(
            !region.is_valid() || region.arena_id == self.arena_id,
            "paint region resolved against a foreign arena"
        );
        if region.arena_id != self.arena_id {
            return &[];
        }
        self.rects.get(region.start..region.end).unwrap_or(&[])
    }

    /// Union of the rects of `region`.
    pub fn bounds(&self, region: &PaintRegion) -> Rect {
        self.rects(region)
            .iter()
            .fold(empty_rect(), |bounds, rect| bounds.join_rect(rect))
    }
}
