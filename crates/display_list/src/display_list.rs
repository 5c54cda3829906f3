use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use geometry::{Rect, max_cull_rect};

use crate::bounds::BoundsCalculator;
use crate::op::{Op, TapeObject, TapeReader};
use crate::{DispatchError, Dispatcher};

static NEXT_UNIQUE_ID: AtomicU32 = AtomicU32::new(1);

fn next_unique_id() -> u32 {
    loop {
        let id = NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

/// An immutable, replayable recording.
///
/// Lists are shared as `Arc<DisplayList>` and may be dispatched from any
/// number of threads at once. Bounds are computed on first use and cached.
#[derive(Debug)]
pub struct DisplayList {
    words: Box<[u32]>,
    objects: Box<[TapeObject]>,
    op_count: usize,
    nested_op_count: usize,
    nested_bytes: usize,
    unique_id: u32,
    cull_rect: Option<Rect>,
    bounds: OnceLock<Rect>,
}

static_assertions::assert_impl_all!(DisplayList: Send, Sync);

impl DisplayList {
    pub(crate) fn new(
        words: Vec<u32>,
        objects: Vec<TapeObject>,
        op_count: usize,
        nested_op_count: usize,
        nested_bytes: usize,
        cull_rect: Option<Rect>,
    ) -> Self {
        Self {
            words: words.into_boxed_slice(),
            objects: objects.into_boxed_slice(),
            op_count,
            nested_op_count,
            nested_bytes,
            unique_id: next_unique_id(),
            cull_rect,
            bounds: OnceLock::new(),
        }
    }

    /// Adopts a tape produced elsewhere, such as one read back from
    /// `words()`/`objects()` of another list. Every record is checked before
    /// the list is returned.
    pub fn from_raw_parts(
        words: Vec<u32>,
        objects: Vec<TapeObject>,
    ) -> Result<Self, DispatchError> {
        let mut op_count = 0;
        let mut nested_op_count = 0;
        let mut nested_bytes = 0;
        {
            let reader = TapeReader::new(&words, &objects);
            let mut cursor = 0;
            while cursor < words.len() {
                let (op, next) = reader.decode(cursor).inspect_err(|error| {
                    tracing::error!(%error, "rejected malformed display list tape");
                })?;
                if let Op::DrawDisplayList { display_list, .. } = op {
                    nested_op_count += display_list.op_count(true);
                    nested_bytes += display_list.bytes(true);
                }
                op_count += 1;
                cursor = next;
            }
        }
        Ok(Self::new(
            words,
            objects,
            op_count,
            nested_op_count,
            nested_bytes,
            None,
        ))
    }

    /// Process-unique, never zero.
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    pub fn op_count(&self, nested: bool) -> usize {
        if nested {
            self.op_count + self.nested_op_count
        } else {
            self.op_count
        }
    }

    pub fn bytes(&self, nested: bool) -> usize {
        let bytes = self.words.len() * 4;
        if nested {
            bytes + self.nested_bytes
        } else {
            bytes
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn objects(&self) -> &[TapeObject] {
        &self.objects
    }

    /// The cull rect the recording was made against, if one was given.
    pub fn cull_rect(&self) -> Option<Rect> {
        self.cull_rect
    }

    /// Conservative device bounds of everything the list draws, relative to
    /// an identity transform and the cull rect the list was recorded with.
    /// An empty list has empty bounds.
    pub fn bounds(&self) -> Rect {
        *self.bounds.get_or_init(|| {
            let cull_rect = self.cull_rect.unwrap_or_else(max_cull_rect);
            let mut calculator = BoundsCalculator::new(cull_rect);
            if let Err(error) = self.dispatch(&mut calculator) {
                tracing::error!(%error, unique_id = self.unique_id, "bounds pass stopped early");
            }
            calculator.finish()
        })
    }

    pub fn ops(&self) -> Ops<'_> {
        Ops {
            reader: TapeReader::new(&self.words, &self.objects),
            cursor: 0,
            end: self.words.len(),
            failed: false,
        }
    }

    pub fn dispatch<D: Dispatcher + ?Sized>(
        &self,
        dispatcher: &mut D,
    ) -> Result<(), DispatchError> {
        for op in self.ops() {
            op?.dispatch(dispatcher);
        }
        Ok(())
    }

    /// Replays the records in `[start, end)`. Both offsets are byte offsets
    /// and must fall on record boundaries.
    pub fn dispatch_range<D: Dispatcher + ?Sized>(
        &self,
        dispatcher: &mut D,
        start: usize,
        end: usize,
    ) -> Result<(), DispatchError> {
        let start_word = self.record_boundary(start)?;
        let end_word = self.record_boundary(end)?;
        if start_word > end_word {
            return Err(DispatchError::RangeNotOnRecordBoundary { offset: start });
        }
        let ops = Ops {
            reader: TapeReader::new(&self.words, &self.objects),
            cursor: start_word,
            end: end_word,
            failed: false,
        };
        for op in ops {
            op?.dispatch(dispatcher);
        }
        Ok(())
    }

    fn record_boundary(&self, byte_offset: usize) -> Result<usize, DispatchError> {
        let not_boundary = DispatchError::RangeNotOnRecordBoundary {
            offset: byte_offset,
        };
        if byte_offset % 4 != 0 || byte_offset > self.bytes(false) {
            return Err(not_boundary);
        }
        let target = byte_offset / 4;
        let reader = TapeReader::new(&self.words, &self.objects);
        let mut cursor = 0;
        while cursor < target {
            cursor += reader.record_len(cursor)?;
        }
        if cursor == target {
            Ok(target)
        } else {
            Err(not_boundary)
        }
    }
}

impl PartialEq for DisplayList {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.op_count == other.op_count
            && self.nested_op_count == other.nested_op_count
            && self.words == other.words
            && self.objects == other.objects
    }
}

/// Iterator over the decoded records of a list. Stops after the first
/// error.
#[derive(Debug, Clone)]
pub struct Ops<'a> {
    reader: TapeReader<'a>,
    cursor: usize,
    end: usize,
    failed: bool,
}

impl<'a> Iterator for Ops<'a> {
    type Item = Result<Op<'a>, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.end {
            return None;
        }
        match self.reader.decode(self.cursor) {
            Ok((op, next)) => {
                self.cursor = next;
                Some(Ok(op))
            }
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}
