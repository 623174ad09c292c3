//! The four read-tracker shapes, realized as one tagged variant sharing a
//! base payload (owning transaction, index) and free-listed through a
//! single `slotmap` arena rather than four bespoke pools.

use memtx_core::{IndexId, IteratorType, Key, Tuple};

use crate::ids::{StoryId, TxnId};

/// What kind of read produced this tracker, and the position-specific
/// data needed to decide whether a later write crosses it.
#[derive(Debug, Clone)]
pub enum GapKind {
    /// A full unique key was queried and matched nothing anywhere —
    /// no story exists at that key at all. Sits in the index's
    /// point-hole orphan table until a later insert creates a story
    /// there, at which point it is promoted onto that story.
    PointHole {
        /// Index the point read was against.
        index: IndexId,
        /// The exact key that was queried.
        key: Key,
    },
    /// A read resolved against a story that already exists, either
    /// because `clarify` found the story's current version invisible
    /// (attached to `story.links[index].read_gaps`, conflicted the same
    /// way any other gap is at prepare time) or because it found the
    /// version visible (attached to `story.reader_list`, conflicted if
    /// that version is later superseded or rolled back). Created
    /// automatically as a side effect of clarification, never by a
    /// separate host call.
    StoryRead {
        /// Index the read was resolved against.
        index: IndexId,
    },
    /// A range/select returned no hit between two adjacent index
    /// entries.
    Nearby {
        /// Index the range read was against.
        index: IndexId,
        /// Scan direction/shape.
        iterator: IteratorType,
        /// The bound key of the range.
        key: Key,
        /// How many parts of the bound key were supplied.
        part_count: usize,
    },
    /// An exhaustive scan of an unordered index.
    FullScan {
        /// Index scanned.
        index: IndexId,
    },
    /// A count by `(type, key)`, optionally bounded by a tuple.
    Count {
        /// Index the count was against.
        index: IndexId,
        /// Scan direction/shape.
        iterator: IteratorType,
        /// The bound key of the count.
        key: Key,
        /// How many parts of the bound key were supplied.
        part_count: usize,
        /// Optional tuple bound ("count up to this tuple").
        until: Option<Tuple>,
    },
}

impl GapKind {
    /// The index this tracker observes.
    pub fn index(&self) -> IndexId {
        match self {
            GapKind::PointHole { index, .. }
            | GapKind::StoryRead { index }
            | GapKind::Nearby { index, .. }
            | GapKind::FullScan { index }
            | GapKind::Count { index, .. } => *index,
        }
    }
}

/// One read-tracker record: an owning transaction plus its kind, and
/// (once positioned) the story it is attached to.
#[derive(Debug, Clone)]
pub struct GapItem {
    /// Transaction that performed the read this tracker records.
    pub txn: TxnId,
    /// What was read.
    pub kind: GapKind,
    /// Story this tracker is currently attached to, if any. `None` while
    /// sitting in one of the manager's index-level orphan lists (a
    /// nearby-gap with no successor yet, a full-scan, or a count-gap
    /// before it matches an insert).
    pub attached_story: Option<StoryId>,
}

impl GapItem {
    /// A new, unpositioned tracker.
    pub fn new(txn: TxnId, kind: GapKind) -> Self {
        GapItem {
            txn,
            kind,
            attached_story: None,
        }
    }
}
