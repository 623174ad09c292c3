//! Read-side operations (C4/C5): the manager's answer to "what does this
//! transaction see", plus the tracker-registration calls a host makes
//! after a physical scan came up empty.

use memtx_core::{IndexId, IteratorType, Key, SpaceId, Tuple};

use crate::gap::{GapItem, GapKind};
use crate::ids::{GapId, StoryId, TxnId};
use crate::manager::TxManager;
use crate::visibility;

impl TxManager {
    /// Resolve what `reader` observes starting at `start` in `index`'s
    /// chain, applying any read-view detour the clarification requires.
    ///
    /// As a side effect — mirroring the source engine's clarify routine
    /// — a registered `reader` that did not resolve to its own change is
    /// tracked against the story the result came from: attached to
    /// `reader_list` when a version was visible (so a later rollback or
    /// supersession can find it), or to `links[index].read_gaps` at the
    /// chain head when nothing was visible (so a later insert there can
    /// conflict it, same as any other gap). A reader resolving its own
    /// write is never tracked — a transaction cannot conflict with
    /// itself.
    pub fn clarify(
        &mut self,
        reader: Option<TxnId>,
        start: StoryId,
        index: usize,
        is_system_space: bool,
    ) -> Option<Tuple> {
        let stmts = &self.stmts;
        let reader_txn = reader.and_then(|id| self.txns.get(id));
        let clarified = visibility::clarify_index(
            self.stories.stories(),
            stmts,
            start,
            index,
            reader_txn,
            reader,
            is_system_space,
            |stmt_id| stmts.get(stmt_id).map(|s| s.txn) == reader,
        );
        if let (Some(psn), Some(txn_id)) = (clarified.send_to_read_view_psn, reader) {
            crate::conflict::send_to_read_view(&mut self.txns, &mut self.read_views, txn_id, psn);
        }
        if let (Some(story_id), Some(txn_id)) = (clarified.track_story, reader) {
            self.track_story_read(txn_id, story_id, index, clarified.tuple.is_some());
        }
        clarified.tuple
    }

    /// Attach an automatic [`GapKind::StoryRead`] tracker for `txn` to
    /// `story_id`, unless one is already there — repeated reads of the
    /// same story by the same transaction must not pile up trackers.
    fn track_story_read(&mut self, txn: TxnId, story_id: StoryId, index: usize, visible: bool) {
        let already_tracked = self
            .stories
            .story(story_id)
            .map(|story| {
                let list = if visible { &story.reader_list } else { &story.links[index].read_gaps };
                list.iter().any(|&gap_id| self.gaps.get(gap_id).map(|g| g.txn == txn).unwrap_or(false))
            })
            .unwrap_or(false);
        if already_tracked {
            return;
        }

        let mut item = GapItem::new(txn, GapKind::StoryRead { index: IndexId(index as u32) });
        item.attached_story = Some(story_id);
        let gap_id = self.gaps.insert(item);

        if let Some(story) = self.stories.story_mut(story_id) {
            if visible {
                story.reader_list.push(gap_id);
            } else {
                story.links[index].read_gaps.push(gap_id);
            }
        }
        if let Some(t) = self.txns.get_mut(txn) {
            t.read_trackers.push(gap_id);
        }
    }

    /// Whether the chain-head tuple in `index`'s chain starting at
    /// `start` is visible to `reader`.
    pub fn tuple_key_is_visible(
        &mut self,
        reader: Option<TxnId>,
        start: StoryId,
        index: usize,
        is_system_space: bool,
    ) -> bool {
        self.clarify(reader, start, index, is_system_space).is_some()
    }

    /// Record that `reader` queried `key` in `index` and found nothing.
    ///
    /// More than one transaction can probe the same absent key at once,
    /// so each tracker is appended rather than replacing whatever is
    /// already registered for that key — an earlier prober must still be
    /// found and conflicted when a later transaction inserts the key.
    pub fn track_point(&mut self, reader: TxnId, space: SpaceId, index: IndexId, key: Key) -> GapId {
        let gap_id = self.gaps.insert(GapItem::new(reader, GapKind::PointHole { index, key: key.clone() }));
        self.point_holes.entry(((space, index), key)).or_default().push(gap_id);
        if let Some(t) = self.txns.get_mut(reader) {
            t.read_trackers.push(gap_id);
        }
        gap_id
    }

    /// Record a nearby-gap tracker. If `successor` names a story, the
    /// tracker attaches to that story's `read_gaps` at `index`; otherwise
    /// it sits in the index's orphan list (no successor existed).
    pub fn track_gap(
        &mut self,
        reader: TxnId,
        space: SpaceId,
        index: IndexId,
        iterator: IteratorType,
        key: Key,
        part_count: usize,
        successor: Option<StoryId>,
        link_index: usize,
    ) -> GapId {
        let mut item = GapItem::new(
            reader,
            GapKind::Nearby {
                index,
                iterator,
                key,
                part_count,
            },
        );
        item.attached_story = successor;
        let gap_id = self.gaps.insert(item);
        match successor {
            Some(story_id) => {
                if let Some(story) = self.stories.story_mut(story_id) {
                    story.links[link_index].read_gaps.push(gap_id);
                }
            }
            None => {
                self.nearby_orphans.entry((space, index)).or_default().push(gap_id);
            }
        }
        if let Some(t) = self.txns.get_mut(reader) {
            t.read_trackers.push(gap_id);
        }
        gap_id
    }

    /// Record a full-scan tracker against `index`.
    pub fn track_full_scan(&mut self, reader: TxnId, space: SpaceId, index: IndexId) -> GapId {
        let gap_id = self.gaps.insert(GapItem::new(reader, GapKind::FullScan { index }));
        self.full_scans.entry((space, index)).or_default().push(gap_id);
        if let Some(t) = self.txns.get_mut(reader) {
            t.read_trackers.push(gap_id);
        }
        gap_id
    }

    /// Record a count-gap tracker: `reader` counted rows matching
    /// `(iterator, key, part_count)` up to `until`, and the count it saw
    /// is only valid while no matching insert occurs.
    pub fn track_count_until(
        &mut self,
        reader: TxnId,
        space: SpaceId,
        index: IndexId,
        iterator: IteratorType,
        key: Key,
        part_count: usize,
        until: Option<Tuple>,
    ) -> GapId {
        let gap_id = self.gaps.insert(GapItem::new(
            reader,
            GapKind::Count {
                index,
                iterator,
                key,
                part_count,
                until,
            },
        ));
        self.count_gaps.entry((space, index)).or_default().push(gap_id);
        if let Some(t) = self.txns.get_mut(reader) {
            t.read_trackers.push(gap_id);
        }
        gap_id
    }

    /// Count, among `chain_heads`, how many are invisible to `reader` and
    /// match a count-gap bound — used by a host implementing `COUNT` to
    /// learn how many rows its visibility-adjusted count must skip.
    pub fn index_invisible_count_matching_until(
        &mut self,
        reader: Option<TxnId>,
        chain_heads: &[StoryId],
        index: usize,
        is_system_space: bool,
    ) -> usize {
        chain_heads
            .iter()
            .filter(|&&head| self.clarify(reader, head, index, is_system_space).is_none())
            .count()
    }
}
