//! The tuple-history store (C2, §4.1): story allocation and the
//! primitive chain operations every lifecycle transition is built from.

use memtx_core::{Index, ReplaceMode, SpaceId, Tuple, TupleId, TxError, TxResult};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::ids::StoryId;
use crate::story::Story;

/// Owns every story and the primary `tuple -> story` hash.
#[derive(Debug, Default)]
pub struct StoryStore {
    stories: SlotMap<StoryId, Story>,
    by_tuple: FxHashMap<TupleId, StoryId>,
}

impl StoryStore {
    /// A fresh, empty store.
    pub fn new() -> Self {
        StoryStore {
            stories: SlotMap::with_key(),
            by_tuple: FxHashMap::default(),
        }
    }

    /// Allocate a story for `tuple`, flagging it dirty and referencing it.
    pub fn new_story(&mut self, space: SpaceId, tuple: Tuple, index_count: usize) -> StoryId {
        let id = tuple.id();
        let story = Story::new(space, tuple, index_count);
        let story_id = self.stories.insert(story);
        self.by_tuple.insert(id, story_id);
        story_id
    }

    /// Look up the story for an already-dirty tuple.
    ///
    /// Precondition (per §4.1): `tuple` must already be dirty (i.e. have
    /// a story). Violating this is a host bug, not a recoverable error.
    pub fn get(&self, tuple_id: TupleId) -> Option<StoryId> {
        self.by_tuple.get(&tuple_id).copied()
    }

    /// Immutable access to a story.
    pub fn story(&self, id: StoryId) -> Option<&Story> {
        self.stories.get(id)
    }

    /// Mutable access to a story.
    pub fn story_mut(&mut self, id: StoryId) -> Option<&mut Story> {
        self.stories.get_mut(id)
    }

    /// The whole story table, for GC and snapshot traversal.
    pub fn stories(&self) -> &SlotMap<StoryId, Story> {
        &self.stories
    }

    /// Mutable access to the whole story table.
    pub fn stories_mut(&mut self) -> &mut SlotMap<StoryId, Story> {
        &mut self.stories
    }

    /// Remove a story. Precondition: fully unlinked from every chain
    /// (every `StoryLink::older`/`newer` is `None` and `in_index` is
    /// false).
    pub fn delete(&mut self, id: StoryId) -> Option<Story> {
        let story = self.stories.remove(id)?;
        debug_assert!(
            story
                .links
                .iter()
                .all(|l| l.older.is_none() && l.newer.is_none() && !l.in_index),
            "deleted a story still linked into a chain"
        );
        self.by_tuple.remove(&story.tuple.id());
        Some(story)
    }

    /// Splice `new` directly above `old` in index `index`'s chain,
    /// without touching `in_index`/physical state.
    pub fn link(&mut self, new: StoryId, old: StoryId, index: usize) {
        if let Some(old_story) = self.stories.get_mut(old) {
            old_story.links[index].newer = Some(new);
        }
        if let Some(new_story) = self.stories.get_mut(new) {
            new_story.links[index].older = Some(old);
        }
    }

    /// Remove `story` from index `index`'s chain, splicing its neighbors
    /// together.
    pub fn unlink(&mut self, story: StoryId, index: usize) {
        let (older, newer) = match self.stories.get(story) {
            Some(s) => (s.links[index].older, s.links[index].newer),
            None => return,
        };
        if let Some(older_id) = older {
            if let Some(older_story) = self.stories.get_mut(older_id) {
                older_story.links[index].newer = newer;
            }
        }
        if let Some(newer_id) = newer {
            if let Some(newer_story) = self.stories.get_mut(newer_id) {
                newer_story.links[index].older = older;
            }
        }
        if let Some(s) = self.stories.get_mut(story) {
            s.links[index].older = None;
            s.links[index].newer = None;
        }
    }

    /// Swap adjacent stories `a` (newer) and `b` (older) in index
    /// `index`'s chain: `a`'s newer-neighbor becomes `b`'s newer-neighbor
    /// and vice versa. Does not touch `in_index` — callers that swap the
    /// chain head are responsible for updating physical index state
    /// separately.
    pub fn reorder(&mut self, a: StoryId, b: StoryId, index: usize) {
        debug_assert_eq!(
            self.stories.get(a).and_then(|s| s.links[index].older),
            Some(b)
        );
        let above_a = self.stories.get(a).and_then(|s| s.links[index].newer);
        let below_b = self.stories.get(b).and_then(|s| s.links[index].older);

        if let Some(id) = above_a {
            if let Some(s) = self.stories.get_mut(id) {
                s.links[index].older = Some(b);
            }
        }
        if let Some(id) = below_b {
            if let Some(s) = self.stories.get_mut(id) {
                s.links[index].newer = Some(a);
            }
        }
        if let Some(s) = self.stories.get_mut(b) {
            s.links[index].newer = above_a;
            s.links[index].older = Some(a);
        }
        if let Some(s) = self.stories.get_mut(a) {
            s.links[index].newer = Some(b);
            s.links[index].older = below_b;
        }
    }

    /// Promote `new` to chain head in index `index`, demoting `old` (if
    /// any). When `is_new_tuple` is false this is moving an *existing*
    /// story to the head and must physically rebind the index entry via
    /// `index.replace`; the gap-observer list on the demoted head moves
    /// to the new head, since gap observations track positions and the
    /// new head now represents that position.
    pub fn link_top(
        &mut self,
        new: StoryId,
        old: Option<StoryId>,
        index_pos: usize,
        is_new_tuple: bool,
        physical_index: &mut dyn Index,
    ) -> TxResult<()> {
        if let Some(old_id) = old {
            self.link(new, old_id, index_pos);
            let moved_gaps = self
                .stories
                .get_mut(old_id)
                .map(|s| std::mem::take(&mut s.links[index_pos].read_gaps))
                .unwrap_or_default();
            if let Some(new_story) = self.stories.get_mut(new) {
                new_story.links[index_pos].read_gaps = moved_gaps;
            }
            if let Some(old_story) = self.stories.get_mut(old_id) {
                old_story.links[index_pos].in_index = false;
            }
        }

        if !is_new_tuple {
            let old_tuple = old.and_then(|o| self.stories.get(o)).map(|s| s.tuple.clone());
            let new_tuple = self.stories.get(new).map(|s| s.tuple.clone());
            physical_index.replace(
                old_tuple.as_ref(),
                new_tuple.as_ref(),
                ReplaceMode::ReplaceOrInsert,
            )?;
        }

        if let Some(new_story) = self.stories.get_mut(new) {
            new_story.links[index_pos].in_index = true;
        }
        Ok(())
    }

    /// Mark a tuple dirty without allocating a story (used only for the
    /// degenerate excluded-key case of §4.5).
    pub fn mark_excluded(&mut self, story: StoryId, index_pos: usize) {
        if let Some(s) = self.stories.get_mut(story) {
            s.links[index_pos].excluded = true;
            s.links[index_pos].in_index = false;
        }
    }
}

/// Uniqueness precondition check for `INSERT`: fails with
/// [`TxError::DuplicateKey`] if a visible predecessor already occupies
/// the slot.
pub fn check_no_visible_predecessor(index_id: u32, visible_predecessor: bool) -> TxResult<()> {
    if visible_predecessor {
        Err(TxError::duplicate_key(index_id))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtx_core::{IndexDef, IndexId, KeyDefBuilder, Key, ReplaceOutcome};

    struct FakeIndex {
        def: IndexDef,
    }
    impl Index for FakeIndex {
        fn replace(
            &mut self,
            _old: Option<&Tuple>,
            _new: Option<&Tuple>,
            _mode: ReplaceMode,
        ) -> TxResult<ReplaceOutcome> {
            Ok(ReplaceOutcome::default())
        }
        fn def(&self) -> &IndexDef {
            &self.def
        }
    }

    fn fake_index() -> FakeIndex {
        FakeIndex {
            def: IndexDef {
                dense_id: IndexId(0),
                space_id: SpaceId(0),
                key_def: KeyDefBuilder::new(1).build(|_| Key::new(), |a, b| a.cmp(b)),
            },
        }
    }

    #[test]
    fn link_top_without_old_sets_in_index() {
        let mut store = StoryStore::new();
        let id = store.new_story(SpaceId(0), Tuple::new(vec![1]), 1);
        let mut idx = fake_index();
        store.link_top(id, None, 0, true, &mut idx).unwrap();
        assert!(store.story(id).unwrap().links[0].in_index);
    }

    #[test]
    fn link_top_demotes_old_and_moves_gaps() {
        let mut store = StoryStore::new();
        let old = store.new_story(SpaceId(0), Tuple::new(vec![1]), 1);
        let mut idx = fake_index();
        store.link_top(old, None, 0, true, &mut idx).unwrap();

        let new = store.new_story(SpaceId(0), Tuple::new(vec![2]), 1);
        store.link_top(new, Some(old), 0, true, &mut idx).unwrap();

        assert!(store.story(new).unwrap().links[0].in_index);
        assert!(!store.story(old).unwrap().links[0].in_index);
        assert_eq!(store.story(old).unwrap().links[0].newer, Some(new));
        assert_eq!(store.story(new).unwrap().links[0].older, Some(old));
    }

    #[test]
    fn unlink_splices_neighbors() {
        let mut store = StoryStore::new();
        let a = store.new_story(SpaceId(0), Tuple::new(vec![1]), 1);
        let b = store.new_story(SpaceId(0), Tuple::new(vec![2]), 1);
        let c = store.new_story(SpaceId(0), Tuple::new(vec![3]), 1);
        store.link(a, b, 0);
        store.link(b, c, 0);

        store.unlink(b, 0);
        assert_eq!(store.story(a).unwrap().links[0].older, Some(c));
        assert_eq!(store.story(c).unwrap().links[0].newer, Some(a));
    }
}
