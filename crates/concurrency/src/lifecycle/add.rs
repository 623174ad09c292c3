//! `add_stmt` (§4.3.1): the insert/replace/delete half of the statement
//! lifecycle. Everything here runs before the host has a PSN for the
//! statement — nothing committed here is visible to anyone but the
//! statement's own transaction until `prepare_stmt` runs.

use std::sync::Arc;

use memtx_core::{Index, Key, KeyDef, ReplaceMode, SpaceId, Tuple, TxResult};
use tracing::instrument;

use crate::gap::GapKind;
use crate::gap_policy;
use crate::ids::{GapId, StmtId, StoryId, TxnId};
use crate::manager::TxManager;
use crate::stmt::Stmt;
use crate::store::check_no_visible_predecessor;

/// Outcome of [`TxManager::add_stmt`]: the allocated statement and the
/// tuple (if any) that was visibly occupying the slot before this write.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// Handle to the statement the manager now tracks.
    pub stmt: StmtId,
    /// The tuple a concurrent reader would have observed before this
    /// statement, if any.
    pub old_visible: Option<Tuple>,
}

impl TxManager {
    /// Observe one DML statement. `new_tuple = None` is a delete;
    /// otherwise this is an insert/replace governed by `mode`.
    /// `indexes[0]` must be the primary index; `excluded[i]` lets the
    /// host flag that the tuple's key in index `i` is excluded from the
    /// physical index (§4.5) without this crate needing to inspect the
    /// tuple's fields itself.
    #[instrument(skip(self, indexes, old_tuple_hint, new_tuple), fields(space = space.0))]
    pub fn add_stmt(
        &mut self,
        txn: TxnId,
        space: SpaceId,
        indexes: &mut [&mut dyn Index],
        old_tuple_hint: Option<Tuple>,
        new_tuple: Option<Tuple>,
        mode: ReplaceMode,
        excluded: &[bool],
    ) -> TxResult<AddOutcome> {
        let stmt_id = self.stmts.insert(Stmt::new(space, txn));
        if let Some(t) = self.txns.get_mut(txn) {
            t.stmts.push(stmt_id);
        }

        let old_visible = match new_tuple {
            Some(new_tuple) => {
                self.add_insert_or_replace(stmt_id, space, indexes, new_tuple, mode, excluded)?
            }
            None => self.add_delete(stmt_id, space, indexes, old_tuple_hint)?,
        };

        if let Some(t) = self.txns.get_mut(txn) {
            t.has_issued_statement = true;
        }

        Ok(AddOutcome {
            stmt: stmt_id,
            old_visible,
        })
    }

    fn add_insert_or_replace(
        &mut self,
        stmt_id: StmtId,
        space: SpaceId,
        indexes: &mut [&mut dyn Index],
        new_tuple: Tuple,
        mode: ReplaceMode,
        excluded: &[bool],
    ) -> TxResult<Option<Tuple>> {
        // Step 1: allocate the new story.
        let add_story = self.new_story(space, new_tuple.clone());
        if let Some(s) = self.stories.story_mut(add_story) {
            s.add_stmt = Some(stmt_id);
        }
        if let Some(stmt) = self.stmts.get_mut(stmt_id) {
            stmt.add_story = Some(add_story);
        }

        // Step 2: physically replace in every index, always as
        // REPLACE_OR_INSERT — the mode's semantics are enforced logically
        // in step 3 against the *visible* predecessor, not the physical
        // occupant.
        let mut directly_replaced = Vec::with_capacity(indexes.len());
        let mut direct_successor = Vec::with_capacity(indexes.len());
        for idx in indexes.iter_mut() {
            let outcome = idx.replace(None, Some(&new_tuple), ReplaceMode::ReplaceOrInsert)?;
            directly_replaced.push(outcome.removed);
            direct_successor.push(outcome.successor);
        }

        // Step 3: validate uniqueness against the *visible* predecessor.
        let mut old_visible = None;
        for (i, replaced) in directly_replaced.iter().enumerate() {
            let Some(replaced_tuple) = replaced else { continue };
            let visible = self.visible_predecessor(replaced_tuple, i);
            if i == 0 {
                old_visible = visible.clone();
            }
            check_no_visible_predecessor(
                indexes[i].def().dense_id.0,
                mode == ReplaceMode::Insert && visible.is_some(),
            )?;
        }

        // Step 5: resolve the primary-index replaced slot into a story
        // (existing if dirty, a freshly built "added long ago" story
        // otherwise), and link it as this statement's delete side.
        let primary_old_story = match directly_replaced.first().and_then(|o| o.as_ref()) {
            Some(old_tuple) => Some(self.resolve_or_build_story(space, old_tuple)),
            None => None,
        };
        if let Some(old_story) = primary_old_story {
            if let Some(stmt) = self.stmts.get_mut(stmt_id) {
                stmt.del_story = Some(old_story);
            }
            let del_head = self.stories.story(old_story).and_then(|s| s.del_stmt);
            if let Some(stmt) = self.stmts.get_mut(stmt_id) {
                stmt.next_in_del_list = del_head;
            }
            if let Some(s) = self.stories.story_mut(old_story) {
                s.del_stmt = Some(stmt_id);
            }
            self.mark_own_change_if_displacing_own_add(stmt_id, old_story);
        }

        // Step 6: per-index chain linking and gap-tracker resolution.
        for i in 0..indexes.len() {
            if excluded.get(i).copied().unwrap_or(false) {
                self.stories.mark_excluded(add_story, i);
                continue;
            }
            match &directly_replaced[i] {
                None => {
                    self.resolve_gap_trackers_on_insert(
                        space,
                        i,
                        add_story,
                        &new_tuple,
                        direct_successor[i].as_ref(),
                        indexes[i],
                    );
                    self.stories.link_top(add_story, None, i, true, indexes[i])?;
                }
                Some(replaced_tuple) => {
                    let old_story = if i == 0 {
                        primary_old_story
                    } else {
                        Some(self.resolve_or_build_story(space, replaced_tuple))
                    };
                    self.stories
                        .link_top(add_story, old_story, i, true, indexes[i])?;
                }
            }
        }

        Ok(old_visible)
    }

    fn add_delete(
        &mut self,
        stmt_id: StmtId,
        space: SpaceId,
        indexes: &mut [&mut dyn Index],
        old_tuple_hint: Option<Tuple>,
    ) -> TxResult<Option<Tuple>> {
        let Some(old_tuple) = old_tuple_hint else {
            return Ok(None);
        };
        let story_id = self
            .lookup_story_by_tuple(old_tuple.id())
            .unwrap_or_else(|| self.resolve_or_build_story(space, &old_tuple));

        if let Some(stmt) = self.stmts.get_mut(stmt_id) {
            stmt.del_story = Some(story_id);
        }
        let del_head = self.stories.story(story_id).and_then(|s| s.del_stmt);
        if let Some(stmt) = self.stmts.get_mut(stmt_id) {
            stmt.next_in_del_list = del_head;
        }
        if let Some(story) = self.stories.story_mut(story_id) {
            story.del_stmt = Some(stmt_id);
            story.tuple_is_retained = true;
        }
        self.mark_own_change_if_displacing_own_add(stmt_id, story_id);

        // Count-gap trackers matching the deleted key become readers of
        // the story: a rollback of this delete must abort them.
        for idx in indexes.iter() {
            let key = idx.def().key_def.extract_key(&old_tuple);
            let matches: Vec<GapId> = self
                .count_gaps
                .get(&(space, idx.def().dense_id))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|&g| self.count_gap_matches_key(g, &key))
                .collect();
            for gap_id in matches {
                if let Some(item) = self.gaps.get_mut(gap_id) {
                    item.attached_story = Some(story_id);
                }
                if let Some(story) = self.stories.story_mut(story_id) {
                    story.reader_list.push(gap_id);
                }
            }
        }

        Ok(Some(old_tuple))
    }

    /// `stmt_id` is deleting (or displacing) `old_story`. If `old_story`
    /// still has an in-progress adder belonging to the same transaction
    /// as `stmt_id`, this statement is a self-overwrite, not a write a
    /// neighbor could conflict with — mark it so.
    fn mark_own_change_if_displacing_own_add(&mut self, stmt_id: StmtId, old_story: StoryId) {
        let Some(adder_stmt) = self.stories.story(old_story).and_then(|s| s.add_stmt) else {
            return;
        };
        let adder_txn = self.stmts.get(adder_stmt).map(|s| s.txn);
        let this_txn = self.stmts.get(stmt_id).map(|s| s.txn);
        if adder_txn.is_some() && adder_txn == this_txn {
            if let Some(stmt) = self.stmts.get_mut(stmt_id) {
                stmt.is_own_change = true;
            }
        }
    }

    fn visible_predecessor(&self, replaced_tuple: &Tuple, index: usize) -> Option<Tuple> {
        match self.lookup_story_by_tuple(replaced_tuple.id()) {
            Some(story_id) => {
                let stmts = &self.stmts;
                let clarified = crate::visibility::clarify_index(
                    self.stories.stories(),
                    stmts,
                    story_id,
                    index,
                    None,
                    None,
                    false,
                    |stmt_id| stmts.get(stmt_id).is_none(),
                );
                clarified.tuple
            }
            None => Some(replaced_tuple.clone()),
        }
    }

    fn resolve_or_build_story(&mut self, space: SpaceId, tuple: &Tuple) -> StoryId {
        match self.lookup_story_by_tuple(tuple.id()) {
            Some(id) => id,
            None => self.new_story(space, tuple.clone()),
        }
    }

    /// Resolve nearby-gap, point-hole and count-gap trackers positioned
    /// at the insertion point of `new_tuple` in index `index_pos`,
    /// attaching the right ones to `new_story` per the split/move/track
    /// policy of §4.3.1.
    fn resolve_gap_trackers_on_insert(
        &mut self,
        space: SpaceId,
        index_pos: usize,
        new_story: StoryId,
        new_tuple: &Tuple,
        successor: Option<&Tuple>,
        index: &dyn Index,
    ) {
        let index_id = index.def().dense_id;
        let key_def = index.def().key_def.clone();
        let full_key_part_count = key_def.part_count();

        if let Some(successor_tuple) = successor {
            if let Some(successor_story) = self.lookup_story_by_tuple(successor_tuple.id()) {
                let tracker_ids: Vec<GapId> = self
                    .stories
                    .story(successor_story)
                    .map(|s| s.links[index_pos].read_gaps.clone())
                    .unwrap_or_default();

                for gap_id in tracker_ids {
                    let Some(item) = self.gaps.get(gap_id).cloned() else {
                        continue;
                    };
                    let GapKind::Nearby {
                        iterator,
                        key,
                        part_count,
                        ..
                    } = &item.kind
                    else {
                        continue;
                    };
                    let cmp = key_def.compare_tuple_key(new_tuple, key);
                    let decision =
                        gap_policy::decide(*iterator, cmp, *part_count, full_key_part_count);

                    if decision.moved {
                        if let Some(s) = self.stories.story_mut(successor_story) {
                            s.links[index_pos].read_gaps.retain(|&g| g != gap_id);
                        }
                        self.attach_gap_to_story(gap_id, new_story, index_pos);
                    } else if decision.track {
                        let clone_id = self.gaps.insert(item.clone());
                        if let Some(t) = self.txns.get_mut(item.txn) {
                            t.read_trackers.push(clone_id);
                        }
                        self.attach_gap_to_story(clone_id, new_story, index_pos);
                    }
                }
            }
        }

        let new_key = key_def.extract_key(new_tuple);
        if let Some(gap_ids) = self.point_holes.remove(&((space, index_id), new_key)) {
            for gap_id in gap_ids {
                if let Some(s) = self.stories.story_mut(new_story) {
                    s.reader_list.push(gap_id);
                }
                if let Some(item) = self.gaps.get_mut(gap_id) {
                    item.attached_story = Some(new_story);
                }
            }
        }

        let count_matches: Vec<GapId> = self
            .count_gaps
            .get(&(space, index_id))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|&g| self.count_gap_matches_tuple(g, new_tuple, &key_def))
            .collect();
        for gap_id in count_matches {
            self.attach_gap_to_story(gap_id, new_story, index_pos);
        }
    }

    fn attach_gap_to_story(&mut self, gap_id: GapId, story_id: StoryId, index_pos: usize) {
        if let Some(item) = self.gaps.get_mut(gap_id) {
            item.attached_story = Some(story_id);
        }
        if let Some(s) = self.stories.story_mut(story_id) {
            s.links[index_pos].read_gaps.push(gap_id);
        }
    }

    fn count_gap_matches_key(&self, gap_id: GapId, key: &Key) -> bool {
        matches!(
            self.gaps.get(gap_id).map(|g| &g.kind),
            Some(GapKind::Count { key: gap_key, .. }) if gap_key == key
        )
    }

    fn count_gap_matches_tuple(
        &self,
        gap_id: GapId,
        tuple: &Tuple,
        key_def: &Arc<dyn KeyDef>,
    ) -> bool {
        match self.gaps.get(gap_id).map(|g| &g.kind) {
            Some(GapKind::Count {
                key,
                iterator,
                part_count,
                ..
            }) => {
                let cmp = key_def.compare_tuple_key(tuple, key);
                let decision =
                    gap_policy::decide(*iterator, cmp, *part_count, key_def.part_count());
                decision.track
            }
            _ => false,
        }
    }
}
