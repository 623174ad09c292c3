//! Space invalidation (C10, §4.7): the DDL path. A space changing shape
//! (an index dropped or altered) cannot be observed consistently by
//! anyone holding an older view of it, so every such observer is killed
//! and the space's version history is thrown away wholesale.

use memtx_core::{Index, ReplaceMode, SpaceId, TxResult};
use tracing::instrument;

use crate::conflict;
use crate::ids::{GapId, TxnId};
use crate::manager::TxManager;
use crate::visibility;

impl TxManager {
    /// Invalidate every story, tracker and observer of `space`, sparing
    /// only `ddl_owner`. `indexes` must cover every index of `space`,
    /// primary first, so chain heads can be physically rebound to what
    /// `ddl_owner` sees before the history is dropped.
    #[instrument(skip(self, indexes))]
    pub fn invalidate_space(&mut self, space: SpaceId, ddl_owner: TxnId, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        for victim in self.observers_of_space(space, ddl_owner) {
            conflict::abort_with_conflict(&mut self.txns, &mut self.read_views, victim);
            if let Some(t) = self.txns.get(victim) {
                for &stmt_id in &t.stmts.clone() {
                    if let Some(s) = self.stmts.get_mut(stmt_id) {
                        s.engine_savepoint = None;
                    }
                }
            }
        }

        self.rebind_chain_heads_to_ddl_owner(space, ddl_owner, indexes)?;
        self.destroy_space_history(space);
        Ok(())
    }

    /// Every transaction with any observation of `space` — reader,
    /// gap/point-hole/full-scan/count reader, or writer — other than
    /// `except`.
    fn observers_of_space(&self, space: SpaceId, except: TxnId) -> Vec<TxnId> {
        let mut out = Vec::new();

        for (_, story) in self.stories.stories().iter() {
            if story.space != space {
                continue;
            }
            for &gap_id in &story.reader_list {
                if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                    out.push(txn);
                }
            }
            for link in &story.links {
                for &gap_id in &link.read_gaps {
                    if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                        out.push(txn);
                    }
                }
            }
            if let Some(stmt_id) = story.add_stmt {
                if let Some(txn) = self.stmts.get(stmt_id).map(|s| s.txn) {
                    out.push(txn);
                }
            }
            let mut cursor = story.del_stmt;
            while let Some(stmt_id) = cursor {
                if let Some(s) = self.stmts.get(stmt_id) {
                    out.push(s.txn);
                    cursor = s.next_in_del_list;
                } else {
                    break;
                }
            }
        }

        for (&(s, _), gap_ids) in &self.point_holes {
            if s.0 == space {
                for &gap_id in gap_ids {
                    if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                        out.push(txn);
                    }
                }
            }
        }
        for (&(s, _), gap_ids) in &self.nearby_orphans {
            if s == space {
                for &gap_id in gap_ids {
                    if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                        out.push(txn);
                    }
                }
            }
        }
        for (&(s, _), gap_ids) in &self.full_scans {
            if s == space {
                for &gap_id in gap_ids {
                    if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                        out.push(txn);
                    }
                }
            }
        }
        for (&(s, _), gap_ids) in &self.count_gaps {
            if s == space {
                for &gap_id in gap_ids {
                    if let Some(txn) = self.gaps.get(gap_id).map(|g| g.txn) {
                        out.push(txn);
                    }
                }
            }
        }

        out.retain(|&t| t != except);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// For every index of `space`, replace whatever is physically there
    /// with the tuple `ddl_owner` is entitled to see (the owner always
    /// observes prepared state, §4.2), so the persistence layer never
    /// sees a dangling reference into history about to be destroyed.
    fn rebind_chain_heads_to_ddl_owner(
        &mut self,
        space: SpaceId,
        ddl_owner: TxnId,
        indexes: &mut [&mut dyn Index],
    ) -> TxResult<()> {
        let owner_txn = self.txns.get(ddl_owner);
        for (index_pos, index) in indexes.iter_mut().enumerate() {
            let heads: Vec<_> = self
                .stories
                .stories()
                .iter()
                .filter(|(_, s)| {
                    s.space == space
                        && s.links
                            .get(index_pos)
                            .map(|l| l.newer.is_none() && (l.in_index || l.older.is_some()))
                            .unwrap_or(false)
                })
                .map(|(id, s)| (id, s.tuple.clone(), s.links[index_pos].in_index))
                .collect();

            for (story_id, old_tuple, in_index) in heads {
                let stmts = &self.stmts;
                let clarified = visibility::clarify_index(
                    self.stories.stories(),
                    stmts,
                    story_id,
                    index_pos,
                    owner_txn,
                    Some(ddl_owner),
                    true,
                    |stmt_id| stmts.get(stmt_id).map(|s| s.txn) == Some(ddl_owner),
                );
                if in_index {
                    index.replace(Some(&old_tuple), clarified.tuple.as_ref(), ReplaceMode::ReplaceOrInsert)?;
                }
            }
        }
        Ok(())
    }

    /// Drop every story, gap item and tracker-list entry belonging to
    /// `space`. No physical index access here — [`Self::rebind_chain_heads_to_ddl_owner`]
    /// has already made the index consistent with what survives.
    ///
    /// Every gap item is torn down through [`TxManager::remove_gap_item`],
    /// which also scrubs the owning transaction's `read_trackers` list —
    /// a blanket filter on the four tracker-list tables alone would leak
    /// the arena entries and leave dangling ids in `read_trackers`.
    fn destroy_space_history(&mut self, space: SpaceId) {
        let story_ids: Vec<_> = self
            .stories
            .stories()
            .iter()
            .filter(|(_, s)| s.space == space)
            .map(|(id, _)| id)
            .collect();

        let mut gap_ids: Vec<GapId> = Vec::new();
        for (&(si, _), gids) in &self.point_holes {
            if si.0 == space {
                gap_ids.extend(gids.iter().copied());
            }
        }
        for (&si, gids) in &self.nearby_orphans {
            if si.0 == space {
                gap_ids.extend(gids.iter().copied());
            }
        }
        for (&si, gids) in &self.full_scans {
            if si.0 == space {
                gap_ids.extend(gids.iter().copied());
            }
        }
        for (&si, gids) in &self.count_gaps {
            if si.0 == space {
                gap_ids.extend(gids.iter().copied());
            }
        }
        for &story_id in &story_ids {
            if let Some(story) = self.stories.story(story_id) {
                gap_ids.extend(story.reader_list.iter().copied());
                for link in &story.links {
                    gap_ids.extend(link.read_gaps.iter().copied());
                }
            }
        }
        gap_ids.sort_unstable();
        gap_ids.dedup();
        for gap_id in gap_ids {
            self.remove_gap_item(gap_id);
        }

        for &story_id in &story_ids {
            if let Some(story) = self.stories.story(story_id) {
                let index_count = story.links.len();
                for i in 0..index_count {
                    self.stories.unlink(story_id, i);
                }
            }
        }

        for &story_id in &story_ids {
            if let Some(story) = self.stories.story(story_id) {
                self.func_keys.evict_tuple(story.tuple.id());
            }
            self.stories.delete(story_id);
            self.gc_queue.retain(|&id| id != story_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtx_core::{IndexDef, IndexId, Key, KeyDefBuilder, ReplaceOutcome, SpaceId, Tuple};

    struct FakeIndex {
        def: IndexDef,
        current: Option<Tuple>,
    }
    impl memtx_core::Index for FakeIndex {
        fn replace(&mut self, _old: Option<&Tuple>, new: Option<&Tuple>, _mode: ReplaceMode) -> TxResult<ReplaceOutcome> {
            self.current = new.cloned();
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
                key_def: KeyDefBuilder::new(1).build(|t| Key::from_slice(t.as_bytes()), |a, b| a.cmp(b)),
            },
            current: None,
        }
    }

    #[test]
    fn invalidate_aborts_observers_and_destroys_history() {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 1);
        let ddl_owner = mgr.acquire_ddl();
        let reader = mgr.register_txn(crate::txn::Isolation::ReadCommitted);

        let story_id = mgr.new_story(SpaceId(0), Tuple::new(vec![1]));
        if let Some(s) = mgr.stories.story_mut(story_id) {
            s.links[0].in_index = true;
        }
        let gap = mgr.track_full_scan(reader, SpaceId(0), IndexId(0));
        if let Some(s) = mgr.stories.story_mut(story_id) {
            s.links[0].read_gaps.push(gap);
        }

        let mut primary = fake_index();
        let mut indexes: Vec<&mut dyn memtx_core::Index> = vec![&mut primary];
        mgr.invalidate_space(SpaceId(0), ddl_owner, &mut indexes).unwrap();

        assert_eq!(mgr.txn(reader).unwrap().status, crate::txn::TxnStatus::Aborted);
        assert!(mgr.story(story_id).is_none());
        assert!(mgr.full_scans.is_empty());
    }
}
