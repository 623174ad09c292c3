//! The snapshot cleaner (C9, §4.6): translates a dirty chain head into
//! the tuple a durable checkpoint should actually persist.
//!
//! A checkpoint walker asks, for every chain head it finds in
//! `(space, index)`, "what would a reader who may see prepared-but-not-
//! committed state observe here?" — the last committed-or-prepared
//! version, or nothing if even that much has been deleted. The answer is
//! computed once per `create` and cached, since a checkpoint typically
//! revisits the same head while paging through an index.

use std::collections::HashMap;

use memtx_core::{SpaceId, Tuple, TupleId};

use crate::manager::TxManager;
use crate::txn::{Isolation, Txn};
use crate::visibility;

/// A materialized view over one `(space, index)`'s dirty chain heads, as
/// they should appear in a durable checkpoint.
#[derive(Debug, Default)]
pub struct SnapshotCleaner {
    by_tuple: HashMap<TupleId, Option<Tuple>>,
}

impl TxManager {
    /// Build a [`SnapshotCleaner`] for every chain head currently linked
    /// into the index at `index_pos` of `space`. Each head is resolved as
    /// if observed by a reader that may see prepared-but-uncommitted
    /// state (the strongest "has this been WAL-ordered yet" view a
    /// checkpoint needs), never as the raw physical occupant.
    pub fn snapshot_cleaner_create(&self, space: SpaceId, index_pos: usize) -> SnapshotCleaner {
        let null_reader = Txn::new_system();
        let mut by_tuple = HashMap::new();

        for (story_id, story) in self.stories.stories().iter() {
            if story.space != space {
                continue;
            }
            let Some(link) = story.links.get(index_pos) else {
                continue;
            };
            if link.newer.is_some() || link.excluded {
                continue;
            }
            if !(link.in_index || link.older.is_some()) {
                continue;
            }
            let clarified = visibility::clarify_index(
                self.stories.stories(),
                &self.stmts,
                story_id,
                index_pos,
                Some(&null_reader),
                None,
                false,
                |_| false,
            );
            by_tuple.insert(story.tuple.id(), clarified.tuple);
        }

        SnapshotCleaner { by_tuple }
    }

    /// Drop a cleaner built by [`TxManager::snapshot_cleaner_create`].
    /// Exists as an explicit counterpart to `create` for symmetry with
    /// the host's lifecycle expectations; the cleaner owns no manager
    /// resources that outlive it, so this is just a drop.
    pub fn snapshot_cleaner_destroy(&self, cleaner: SnapshotCleaner) {
        drop(cleaner);
    }
}

impl SnapshotCleaner {
    /// What a checkpoint should persist in place of `tuple`: the
    /// committed-or-prepared version, or `None` if the dirty head should
    /// be skipped entirely (added and already visibly deleted again, or
    /// never became visible in the first place).
    pub fn clarify(&self, tuple: &Tuple) -> Option<Tuple> {
        match self.by_tuple.get(&tuple.id()) {
            Some(resolved) => resolved.clone(),
            None => Some(tuple.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_insert_is_cleaned_to_none() {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 1);
        let txn = mgr.register_txn(Isolation::ReadCommitted);
        let tuple = Tuple::new(vec![1]);
        let story_id = mgr.new_story(SpaceId(0), tuple.clone());
        if let Some(s) = mgr.stories.story_mut(story_id) {
            s.add_stmt = Some(mgr.stmts.insert(crate::stmt::Stmt::new(SpaceId(0), txn)));
            s.links[0].in_index = true;
        }

        let cleaner = mgr.snapshot_cleaner_create(SpaceId(0), 0);
        assert_eq!(cleaner.clarify(&tuple), None);
    }

    #[test]
    fn committed_insert_passes_through() {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 1);
        let tuple = Tuple::new(vec![1]);
        let story_id = mgr.new_story(SpaceId(0), tuple.clone());
        if let Some(s) = mgr.stories.story_mut(story_id) {
            s.links[0].in_index = true;
        }

        let cleaner = mgr.snapshot_cleaner_create(SpaceId(0), 0);
        assert_eq!(cleaner.clarify(&tuple), Some(tuple));
    }
}
