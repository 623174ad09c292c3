//! `commit_stmt` (§4.3.3): drop the now-permanent back-pointers a
//! prepared statement still holds, and drain a share of the GC backlog.

use tracing::instrument;

use crate::ids::StmtId;
use crate::manager::TxManager;

impl TxManager {
    /// Finalize `stmt`: its story chains keep the PSNs stamped at
    /// prepare time, but the statement itself is no longer referenced.
    #[instrument(skip(self))]
    pub fn commit_stmt(&mut self, stmt: StmtId) {
        let Some(s) = self.stmts.get(stmt) else {
            return;
        };
        let (add_story, del_story) = (s.add_story, s.del_story);

        if let Some(story_id) = add_story {
            if let Some(story) = self.stories.story_mut(story_id) {
                if story.add_stmt == Some(stmt) {
                    story.add_stmt = None;
                }
            }
        }
        if let Some(story_id) = del_story {
            self.unlink_from_del_list(story_id, stmt);
        }

        self.stmts.remove(stmt);
        self.drain_gc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtx_core::{IndexDef, IndexId, Key, KeyDefBuilder, ReplaceMode, ReplaceOutcome, SpaceId, Tuple, TxResult};

    struct FakeIndex {
        def: IndexDef,
    }
    impl memtx_core::Index for FakeIndex {
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

    fn fake_index(id: u32) -> FakeIndex {
        FakeIndex {
            def: IndexDef {
                dense_id: IndexId(id),
                space_id: SpaceId(0),
                key_def: KeyDefBuilder::new(1).build(|t| Key::from_slice(t.as_bytes()), |a, b| a.cmp(b)),
            },
        }
    }

    #[test]
    fn commit_clears_add_stmt_back_pointer() {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 1);
        let txn = mgr.register_txn(crate::txn::Isolation::ReadCommitted);
        let mut primary = fake_index(0);
        let mut indexes: Vec<&mut dyn memtx_core::Index> = vec![&mut primary];
        let outcome = mgr
            .add_stmt(
                txn,
                SpaceId(0),
                &mut indexes,
                None,
                Some(Tuple::new(vec![1])),
                ReplaceMode::Insert,
                &[],
            )
            .unwrap();
        let psn = mgr.next_psn();
        mgr.prepare_stmt(outcome.stmt, psn, &mut indexes).unwrap();
        mgr.commit_stmt(outcome.stmt);
        assert!(mgr.stmt(outcome.stmt).is_none());
    }
}
