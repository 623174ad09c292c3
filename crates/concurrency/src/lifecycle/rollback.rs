//! `rollback_stmt` (§4.3.4): inverts whatever `prepare_stmt` did, or —
//! for a statement that never allocated stories — rebinds the physical
//! index back to the tuple it displaced.

use memtx_core::{Index, ReplaceMode, TxResult};
use tracing::instrument;

use crate::conflict;
use crate::ids::{StmtId, StoryId};
use crate::manager::TxManager;
use crate::psn::{ROLLBACKED_PSN, UNASSIGNED_PSN};

impl TxManager {
    /// Undo `stmt`. `indexes` must cover every index of the statement's
    /// space, primary first — needed to physically rebind an index entry
    /// when the rolled-back story was still its chain head, or when the
    /// statement never allocated stories at all.
    #[instrument(skip(self, indexes))]
    pub fn rollback_stmt(&mut self, stmt: StmtId, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        let Some(s) = self.stmts.get(stmt) else {
            return Ok(());
        };
        let (add_story, del_story, was_prepared) = (s.add_story, s.del_story, s.psn != UNASSIGNED_PSN);

        match (add_story, was_prepared) {
            (Some(add_story), true) => self.rollback_prepared_insert(stmt, add_story, del_story, indexes)?,
            (Some(_), false) => self.rollback_unprepared_insert(stmt, indexes)?,
            (None, _) => match del_story {
                Some(del_story) if was_prepared => self.rollback_prepared_delete(stmt, del_story),
                Some(_) => self.rollback_unprepared_delete(stmt),
                None => self.rollback_ephemeral(stmt, indexes)?,
            },
        }

        self.stmts.remove(stmt);
        Ok(())
    }

    fn rollback_prepared_insert(
        &mut self,
        stmt: StmtId,
        add_story: StoryId,
        del_story: Option<StoryId>,
        indexes: &mut [&mut dyn Index],
    ) -> TxResult<()> {
        match del_story {
            Some(old_story) => {
                let others: Vec<StmtId> = self
                    .del_list(add_story)
                    .into_iter()
                    .filter(|&s| s != stmt)
                    .collect();
                for other in others {
                    self.unlink_from_del_list(add_story, other);
                    self.relink_deleter(other, old_story);
                }
                if let Some(s) = self.stories.story_mut(old_story) {
                    s.del_psn = UNASSIGNED_PSN;
                }
            }
            None => {
                let others: Vec<StmtId> = self
                    .del_list(add_story)
                    .into_iter()
                    .filter(|&s| s != stmt)
                    .collect();
                for other in others {
                    self.unlink_from_del_list(add_story, other);
                    if let Some(s) = self.stmts.get_mut(other) {
                        s.del_story = None;
                    }
                }
            }
        }

        if let Some(s) = self.stories.story_mut(add_story) {
            s.add_psn = UNASSIGNED_PSN;
            s.del_stmt = None;
        }

        let readers = self
            .stories
            .story(add_story)
            .map(|s| s.reader_list.clone())
            .unwrap_or_default();
        for gap_id in readers {
            if let Some(reader) = self.gaps.get(gap_id).map(|g| g.txn) {
                conflict::abort_with_conflict(&mut self.txns, &mut self.read_views, reader);
            }
        }

        self.sink_to_tail(add_story, indexes)?;
        if let Some(s) = self.stories.story_mut(add_story) {
            s.del_psn = ROLLBACKED_PSN;
        }
        Ok(())
    }

    fn rollback_unprepared_insert(&mut self, stmt: StmtId, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        let Some(add_story) = self.stmts.get(stmt).and_then(|s| s.add_story) else {
            return Ok(());
        };
        self.sink_to_tail(add_story, indexes)?;
        if let Some(s) = self.stories.story_mut(add_story) {
            s.add_psn = UNASSIGNED_PSN;
            s.del_psn = ROLLBACKED_PSN;
        }
        Ok(())
    }

    fn rollback_prepared_delete(&mut self, stmt: StmtId, story: StoryId) {
        self.relink_deleter(stmt, story);
        if let Some(s) = self.stories.story_mut(story) {
            s.del_psn = UNASSIGNED_PSN;
        }
        let gap_readers: Vec<_> = self
            .stories
            .story(story)
            .map(|s| s.links.iter().flat_map(|l| l.read_gaps.clone()).collect())
            .unwrap_or_default();
        for gap_id in gap_readers {
            if let Some(reader) = self.gaps.get(gap_id).map(|g| g.txn) {
                conflict::abort_with_conflict(&mut self.txns, &mut self.read_views, reader);
            }
        }
    }

    fn rollback_unprepared_delete(&mut self, stmt: StmtId) {
        let Some(story) = self.stmts.get(stmt).and_then(|s| s.del_story) else {
            return;
        };
        self.unlink_from_del_list(story, stmt);
        if let Some(s) = self.stories.story_mut(story) {
            s.tuple_is_retained = false;
        }
    }

    fn rollback_ephemeral(&mut self, stmt: StmtId, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        let info = self
            .stmts
            .get(stmt)
            .map(|s| s.rollback_info.clone())
            .unwrap_or_default();
        for idx in indexes.iter_mut() {
            idx.replace(info.new_tuple.as_ref(), info.old_tuple.as_ref(), ReplaceMode::ReplaceOrInsert)?;
        }
        Ok(())
    }

    /// Move `story` to the tail of every index chain it belongs to,
    /// physically restoring the index entry if it was still a chain
    /// head.
    fn sink_to_tail(&mut self, story: StoryId, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        for i in 0..indexes.len() {
            let was_head = self
                .stories
                .story(story)
                .map(|s| s.links[i].in_index)
                .unwrap_or(false);
            let older = self.stories.story(story).and_then(|s| s.links[i].older);

            if was_head {
                let new_tuple = self.stories.story(story).map(|s| s.tuple.clone());
                let restored_tuple = older.and_then(|o| self.stories.story(o)).map(|s| s.tuple.clone());
                indexes[i].replace(
                    new_tuple.as_ref(),
                    restored_tuple.as_ref(),
                    ReplaceMode::ReplaceOrInsert,
                )?;
                if let Some(o) = older {
                    let moved_gaps = self
                        .stories
                        .story_mut(story)
                        .map(|s| std::mem::take(&mut s.links[i].read_gaps))
                        .unwrap_or_default();
                    if let Some(s) = self.stories.story_mut(o) {
                        s.links[i].in_index = true;
                        s.links[i].read_gaps = moved_gaps;
                    }
                }
                if let Some(s) = self.stories.story_mut(story) {
                    s.links[i].in_index = false;
                }
            }

            // Find the current tail from wherever `story` sits and splice
            // it in below it.
            self.stories.unlink(story, i);
            let mut tail = older;
            loop {
                let next_older = tail.and_then(|t| self.stories.story(t)).and_then(|s| s.links[i].older);
                match next_older {
                    Some(n) => tail = Some(n),
                    None => break,
                }
            }
            match tail {
                Some(tail_id) => self.stories.link(story, tail_id, i),
                None => {
                    // The chain had only this one story; it is now both
                    // head and tail again with `older == None`, nothing
                    // further to splice.
                }
            }
        }
        Ok(())
    }
}
