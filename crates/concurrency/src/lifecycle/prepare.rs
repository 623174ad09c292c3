//! `prepare_stmt` (§4.3.2): assigns the statement's PSN, re-sorts the
//! chains it touched into the newest→oldest layering the visibility
//! engine assumes, and conflicts every transaction whose snapshot this
//! preparation invalidates.

use memtx_core::{Index, TxResult};
use tracing::{instrument, warn};

use crate::conflict;
use crate::ids::{StmtId, StoryId};
use crate::manager::TxManager;
use crate::psn::Psn;

impl TxManager {
    /// Prepare `stmt` at `psn`. `indexes` must cover every index of the
    /// statement's space, primary first.
    #[instrument(skip(self, indexes), fields(psn))]
    pub fn prepare_stmt(&mut self, stmt: StmtId, psn: Psn, indexes: &mut [&mut dyn Index]) -> TxResult<()> {
        if let Some(s) = self.stmts.get_mut(stmt) {
            s.psn = psn;
        }
        let (add_story, del_story, txn) = match self.stmts.get(stmt) {
            Some(s) => (s.add_story, s.del_story, s.txn),
            None => return Ok(()),
        };

        match add_story {
            Some(add_story) => self.prepare_insert_or_replace(stmt, txn, psn, add_story, del_story, indexes),
            None => {
                if let Some(del_story) = del_story {
                    self.prepare_delete_only(stmt, txn, psn, del_story);
                }
            }
        }
        Ok(())
    }

    fn prepare_insert_or_replace(
        &mut self,
        stmt: StmtId,
        txn: crate::ids::TxnId,
        psn: Psn,
        add_story: StoryId,
        del_story: Option<StoryId>,
        indexes: &mut [&mut dyn Index],
    ) {
        // Step 1: sink add_story below every in-progress older neighbor,
        // in every index.
        for i in 0..indexes.len() {
            loop {
                let older = self
                    .stories
                    .story(add_story)
                    .and_then(|s| s.links[i].older);
                let is_in_progress = older
                    .and_then(|o| self.stories.story(o))
                    .map(|s| s.add_stmt.is_some() && s.add_psn == crate::psn::UNASSIGNED_PSN)
                    .unwrap_or(false);
                if !is_in_progress {
                    break;
                }
                self.stories.reorder(add_story, older.unwrap(), i);
            }
        }

        // Step 2: relink in-progress deleters.
        match del_story {
            None => {
                let mut cursor = self.stories.story(add_story).and_then(|s| s.links[0].newer);
                while let Some(story_id) = cursor {
                    let next = self.stories.story(story_id).and_then(|s| s.links[0].newer);
                    let adder = self.stories.story(story_id).and_then(|s| s.add_stmt);
                    if let Some(adder_stmt) = adder {
                        let (is_own_change, has_del) = self
                            .stmts
                            .get(adder_stmt)
                            .map(|s| (s.is_own_change, s.del_story.is_some()))
                            .unwrap_or((true, true));
                        if !is_own_change && !has_del {
                            self.relink_deleter(adder_stmt, add_story);
                        }
                    }
                    cursor = next;
                }
            }
            Some(old_story) => {
                let deleters: Vec<StmtId> = self.del_list(old_story).into_iter().filter(|&s| s != stmt).collect();
                for deleter in deleters {
                    self.unlink_from_del_list(old_story, deleter);
                    self.relink_deleter(deleter, add_story);
                }
            }
        }

        // Step 3: conflict.
        if let Some(old_story) = del_story {
            self.conflict_readers_of(old_story, psn, Some(txn));
        } else {
            self.conflict_gap_readers_at(add_story, 0, psn, Some(txn));
        }

        // Step 4: secondary-index conflicts. A later writer that stacked
        // its own new story directly on top of `add_story` (it replaced
        // *our* new tuple, in both pk and sk) is exempt — it already
        // depends on us through the primary chain, so conflicting it a
        // second time here would be redundant.
        for i in 1..indexes.len() {
            let mut cursor = self.stories.story(add_story).and_then(|s| s.links[i].newer);
            while let Some(story_id) = cursor {
                let next = self.stories.story(story_id).and_then(|s| s.links[i].newer);
                if let Some(adder_stmt) = self.stories.story(story_id).and_then(|s| s.add_stmt) {
                    let (other_txn, is_own_change, stmt2_del) = match self.stmts.get(adder_stmt) {
                        Some(s) => (s.txn, s.is_own_change, s.del_story),
                        None => (txn, true, None),
                    };
                    if other_txn != txn {
                        let skip_self_replace = is_own_change && stmt2_del.is_none();
                        let same_primary = stmt2_del == Some(add_story);
                        if !skip_self_replace && !same_primary {
                            warn!(target_txn = ?other_txn, psn, "secondary-index conflict, sending to read view");
                            conflict::send_to_read_view(&mut self.txns, &mut self.read_views, other_txn, psn);
                        }
                    }
                }
                cursor = next;
            }
            self.conflict_gap_readers_at(add_story, i, psn, Some(txn));
        }

        // Step 5: stamp PSNs.
        if let Some(s) = self.stories.story_mut(add_story) {
            s.add_psn = psn;
        }
        if let Some(old_story) = del_story {
            if let Some(s) = self.stories.story_mut(old_story) {
                s.del_psn = psn;
            }
        }
    }

    fn prepare_delete_only(&mut self, stmt: StmtId, txn: crate::ids::TxnId, psn: Psn, story_id: StoryId) {
        let others: Vec<StmtId> = self.del_list(story_id).into_iter().filter(|&s| s != stmt).collect();
        for other in others {
            self.unlink_from_del_list(story_id, other);
        }
        self.conflict_readers_of(story_id, psn, Some(txn));
        if let Some(s) = self.stories.story_mut(story_id) {
            s.del_psn = psn;
        }
    }

    /// Every statement in `story`'s delete linked list, head first.
    pub(crate) fn del_list(&self, story: StoryId) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut cursor = self.stories.story(story).and_then(|s| s.del_stmt);
        while let Some(stmt_id) = cursor {
            out.push(stmt_id);
            cursor = self.stmts.get(stmt_id).and_then(|s| s.next_in_del_list);
        }
        out
    }

    /// Splice `stmt` out of `story`'s delete linked list.
    pub(crate) fn unlink_from_del_list(&mut self, story: StoryId, stmt: StmtId) {
        let head = self.stories.story(story).and_then(|s| s.del_stmt);
        let next = self.stmts.get(stmt).and_then(|s| s.next_in_del_list);
        if head == Some(stmt) {
            if let Some(s) = self.stories.story_mut(story) {
                s.del_stmt = next;
            }
        } else {
            let mut cursor = head;
            while let Some(cur_id) = cursor {
                let cur_next = self.stmts.get(cur_id).and_then(|s| s.next_in_del_list);
                if cur_next == Some(stmt) {
                    if let Some(s) = self.stmts.get_mut(cur_id) {
                        s.next_in_del_list = next;
                    }
                    break;
                }
                cursor = cur_next;
            }
        }
        if let Some(s) = self.stmts.get_mut(stmt) {
            s.next_in_del_list = None;
        }
    }

    /// Point `stmt` at `story` as its delete target, prepending it to
    /// `story`'s delete linked list.
    pub(crate) fn relink_deleter(&mut self, stmt: StmtId, story: StoryId) {
        let head = self.stories.story(story).and_then(|s| s.del_stmt);
        if let Some(s) = self.stmts.get_mut(stmt) {
            s.del_story = Some(story);
            s.next_in_del_list = head;
        }
        if let Some(s) = self.stories.story_mut(story) {
            s.del_stmt = Some(stmt);
        }
    }

    fn conflict_readers_of(&mut self, story: StoryId, psn: Psn, except: Option<crate::ids::TxnId>) {
        let readers = self.stories.story(story).map(|s| s.reader_list.clone()).unwrap_or_default();
        let gaps = &self.gaps;
        for gap_id in readers {
            let Some(reader) = gaps.get(gap_id).map(|g| g.txn) else { continue };
            if Some(reader) != except {
                warn!(reader = ?reader, psn, "sending reader to read view on conflict");
                conflict::send_to_read_view(&mut self.txns, &mut self.read_views, reader, psn);
            }
        }
    }

    fn conflict_gap_readers_at(&mut self, story: StoryId, index_pos: usize, psn: Psn, except: Option<crate::ids::TxnId>) {
        let readers = self
            .stories
            .story(story)
            .and_then(|s| s.links.get(index_pos))
            .map(|l| l.read_gaps.clone())
            .unwrap_or_default();
        let gaps = &self.gaps;
        for gap_id in readers {
            let Some(reader) = gaps.get(gap_id).map(|g| g.txn) else { continue };
            if Some(reader) != except {
                conflict::send_to_read_view(&mut self.txns, &mut self.read_views, reader, psn);
            }
        }
    }
}
