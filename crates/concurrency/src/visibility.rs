//! The visibility engine (C5, §4.2): decides, for a `(txn, story, index)`
//! triple, what tuple — if any — is observed.

use memtx_core::Tuple;
use slotmap::SlotMap;

use crate::ids::{StmtId, StoryId, TxnId};
use crate::psn::INFINITE_PSN;
use crate::stmt::Stmt;
use crate::story::Story;
use crate::txn::{Isolation, Txn};

/// `rv_psn(txn)`: the PSN frontier a transaction observes. A transaction
/// in a read view sees only PSNs strictly less than its `rv_psn`; a
/// transaction not in a read view sees everything, modeled here as
/// `+infinity` since it has no frontier yet.
pub fn rv_psn(txn: Option<&Txn>) -> i64 {
    match txn {
        Some(t) => t.rv_psn_or_infinite(),
        None => INFINITE_PSN,
    }
}

/// Whether `txn` is allowed to observe a prepared-but-uncommitted
/// statement in `is_system_space`.
///
/// - System spaces always allow it.
/// - The manager's own bookkeeping transactions (`Txn::is_system`) always
///   allow it, regardless of isolation.
/// - A null `txn` (autocommit read) never does.
/// - `ReadCommitted` always does.
/// - `ReadConfirmed` / `Linearizable` never do.
/// - `BestEffort` does once the transaction has issued a statement of its
///   own (i.e. is effectively read-write).
pub fn allow_prepared(txn: Option<&Txn>, is_system_space: bool) -> bool {
    if is_system_space {
        return true;
    }
    match txn {
        None => false,
        Some(t) => {
            if t.is_system {
                return true;
            }
            match t.isolation {
                Isolation::ReadCommitted => true,
                Isolation::ReadConfirmed | Isolation::Linearizable => false,
                Isolation::BestEffort => t.has_issued_statement,
            }
        }
    }
}

/// Outcome of [`clarify_index`]: either the tuple observed, or nothing,
/// plus an optional PSN the reader must be sent to a read view at (the
/// mechanism by which skipping a prepared statement turns a read into a
/// pre-commit snapshot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clarified {
    /// The observed tuple, if any.
    pub tuple: Option<Tuple>,
    /// If clarification skipped a prepared add/delete belonging to
    /// another transaction, the PSN the reader must be frozen at.
    pub send_to_read_view_psn: Option<i64>,
    /// Which story this read should be tracked against, and `None` when
    /// the read resolved to the reader's own change (own changes are
    /// never tracked — a transaction cannot conflict with itself).
    ///
    /// When [`Self::tuple`] is `None` this is always `start` (the chain
    /// head): a reader who found nothing must be told about *any* later
    /// write to the head position, not just one at the story that
    /// happened to decide invisibility. When `tuple` is `Some`, this is
    /// the exact story whose version became visible.
    pub track_story: Option<StoryId>,
}

/// Walk index `index`'s chain starting at `start`, resolving what `reader`
/// observes.
///
/// `owns_stmt` must report whether a given statement handle belongs to
/// the reading transaction itself — own changes are always visible to
/// their own author and never trigger a read-view detour. A story can
/// carry more than one in-progress deleter at once (`story.del_stmt`
/// only heads the list; the rest hang off `Stmt::next_in_del_list`), so
/// deletion ownership is resolved by walking the whole list rather than
/// just its head — otherwise an earlier deleter stops recognizing its
/// own uncommitted delete the moment a second transaction queues up
/// behind it.
pub fn clarify_index(
    stories: &SlotMap<StoryId, Story>,
    stmts: &SlotMap<StmtId, Stmt>,
    start: StoryId,
    index: usize,
    reader: Option<&Txn>,
    _reader_txn_id: Option<TxnId>,
    is_system_space: bool,
    owns_stmt: impl Fn(StmtId) -> bool,
) -> Clarified {
    let allow_prep = allow_prepared(reader, is_system_space);
    let frontier = rv_psn(reader);
    let mut cursor = Some(start);
    let mut send_to_rv: Option<i64> = None;

    while let Some(story_id) = cursor {
        let story = match stories.get(story_id) {
            Some(s) => s,
            None => break,
        };

        let del_is_own = {
            let mut deleter = story.del_stmt;
            let mut is_own = false;
            while let Some(stmt_id) = deleter {
                if owns_stmt(stmt_id) {
                    is_own = true;
                    break;
                }
                deleter = stmts.get(stmt_id).and_then(|s| s.next_in_del_list);
            }
            is_own
        };
        let del_prepared_visible = allow_prep && story.del_psn != 0 && story.del_psn < frontier;
        let del_committed_visible =
            story.del_psn != 0 && story.del_stmt.is_none() && story.del_psn < frontier;
        let delete_visible = del_is_own || del_prepared_visible || del_committed_visible;

        if delete_visible {
            return Clarified {
                tuple: None,
                send_to_read_view_psn: send_to_rv,
                track_story: if del_is_own { None } else { Some(start) },
            };
        }
        if story.del_psn != 0 && !del_is_own && story.del_psn >= frontier {
            send_to_rv = Some(send_to_rv.map_or(story.del_psn, |e: i64| e.min(story.del_psn)));
        }

        let add_is_own = story.add_stmt.map(&owns_stmt).unwrap_or(false);
        let add_long_ago = story.add_stmt.is_none() && story.add_psn == 0;
        let add_prepared_visible = allow_prep && story.add_psn != 0 && story.add_psn < frontier;
        let add_committed_visible =
            story.add_psn != 0 && story.add_stmt.is_none() && story.add_psn < frontier;
        let insert_visible =
            add_is_own || add_long_ago || add_prepared_visible || add_committed_visible;

        if insert_visible {
            return Clarified {
                tuple: Some(story.tuple.clone()),
                send_to_read_view_psn: send_to_rv,
                track_story: if add_is_own { None } else { Some(story_id) },
            };
        }
        if story.add_psn != 0 && !add_is_own {
            send_to_rv = Some(send_to_rv.map_or(story.add_psn, |e: i64| e.min(story.add_psn)));
        }

        cursor = story.links.get(index).and_then(|l| l.older);
    }

    Clarified {
        tuple: None,
        send_to_read_view_psn: send_to_rv,
        track_story: Some(start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtx_core::SpaceId;
    use slotmap::SlotMap;

    fn story(tuple_byte: u8) -> Story {
        Story::new(SpaceId(0), Tuple::new(vec![tuple_byte]), 1)
    }

    #[test]
    fn committed_insert_with_no_stmt_is_visible() {
        let mut stories: SlotMap<StoryId, Story> = SlotMap::with_key();
        let stmts: SlotMap<StmtId, Stmt> = SlotMap::with_key();
        let mut s = story(1);
        s.add_stmt = None;
        s.add_psn = 0;
        let id = stories.insert(s);

        let clarified = clarify_index(&stories, &stmts, id, 0, None, None, false, |_| false);
        assert_eq!(clarified.tuple, Some(Tuple::new(vec![1])));
    }

    #[test]
    fn uncommitted_insert_by_other_txn_is_invisible_to_autocommit_read() {
        let mut stories: SlotMap<StoryId, Story> = SlotMap::with_key();
        let mut txns: SlotMap<TxnId, ()> = SlotMap::with_key();
        let mut stmts: SlotMap<StmtId, Stmt> = SlotMap::with_key();
        let txn_id = txns.insert(());
        let stmt_id = stmts.insert(Stmt::new(SpaceId(0), txn_id));
        let mut s = story(1);
        s.add_stmt = Some(stmt_id);
        s.add_psn = 0;
        let id = stories.insert(s);

        let clarified = clarify_index(&stories, &stmts, id, 0, None, None, false, |_| false);
        assert_eq!(clarified.tuple, None);
    }

    #[test]
    fn prepared_insert_visible_under_read_committed() {
        let mut stories: SlotMap<StoryId, Story> = SlotMap::with_key();
        let stmts: SlotMap<StmtId, Stmt> = SlotMap::with_key();
        let mut s = story(1);
        s.add_stmt = None;
        s.add_psn = 5;
        let id = stories.insert(s);

        let mut reader = Txn::new(Isolation::ReadCommitted);
        reader.rv_psn = None;
        let clarified =
            clarify_index(&stories, &stmts, id, 0, Some(&reader), None, false, |_| false);
        assert_eq!(clarified.tuple, Some(Tuple::new(vec![1])));
    }

    #[test]
    fn prepared_delete_sends_reader_to_read_view() {
        let mut stories: SlotMap<StoryId, Story> = SlotMap::with_key();
        let stmts: SlotMap<StmtId, Stmt> = SlotMap::with_key();
        let mut s = story(1);
        s.add_stmt = None;
        s.add_psn = 0;
        s.del_stmt = None;
        s.del_psn = 7;
        let id = stories.insert(s);

        let mut reader = Txn::new(Isolation::ReadCommitted);
        reader.rv_psn = None;
        let clarified =
            clarify_index(&stories, &stmts, id, 0, Some(&reader), None, false, |_| false);
        assert_eq!(clarified.tuple, None);
        assert_eq!(clarified.send_to_read_view_psn, Some(7));
    }

    #[test]
    fn del_list_walk_recognizes_non_head_own_delete() {
        let mut stories: SlotMap<StoryId, Story> = SlotMap::with_key();
        let mut txns: SlotMap<TxnId, ()> = SlotMap::with_key();
        let mut stmts: SlotMap<StmtId, Stmt> = SlotMap::with_key();

        let txn_a = txns.insert(());
        let txn_b = txns.insert(());
        let stmt_a = stmts.insert(Stmt::new(SpaceId(0), txn_a));
        let mut stmt_b = Stmt::new(SpaceId(0), txn_b);
        stmt_b.next_in_del_list = Some(stmt_a);
        let stmt_b = stmts.insert(stmt_b);

        let mut s = story(1);
        s.add_stmt = None;
        s.add_psn = 0;
        s.del_stmt = Some(stmt_b);
        s.del_psn = 0;
        let id = stories.insert(s);

        let clarified = clarify_index(&stories, &stmts, id, 0, None, None, false, |stmt_id| {
            stmts.get(stmt_id).map(|s| s.txn) == Some(txn_a)
        });
        assert_eq!(clarified.tuple, None);
        assert_eq!(clarified.track_story, None);
    }
}
