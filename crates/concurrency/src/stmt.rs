//! The statement record the manager tracks per DML operation.
//!
//! Realizes the "Statement contract" (§6): `space`, `txn`, `add_story`,
//! `del_story`, `next_in_del_list`, `is_own_change`, `rollback_info` and
//! `engine_savepoint` all appear here, verbatim in meaning.

use memtx_core::{SpaceId, Tuple};

use crate::ids::{StmtId, StoryId, TxnId};
use crate::psn::{Psn, UNASSIGNED_PSN};

/// What a statement would need to restore physical index state if it
/// never allocated stories at all (the ephemeral-space / no-op-delete /
/// DDL-cleanup path of §4.3.4).
#[derive(Debug, Clone, Default)]
pub struct RollbackInfo {
    /// The tuple previously occupying the slot, if any.
    pub old_tuple: Option<Tuple>,
    /// The tuple this statement placed, if any.
    pub new_tuple: Option<Tuple>,
}

/// One DML statement observed by the manager via `add_stmt`.
#[derive(Debug)]
pub struct Stmt {
    /// Space this statement mutated.
    pub space: SpaceId,
    /// Owning transaction.
    pub txn: TxnId,
    /// Story this statement added, if any.
    pub add_story: Option<StoryId>,
    /// Story this statement intends to delete, if any.
    pub del_story: Option<StoryId>,
    /// Next statement in `del_story`'s linked list of in-progress
    /// deleters (the list `del_story.del_stmt` heads).
    pub next_in_del_list: Option<StmtId>,
    /// True if this statement's effect is observed by the same
    /// transaction that produced it — own changes never conflict with
    /// themselves.
    pub is_own_change: bool,
    /// What to restore on rollback if no story was ever allocated.
    pub rollback_info: RollbackInfo,
    /// A host-side savepoint token the engine can use to undo its own
    /// state alongside this statement's rollback. Opaque to the manager;
    /// cleared (never dereferenced) during space invalidation (§4.7).
    pub engine_savepoint: Option<u64>,
    /// PSN assigned when this statement's transaction prepared; 0 until
    /// then.
    pub psn: Psn,
}

impl Stmt {
    /// A statement that has not yet prepared.
    pub fn new(space: SpaceId, txn: TxnId) -> Self {
        Stmt {
            space,
            txn,
            add_story: None,
            del_story: None,
            next_in_del_list: None,
            is_own_change: false,
            rollback_info: RollbackInfo::default(),
            engine_savepoint: None,
            psn: UNASSIGNED_PSN,
        }
    }

    /// Whether this statement ever allocated a story (i.e. it is not the
    /// ephemeral-space / ddl-cleanup path of §4.3.4).
    pub fn touched_a_story(&self) -> bool {
        self.add_story.is_some() || self.del_story.is_some()
    }
}
