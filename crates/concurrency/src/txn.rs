//! The transaction record the manager tracks on the host's behalf.
//!
//! This realizes the "Transaction contract" of the design this manager is
//! modeled on: the fields the manager reads and writes directly
//! (`status`, `psn`, `rv_psn`, `isolation`, the read-tracking lists) live
//! here as a concrete struct rather than a trait the host must implement,
//! since this crate *is* the transaction manager — there is no separate
//! host-side transaction object to adapt to.

use crate::ids::{GapId, StmtId};
use crate::psn::{Psn, UNASSIGNED_PSN};

/// Isolation level, governing whether `clarify` is allowed to observe a
/// prepared-but-uncommitted statement (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// May observe prepared statements.
    ReadCommitted,
    /// May not observe prepared statements.
    ReadConfirmed,
    /// May not observe prepared statements.
    Linearizable,
    /// May observe prepared statements once this transaction has itself
    /// issued at least one statement.
    BestEffort,
}

/// Lifecycle state of a transaction as tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Not yet prepared; may still add statements.
    InProgress,
    /// Sent to a read view by a conflicting preparation; still alive but
    /// now frozen at `rv_psn`.
    InReadView,
    /// Prepared and committed.
    Committed,
    /// Aborted, by conflict or by the host.
    Aborted,
}

/// A transaction, as the manager needs to see it.
#[derive(Debug)]
pub struct Txn {
    /// Current lifecycle state.
    pub status: TxnStatus,
    /// Isolation level, fixed for the transaction's life.
    pub isolation: Isolation,
    /// True for the manager's own bookkeeping transactions (DDL owners,
    /// system-space writers); `visibility::allow_prepared` always allows
    /// prepared reads for these regardless of isolation.
    pub is_system: bool,
    /// PSN this transaction was assigned at its own preparation, or
    /// [`UNASSIGNED_PSN`] before that.
    pub psn: Psn,
    /// PSN frontier this transaction is frozen at, if it has been sent to
    /// a read view. `None` means "not in a read view" (observes
    /// everything up to its own prepare).
    pub rv_psn: Option<Psn>,
    /// Statements issued by this transaction, in issue order.
    pub stmts: Vec<StmtId>,
    /// Every read tracker (point-hole, nearby-gap, full-scan, count-gap)
    /// this transaction owns, regardless of which story or index list it
    /// is currently attached to. Used to tear down all of a transaction's
    /// observations in one pass (§8 invariant 4).
    pub read_trackers: Vec<GapId>,
    /// Set once this transaction has issued its first statement; used by
    /// `Isolation::BestEffort`'s allow-prepared rule.
    pub has_issued_statement: bool,
}

impl Txn {
    /// A fresh, in-progress transaction.
    pub fn new(isolation: Isolation) -> Self {
        Txn {
            status: TxnStatus::InProgress,
            isolation,
            is_system: false,
            psn: UNASSIGNED_PSN,
            rv_psn: None,
            stmts: Vec::new(),
            read_trackers: Vec::new(),
            has_issued_statement: false,
        }
    }

    /// A transaction the manager uses for its own bookkeeping (DDL
    /// owners, space invalidation); always allowed to observe prepared
    /// statements.
    pub fn new_system() -> Self {
        let mut txn = Txn::new(Isolation::ReadCommitted);
        txn.is_system = true;
        txn
    }

    /// The PSN frontier this transaction observes: its own `rv_psn` if it
    /// has been sent to a read view, otherwise "everything".
    pub fn rv_psn_or_infinite(&self) -> Psn {
        self.rv_psn.unwrap_or(crate::psn::INFINITE_PSN)
    }

    /// Whether this transaction currently sits in a read view.
    pub fn is_in_read_view(&self) -> bool {
        self.rv_psn.is_some()
    }

    /// Freeze this transaction at the given PSN frontier. A transaction
    /// already in a read view at an earlier (more restrictive) frontier
    /// keeps the earlier one — a second, later conflict cannot relax an
    /// already-established snapshot.
    pub fn send_to_read_view(&mut self, psn: Psn) {
        if self.status == TxnStatus::Aborted || self.status == TxnStatus::Committed {
            return;
        }
        self.rv_psn = Some(match self.rv_psn {
            Some(existing) => existing.min(psn),
            None => psn,
        });
        self.status = TxnStatus::InReadView;
    }

    /// Kill this transaction due to a write-write or gap conflict.
    pub fn abort_with_conflict(&mut self) {
        self.status = TxnStatus::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_txn_observes_everything() {
        let txn = Txn::new(Isolation::ReadCommitted);
        assert_eq!(txn.rv_psn_or_infinite(), crate::psn::INFINITE_PSN);
        assert!(!txn.is_in_read_view());
    }

    #[test]
    fn send_to_read_view_keeps_tighter_frontier() {
        let mut txn = Txn::new(Isolation::ReadCommitted);
        txn.send_to_read_view(10);
        txn.send_to_read_view(20);
        assert_eq!(txn.rv_psn, Some(10));
    }

    #[test]
    fn aborted_txn_is_not_resurrected_by_read_view() {
        let mut txn = Txn::new(Isolation::ReadCommitted);
        txn.abort_with_conflict();
        txn.send_to_read_view(5);
        assert_eq!(txn.status, TxnStatus::Aborted);
        assert_eq!(txn.rv_psn, None);
    }
}
