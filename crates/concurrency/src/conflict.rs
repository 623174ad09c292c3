//! Conflict engine (C7): upgrades other transactions to a deeper read
//! view, or aborts them outright, in reaction to a preparation event.
//!
//! The read-view list is a global, `rv_psn`-ascending list the GC
//! consults for `lowest_rv_psn` (§4.4). Every insertion must preserve
//! that order (§8 invariant 3).

use slotmap::SlotMap;

use crate::ids::{GapId, TxnId};
use crate::manager::TxManager;
use crate::psn::Psn;
use crate::story::Story;
use crate::txn::{Txn, TxnStatus};

/// The global read-view list: transactions currently frozen at some
/// `rv_psn`, sorted ascending by that PSN.
#[derive(Debug, Default)]
pub struct ReadViewList {
    ordered: Vec<TxnId>,
}

impl ReadViewList {
    /// A fresh, empty list.
    pub fn new() -> Self {
        ReadViewList { ordered: Vec::new() }
    }

    /// Insert (or move) `txn`, keeping the list sorted ascending by
    /// `rv_psn`.
    pub fn insert(&mut self, txns: &SlotMap<TxnId, Txn>, txn: TxnId) {
        self.ordered.retain(|&t| t != txn);
        let psn = txns.get(txn).map(|t| t.rv_psn_or_infinite()).unwrap_or(Psn::MAX);
        let pos = self
            .ordered
            .partition_point(|&t| txns.get(t).map(|o| o.rv_psn_or_infinite()).unwrap_or(Psn::MAX) <= psn);
        self.ordered.insert(pos, txn);
    }

    /// Remove `txn` from the list (on abort or commit).
    pub fn remove(&mut self, txn: TxnId) {
        self.ordered.retain(|&t| t != txn);
    }

    /// The lowest `rv_psn` among tracked transactions, or `next_psn` if
    /// the list is empty (§4.4).
    pub fn lowest_rv_psn(&self, txns: &SlotMap<TxnId, Txn>, next_psn: Psn) -> Psn {
        self.ordered
            .first()
            .and_then(|&t| txns.get(t))
            .map(|t| t.rv_psn_or_infinite())
            .unwrap_or(next_psn)
    }

    /// Whether the list is sorted ascending by `rv_psn` — an invariant
    /// check, not used on any hot path.
    pub fn is_sorted(&self, txns: &SlotMap<TxnId, Txn>) -> bool {
        self.ordered
            .windows(2)
            .all(|w| {
                let a = txns.get(w[0]).map(|t| t.rv_psn_or_infinite()).unwrap_or(Psn::MAX);
                let b = txns.get(w[1]).map(|t| t.rv_psn_or_infinite()).unwrap_or(Psn::MAX);
                a <= b
            })
    }

    /// Iterate tracked transactions in ascending `rv_psn` order.
    pub fn iter(&self) -> impl Iterator<Item = TxnId> + '_ {
        self.ordered.iter().copied()
    }
}

/// Send `txn` into a read view frozen at `psn`, registering it in
/// `read_views` so the GC's `lowest_rv_psn` accounts for it.
pub fn send_to_read_view(
    txns: &mut SlotMap<TxnId, Txn>,
    read_views: &mut ReadViewList,
    txn: TxnId,
    psn: Psn,
) {
    if let Some(t) = txns.get_mut(txn) {
        if t.status == TxnStatus::Aborted || t.status == TxnStatus::Committed {
            return;
        }
        t.send_to_read_view(psn);
    }
    read_views.insert(txns, txn);
}

/// Kill `txn` outright. If it was in the read-view list, remove it —
/// subsequent operations by the host against this txn must observe
/// `TxnStatus::Aborted`.
pub fn abort_with_conflict(
    txns: &mut SlotMap<TxnId, Txn>,
    read_views: &mut ReadViewList,
    txn: TxnId,
) {
    if let Some(t) = txns.get_mut(txn) {
        t.abort_with_conflict();
    }
    read_views.remove(txn);
}

/// Abort every transaction referenced by a story's `reader_list`, except
/// `except`. Used when a story transitions in a way that invalidates
/// what its readers observed (e.g. `rollback_stmt` undoing an insert).
pub fn abort_all_readers_except(
    txns: &mut SlotMap<TxnId, Txn>,
    read_views: &mut ReadViewList,
    story: &Story,
    except: Option<TxnId>,
    resolve_reader: impl Fn(GapId) -> TxnId,
) {
    for &gap in &story.reader_list {
        let reader = resolve_reader(gap);
        if Some(reader) != except {
            abort_with_conflict(txns, read_views, reader);
        }
    }
}

/// Send every transaction referenced by a story's `reader_list` to a
/// read view at `psn`, except `except` (the preparing transaction itself
/// never conflicts with its own change).
pub fn send_all_readers_to_read_view_except(
    txns: &mut SlotMap<TxnId, Txn>,
    read_views: &mut ReadViewList,
    story: &Story,
    psn: Psn,
    except: Option<TxnId>,
    resolve_reader: impl Fn(GapId) -> TxnId,
) {
    for &gap in &story.reader_list {
        let reader = resolve_reader(gap);
        if Some(reader) != except {
            send_to_read_view(txns, read_views, reader, psn);
        }
    }
}

/// Send every gap tracker positioned at a chain link to a read view at
/// `psn`, except `except`.
pub fn send_gap_readers_to_read_view_except(
    txns: &mut SlotMap<TxnId, Txn>,
    read_views: &mut ReadViewList,
    read_gaps: &[GapId],
    psn: Psn,
    except: Option<TxnId>,
    resolve_reader: impl Fn(GapId) -> TxnId,
) {
    for &gap in read_gaps {
        let reader = resolve_reader(gap);
        if Some(reader) != except {
            send_to_read_view(txns, read_views, reader, psn);
        }
    }
}

impl TxManager {
    /// Kill `txn` outright due to a conflict the host itself detected
    /// (e.g. finding its own transaction already in a read view at
    /// commit time). The manager's own lifecycle calls never need this —
    /// they go through the module-private helpers above — this exists
    /// for the host-driven case §6 names directly.
    pub fn abort_with_conflict(&mut self, txn: TxnId) {
        abort_with_conflict(&mut self.txns, &mut self.read_views, txn);
    }

    /// Freeze `txn` at `psn`, as the manager's own lifecycle calls do
    /// internally, exposed for a host that needs to send a reader to a
    /// read view for a reason the manager itself didn't detect.
    pub fn send_to_read_view(&mut self, txn: TxnId, psn: Psn) {
        send_to_read_view(&mut self.txns, &mut self.read_views, txn, psn);
    }
}
