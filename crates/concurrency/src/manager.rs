//! The transaction manager: one explicit, non-singleton struct owning
//! every arena, hash table and list described in §3/§9. Every operation
//! the manager exposes takes `&mut TxManager` (or `&TxManager` for
//! read-only queries) — there is no ambient or global state anywhere in
//! this crate.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use memtx_core::{IndexId, Key, SpaceId, Tuple, TupleId, TxManagerConfig};

use crate::conflict::ReadViewList;
use crate::func_key::FuncKeyCache;
use crate::gap::GapItem;
use crate::ids::{GapId, StmtId, StoryId, TxnId};
use crate::psn::{Psn, TXN_MIN_PSN};
use crate::stmt::Stmt;
use crate::story::Story;
use crate::store::StoryStore;
use crate::txn::{Isolation, Txn};

/// Key identifying one index of one space, used by every tracker-list
/// table the manager keeps.
pub type SpaceIndex = (SpaceId, IndexId);

/// Aggregate counters exposed by `statistics_collect`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Number of live stories.
    pub stories: usize,
    /// Number of live transactions (any status).
    pub txns: usize,
    /// Number of live read trackers (all kinds combined).
    pub gap_items: usize,
    /// Number of transactions currently in a read view.
    pub in_read_view: usize,
    /// Pending GC backlog steps.
    pub gc_backlog: u32,
    /// Number of cached functional keys.
    pub func_key_cache_len: usize,
}

/// The transaction manager.
///
/// Deliberately `!Sync`: the concurrency model is single-threaded and
/// cooperative (§5), so the manager leans on ordinary `&mut` exclusivity
/// for every mutation instead of internal locking.
#[derive(Debug)]
pub struct TxManager {
    pub(crate) config: TxManagerConfig,

    pub(crate) txns: SlotMap<TxnId, Txn>,
    pub(crate) stmts: SlotMap<StmtId, Stmt>,
    pub(crate) gaps: SlotMap<GapId, GapItem>,
    pub(crate) stories: StoryStore,
    pub(crate) func_keys: FuncKeyCache,

    pub(crate) read_views: ReadViewList,

    /// Point-hole orphan table: an exact key that, last time it was
    /// queried, matched nothing. More than one transaction can probe the
    /// same absent key concurrently, so each key chains every live
    /// tracker rather than keeping only the most recent one.
    pub(crate) point_holes: FxHashMap<(SpaceIndex, Key), Vec<GapId>>,
    /// Nearby-gap trackers not currently attached to any story (no
    /// successor existed when the gap was recorded).
    pub(crate) nearby_orphans: FxHashMap<SpaceIndex, Vec<GapId>>,
    /// Full-scan trackers, per index.
    pub(crate) full_scans: FxHashMap<SpaceIndex, Vec<GapId>>,
    /// Count-gap trackers not yet matched to an inserted story.
    pub(crate) count_gaps: FxHashMap<SpaceIndex, Vec<GapId>>,

    /// Ring of every live story, for the incremental GC crawler (§4.4).
    /// Stale ids (already deleted) are skipped when popped.
    pub(crate) gc_queue: VecDeque<StoryId>,
    pub(crate) gc_backlog: u32,

    pub(crate) next_psn: Psn,
    pub(crate) next_space_index_count: FxHashMap<SpaceId, usize>,
}

impl Default for TxManager {
    fn default() -> Self {
        TxManager::new(TxManagerConfig::default())
    }
}

impl TxManager {
    /// Construct a fresh manager. There is exactly one way to get a
    /// `TxManager`: explicit construction by the host, never a
    /// `static`/`thread_local!`/`once_cell` singleton.
    pub fn new(config: TxManagerConfig) -> Self {
        TxManager {
            config,
            txns: SlotMap::with_key(),
            stmts: SlotMap::with_key(),
            gaps: SlotMap::with_key(),
            stories: StoryStore::new(),
            func_keys: FuncKeyCache::new(),
            read_views: ReadViewList::new(),
            point_holes: FxHashMap::default(),
            nearby_orphans: FxHashMap::default(),
            full_scans: FxHashMap::default(),
            count_gaps: FxHashMap::default(),
            gc_queue: VecDeque::new(),
            gc_backlog: 0,
            next_psn: TXN_MIN_PSN,
            next_space_index_count: FxHashMap::default(),
        }
    }

    /// Record how many indexes `space` has, so chain/link bookkeeping
    /// can size a new story's `links` vector correctly. The host calls
    /// this once per space, typically when the space is created.
    pub fn register_space(&mut self, space: SpaceId, index_count: usize) {
        self.next_space_index_count.insert(space, index_count);
    }

    fn index_count(&self, space: SpaceId) -> usize {
        self.next_space_index_count.get(&space).copied().unwrap_or(1)
    }

    /// Register a new transaction with the manager, returning its handle.
    pub fn register_txn(&mut self, isolation: Isolation) -> TxnId {
        self.txns.insert(Txn::new(isolation))
    }

    /// Register one of the manager's own bookkeeping transactions (DDL
    /// owner, space-invalidation driver). Always allowed to observe
    /// prepared statements regardless of isolation.
    pub fn acquire_ddl(&mut self) -> TxnId {
        self.txns.insert(Txn::new_system())
    }

    /// Assign the next PSN and advance the counter. Called by the host
    /// immediately before `prepare_stmt`.
    pub fn next_psn(&mut self) -> Psn {
        let psn = self.next_psn;
        self.next_psn += 1;
        psn
    }

    /// Immutable access to a transaction.
    pub fn txn(&self, id: TxnId) -> Option<&Txn> {
        self.txns.get(id)
    }

    /// Mutable access to a transaction.
    pub fn txn_mut(&mut self, id: TxnId) -> Option<&mut Txn> {
        self.txns.get_mut(id)
    }

    /// Immutable access to a statement.
    pub fn stmt(&self, id: StmtId) -> Option<&Stmt> {
        self.stmts.get(id)
    }

    /// Immutable access to a story.
    pub fn story(&self, id: StoryId) -> Option<&Story> {
        self.stories.story(id)
    }

    /// Tear down every reader/gap-tracker reference to `txn` (§8
    /// invariant 4) and drop the transaction record itself.
    pub fn clean_txn(&mut self, txn: TxnId) {
        let tracker_ids: Vec<GapId> = self
            .txns
            .get(txn)
            .map(|t| t.read_trackers.clone())
            .unwrap_or_default();

        for gap_id in tracker_ids {
            self.remove_gap_item(gap_id);
        }
        self.read_views.remove(txn);
        self.txns.remove(txn);
    }

    /// Remove a gap tracker from whatever list/story it is attached to,
    /// and from the gaps arena.
    pub(crate) fn remove_gap_item(&mut self, gap_id: GapId) {
        let Some(item) = self.gaps.remove(gap_id) else {
            return;
        };
        if let Some(story_id) = item.attached_story {
            if let Some(story) = self.stories.story_mut(story_id) {
                story.reader_list.retain(|&g| g != gap_id);
                for link in &mut story.links {
                    link.read_gaps.retain(|&g| g != gap_id);
                }
            }
        } else {
            let index = item.kind.index();
            match &item.kind {
                crate::gap::GapKind::StoryRead { .. } => {
                    // A StoryRead is only ever created already attached
                    // to a story (see query::clarify) — it never sits in
                    // an orphan table, so there is nothing to scan here.
                }
                crate::gap::GapKind::PointHole { key, .. } => {
                    // space is unknown here; point_holes is keyed by
                    // (space,index,key) so we scan — orphan point-holes
                    // are rare enough that this stays cheap relative to
                    // story churn.
                    self.point_holes.retain(|(si, k), gids| {
                        if si.1 == index && k == key {
                            gids.retain(|&g| g != gap_id);
                        }
                        !gids.is_empty()
                    });
                }
                crate::gap::GapKind::Nearby { .. } => {
                    for list in self.nearby_orphans.values_mut() {
                        list.retain(|&g| g != gap_id);
                    }
                }
                crate::gap::GapKind::FullScan { .. } => {
                    for list in self.full_scans.values_mut() {
                        list.retain(|&g| g != gap_id);
                    }
                }
                crate::gap::GapKind::Count { .. } => {
                    for list in self.count_gaps.values_mut() {
                        list.retain(|&g| g != gap_id);
                    }
                }
            }
        }
        if let Some(t) = item_owner_txn(&mut self.txns, item.txn) {
            t.read_trackers.retain(|&g| g != gap_id);
        }
    }

    pub(crate) fn new_story(&mut self, space: SpaceId, tuple: Tuple) -> StoryId {
        let count = self.index_count(space);
        let id = self.stories.new_story(space, tuple, count);
        self.gc_queue.push_back(id);
        self.charge_gc_backlog();
        id
    }

    pub(crate) fn charge_gc_backlog(&mut self) {
        self.gc_backlog = self.gc_backlog.saturating_add(self.config.steps_per_mutation);
    }

    /// Resolve the story for an already-dirty tuple, as a host must
    /// after a physical scan turns up a tuple it needs `clarify` on
    /// (§6's `clarify(txn, space, tuple, index, mk_index)`). `None` means
    /// the tuple has no pending history and is visible to everyone as-is.
    pub fn lookup_story_by_tuple(&self, tuple_id: TupleId) -> Option<StoryId> {
        self.stories.get(tuple_id)
    }

    /// Record a functional-index key for `tuple`, computing it with
    /// `compute` on first access and reusing the cached value after.
    pub fn save_func_key(&mut self, tuple: &Tuple, index: IndexId, compute: impl FnOnce(&Tuple) -> Tuple) -> Tuple {
        self.func_keys.get_or_compute(tuple, index, compute)
    }

    /// Snapshot the manager's aggregate counters.
    pub fn statistics_collect(&self) -> Statistics {
        Statistics {
            stories: self.stories.stories().len(),
            txns: self.txns.len(),
            gap_items: self.gaps.len(),
            in_read_view: self.txns.values().filter(|t| t.is_in_read_view()).count(),
            gc_backlog: self.gc_backlog,
            func_key_cache_len: self.func_keys.len(),
        }
    }
}

fn item_owner_txn(txns: &mut SlotMap<TxnId, Txn>, id: TxnId) -> Option<&mut Txn> {
    txns.get_mut(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_clean_txn() {
        let mut mgr = TxManager::default();
        let txn = mgr.register_txn(Isolation::ReadCommitted);
        assert!(mgr.txn(txn).is_some());
        mgr.clean_txn(txn);
        assert!(mgr.txn(txn).is_none());
    }

    #[test]
    fn next_psn_is_monotonic() {
        let mut mgr = TxManager::default();
        let a = mgr.next_psn();
        let b = mgr.next_psn();
        assert!(b > a);
    }

    #[test]
    fn new_story_charges_gc_backlog() {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 1);
        mgr.new_story(SpaceId(0), Tuple::new(vec![1]));
        assert_eq!(mgr.gc_backlog, 2);
    }
}
