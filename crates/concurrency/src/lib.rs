//! Multi-version concurrency control for an in-memory, index-organized
//! store.
//!
//! This crate is the transaction manager itself: a single explicit
//! [`TxManager`] that a host embeds to get snapshot-isolated reads over a
//! set of physical indexes it owns, without blocking writers on readers
//! or vice versa. It tracks every in-flight tuple version as a *story*
//! (a per-index chain of versions), resolves what each transaction is
//! allowed to see through the visibility engine, and reclaims history
//! incrementally once no one can still need it.
//!
//! # Layout
//! - [`story`] / [`store`]: the version-history chains (C2).
//! - [`visibility`]: what a `(txn, story, index)` triple resolves to (C5).
//! - [`gap`] / [`gap_policy`]: the four read-tracker shapes and the
//!   split/move/track policy that keeps them correct across inserts.
//! - [`lifecycle`]: `add_stmt` / `prepare_stmt` / `commit_stmt` /
//!   `rollback_stmt` (C6).
//! - [`conflict`]: the read-view list and the abort/send-to-read-view
//!   primitives preparation uses to invalidate stale readers (C7).
//! - [`gc`]: the incremental story-reclamation crawler (C8).
//! - [`snapshot`]: the checkpoint-time view of dirty chain heads (C9).
//! - [`invalidate`]: space (DDL) invalidation (C10).
//! - [`func_key`]: the functional-index key cache (§4.5).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod func_key;
pub mod gap;
pub mod gap_policy;
pub mod gc;
pub mod ids;
pub mod invalidate;
pub mod lifecycle;
pub mod manager;
pub mod psn;
pub mod query;
pub mod snapshot;
pub mod stmt;
pub mod store;
pub mod story;
pub mod txn;
pub mod visibility;

pub use conflict::ReadViewList;
pub use gap::{GapItem, GapKind};
pub use gap_policy::GapDecision;
pub use ids::{GapId, StmtId, StoryId, TxnId};
pub use lifecycle::add::AddOutcome;
pub use manager::{SpaceIndex, Statistics, TxManager};
pub use psn::Psn;
pub use snapshot::SnapshotCleaner;
pub use stmt::{RollbackInfo, Stmt};
pub use story::{GcStatus, Story, StoryLink};
pub use store::StoryStore;
pub use txn::{Isolation, Txn, TxnStatus};
pub use visibility::Clarified;

// Re-exported for convenience: hosts building index implementations and
// wiring up the manager need these without a second `memtx-core`
// dependency declaration.
pub use memtx_core::{
    Index, IndexDef, IndexId, IteratorType, Key, KeyDef, KeyDefBuilder, ReplaceMode,
    ReplaceOutcome, SpaceId, Tuple, TupleId, TxError, TxManagerConfig, TxResult,
};
