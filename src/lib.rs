//! # memtx-mvcc
//!
//! Snapshot isolation and conflict detection for an in-memory,
//! index-organized store.
//!
//! This crate is the embeddable transaction manager: a host owns its own
//! physical indexes (implementing the narrow `Index` trait) and drives
//! them through one explicit [`TxManager`], getting per-transaction
//! snapshot reads, read/write conflict detection, and incremental
//! history garbage collection in return.
//!
//! Internal crates (`memtx-core`, `memtx-tx`) are implementation
//! details; only the surface re-exported here is stable.
//!
//! # Quick start
//!
//! ```no_run
//! use memtx_mvcc::{Isolation, ReplaceMode, SpaceId, Tuple, TxManager};
//!
//! let mut mgr = TxManager::default();
//! mgr.register_space(SpaceId(0), 1);
//!
//! let txn = mgr.register_txn(Isolation::ReadCommitted);
//! // `indexes` would normally be the host's real primary/secondary
//! // index objects implementing `memtx_mvcc::Index`.
//! let mut indexes: Vec<&mut dyn memtx_mvcc::Index> = Vec::new();
//! let outcome = mgr
//!     .add_stmt(
//!         txn,
//!         SpaceId(0),
//!         &mut indexes,
//!         None,
//!         Some(Tuple::new(vec![1])),
//!         ReplaceMode::Insert,
//!         &[false],
//!     )
//!     .unwrap();
//! let psn = mgr.next_psn();
//! mgr.prepare_stmt(outcome.stmt, psn, &mut indexes).unwrap();
//! mgr.commit_stmt(outcome.stmt);
//! ```

// Re-export the public API from memtx-tx (which itself re-exports the
// memtx-core types a host needs to implement `Index`).
pub use memtx_tx::*;
