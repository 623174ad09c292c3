//! Shared types and host-facing contracts for the memtx-style MVCC core.
//!
//! This crate defines only what the transaction manager in `memtx-tx`
//! needs from, or exposes to, its host:
//! - `Tuple` / `TupleId`: the immutable payload stories version.
//! - `SpaceId` / `IndexId`: dense identifiers.
//! - `Index` / `KeyDef` / `IndexDef`: the narrow interface onto the
//!   host's physical index implementations (B-tree, hash, R-tree — none
//!   of which live here).
//! - `TxError`: the manager's error hierarchy.
//! - `TxManagerConfig`: the manager's entire configuration surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ids;
pub mod traits;
pub mod tuple;

pub use config::TxManagerConfig;
pub use error::{TxError, TxResult};
pub use ids::{IndexId, SpaceId};
pub use traits::{Index, IndexDef, IteratorType, KeyDef, KeyDefBuilder, ReplaceMode, ReplaceOutcome};
pub use tuple::{Key, Tuple, TupleId};
