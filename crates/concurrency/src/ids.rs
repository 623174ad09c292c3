//! Stable, generation-checked handles for the manager's arena-allocated
//! records.
//!
//! Every intrusive "pointer" in the design this manager is modeled on
//! (story links, statement back-pointers, reader lists) becomes a
//! `slotmap` key here: a handle stays meaningful across garbage
//! collection passes because the slot it names is never reused while the
//! handle's generation is still live, and a stale handle is detected
//! rather than silently aliasing a new record.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`crate::story::Story`].
    pub struct StoryId;

    /// Handle to a [`crate::stmt::Stmt`].
    pub struct StmtId;

    /// Handle to a [`crate::txn::Txn`].
    pub struct TxnId;

    /// Handle to a [`crate::gap::GapItem`].
    pub struct GapId;
}
