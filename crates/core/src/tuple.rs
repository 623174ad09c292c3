//! The tuple payload and the key bytes extracted from it.
//!
//! Tuple storage and reference counting proper live outside this crate
//! (§1, out of scope); what the manager needs is an immutable, cheaply
//! cloned payload with a stable identity it can use to key its hash
//! tables. `Tuple` wraps an `Arc<[u8]>` for exactly that: clone is a
//! refcount bump, and the identity used for hashing is derived from the
//! pointer, mirroring the reference engine's use of the tuple's address
//! as its hash key.

use smallvec::SmallVec;
use std::sync::Arc;

/// A key extracted from a tuple by an index's comparator. Most keys are
/// short (a handful of packed fields), so the inline capacity avoids a
/// heap allocation for the common case.
pub type Key = SmallVec<[u8; 32]>;

/// Stable, `Copy` identity for a tuple, derived from its backing
/// allocation's address. Valid only while the `Tuple` (or a clone of it)
/// is alive; the manager never persists a `TupleId` past the lifetime of
/// the `Tuple` it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId(usize);

/// An immutable tuple payload, referenced (never copied) by every story
/// that describes one of its versions.
#[derive(Debug, Clone)]
pub struct Tuple(Arc<[u8]>);

impl Tuple {
    /// Wrap an encoded tuple payload.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Tuple(bytes.into())
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Stable identity for this tuple's backing allocation.
    pub fn id(&self) -> TupleId {
        TupleId(Arc::as_ptr(&self.0) as *const u8 as usize)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Tuple {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_preserves_identity() {
        let t1 = Tuple::new(vec![1, 2, 3]);
        let t2 = t1.clone();
        assert_eq!(t1.id(), t2.id());
        assert_eq!(t1, t2);
    }

    #[test]
    fn distinct_tuples_have_distinct_identity() {
        let t1 = Tuple::new(vec![1, 2, 3]);
        let t2 = Tuple::new(vec![1, 2, 3]);
        assert_ne!(t1.id(), t2.id());
    }
}
