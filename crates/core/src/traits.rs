//! The narrow interfaces the manager consumes from its host.
//!
//! The manager never implements an index itself — B-tree, hash and R-tree
//! indexes all live outside this crate. What the manager needs from an
//! index is exactly the `Index` trait below: a way to physically swap one
//! tuple for another and learn what was displaced, plus the comparator it
//! needs to reason about gap positions.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::TxError;
use crate::ids::{IndexId, SpaceId};
use crate::tuple::{Key, Tuple};

/// How a physical index mutation should behave with respect to an
/// existing occupant of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Fail if a visible tuple already occupies the key.
    Insert,
    /// Fail if no visible tuple occupies the key.
    Replace,
    /// Succeed either way.
    ReplaceOrInsert,
}

/// What a single `Index::replace` call displaced and what now follows the
/// inserted tuple in index order.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    /// The tuple previously occupying the physical slot, if any.
    pub removed: Option<Tuple>,
    /// The tuple immediately following the new tuple in index order, used
    /// to resolve nearby-gap trackers at the insertion point.
    pub successor: Option<Tuple>,
}

/// Comparator and key-extraction contract for one index.
///
/// `key_def` may declare `for_func_index` (the key is computed by an
/// external function rather than read directly off the tuple) and
/// `has_exclude_null` (some key parts may exclude a tuple from the
/// physical index while still participating in its version chain).
pub trait KeyDef: Send + Sync {
    /// Number of parts in this index's key.
    fn part_count(&self) -> usize;

    /// Extract this index's key from a tuple.
    fn extract_key(&self, tuple: &Tuple) -> Key;

    /// Compare two keys in this index's order.
    fn compare_keys(&self, a: &Key, b: &Key) -> Ordering;

    /// Compare a tuple's key in this index against a query key.
    fn compare_tuple_key(&self, tuple: &Tuple, key: &Key) -> Ordering {
        self.compare_keys(&self.extract_key(tuple), key)
    }

    /// Whether this index's key is computed by an external function
    /// rather than read directly off the tuple.
    fn for_func_index(&self) -> bool {
        false
    }

    /// Whether some key parts exclude a tuple from the physical index
    /// (e.g. "exclude nulls").
    fn has_exclude_null(&self) -> bool {
        false
    }

    /// Whether this key, if functional, maps one tuple to multiple keys.
    /// Multikey functional indexes are rejected outright by
    /// [`IndexDef::validate`] — this layer never attempts to support them.
    fn is_multikey(&self) -> bool {
        false
    }
}

/// Builder for an index's key comparator, kept deliberately separate from
/// a single constructor call.
///
/// The reference this manager is modeled on carries an open question about
/// whether "optionality" of trailing key parts belongs inside the key
/// definition constructor. Rather than resolve that ambiguity inside a
/// single constructor, `update_optionality` is its own builder step: the
/// ambiguity stays visible at the call site instead of being hidden.
pub struct KeyDefBuilder {
    part_count: usize,
    optional_parts: usize,
    for_func_index: bool,
    has_exclude_null: bool,
    is_multikey: bool,
}

impl KeyDefBuilder {
    /// Start building a key definition with the given number of parts.
    pub fn new(part_count: usize) -> Self {
        KeyDefBuilder {
            part_count,
            optional_parts: 0,
            for_func_index: false,
            has_exclude_null: false,
            is_multikey: false,
        }
    }

    /// Mark the trailing `n` key parts as optional (may be absent from a
    /// partial key during a range scan). Deliberately distinct from
    /// `new` — see the struct docs.
    pub fn update_optionality(mut self, optional_parts: usize) -> Self {
        self.optional_parts = optional_parts.min(self.part_count);
        self
    }

    /// Mark this key as functional (computed, not read off the tuple).
    pub fn for_func_index(mut self, value: bool) -> Self {
        self.for_func_index = value;
        self
    }

    /// Mark this key as excluding some tuples from the physical index.
    pub fn has_exclude_null(mut self, value: bool) -> Self {
        self.has_exclude_null = value;
        self
    }

    /// Mark this key as multikey (one tuple, several keys).
    pub fn is_multikey(mut self, value: bool) -> Self {
        self.is_multikey = value;
        self
    }

    /// Number of key parts considered optional by this builder so far.
    pub fn optional_parts(&self) -> usize {
        self.optional_parts
    }

    /// Finish building, pairing the declared shape with host-supplied
    /// extraction and comparison closures.
    pub fn build(
        self,
        extract: impl Fn(&Tuple) -> Key + Send + Sync + 'static,
        compare: impl Fn(&Key, &Key) -> Ordering + Send + Sync + 'static,
    ) -> Arc<dyn KeyDef> {
        Arc::new(BuiltKeyDef {
            part_count: self.part_count,
            for_func_index: self.for_func_index,
            has_exclude_null: self.has_exclude_null,
            is_multikey: self.is_multikey,
            extract: Box::new(extract),
            compare: Box::new(compare),
        })
    }
}

struct BuiltKeyDef {
    part_count: usize,
    for_func_index: bool,
    has_exclude_null: bool,
    is_multikey: bool,
    extract: Box<dyn Fn(&Tuple) -> Key + Send + Sync>,
    compare: Box<dyn Fn(&Key, &Key) -> Ordering + Send + Sync>,
}

impl KeyDef for BuiltKeyDef {
    fn part_count(&self) -> usize {
        self.part_count
    }

    fn extract_key(&self, tuple: &Tuple) -> Key {
        (self.extract)(tuple)
    }

    fn compare_keys(&self, a: &Key, b: &Key) -> Ordering {
        (self.compare)(a, b)
    }

    fn for_func_index(&self) -> bool {
        self.for_func_index
    }

    fn has_exclude_null(&self) -> bool {
        self.has_exclude_null
    }

    fn is_multikey(&self) -> bool {
        self.is_multikey
    }
}

/// Static description of one index of a space, as the manager sees it.
#[derive(Clone)]
pub struct IndexDef {
    /// Dense id of this index, stable within its space.
    pub dense_id: IndexId,
    /// Space this index belongs to.
    pub space_id: SpaceId,
    /// Comparator / key extraction contract.
    pub key_def: Arc<dyn KeyDef>,
}

impl IndexDef {
    /// Reject index shapes the MVCC layer cannot support: a multikey
    /// functional index must never be silently accepted.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.key_def.for_func_index() && self.key_def.is_multikey() {
            return Err(TxError::illegal_params(
                "multikey functional indexes are not supported by the MVCC layer",
            ));
        }
        Ok(())
    }
}

/// The physical index implementation the manager mutates and queries.
///
/// Consumed, never implemented, by this crate: B-tree, hash and R-tree
/// indexes all live outside the manager and are reached only through this
/// trait.
pub trait Index: Send {
    /// Physically mutate the index, returning the tuple displaced (if
    /// any) and the new tuple's immediate successor in index order.
    fn replace(
        &mut self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: ReplaceMode,
    ) -> Result<ReplaceOutcome, TxError>;

    /// This index's static definition.
    fn def(&self) -> &IndexDef;
}

/// Iterator direction/shape used by range scans, nearby-gap trackers and
/// count queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    /// Exact match, ascending key order.
    Eq,
    /// Exact match, descending key order ("reverse equal").
    Req,
    /// Greater-or-equal.
    Ge,
    /// Strictly greater.
    Gt,
    /// Less-or-equal.
    Le,
    /// Strictly less.
    Lt,
    /// Unordered full scan.
    All,
}

impl IteratorType {
    /// Scan direction: +1 ascending, -1 descending.
    pub fn direction(&self) -> i32 {
        match self {
            IteratorType::Ge | IteratorType::Gt | IteratorType::Eq | IteratorType::All => 1,
            IteratorType::Le | IteratorType::Lt | IteratorType::Req => -1,
        }
    }

    /// Whether this is one of the two exact-match variants.
    pub fn is_eq(&self) -> bool {
        matches!(self, IteratorType::Eq | IteratorType::Req)
    }

    /// Whether this is one of the two inclusive-bound variants.
    pub fn is_inclusive(&self) -> bool {
        matches!(self, IteratorType::Le | IteratorType::Ge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multikey_functional_index_rejected() {
        let key_def = KeyDefBuilder::new(1)
            .for_func_index(true)
            .is_multikey(true)
            .build(|_t| Key::new(), |a, b| a.cmp(b));
        let def = IndexDef {
            dense_id: IndexId(0),
            space_id: SpaceId(0),
            key_def,
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn non_multikey_functional_index_accepted() {
        let key_def = KeyDefBuilder::new(1)
            .for_func_index(true)
            .build(|_t| Key::new(), |a, b| a.cmp(b));
        let def = IndexDef {
            dense_id: IndexId(0),
            space_id: SpaceId(0),
            key_def,
        };
        assert!(def.validate().is_ok());
    }

    #[test]
    fn update_optionality_is_a_distinct_step() {
        let builder = KeyDefBuilder::new(3).update_optionality(1);
        assert_eq!(builder.optional_parts(), 1);
    }

    #[test]
    fn iterator_type_direction_and_shape() {
        assert_eq!(IteratorType::Ge.direction(), 1);
        assert_eq!(IteratorType::Lt.direction(), -1);
        assert!(IteratorType::Eq.is_eq());
        assert!(!IteratorType::Ge.is_eq());
        assert!(IteratorType::Le.is_inclusive());
    }
}
