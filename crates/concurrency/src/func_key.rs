//! Functional-key cache (C3, §4.5): maps `(tuple, index)` to a
//! precomputed functional key for dirty tuples, avoiding recomputation
//! of an externally supplied key function.

use rustc_hash::FxHashMap;

use memtx_core::{IndexId, Tuple, TupleId};

/// Cache of `(tuple identity, index) -> functional key tuple`.
///
/// Entries are created lazily on first lookup and destroyed with the
/// story that owns the underlying tuple (callers must evict via
/// [`FuncKeyCache::evict_tuple`] when a story is freed). A cached key is
/// itself a referenced tuple, kept alive by this cache's entry.
#[derive(Debug, Default)]
pub struct FuncKeyCache {
    entries: FxHashMap<(TupleId, IndexId), Tuple>,
}

impl FuncKeyCache {
    /// A fresh, empty cache.
    pub fn new() -> Self {
        FuncKeyCache {
            entries: FxHashMap::default(),
        }
    }

    /// Fetch the cached functional key for `(tuple, index)`, computing
    /// and inserting it via `compute` on first access.
    pub fn get_or_compute(
        &mut self,
        tuple: &Tuple,
        index: IndexId,
        compute: impl FnOnce(&Tuple) -> Tuple,
    ) -> Tuple {
        self.entries
            .entry((tuple.id(), index))
            .or_insert_with(|| compute(tuple))
            .clone()
    }

    /// Drop every cached key for a tuple whose story was just freed.
    pub fn evict_tuple(&mut self, tuple: TupleId) {
        self.entries.retain(|(id, _), _| *id != tuple);
    }

    /// Number of cached keys, for statistics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_once_and_caches() {
        let mut cache = FuncKeyCache::new();
        let tuple = Tuple::new(vec![1, 2, 3]);
        let mut calls = 0;
        let key1 = cache.get_or_compute(&tuple, IndexId(1), |_| {
            calls += 1;
            Tuple::new(vec![9])
        });
        let key2 = cache.get_or_compute(&tuple, IndexId(1), |_| {
            calls += 1;
            Tuple::new(vec![9])
        });
        assert_eq!(calls, 1);
        assert_eq!(key1, key2);
    }

    #[test]
    fn evict_removes_all_indexes_for_a_tuple() {
        let mut cache = FuncKeyCache::new();
        let tuple = Tuple::new(vec![1]);
        cache.get_or_compute(&tuple, IndexId(1), |_| Tuple::new(vec![9]));
        cache.get_or_compute(&tuple, IndexId(2), |_| Tuple::new(vec![9]));
        assert_eq!(cache.len(), 2);
        cache.evict_tuple(tuple.id());
        assert!(cache.is_empty());
    }
}
