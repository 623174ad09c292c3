//! Shared scaffolding for the end-to-end scenario tests: a minimal
//! `Index` backed by a `BTreeMap`, and the two-field tuple encoding the
//! scenarios in `SPEC_FULL.md` §8 are written against (field 1 = byte 0,
//! field 2 = byte 1).

use std::collections::BTreeMap;
use std::ops::Bound;

use memtx_core::{Index, IndexDef, IndexId, Key, KeyDefBuilder, ReplaceMode, ReplaceOutcome, SpaceId, Tuple, TxResult};

/// Build a two-field tuple: field 1 in byte 0, field 2 in byte 1.
pub fn tuple(f1: u8, f2: u8) -> Tuple {
    Tuple::new(vec![f1, f2])
}

/// A `BTreeMap`-backed index keyed by one byte of the tuple, physically
/// applying every `replace` it is given so nearby-gap successor
/// resolution (S3) has real ordered neighbors to find.
pub struct FakeIndex {
    def: IndexDef,
    field: usize,
    rows: BTreeMap<Key, Tuple>,
}

impl FakeIndex {
    pub fn new(dense_id: u32, field: usize) -> Self {
        let extract_field = field;
        FakeIndex {
            def: IndexDef {
                dense_id: IndexId(dense_id),
                space_id: SpaceId(0),
                key_def: KeyDefBuilder::new(1)
                    .build(move |t| Key::from_slice(&t.as_bytes()[extract_field..extract_field + 1]), |a, b| a.cmp(b)),
            },
            field,
            rows: BTreeMap::new(),
        }
    }

    pub fn primary() -> Self {
        FakeIndex::new(0, 0)
    }

    pub fn secondary() -> Self {
        FakeIndex::new(1, 1)
    }

    fn key_of(&self, t: &Tuple) -> Key {
        Key::from_slice(&t.as_bytes()[self.field..self.field + 1])
    }

    fn successor_of(&self, key: &Key) -> Option<Tuple> {
        self.rows
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
            .map(|(_, v)| v.clone())
    }
}

impl Index for FakeIndex {
    fn replace(&mut self, old: Option<&Tuple>, new: Option<&Tuple>, _mode: ReplaceMode) -> TxResult<ReplaceOutcome> {
        match (old, new) {
            (_, Some(new_t)) => {
                let key = self.key_of(new_t);
                let removed = self.rows.insert(key.clone(), new_t.clone());
                let successor = self.successor_of(&key);
                Ok(ReplaceOutcome { removed, successor })
            }
            (Some(old_t), None) => {
                let key = self.key_of(old_t);
                let removed = self.rows.remove(&key);
                Ok(ReplaceOutcome { removed, successor: None })
            }
            (None, None) => Ok(ReplaceOutcome::default()),
        }
    }

    fn def(&self) -> &IndexDef {
        &self.def
    }
}

/// A freshly wired-up primary/secondary index pair for a one-space test.
pub fn indexes() -> (FakeIndex, FakeIndex) {
    (FakeIndex::primary(), FakeIndex::secondary())
}

/// Borrow both indexes as the `&mut [&mut dyn Index]` slice every
/// lifecycle call takes.
pub fn as_slice<'a>(primary: &'a mut FakeIndex, secondary: &'a mut FakeIndex) -> Vec<&'a mut dyn Index> {
    vec![primary, secondary]
}
