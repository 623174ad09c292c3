//! Dense integer identifiers for spaces and indexes.

use std::fmt;

/// Identifier of a space, stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u32);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space#{}", self.0)
    }
}

/// Dense id of an index within its space (0 is always the primary index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId(pub u32);

impl IndexId {
    /// The primary index always has dense id 0.
    pub const PRIMARY: IndexId = IndexId(0);

    /// Whether this is the primary index.
    pub fn is_primary(&self) -> bool {
        *self == IndexId::PRIMARY
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index#{}", self.0)
    }
}
