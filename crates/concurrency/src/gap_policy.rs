//! The nearby-gap resolution policy of §4.3.1: given a newly inserted
//! tuple and a gap tracker sitting at the insertion point, decide whether
//! the tracker must split, move, or simply start tracking the new story.

use std::cmp::Ordering;

use memtx_core::IteratorType;

/// What to do with a nearby-gap tracker when a new tuple lands at its
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapDecision {
    /// Clone the tracker onto the new story's gap list; the original
    /// stays on the successor.
    pub split: bool,
    /// Relink the tracker from the successor to the new story.
    pub moved: bool,
    /// Add a gap observer against the new story (independent of
    /// split/move — a split also always tracks).
    pub track: bool,
}

/// Evaluate the split/move/track policy for one tracker against one
/// insertion.
///
/// `cmp` is `cmp(new_tuple, key)` in the index's key order; `part_count`
/// is the tracker's own key length; `full_key_part_count` is the index's
/// total key length (`part_count == full_key_part_count` means the
/// tracker used a full key, not a prefix).
pub fn decide(
    iterator: IteratorType,
    cmp: Ordering,
    part_count: usize,
    full_key_part_count: usize,
) -> GapDecision {
    let dir = iterator.direction();
    let cmp_i = match cmp {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    let is_full_key = part_count == full_key_part_count;
    let is_eq = iterator.is_eq();
    let is_e = iterator.is_inclusive();

    let need_split = part_count == 0
        || (dir * cmp_i > 0 && !is_eq)
        || (!is_full_key && cmp_i == 0 && (is_e || is_eq));

    let need_move = !need_split
        && ((dir < 0 && cmp_i > 0)
            || (cmp_i > 0 && iterator == IteratorType::Eq)
            || (cmp_i == 0 && ((dir < 0 && is_full_key) || iterator == IteratorType::Lt)));

    let need_track = need_split || (is_full_key && cmp_i == 0 && is_e);

    GapDecision {
        split: need_split,
        moved: need_move,
        track: need_track,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_always_splits_and_tracks() {
        let d = decide(IteratorType::Ge, Ordering::Less, 0, 2);
        assert!(d.split);
        assert!(d.track);
        assert!(!d.moved);
    }

    #[test]
    fn ascending_scan_crossed_by_new_tuple_splits() {
        // GE scan, new tuple strictly greater than the bound (dir=1,
        // cmp=+1), not an eq iterator -> need_split.
        let d = decide(IteratorType::Ge, Ordering::Greater, 1, 1);
        assert!(d.split);
    }

    #[test]
    fn exact_full_key_inclusive_match_tracks_without_split_or_move() {
        let d = decide(IteratorType::Ge, Ordering::Equal, 2, 2);
        assert!(!d.split);
        assert!(d.track);
    }

    #[test]
    fn descending_scan_with_tuple_above_bound_moves() {
        let d = decide(IteratorType::Le, Ordering::Greater, 1, 2);
        assert!(!d.split);
        assert!(d.moved);
    }

    #[test]
    fn lt_iterator_at_equal_position_moves() {
        let d = decide(IteratorType::Lt, Ordering::Equal, 1, 2);
        assert!(d.moved);
    }
}
