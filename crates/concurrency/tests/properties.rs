//! Property-based and randomized coverage, layered on top of the literal
//! scenarios in `scenarios.rs`: round-trip/idempotence checks generalized
//! across random keys via `proptest`, and the dirty-read / count-gap
//! conflict scenarios replayed across many random keys via `rand`.

mod common;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use memtx_core::{IndexId, IteratorType, Key, ReplaceMode, SpaceId};
use memtx_tx::psn::ROLLBACKED_PSN;
use memtx_tx::{Isolation, TxManager, TxnStatus};

use common::{as_slice, indexes, tuple};

proptest! {
    /// Preparing a replace and then rolling it back leaves the
    /// displaced row as the index's physical head again, resolving
    /// exactly as it did before the replace was ever attempted.
    #[test]
    fn prepare_then_rollback_restores_the_displaced_head(pk in 0u8..250, old_sk in 0u8..250, new_sk in 0u8..250) {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 2);
        let (mut primary, mut secondary) = indexes();

        let t0 = mgr.register_txn(Isolation::ReadCommitted);
        let base = tuple(pk, old_sk);
        let out0 = mgr
            .add_stmt(
                t0,
                SpaceId(0),
                &mut as_slice(&mut primary, &mut secondary),
                None,
                Some(base.clone()),
                ReplaceMode::ReplaceOrInsert,
                &[false, false],
            )
            .unwrap();
        let psn0 = mgr.next_psn();
        mgr.prepare_stmt(out0.stmt, psn0, &mut as_slice(&mut primary, &mut secondary)).unwrap();
        mgr.commit_stmt(out0.stmt);

        let t1 = mgr.register_txn(Isolation::ReadCommitted);
        let replacement = tuple(pk, new_sk);
        let out1 = mgr
            .add_stmt(
                t1,
                SpaceId(0),
                &mut as_slice(&mut primary, &mut secondary),
                None,
                Some(replacement.clone()),
                ReplaceMode::ReplaceOrInsert,
                &[false, false],
            )
            .unwrap();
        let psn1 = mgr.next_psn();
        mgr.prepare_stmt(out1.stmt, psn1, &mut as_slice(&mut primary, &mut secondary)).unwrap();
        mgr.rollback_stmt(out1.stmt, &mut as_slice(&mut primary, &mut secondary)).unwrap();

        let replacement_story = mgr.lookup_story_by_tuple(replacement.id()).unwrap();
        prop_assert!(!mgr.story(replacement_story).unwrap().links[0].in_index);
        prop_assert_eq!(mgr.story(replacement_story).unwrap().del_psn, ROLLBACKED_PSN);

        let base_story = mgr.lookup_story_by_tuple(base.id()).unwrap();
        prop_assert!(mgr.story(base_story).unwrap().links[0].in_index);
        prop_assert_eq!(mgr.clarify(None, base_story, 0, false), Some(base));
    }

    /// The snapshot cleaner's resolution map is a fixed point: clarifying
    /// an already-resolved tuple returns it unchanged.
    #[test]
    fn snapshot_cleaner_clarify_is_idempotent(pk in 0u8..250, committed_sk in 0u8..250, dirty_sk in 0u8..250) {
        let mut mgr = TxManager::default();
        mgr.register_space(SpaceId(0), 2);
        let (mut primary, mut secondary) = indexes();

        let t0 = mgr.register_txn(Isolation::ReadCommitted);
        let committed = tuple(pk, committed_sk);
        let o = mgr
            .add_stmt(
                t0,
                SpaceId(0),
                &mut as_slice(&mut primary, &mut secondary),
                None,
                Some(committed.clone()),
                ReplaceMode::ReplaceOrInsert,
                &[false, false],
            )
            .unwrap();
        let psn = mgr.next_psn();
        mgr.prepare_stmt(o.stmt, psn, &mut as_slice(&mut primary, &mut secondary)).unwrap();
        mgr.commit_stmt(o.stmt);

        let t_live = mgr.register_txn(Isolation::ReadCommitted);
        let dirty = tuple(pk, dirty_sk);
        mgr.add_stmt(
            t_live,
            SpaceId(0),
            &mut as_slice(&mut primary, &mut secondary),
            None,
            Some(dirty.clone()),
            ReplaceMode::ReplaceOrInsert,
            &[false, false],
        )
        .unwrap();

        let cleaner = mgr.snapshot_cleaner_create(SpaceId(0), 0);
        let once = cleaner.clarify(&dirty);
        prop_assert_eq!(once.clone(), Some(committed));
        let twice = once.clone().and_then(|t| cleaner.clarify(&t));
        prop_assert_eq!(once, twice);
    }
}

/// Replays the dirty-read scenario (S1) across many random, mutually
/// distinct keys with a fixed seed: every round a fresh T1 inserts a new
/// row, a fresh T2 dirty-reads it before T1 prepares, and T1's prepare
/// must conflict exactly that read.
#[test]
fn randomized_dirty_read_conflicts_across_many_keys() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut keys: Vec<u8> = (0..=250).collect();
    keys.shuffle(&mut rng);

    let mut mgr = TxManager::default();
    mgr.register_space(SpaceId(0), 2);
    let (mut primary, mut secondary) = indexes();

    for &key in keys.iter().take(40) {
        let t1 = mgr.register_txn(Isolation::ReadCommitted);
        let t2 = mgr.register_txn(Isolation::ReadCommitted);
        let new_tuple = tuple(key, key);

        let outcome = mgr
            .add_stmt(
                t1,
                SpaceId(0),
                &mut as_slice(&mut primary, &mut secondary),
                None,
                Some(new_tuple.clone()),
                ReplaceMode::Insert,
                &[false, false],
            )
            .unwrap();
        let story = mgr.lookup_story_by_tuple(new_tuple.id()).unwrap();

        assert_eq!(mgr.clarify(Some(t2), story, 0, false), None);

        let psn = mgr.next_psn();
        mgr.prepare_stmt(outcome.stmt, psn, &mut as_slice(&mut primary, &mut secondary)).unwrap();

        assert_eq!(mgr.txn(t2).unwrap().status, TxnStatus::InReadView);
        assert_eq!(mgr.txn(t2).unwrap().rv_psn, Some(psn));

        mgr.commit_stmt(outcome.stmt);
        mgr.abort_with_conflict(t2);
        assert_eq!(mgr.txn(t2).unwrap().status, TxnStatus::Aborted);
    }
}

/// Replays the count-gap scenario (S4) across many random, mutually
/// distinct keys with a fixed seed: every round a fresh T1 counts a key
/// that doesn't exist yet, a fresh T2 inserts exactly that key, and T2's
/// prepare must conflict T1's count.
#[test]
fn randomized_count_gap_conflicts_across_many_keys() {
    let mut rng = StdRng::seed_from_u64(0xBADF00D);
    let mut keys: Vec<u8> = (0..=250).collect();
    keys.shuffle(&mut rng);

    let mut mgr = TxManager::default();
    mgr.register_space(SpaceId(0), 2);
    let (mut primary, mut secondary) = indexes();

    for &key in keys.iter().take(40) {
        let t1 = mgr.register_txn(Isolation::ReadCommitted);
        let t2 = mgr.register_txn(Isolation::ReadCommitted);

        let count_key = Key::from_slice(&[key]);
        mgr.track_count_until(t1, SpaceId(0), IndexId(0), IteratorType::Eq, count_key, 1, None);

        let new_tuple = tuple(key, key);
        let outcome = mgr
            .add_stmt(
                t2,
                SpaceId(0),
                &mut as_slice(&mut primary, &mut secondary),
                None,
                Some(new_tuple.clone()),
                ReplaceMode::Insert,
                &[false, false],
            )
            .unwrap();

        let story = mgr.lookup_story_by_tuple(new_tuple.id()).unwrap();
        assert_eq!(mgr.story(story).unwrap().links[0].read_gaps.len(), 1);

        let psn = mgr.next_psn();
        mgr.prepare_stmt(outcome.stmt, psn, &mut as_slice(&mut primary, &mut secondary)).unwrap();

        assert_eq!(mgr.txn(t1).unwrap().status, TxnStatus::InReadView);
        assert_eq!(mgr.txn(t1).unwrap().rv_psn, Some(psn));

        mgr.commit_stmt(outcome.stmt);
        mgr.abort_with_conflict(t1);
    }
}
