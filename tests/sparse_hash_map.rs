// SparseHashMap behavior test suite (consolidated).
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Ownership balance: the map holds exactly one share per live entry;
//   overwrite, erase, clear, and drop each release exactly once.
// - Sentinel discipline: the registered deleted key is never storable,
//   and erase is unavailable until a sentinel is registered.
// - Association stability: key -> value pairs survive any number of
//   grow/purge/shrink rehashes.
// - Absence is a value: missing keys report None / Ok(false), never an
//   error, and never touch a stored value.
use sparse_hashmap::{
    SparseBytesMap, SparseHashMap, SparseIntMap, SparseMapError, BYTES_DELETED_KEY,
    INT_DELETED_KEY,
};
use std::rc::Rc;

// Test: the end-to-end integer-map scenario.
// Assumes: sentinel -1 registered at construction.
// Verifies: set/get/erase/clear compose the way the container contract
// describes.
#[test]
fn int_map_end_to_end() {
    let mut m: SparseIntMap<&'static str> = SparseIntMap::with_deleted_key(INT_DELETED_KEY);
    m.set(5, "a").unwrap();
    m.set(7, "b").unwrap();
    assert_eq!(m.get(&5), Some(&"a"));
    assert_eq!(m.erase(&5), Ok(true));
    assert_eq!(m.get(&5), None);
    assert_eq!(m.get(&7), Some(&"b"));
    m.clear();
    assert_eq!(m.get(&7), None);
    assert!(m.is_empty());
}

// Test: byte-string keys with the conventional 16-byte sentinel.
// Verifies: owned Vec<u8> keys round-trip and borrowed &[u8] lookups
// reach the same entries.
#[test]
fn bytes_map_end_to_end() {
    let mut m: SparseBytesMap<u64> = SparseBytesMap::with_deleted_key(BYTES_DELETED_KEY.to_vec());
    m.set(b"alpha".to_vec(), 1).unwrap();
    m.set(b"beta".to_vec(), 2).unwrap();

    assert_eq!(m.get(b"alpha".as_slice()), Some(&1));
    assert_eq!(m.set(BYTES_DELETED_KEY.to_vec(), 3), Err(SparseMapError::ReservedKey));
    assert_eq!(m.erase(b"alpha".as_slice()), Ok(true));
    assert_eq!(m.get(b"alpha".as_slice()), None);
    assert_eq!(m.get(b"beta".as_slice()), Some(&2));
}

// Helper: the number of shares the map holds for `base` is everything
// beyond our own handle.
fn map_shares(base: &Rc<&'static str>) -> usize {
    Rc::strong_count(base) - 1
}

// Test: exactly-once release across overwrite, erase, clear, and drop.
// Assumes: Rc strong counts observe every map-held share.
// Verifies: at every step, shares held by the map equal the number of
// live entries storing that value.
#[test]
fn ownership_balance_across_operations() {
    let a = Rc::new("a");
    let b = Rc::new("b");

    let mut m: SparseIntMap<Rc<&'static str>> = SparseIntMap::with_deleted_key(-1);
    m.set(1, Rc::clone(&a)).unwrap();
    m.set(2, Rc::clone(&a)).unwrap();
    m.set(3, Rc::clone(&b)).unwrap();
    assert_eq!(map_shares(&a), 2);
    assert_eq!(map_shares(&b), 1);

    // Overwrite releases the old value and retains the new one.
    m.set(1, Rc::clone(&b)).unwrap();
    assert_eq!(map_shares(&a), 1);
    assert_eq!(map_shares(&b), 2);

    // Erase releases exactly the removed entry's share.
    assert_eq!(m.erase(&2), Ok(true));
    assert_eq!(map_shares(&a), 0);
    assert_eq!(map_shares(&b), 2);

    // Erase of an absent key performs no release.
    assert_eq!(m.erase(&2), Ok(false));
    assert_eq!(map_shares(&b), 2);

    // Clear releases every remaining share.
    m.clear();
    assert_eq!(map_shares(&a), 0);
    assert_eq!(map_shares(&b), 0);

    // Drop after repopulation releases as well.
    m.set(9, Rc::clone(&a)).unwrap();
    drop(m);
    assert_eq!(Rc::strong_count(&a), 1);
    assert_eq!(Rc::strong_count(&b), 1);
}

// Test: storing the same value twice for one key nets one share.
// Verifies: the overwrite path releases the first share before
// retaining the second; no double-retain accumulates.
#[test]
fn double_set_of_same_value_nets_one_share() {
    let v = Rc::new("v");
    let mut m: SparseIntMap<Rc<&'static str>> = SparseIntMap::with_deleted_key(-1);

    m.set(1, Rc::clone(&v)).unwrap();
    m.set(1, Rc::clone(&v)).unwrap();
    assert_eq!(map_shares(&v), 1);
    assert_eq!(m.len(), 1);

    assert_eq!(m.erase(&1), Ok(true));
    assert_eq!(Rc::strong_count(&v), 1);
}

// Test: rehash correctness over at least two growth events.
// Assumes: growth doubles from the default 32-bucket table.
// Verifies: every inserted association reads back intact after the
// table has grown at least twice, in arbitrary read order.
#[test]
fn associations_survive_repeated_growth() {
    let mut m: SparseIntMap<i64> = SparseIntMap::with_deleted_key(-1);
    let initial = m.bucket_count();

    for k in 0..300 {
        m.set(k * 7, k).unwrap();
    }
    assert!(
        m.bucket_count() >= initial * 4,
        "expected at least two growth events, got {} -> {}",
        initial,
        m.bucket_count()
    );
    assert_eq!(m.len(), 300);

    // Read back in a different order than insertion.
    for k in (0..300).rev() {
        assert_eq!(m.get(&(k * 7)), Some(&k));
    }
}

// Test: erase/reinsert churn does not grow the table.
// Assumes: reinserting an erased key reclaims its tombstone, and
// rehashes purge whatever tombstones remain.
// Verifies: cycling the same working set leaves capacity at the
// default.
#[test]
fn erase_reinsert_churn_is_bounded() {
    let mut m: SparseIntMap<u64> = SparseIntMap::with_deleted_key(-1);
    for round in 0..200u64 {
        for k in 0..10 {
            m.set(k, round).unwrap();
        }
        for k in 0..10 {
            assert_eq!(m.erase(&k), Ok(true));
        }
    }
    assert!(m.is_empty());
    assert_eq!(m.bucket_count(), 32);
}

// Test: values stay readable while unrelated keys are erased.
// Verifies: tombstoning one entry does not disturb neighbors that
// share probe chains, across a whole mixed workload.
#[test]
fn unrelated_erases_leave_entries_intact() {
    let mut m: SparseIntMap<i64> = SparseIntMap::with_deleted_key(-1);
    for k in 0..100 {
        m.set(k, k + 1000).unwrap();
    }
    for k in (0..100).step_by(2) {
        assert_eq!(m.erase(&k), Ok(true));
    }
    for k in 0..100 {
        if k % 2 == 0 {
            assert_eq!(m.get(&k), None);
        } else {
            assert_eq!(m.get(&k), Some(&(k + 1000)));
        }
    }
    assert_eq!(m.len(), 50);
}

// Test: a cleared map is immediately reusable with fresh state.
// Verifies: clear does not disturb the registered sentinel, and the
// sentinel is still rejected afterwards.
#[test]
fn clear_preserves_sentinel_registration() {
    let mut m: SparseIntMap<u32> = SparseIntMap::with_deleted_key(-1);
    m.set(1, 1).unwrap();
    m.clear();

    assert_eq!(m.set(-1, 0), Err(SparseMapError::ReservedKey));
    m.set(2, 2).unwrap();
    assert_eq!(m.erase(&2), Ok(true));
}

// Test: error values render as messages and satisfy std::error::Error.
#[test]
fn errors_display_and_compose() {
    let e: Box<dyn std::error::Error> = Box::new(SparseMapError::DeletedKeyUnset);
    assert!(e.to_string().contains("deleted key"));
    assert_ne!(SparseMapError::ReservedKey, SparseMapError::AllocationFailed);
}

// Test: a map behind a mutex is usable from another thread.
// Verifies: the container is Send (externally synchronized use), while
// remaining single-threaded internally.
#[test]
fn map_is_send_for_external_synchronization() {
    let m: SparseHashMap<i64, u64> = SparseHashMap::with_deleted_key(-1);
    let shared = std::sync::Mutex::new(m);
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let mut guard = shared.lock().unwrap();
                guard.set(1, 10).unwrap();
            })
            .join()
            .unwrap();
    });
    assert_eq!(shared.lock().unwrap().get(&1), Some(&10));
}
