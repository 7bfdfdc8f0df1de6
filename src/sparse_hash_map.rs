//! SparseHashMap: open addressing with triangular probing over a sparse
//! table, a registered deleted-key sentinel, and load-factor driven
//! grow/purge/shrink.

use crate::reentrancy::ReentryCheck;
use crate::sparse_group::GROUP_SIZE;
use crate::sparse_table::{Entries, EntriesMut, SparseTable};
use ahash::RandomState;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::mem;
use std::collections::TryReserveError;
use std::fmt;

/// Buckets in a freshly constructed or cleared table.
const DEFAULT_BUCKETS: usize = 32;

/// Occupancy fractions in fifths: grow/purge when live + tombstoned
/// buckets would exceed 4/5 of the table, flag a shrink when live
/// entries fall below 1/5.
const HIGH_WATER_NUM: usize = 4;
const WATER_DEN: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SparseMapError {
    /// The registered deleted key was used as a real key, or
    /// `set_deleted_key` named a key that is currently live.
    ReservedKey,
    /// `erase` was called before a deleted key was registered.
    DeletedKeyUnset,
    /// A rehash could not allocate storage; the table is unchanged.
    AllocationFailed,
}

impl fmt::Display for SparseMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedKey => {
                f.write_str("the deleted-key sentinel cannot be used as a real key")
            }
            Self::DeletedKeyUnset => {
                f.write_str("no deleted key registered; erase is unavailable")
            }
            Self::AllocationFailed => f.write_str("could not allocate table storage"),
        }
    }
}

impl std::error::Error for SparseMapError {}

impl From<TryReserveError> for SparseMapError {
    fn from(_: TryReserveError) -> Self {
        Self::AllocationFailed
    }
}

enum Slot<K, V> {
    Live { key: K, value: V },
    /// A vacated bucket that keeps its probe position until a rehash
    /// purges it; the in-slot rendering of the deleted-key sentinel.
    Tombstone,
}

/// What an insert probe found for a key.
enum ProbeOutcome {
    /// Live entry with an equal key.
    Occupied(usize),
    /// Key absent; first tombstone on the probe path, reusable in place.
    Reusable(usize),
    /// Key absent; first vacant bucket, no tombstone before it.
    Vacant(usize),
}

/// Scratch occupancy bitmap for planning a rehash.
struct BucketBits {
    words: Vec<u64>,
}

impl BucketBits {
    fn try_with_buckets(buckets: usize) -> Result<Self, TryReserveError> {
        let n = (buckets + 63) / 64;
        let mut words = Vec::new();
        words.try_reserve_exact(n)?;
        words.resize(n, 0);
        Ok(Self { words })
    }

    /// Claim the first free bucket on the triangular probe path from
    /// `start`, and return it.
    fn claim_first_free(&mut self, start: usize, mask: usize) -> usize {
        let mut bucket = start;
        let mut stride = 0;
        while self.words[bucket / 64] & (1u64 << (bucket % 64)) != 0 {
            stride += 1;
            bucket = (bucket + stride) & mask;
        }
        self.words[bucket / 64] |= 1u64 << (bucket % 64);
        bucket
    }
}

pub struct SparseHashMap<K, V, S = RandomState> {
    hasher: S,
    table: SparseTable<Slot<K, V>>,
    // Live entries; the table's occupied count additionally includes
    // tombstoned buckets.
    live: usize,
    deleted_key: Option<K>,
    consider_shrink: bool,
    reentry: ReentryCheck,
}

impl<K, V> SparseHashMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Empty map with the deleted-key sentinel pre-registered, the way
    /// the original construction path does it.
    pub fn with_deleted_key(key: K) -> Self {
        Self::with_deleted_key_and_hasher(key, RandomState::new())
    }
}

impl<K, V> Default for SparseHashMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> SparseHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            table: SparseTable::with_buckets(DEFAULT_BUCKETS),
            live: 0,
            deleted_key: None,
            consider_shrink: false,
            reentry: ReentryCheck::new(),
        }
    }

    pub fn with_deleted_key_and_hasher(key: K, hasher: S) -> Self {
        let mut map = Self::with_hasher(hasher);
        map.deleted_key = Some(key);
        map
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current logical capacity. Grows and shrinks in powers of two.
    pub fn bucket_count(&self) -> usize {
        self.table.buckets()
    }

    pub fn deleted_key(&self) -> Option<&K> {
        self.deleted_key.as_ref()
    }

    /// Register or replace the deleted-key sentinel. The sentinel must
    /// never occur as a real key, so a currently live key is rejected.
    pub fn set_deleted_key(&mut self, key: K) -> Result<(), SparseMapError> {
        let _entry = self.reentry.enter();
        if self.locate(&key).is_some() {
            return Err(SparseMapError::ReservedKey);
        }
        self.deleted_key = Some(key);
        Ok(())
    }

    fn hash_of<Q>(&self, key: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(key)
    }

    fn is_reserved<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.deleted_key.as_ref().map_or(false, |d| d.borrow() == key)
    }

    /// Bucket of the live entry for `key`, if any. Probes until the
    /// first vacant bucket; tombstones keep the chain going.
    fn locate<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mask = self.table.buckets() - 1;
        let mut bucket = self.hash_of(key) as usize & mask;
        let mut stride = 0;
        loop {
            match self.table.get(bucket) {
                None => return None,
                Some(Slot::Live { key: k, .. }) if k.borrow() == key => return Some(bucket),
                Some(_) => {}
            }
            stride += 1;
            debug_assert!(stride <= mask, "probe cycled a full table");
            bucket = (bucket + stride) & mask;
        }
    }

    fn probe_for_insert(&self, key: &K) -> ProbeOutcome {
        let mask = self.table.buckets() - 1;
        let mut bucket = self.hash_of(key) as usize & mask;
        let mut stride = 0;
        let mut reusable = None;
        loop {
            match self.table.get(bucket) {
                None => {
                    return match reusable {
                        Some(b) => ProbeOutcome::Reusable(b),
                        None => ProbeOutcome::Vacant(bucket),
                    };
                }
                Some(Slot::Tombstone) => {
                    if reusable.is_none() {
                        reusable = Some(bucket);
                    }
                }
                Some(Slot::Live { key: k, .. }) => {
                    if k == key {
                        return ProbeOutcome::Occupied(bucket);
                    }
                }
            }
            stride += 1;
            debug_assert!(stride <= mask, "probe cycled a full table");
            bucket = (bucket + stride) & mask;
        }
    }

    /// First vacant bucket for `hash`. Only meaningful right after a
    /// rehash, when the table holds no tombstones and not this key.
    fn first_vacant(&self, hash: u64) -> usize {
        let mask = self.table.buckets() - 1;
        let mut bucket = hash as usize & mask;
        let mut stride = 0;
        while self.table.contains(bucket) {
            stride += 1;
            debug_assert!(stride <= mask, "probe cycled a full table");
            bucket = (bucket + stride) & mask;
        }
        bucket
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _entry = self.reentry.enter();
        let bucket = self.locate(key)?;
        match self.table.get(bucket) {
            Some(Slot::Live { value, .. }) => Some(value),
            // locate only reports live buckets
            _ => None,
        }
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _entry = self.reentry.enter();
        let bucket = self.locate(key)?;
        match self.table.get_mut(bucket) {
            Some(Slot::Live { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _entry = self.reentry.enter();
        self.locate(key).is_some()
    }

    /// Insert or overwrite. The map takes ownership of `value`; an
    /// overwritten value is dropped inside the call, so exactly one map
    /// share per live key exists at all times.
    pub fn set(&mut self, key: K, value: V) -> Result<(), SparseMapError> {
        {
            let _entry = self.reentry.enter();
            if self.is_reserved(&key) {
                return Err(SparseMapError::ReservedKey);
            }
        }
        // A pending shrink moves entries, so it must precede probing.
        if self.consider_shrink {
            self.apply_deferred_shrink();
        }
        let outcome = {
            let _entry = self.reentry.enter();
            self.probe_for_insert(&key)
        };
        match outcome {
            ProbeOutcome::Occupied(bucket) => {
                // Swap the new value in while consistent; the old value
                // drops after the guard is released.
                let old = {
                    let _entry = self.reentry.enter();
                    match self.table.get_mut(bucket) {
                        Some(Slot::Live { value: stored, .. }) => {
                            Some(mem::replace(stored, value))
                        }
                        _ => None,
                    }
                };
                drop(old);
                Ok(())
            }
            ProbeOutcome::Reusable(bucket) => {
                // Reclaim the tombstone in place; the bitmap is untouched.
                let _entry = self.reentry.enter();
                if let Some(slot) = self.table.get_mut(bucket) {
                    *slot = Slot::Live { key, value };
                }
                self.live += 1;
                Ok(())
            }
            ProbeOutcome::Vacant(bucket) => {
                let bucket = if self.past_high_water() {
                    self.grow_or_purge()?;
                    let _entry = self.reentry.enter();
                    self.first_vacant(self.hash_of(&key))
                } else {
                    bucket
                };
                let _entry = self.reentry.enter();
                self.table.insert(bucket, Slot::Live { key, value })?;
                self.live += 1;
                Ok(())
            }
        }
    }

    /// Remove a key. `Ok(false)` for an absent key; the removed entry's
    /// bucket becomes a tombstone and its value drops exactly once.
    pub fn erase<Q>(&mut self, key: &Q) -> Result<bool, SparseMapError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.deleted_key.is_none() {
            return Err(SparseMapError::DeletedKeyUnset);
        }
        let removed = {
            let _entry = self.reentry.enter();
            if self.is_reserved(key) {
                return Err(SparseMapError::ReservedKey);
            }
            let bucket = match self.locate(key) {
                Some(bucket) => bucket,
                None => return Ok(false),
            };
            let old = self
                .table
                .get_mut(bucket)
                .map(|slot| mem::replace(slot, Slot::Tombstone))
                .expect("located bucket must be occupied");
            self.live -= 1;
            debug_assert!(self.live <= self.table.occupied());
            old
        };
        // The entry's key and value drop after the table is consistent
        // again; their Drop impls may run arbitrary user code.
        drop(removed);
        if self.below_low_water() {
            self.consider_shrink = true;
        }
        Ok(true)
    }

    /// Drop every live value and reset to the default bucket count.
    pub fn clear(&mut self) {
        let old = {
            let _entry = self.reentry.enter();
            self.live = 0;
            self.consider_shrink = false;
            mem::replace(&mut self.table, SparseTable::with_buckets(DEFAULT_BUCKETS))
        };
        // Entry drops run once the map is consistent again.
        drop(old);
    }

    /// Live entries in table order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            entries: self.table.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            entries: self.table.iter_mut(),
        }
    }

    fn past_high_water(&self) -> bool {
        // Tombstones hold buckets too, so the trigger counts them.
        (self.table.occupied() + 1).saturating_mul(WATER_DEN)
            > self.table.buckets() * HIGH_WATER_NUM
    }

    fn below_low_water(&self) -> bool {
        self.table.buckets() > DEFAULT_BUCKETS
            && self.live.saturating_mul(WATER_DEN) < self.table.buckets()
    }

    /// Smallest power-of-two bucket count that keeps `live` entries
    /// under the high-water mark.
    fn bucket_count_for(live: usize) -> usize {
        let mut buckets = DEFAULT_BUCKETS;
        while live.saturating_mul(WATER_DEN) > buckets * HIGH_WATER_NUM {
            buckets *= 2;
        }
        buckets
    }

    fn grow_or_purge(&mut self) -> Result<(), SparseMapError> {
        self.rehash_to(Self::bucket_count_for(self.live + 1))
    }

    fn apply_deferred_shrink(&mut self) {
        self.consider_shrink = false;
        // Target roughly 40% occupancy so the shrunken table is not
        // immediately regrown.
        let target = Self::bucket_count_for(self.live.saturating_mul(2));
        if target < self.table.buckets() {
            // Best effort: a failed shrink allocation keeps the current
            // (still valid) table.
            let _ = self.rehash_to(target);
        }
    }

    /// All-at-once rehash into `new_buckets`. Plans first: live keys
    /// are trial-placed into a scratch bitmap to size every destination
    /// group, and all storage is reserved before any entry moves. The
    /// commit replays the plan's iteration and probe order, so it
    /// cannot allocate; a failed plan leaves the table untouched.
    /// Tombstones are purged as a side effect.
    fn rehash_to(&mut self, new_buckets: usize) -> Result<(), SparseMapError> {
        let _entry = self.reentry.enter();
        debug_assert!(new_buckets.is_power_of_two());
        debug_assert!(
            self.live.saturating_mul(WATER_DEN) <= new_buckets * HIGH_WATER_NUM,
            "rehash target cannot hold the live entries"
        );
        let mask = new_buckets - 1;

        let mut fresh: SparseTable<Slot<K, V>> = SparseTable::try_with_buckets(new_buckets)?;
        let mut placed = BucketBits::try_with_buckets(new_buckets)?;
        let mut demand = Vec::new();
        demand.try_reserve_exact(fresh.group_directory_len())?;
        demand.resize(fresh.group_directory_len(), 0usize);

        for (_, slot) in self.table.iter() {
            let key = match slot {
                Slot::Live { key, .. } => key,
                Slot::Tombstone => continue,
            };
            let bucket = placed.claim_first_free(self.hash_of(key) as usize & mask, mask);
            demand[bucket / GROUP_SIZE] += 1;
        }
        fresh.try_reserve_groups(&demand)?;

        let old = mem::replace(&mut self.table, fresh);
        for (_, slot) in old.into_entries() {
            let (key, value) = match slot {
                Slot::Live { key, value } => (key, value),
                Slot::Tombstone => continue,
            };
            let mut bucket = self.hash_of(&key) as usize & mask;
            let mut stride = 0;
            while self.table.contains(bucket) {
                stride += 1;
                bucket = (bucket + stride) & mask;
            }
            self.table
                .insert(bucket, Slot::Live { key, value })
                .expect("slot storage reserved by the rehash plan");
        }
        debug_assert_eq!(self.table.occupied(), self.live);
        self.consider_shrink = false;
        Ok(())
    }
}

/// Immutable iterator over live entries.
pub struct Iter<'a, K, V> {
    entries: Entries<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.entries.next() {
                None => return None,
                Some((_, Slot::Live { key, value })) => return Some((key, value)),
                Some((_, Slot::Tombstone)) => {}
            }
        }
    }
}

/// Mutable iterator over live entries; keys stay immutable.
pub struct IterMut<'a, K, V> {
    entries: EntriesMut<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.entries.next() {
                None => return None,
                Some((_, Slot::Live { key, value })) => return Some((&*key, value)),
                Some((_, Slot::Tombstone)) => {}
            }
        }
    }
}
