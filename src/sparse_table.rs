//! SparseTable: an ordered sequence of sparse groups spanning a bucket
//! range. Buckets are routed to (group, offset); only occupied buckets
//! cost a slot.

use crate::sparse_group::{GroupIter, GroupIterMut, SparseGroup, GROUP_SIZE};
use std::collections::TryReserveError;

pub struct SparseTable<T> {
    groups: Vec<SparseGroup<T>>,
    buckets: usize,
    occupied: usize,
}

fn group_count(buckets: usize) -> usize {
    (buckets + GROUP_SIZE - 1) / GROUP_SIZE
}

impl<T> SparseTable<T> {
    /// Table over `buckets` logical buckets. Infallible; only the small
    /// group directory is allocated, never slot storage.
    pub fn with_buckets(buckets: usize) -> Self {
        debug_assert!(buckets > 0);
        Self {
            groups: (0..group_count(buckets)).map(|_| SparseGroup::new()).collect(),
            buckets,
            occupied: 0,
        }
    }

    /// Fallible variant for rehash targets, where the directory can be
    /// large enough to matter.
    pub fn try_with_buckets(buckets: usize) -> Result<Self, TryReserveError> {
        debug_assert!(buckets > 0);
        let n = group_count(buckets);
        let mut groups = Vec::new();
        groups.try_reserve_exact(n)?;
        for _ in 0..n {
            groups.push(SparseGroup::new());
        }
        Ok(Self {
            groups,
            buckets,
            occupied: 0,
        })
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    fn split(&self, bucket: usize) -> (usize, usize) {
        debug_assert!(bucket < self.buckets);
        (bucket / GROUP_SIZE, bucket % GROUP_SIZE)
    }

    pub fn contains(&self, bucket: usize) -> bool {
        let (g, offset) = self.split(bucket);
        self.groups[g].contains(offset)
    }

    pub fn get(&self, bucket: usize) -> Option<&T> {
        let (g, offset) = self.split(bucket);
        self.groups[g].get(offset)
    }

    pub fn get_mut(&mut self, bucket: usize) -> Option<&mut T> {
        let (g, offset) = self.split(bucket);
        self.groups[g].get_mut(offset)
    }

    /// Occupy a vacant bucket. Nothing is mutated if the slot
    /// reservation fails.
    pub fn insert(&mut self, bucket: usize, value: T) -> Result<(), TryReserveError> {
        let (g, offset) = self.split(bucket);
        self.groups[g].insert(offset, value)?;
        self.occupied += 1;
        Ok(())
    }

    /// Reserve slot storage per group: `demand[g]` upcoming inserts for
    /// group `g`. After success those inserts cannot allocate.
    pub fn try_reserve_groups(&mut self, demand: &[usize]) -> Result<(), TryReserveError> {
        debug_assert_eq!(demand.len(), self.groups.len());
        for (group, &n) in self.groups.iter_mut().zip(demand) {
            if n > 0 {
                group.try_reserve_exact(n)?;
            }
        }
        Ok(())
    }

    pub fn group_directory_len(&self) -> usize {
        self.groups.len()
    }

    /// Occupied buckets in ascending order.
    pub fn iter(&self) -> Entries<'_, T> {
        Entries {
            groups: self.groups.iter().enumerate(),
            current: None,
        }
    }

    pub fn iter_mut(&mut self) -> EntriesMut<'_, T> {
        EntriesMut {
            groups: self.groups.iter_mut().enumerate(),
            current: None,
        }
    }

    /// Consume the table, yielding occupied buckets in ascending order.
    /// Drain order matches `iter`, which the map's rehash relies on.
    pub fn into_entries(self) -> impl Iterator<Item = (usize, T)> {
        self.groups
            .into_iter()
            .enumerate()
            .flat_map(|(g, group)| {
                let base = g * GROUP_SIZE;
                group.into_iter().map(move |(offset, value)| (base + offset, value))
            })
    }
}

pub struct Entries<'a, T> {
    groups: std::iter::Enumerate<std::slice::Iter<'a, SparseGroup<T>>>,
    current: Option<(usize, GroupIter<'a, T>)>,
}

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (usize, &'a T);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((base, group)) = &mut self.current {
                if let Some((offset, value)) = group.next() {
                    return Some((*base + offset, value));
                }
            }
            let (g, group) = self.groups.next()?;
            self.current = Some((g * GROUP_SIZE, group.iter()));
        }
    }
}

pub struct EntriesMut<'a, T> {
    groups: std::iter::Enumerate<std::slice::IterMut<'a, SparseGroup<T>>>,
    current: Option<(usize, GroupIterMut<'a, T>)>,
}

impl<'a, T> Iterator for EntriesMut<'a, T> {
    type Item = (usize, &'a mut T);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((base, group)) = &mut self.current {
                if let Some((offset, value)) = group.next() {
                    return Some((*base + offset, value));
                }
            }
            let (g, group) = self.groups.next()?;
            self.current = Some((g * GROUP_SIZE, group.iter_mut()));
        }
    }
}
