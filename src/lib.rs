//! sparse-hashmap: a single-threaded hash map built on sparse groups,
//! trading occasional full-table rehash passes for very low per-entry
//! memory overhead.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: build SparseHashMap in safe, verifiable layers so each piece
//!   can be reasoned about independently.
//! - Layers:
//!   - SparseGroup<T>: a 48-offset span storing only occupied slots,
//!     located by popcount rank over a 64-bit occupancy bitmap. A vacant
//!     offset costs one bit; an occupied slot carries no spare capacity.
//!   - SparseTable<T>: the ordered sequence of groups spanning the
//!     bucket range, with bucket -> (group, offset) routing, an O(1)
//!     occupancy count, and in-order iteration/draining for rehash.
//!   - SparseHashMap<K, V, S>: public API. Open addressing with
//!     triangular probing over a power-of-two bucket count, a registered
//!     deleted-key sentinel, in-place tombstones, and load-factor driven
//!     grow/purge/shrink.
//!
//! Constraints
//! - Single-threaded: `!Sync` in every build profile (enforced with a
//!   marker so debug and release agree); `Send` when `K`/`V`/`S` are, so
//!   a map can sit behind a caller-provided mutex.
//! - Sparse storage: group slot vectors grow one slot at a time with
//!   exact reservations. No per-entry metadata beyond the bitmap bit.
//! - Values are owned: one `V` per live entry, dropped exactly once --
//!   on overwrite (the old value), on erase, on clear, and on map drop.
//! - The registered deleted key is never storable; `set` rejects it
//!   rather than corrupting the table.
//!
//! Why this split?
//! - Localize invariants: rank arithmetic lives in SparseGroup, bucket
//!   routing in SparseTable, probing and occupancy policy in the map.
//! - Minimize tricky code: the layers are plain safe Rust; the only
//!   subtle state is the bitmap/dense-vector correspondence, tested in
//!   isolation.
//! - Clear failure boundaries: every allocation a rehash needs happens
//!   before any entry moves, so a failed resize leaves the table intact.
//!
//! Reentrancy policy
//! - Probing invokes user code via `K: Hash`/`Eq`, and entry removal
//!   runs user `Drop` impls. Map entry points hold a debug-only reentry
//!   check while internal counters and bitmaps may be transiently
//!   inconsistent; user drops are sequenced after the structure is
//!   consistent again. Release builds compile the check away.
//!
//! Rehash invariants
//! - Hashes are not cached per entry; caching a `u64` per slot would
//!   defeat the sparse overhead target. Rehashing therefore re-invokes
//!   `K: Hash`, under the reentry check.
//! - A rehash plans before it commits: live entries are trial-placed
//!   into a scratch bitmap to size every destination group, all storage
//!   is reserved fallibly, and only then do entries move. The commit
//!   replays the plan's iteration and probe order, so it cannot
//!   allocate and cannot fail partway.
//!
//! Notes and non-goals
//! - No thread safety beyond external mutual exclusion; a rehash
//!   touches every group and cannot be interleaved.
//! - Tombstones left by `erase` stay in their probe positions until the
//!   next rehash purges them; erase itself never rehashes.
//! - Shrink is deferred: erasing down to a mostly-empty table flags the
//!   map, and the next `set` contracts it best-effort.
//! - `clear` resets to the default bucket count.
//! - Public API surface is `SparseHashMap`, its error and iterator
//!   types, and the integer/byte-string aliases; lower layers are
//!   implementation details.

mod reentrancy;
mod sparse_group;
mod sparse_hash_map;
#[cfg(feature = "bench_internal")]
pub mod sparse_table;
#[cfg(not(feature = "bench_internal"))]
mod sparse_table;

// Public surface
pub use sparse_hash_map::{Iter, IterMut, SparseHashMap, SparseMapError};

/// Conventional deleted-key sentinel for integer-keyed maps.
pub const INT_DELETED_KEY: i64 = -1;

/// Conventional deleted-key sentinel for byte-string-keyed maps: a fixed
/// 16-byte pattern that does not occur in ordinary key data.
pub const BYTES_DELETED_KEY: [u8; 16] = [0xFF; 16];

/// Map keyed by 64-bit signed integers.
pub type SparseIntMap<V> = SparseHashMap<i64, V>;

/// Map keyed by byte strings.
pub type SparseBytesMap<V> = SparseHashMap<Vec<u8>, V>;
