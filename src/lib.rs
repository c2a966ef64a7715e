//! `stratadb` is the mutation-compaction core of a wide-column storage
//! engine.
//!
//! This crate is intentionally opinionated about correctness first:
//! - Partitions stream as fragments in strict position order.
//! - Deletes are tombstones; a range-tombstone cursor is always closed on
//!   the consumer that saw it opened, including across page boundaries.
//! - Compaction is a pure state machine: no clocks, no I/O, no threads.
//!   Time, grace periods and purgeable timestamps come from the caller.
//!
//! The same engine serves two masters: query-time compaction (limits,
//! pagination, detach/resume) and SSTable-rewrite compaction (no limits,
//! purged data fanned out to a GC consumer).

pub mod cell;
pub mod compactor;
pub mod fragment;
pub mod gc;
pub mod key;
pub mod position;
pub mod row;
pub mod schema;
pub mod time;
pub mod tombstone;

pub use cell::{Cell, CellExpiry, CollectionMutation};
pub use compactor::{
    CompactedFragmentsConsumer, CompactionState, CompactionStats, Compactor,
    DetachedCompactionState, Emission, EmissionLog, NoopConsumer, RowStats, StopIteration,
};
pub use fragment::{
    ClusteringRow, MutationFragment, PartitionStart, RangeTombstoneChange, StaticRow,
};
pub use gc::{gc_before_for_key, GarbageBuffer, MaxPurgeableFn};
pub use key::{ClusteringKey, DecoratedKey};
pub use position::{FullPosition, PartitionRegion, PositionInPartition};
pub use row::{ColumnValue, Row, RowMarker};
pub use schema::{ColumnDef, ColumnId, ColumnKind, QuerySlice, Schema, SliceOptions};
pub use time::{Timestamp, WallTime, NO_TIMESTAMP};
pub use tombstone::{RowTombstone, Tombstone};
