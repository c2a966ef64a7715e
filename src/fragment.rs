//! The fragmented representation of a partition.
//!
//! A partition streams as: partition start (with the partition-level
//! tombstone), an optional static row, then clustering rows and
//! range-tombstone changes in ascending position order, then a partition
//! end.

use crate::key::{ClusteringKey, DecoratedKey};
use crate::position::PositionInPartition;
use crate::row::{Row, RowMarker};
use crate::tombstone::{RowTombstone, Tombstone};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStart {
    pub key: DecoratedKey,
    pub partition_tombstone: Tombstone,
}

impl PartitionStart {
    pub fn new(key: DecoratedKey, partition_tombstone: Tombstone) -> Self {
        Self {
            key,
            partition_tombstone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticRow {
    pub cells: Row,
}

impl StaticRow {
    pub fn new(cells: Row) -> Self {
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRow {
    pub key: ClusteringKey,
    pub tomb: RowTombstone,
    pub marker: RowMarker,
    pub cells: Row,
}

impl ClusteringRow {
    pub fn new(key: ClusteringKey, tomb: RowTombstone, marker: RowMarker, cells: Row) -> Self {
        Self {
            key,
            tomb,
            marker,
            cells,
        }
    }

    pub fn position(&self) -> PositionInPartition {
        PositionInPartition::at_key(self.key.clone())
    }

    pub fn remove_tombstone(&mut self) {
        self.tomb = RowTombstone::NONE;
    }

    /// No tombstone, no marker, no cells: nothing to forward.
    pub fn is_empty(&self) -> bool {
        self.tomb.is_empty() && self.marker.is_missing() && self.cells.is_empty()
    }
}

/// Closes whatever range tombstone was active and opens `tombstone`; an
/// empty tombstone only closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstoneChange {
    pub position: PositionInPartition,
    pub tombstone: Tombstone,
}

impl RangeTombstoneChange {
    pub fn new(position: PositionInPartition, tombstone: Tombstone) -> Self {
        Self {
            position,
            tombstone,
        }
    }
}

/// One element of the partition stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationFragment {
    PartitionStart(PartitionStart),
    StaticRow(StaticRow),
    ClusteringRow(ClusteringRow),
    RangeTombstoneChange(RangeTombstoneChange),
    PartitionEnd,
}

impl MutationFragment {
    pub fn position(&self) -> PositionInPartition {
        match self {
            MutationFragment::PartitionStart(_) => PositionInPartition::partition_start(),
            MutationFragment::StaticRow(_) => PositionInPartition::static_row(),
            MutationFragment::ClusteringRow(cr) => cr.position(),
            MutationFragment::RangeTombstoneChange(rtc) => rtc.position.clone(),
            MutationFragment::PartitionEnd => PositionInPartition::end_of_partition(),
        }
    }
}
