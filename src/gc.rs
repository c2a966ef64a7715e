//! Tombstone garbage-collection policy and the per-row garbage buffer.

use crate::cell::{Cell, CollectionMutation};
use crate::fragment::{ClusteringRow, StaticRow};
use crate::key::{ClusteringKey, DecoratedKey};
use crate::row::{ColumnValue, Row, RowMarker};
use crate::schema::{ColumnId, ColumnKind, Schema};
use crate::time::{Timestamp, WallTime};
use crate::tombstone::RowTombstone;

/// The purgeable-timestamp oracle: the maximum write timestamp for `dk`
/// that is guaranteed to be shadowed by newer data elsewhere. Consulted
/// lazily, at most once per partition.
pub type MaxPurgeableFn = Box<dyn FnMut(&DecoratedKey) -> anyhow::Result<Timestamp>>;

/// The wall-clock cutoff below which tombstones for `dk` may be
/// discarded.
///
/// Currently a flat grace period from the schema; the key parameter is the
/// hook for per-key repair-aware policies.
pub fn gc_before_for_key(schema: &Schema, _dk: &DecoratedKey, query_time: WallTime) -> WallTime {
    query_time.saturating_sub_secs(i64::from(schema.gc_grace_seconds()))
}

/// Scratch buffer accumulating the garbage of one row at a time so it can
/// be forwarded as a synthetic dead fragment to the GC consumer.
///
/// Starting a new row clears any leftover state, so a row abandoned after
/// a consumer failure cannot leak into the next one.
#[derive(Debug, Default)]
pub struct GarbageBuffer {
    kind: Option<ColumnKind>,
    ckey: Option<ClusteringKey>,
    tomb: RowTombstone,
    marker: RowMarker,
    row: Row,
}

impl GarbageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_collecting_static_row(&mut self) {
        self.clear();
        self.kind = Some(ColumnKind::Static);
    }

    pub fn start_collecting_clustering_row(&mut self, key: ClusteringKey) {
        self.clear();
        self.kind = Some(ColumnKind::Regular);
        self.ckey = Some(key);
    }

    pub fn collect_tombstone(&mut self, tomb: RowTombstone) {
        self.tomb = tomb;
    }

    pub fn collect_marker(&mut self, marker: RowMarker) {
        self.marker = marker;
    }

    pub fn collect_cell(&mut self, id: ColumnId, cell: Cell) {
        self.row.apply(id, ColumnValue::Atomic(cell));
    }

    pub fn collect_collection(&mut self, id: ColumnId, mutation: CollectionMutation) {
        if !mutation.is_empty() {
            self.row.apply(id, ColumnValue::Collection(mutation));
        }
    }

    /// The collected static-row garbage, if any. Resets the buffer.
    pub fn take_static_row(&mut self) -> Option<StaticRow> {
        if self.kind != Some(ColumnKind::Static) || self.row.is_empty() {
            return None;
        }
        Some(StaticRow::new(std::mem::take(&mut self.row)))
    }

    /// The collected clustering-row garbage, if any. Resets the buffer.
    pub fn take_clustering_row(&mut self) -> Option<ClusteringRow> {
        if self.kind != Some(ColumnKind::Regular) {
            return None;
        }
        if self.tomb.is_empty() && self.marker.is_missing() && self.row.is_empty() {
            return None;
        }
        let key = self.ckey.take()?;
        Some(ClusteringRow::new(
            key,
            std::mem::take(&mut self.tomb),
            std::mem::take(&mut self.marker),
            std::mem::take(&mut self.row),
        ))
    }

    fn clear(&mut self) {
        self.kind = None;
        self.ckey = None;
        self.tomb = RowTombstone::NONE;
        self.marker = RowMarker::Missing;
        self.row = Row::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tombstone::Tombstone;

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut buffer = GarbageBuffer::new();
        buffer.start_collecting_static_row();
        assert!(buffer.take_static_row().is_none());
        buffer.start_collecting_clustering_row(ClusteringKey::new("a"));
        assert!(buffer.take_clustering_row().is_none());
    }

    #[test]
    fn clustering_garbage_is_taken_once() {
        let mut buffer = GarbageBuffer::new();
        buffer.start_collecting_clustering_row(ClusteringKey::new("a"));
        buffer.collect_cell(0, Cell::dead(5, WallTime(10)));
        buffer.collect_tombstone(RowTombstone::new(Tombstone::new(3, WallTime(8))));

        let row = buffer.take_clustering_row().expect("collected garbage");
        assert_eq!(row.key, ClusteringKey::new("a"));
        assert_eq!(row.tomb, RowTombstone::new(Tombstone::new(3, WallTime(8))));
        assert_eq!(row.cells.len(), 1);

        assert!(buffer.take_clustering_row().is_none(), "reset on take");
    }

    #[test]
    fn starting_a_row_drops_leftovers() {
        let mut buffer = GarbageBuffer::new();
        buffer.start_collecting_clustering_row(ClusteringKey::new("a"));
        buffer.collect_cell(0, Cell::dead(5, WallTime(10)));
        // Abandoned mid-row, e.g. after a consumer failure.
        buffer.start_collecting_clustering_row(ClusteringKey::new("b"));
        assert!(buffer.take_clustering_row().is_none());
    }

    #[test]
    fn grace_period_is_anchored_at_query_time() {
        let schema = Schema::new(Vec::<String>::new(), vec!["v".to_owned()], 3600);
        let dk = DecoratedKey::new("pk");
        assert_eq!(
            gc_before_for_key(&schema, &dk, WallTime(10_000)),
            WallTime(6_400)
        );
    }
}
