//! Rows: column values keyed by column id, plus the row marker.

use std::collections::BTreeMap;

use crate::cell::{compact_cell, Cell, CellExpiry, CellFate, CollectionMutation};
use crate::gc::GarbageBuffer;
use crate::schema::ColumnId;
use crate::time::{Timestamp, WallTime, NO_TIMESTAMP};
use crate::tombstone::{RowTombstone, Tombstone};

/// The value of one column in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Atomic(Cell),
    Collection(CollectionMutation),
}

/// The liveness marker of a clustering row.
///
/// `Missing` means the row was never written as an entity of its own (it
/// only exists through its cells); a `Dead` marker is a row-level
/// tombstone artifact kept until it can be purged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowMarker {
    #[default]
    Missing,
    Live {
        timestamp: Timestamp,
        expiry: Option<CellExpiry>,
    },
    Dead {
        timestamp: Timestamp,
        deleted_at: WallTime,
    },
}

impl RowMarker {
    pub fn live(timestamp: Timestamp) -> Self {
        RowMarker::Live {
            timestamp,
            expiry: None,
        }
    }

    pub fn expiring(timestamp: Timestamp, ttl_seconds: u32, expires_at: WallTime) -> Self {
        RowMarker::Live {
            timestamp,
            expiry: Some(CellExpiry {
                ttl_seconds,
                expires_at,
            }),
        }
    }

    pub fn dead(timestamp: Timestamp, deleted_at: WallTime) -> Self {
        RowMarker::Dead {
            timestamp,
            deleted_at,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RowMarker::Missing)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, RowMarker::Live { .. })
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            RowMarker::Missing => NO_TIMESTAMP,
            RowMarker::Live { timestamp, .. } => *timestamp,
            RowMarker::Dead { timestamp, .. } => *timestamp,
        }
    }

    /// Compact the marker against `tomb` at `now`.
    ///
    /// Returns whether the marker is live afterwards. Erased markers go to
    /// the collector when one is attached.
    pub fn compact_and_expire(
        &mut self,
        tomb: Tombstone,
        now: WallTime,
        can_gc: &mut dyn FnMut(Tombstone) -> anyhow::Result<bool>,
        gc_before: WallTime,
        collector: Option<&mut GarbageBuffer>,
    ) -> anyhow::Result<bool> {
        if self.is_missing() {
            return Ok(false);
        }
        if tomb.deletes(self.timestamp()) {
            if let Some(collector) = collector {
                collector.collect_marker(self.clone());
            }
            *self = RowMarker::Missing;
            return Ok(false);
        }
        if let RowMarker::Live {
            timestamp,
            expiry: Some(expiry),
        } = *self
        {
            if expiry.expires_at <= now {
                *self = RowMarker::Dead {
                    timestamp,
                    deleted_at: expiry
                        .expires_at
                        .saturating_sub_secs(i64::from(expiry.ttl_seconds)),
                };
            }
        }
        if let RowMarker::Dead {
            timestamp,
            deleted_at,
        } = *self
        {
            if deleted_at < gc_before && can_gc(Tombstone::new(timestamp, deleted_at))? {
                if let Some(collector) = collector {
                    collector.collect_marker(self.clone());
                }
                *self = RowMarker::Missing;
            }
        }
        Ok(self.is_live())
    }
}

/// The cells of one row, keyed by column id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: BTreeMap<ColumnId, ColumnValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a column. The last write wins.
    pub fn apply(&mut self, id: ColumnId, value: ColumnValue) {
        self.cells.insert(id, value);
    }

    pub fn get(&self, id: ColumnId) -> Option<&ColumnValue> {
        self.cells.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, &ColumnValue)> {
        self.cells.iter().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Compact every cell of the row against `tomb` at `now`.
    ///
    /// The marker decides whether the shadowable part of `tomb` applies to
    /// the cells. Purged cells and collection garbage go to the collector
    /// when one is attached. Returns whether any live cell survived.
    pub fn compact_and_expire(
        &mut self,
        tomb: RowTombstone,
        now: WallTime,
        can_gc: &mut dyn FnMut(Tombstone) -> anyhow::Result<bool>,
        gc_before: WallTime,
        marker: &RowMarker,
        mut collector: Option<&mut GarbageBuffer>,
    ) -> anyhow::Result<bool> {
        let cell_tomb = tomb.tomb_for_cells(marker);
        let mut any_live = false;
        let cells = std::mem::take(&mut self.cells);
        for (id, value) in cells {
            match value {
                ColumnValue::Atomic(mut cell) => {
                    match compact_cell(&mut cell, cell_tomb, now, can_gc, gc_before)? {
                        CellFate::Keep { live } => {
                            any_live |= live;
                            self.cells.insert(id, ColumnValue::Atomic(cell));
                        }
                        CellFate::Purge => {
                            if let Some(collector) = collector.as_deref_mut() {
                                collector.collect_cell(id, cell);
                            }
                        }
                    }
                }
                ColumnValue::Collection(mut cm) => {
                    let (live, garbage) = cm.compact_and_expire(
                        cell_tomb,
                        now,
                        can_gc,
                        gc_before,
                        collector.is_some(),
                    )?;
                    any_live |= live;
                    if let (Some(garbage), Some(collector)) = (garbage, collector.as_deref_mut()) {
                        collector.collect_collection(id, garbage);
                    }
                    if !cm.is_empty() {
                        self.cells.insert(id, ColumnValue::Collection(cm));
                    }
                }
            }
        }
        Ok(any_live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_gc() -> impl FnMut(Tombstone) -> anyhow::Result<bool> {
        |_| Ok(true)
    }

    fn row_with(cells: Vec<(ColumnId, Cell)>) -> Row {
        let mut row = Row::new();
        for (id, cell) in cells {
            row.apply(id, ColumnValue::Atomic(cell));
        }
        row
    }

    #[test]
    fn shadowed_cells_are_removed() {
        let mut row = row_with(vec![(0, Cell::live(5, "old")), (1, Cell::live(15, "new"))]);
        let tomb = RowTombstone::new(Tombstone::new(10, WallTime(0)));
        let mut can_gc = always_gc();
        let live = row
            .compact_and_expire(
                tomb,
                WallTime(100),
                &mut can_gc,
                WallTime::MIN,
                &RowMarker::Missing,
                None,
            )
            .unwrap();
        assert!(live);
        assert_eq!(row.len(), 1);
        assert!(row.get(1).is_some());
    }

    #[test]
    fn expired_cell_is_kept_dead_within_grace_then_purged() {
        // TTL of 10s expiring at t=50, so it counts as deleted at t=40.
        let cell = Cell::expiring(5, "v", 10, WallTime(50));

        let mut row = row_with(vec![(0, cell.clone())]);
        let mut can_gc = always_gc();
        let live = row
            .compact_and_expire(
                RowTombstone::NONE,
                WallTime(60),
                &mut can_gc,
                WallTime(40),
                &RowMarker::Missing,
                None,
            )
            .unwrap();
        assert!(!live);
        assert_eq!(row.len(), 1, "dead cell within grace is retained");

        let mut row = row_with(vec![(0, cell)]);
        let live = row
            .compact_and_expire(
                RowTombstone::NONE,
                WallTime(60),
                &mut can_gc,
                WallTime(41),
                &RowMarker::Missing,
                None,
            )
            .unwrap();
        assert!(!live);
        assert!(row.is_empty(), "dead cell past grace is purged");
    }

    #[test]
    fn live_marker_revives_shadowable_deletion() {
        let tomb = RowTombstone::new_shadowable(Tombstone::new(10, WallTime(0)));
        let marker = RowMarker::live(11);
        let mut row = row_with(vec![(0, Cell::live(5, "v"))]);
        let mut can_gc = always_gc();
        let live = row
            .compact_and_expire(
                tomb,
                WallTime(100),
                &mut can_gc,
                WallTime::MIN,
                &marker,
                None,
            )
            .unwrap();
        assert!(live, "cell shadowed only by the shadowable part survives");
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn marker_expiry_and_purge() {
        let mut can_gc = always_gc();

        let mut marker = RowMarker::expiring(5, 10, WallTime(50));
        let live = marker
            .compact_and_expire(
                Tombstone::NONE,
                WallTime(60),
                &mut can_gc,
                WallTime(40),
                None,
            )
            .unwrap();
        assert!(!live);
        assert!(
            matches!(marker, RowMarker::Dead { deleted_at, .. } if deleted_at == WallTime(40)),
            "expired marker decays to dead within grace"
        );

        let live = marker
            .compact_and_expire(
                Tombstone::NONE,
                WallTime(60),
                &mut can_gc,
                WallTime(41),
                None,
            )
            .unwrap();
        assert!(!live);
        assert!(marker.is_missing(), "dead marker past grace is erased");
    }

    #[test]
    fn dead_marker_past_grace_is_purged() {
        let mut can_gc = always_gc();
        let mut marker = RowMarker::dead(5, WallTime(10));
        let live = marker
            .compact_and_expire(
                Tombstone::NONE,
                WallTime(60),
                &mut can_gc,
                WallTime(11),
                None,
            )
            .unwrap();
        assert!(!live);
        assert!(marker.is_missing());
    }

    #[test]
    fn marker_shadowed_by_tombstone_is_erased() {
        let mut can_gc = always_gc();
        let mut marker = RowMarker::live(5);
        let live = marker
            .compact_and_expire(
                Tombstone::new(5, WallTime(0)),
                WallTime(60),
                &mut can_gc,
                WallTime::MIN,
                None,
            )
            .unwrap();
        assert!(!live);
        assert!(marker.is_missing());
    }
}
