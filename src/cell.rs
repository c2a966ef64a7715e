//! Cells: the atomic values of a row, plus collection mutations.

use bytes::Bytes;

use crate::time::{Timestamp, WallTime};
use crate::tombstone::Tombstone;

/// TTL metadata of a live expiring cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellExpiry {
    pub ttl_seconds: u32,
    pub expires_at: WallTime,
}

/// A single column value with its write timestamp.
///
/// A live cell may carry a TTL; once the TTL passes it behaves like a
/// tombstone written at `expires_at - ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    timestamp: Timestamp,
    state: CellState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CellState {
    Live {
        value: Bytes,
        expiry: Option<CellExpiry>,
    },
    Dead {
        deleted_at: WallTime,
    },
}

impl Cell {
    pub fn live(timestamp: Timestamp, value: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            state: CellState::Live {
                value: value.into(),
                expiry: None,
            },
        }
    }

    pub fn expiring(
        timestamp: Timestamp,
        value: impl Into<Bytes>,
        ttl_seconds: u32,
        expires_at: WallTime,
    ) -> Self {
        Self {
            timestamp,
            state: CellState::Live {
                value: value.into(),
                expiry: Some(CellExpiry {
                    ttl_seconds,
                    expires_at,
                }),
            },
        }
    }

    pub fn dead(timestamp: Timestamp, deleted_at: WallTime) -> Self {
        Self {
            timestamp,
            state: CellState::Dead { deleted_at },
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, CellState::Live { .. })
    }

    pub fn value(&self) -> Option<&Bytes> {
        match &self.state {
            CellState::Live { value, .. } => Some(value),
            CellState::Dead { .. } => None,
        }
    }

    pub fn expiry(&self) -> Option<CellExpiry> {
        match &self.state {
            CellState::Live { expiry, .. } => *expiry,
            CellState::Dead { .. } => None,
        }
    }

    pub fn has_expired(&self, now: WallTime) -> bool {
        match &self.state {
            CellState::Live {
                expiry: Some(expiry),
                ..
            } => expiry.expires_at <= now,
            _ => false,
        }
    }

    /// The local deletion time: when the cell died, or when it will count
    /// as having died once its TTL passes.
    pub fn deletion_time(&self) -> Option<WallTime> {
        match &self.state {
            CellState::Dead { deleted_at } => Some(*deleted_at),
            CellState::Live {
                expiry: Some(expiry),
                ..
            } => Some(
                expiry
                    .expires_at
                    .saturating_sub_secs(i64::from(expiry.ttl_seconds)),
            ),
            CellState::Live { expiry: None, .. } => None,
        }
    }

    /// Convert an expiring live cell into the dead cell it decays to.
    pub fn expire(&mut self) {
        if let CellState::Live {
            expiry: Some(expiry),
            ..
        } = &self.state
        {
            let deleted_at = expiry
                .expires_at
                .saturating_sub_secs(i64::from(expiry.ttl_seconds));
            self.state = CellState::Dead { deleted_at };
        }
    }
}

/// What became of a cell under compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellFate {
    Keep { live: bool },
    Purge,
}

/// Compact one cell against `tomb` at `now`.
///
/// Shadowed cells are purged outright; expired cells decay to dead cells
/// first; dead cells are purged once past `gc_before` and admitted by
/// `can_gc`.
pub(crate) fn compact_cell(
    cell: &mut Cell,
    tomb: Tombstone,
    now: WallTime,
    can_gc: &mut dyn FnMut(Tombstone) -> anyhow::Result<bool>,
    gc_before: WallTime,
) -> anyhow::Result<CellFate> {
    if tomb.deletes(cell.timestamp()) {
        return Ok(CellFate::Purge);
    }
    if cell.has_expired(now) {
        cell.expire();
    }
    if cell.is_live() {
        return Ok(CellFate::Keep { live: true });
    }
    let deleted_at = cell.deletion_time().unwrap_or(WallTime::MIN);
    if deleted_at < gc_before && can_gc(Tombstone::new(cell.timestamp(), deleted_at))? {
        return Ok(CellFate::Purge);
    }
    Ok(CellFate::Keep { live: false })
}

/// A mutation of one complex (collection) column: a collection-level
/// tombstone plus cells keyed by their path within the collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionMutation {
    pub tomb: Tombstone,
    pub cells: Vec<(Bytes, Cell)>,
}

impl CollectionMutation {
    pub fn is_empty(&self) -> bool {
        self.tomb.is_empty() && self.cells.is_empty()
    }

    /// Compact the collection against the enclosing row tombstone.
    ///
    /// Returns whether any live cell survived and, when `collect` is set,
    /// the purged garbage as a collection mutation of its own.
    pub fn compact_and_expire(
        &mut self,
        enclosing: Tombstone,
        now: WallTime,
        can_gc: &mut dyn FnMut(Tombstone) -> anyhow::Result<bool>,
        gc_before: WallTime,
        collect: bool,
    ) -> anyhow::Result<(bool, Option<CollectionMutation>)> {
        let mut effective = enclosing;
        effective.apply(self.tomb);

        let mut garbage = CollectionMutation::default();
        let mut any_live = false;
        let mut kept = Vec::with_capacity(self.cells.len());
        for (path, mut cell) in self.cells.drain(..) {
            match compact_cell(&mut cell, effective, now, can_gc, gc_before)? {
                CellFate::Keep { live } => {
                    any_live |= live;
                    kept.push((path, cell));
                }
                CellFate::Purge => {
                    if collect {
                        garbage.cells.push((path, cell));
                    }
                }
            }
        }
        self.cells = kept;

        if self.tomb <= enclosing {
            self.tomb = Tombstone::NONE;
        } else if self.tomb.deletion_time < gc_before && can_gc(self.tomb)? {
            if collect {
                garbage.tomb = self.tomb;
            }
            self.tomb = Tombstone::NONE;
        }

        let garbage = (collect && !garbage.is_empty()).then_some(garbage);
        Ok((any_live, garbage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_gc() -> impl FnMut(Tombstone) -> anyhow::Result<bool> {
        |_| Ok(true)
    }

    #[test]
    fn expired_cell_decays_to_a_dead_cell() {
        let mut cell = Cell::expiring(10, "v", 5, WallTime(100));
        assert!(!cell.has_expired(WallTime(99)));
        assert!(cell.has_expired(WallTime(100)));
        cell.expire();
        assert!(!cell.is_live());
        assert_eq!(cell.deletion_time(), Some(WallTime(95)));
    }

    #[test]
    fn compact_cell_purges_shadowed_and_gc_eligible() {
        let tomb = Tombstone::new(20, WallTime(50));
        let mut can_gc = always_gc();

        let mut shadowed = Cell::live(15, "v");
        assert_eq!(
            compact_cell(&mut shadowed, tomb, WallTime(60), &mut can_gc, WallTime::MIN).unwrap(),
            CellFate::Purge
        );

        let mut newer = Cell::live(25, "v");
        assert_eq!(
            compact_cell(&mut newer, tomb, WallTime(60), &mut can_gc, WallTime::MIN).unwrap(),
            CellFate::Keep { live: true }
        );

        // Dead but still within the grace period: kept.
        let mut dead = Cell::dead(25, WallTime(55));
        assert_eq!(
            compact_cell(&mut dead, tomb, WallTime(60), &mut can_gc, WallTime(50)).unwrap(),
            CellFate::Keep { live: false }
        );
        // Past the grace period: purged.
        assert_eq!(
            compact_cell(&mut dead, tomb, WallTime(60), &mut can_gc, WallTime(56)).unwrap(),
            CellFate::Purge
        );
    }

    #[test]
    fn collection_drops_shadowed_tombstone_and_collects_garbage() {
        let mut cm = CollectionMutation {
            tomb: Tombstone::new(5, WallTime(10)),
            cells: vec![
                (Bytes::from_static(b"p1"), Cell::live(3, "old")),
                (Bytes::from_static(b"p2"), Cell::live(7, "new")),
            ],
        };
        let enclosing = Tombstone::new(4, WallTime(9));
        let mut can_gc = always_gc();
        let (any_live, garbage) = cm
            .compact_and_expire(enclosing, WallTime(100), &mut can_gc, WallTime(20), true)
            .unwrap();
        assert!(any_live);
        // p1 shadowed by the collection tombstone, p2 survives.
        assert_eq!(cm.cells.len(), 1);
        assert_eq!(cm.cells[0].0.as_ref(), b"p2");
        // Collection tombstone is newer than the enclosing one but past the
        // grace cutoff, so it moves to the garbage.
        assert!(cm.tomb.is_empty());
        let garbage = garbage.unwrap();
        assert_eq!(garbage.tomb, Tombstone::new(5, WallTime(10)));
        assert_eq!(garbage.cells.len(), 1);
        assert_eq!(garbage.cells[0].0.as_ref(), b"p1");
    }
}
