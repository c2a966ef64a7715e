//! Deletion markers.

use crate::row::RowMarker;
use crate::time::{Timestamp, WallTime, NO_TIMESTAMP};

/// A deletion marker: everything written at or before `timestamp` is
/// deleted, and the deletion itself happened at `deletion_time`.
///
/// Ordering is by `(timestamp, deletion_time)`; the empty tombstone sorts
/// below every real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tombstone {
    pub timestamp: Timestamp,
    pub deletion_time: WallTime,
}

impl Tombstone {
    pub const NONE: Tombstone = Tombstone {
        timestamp: NO_TIMESTAMP,
        deletion_time: WallTime::MIN,
    };

    pub fn new(timestamp: Timestamp, deletion_time: WallTime) -> Self {
        Self {
            timestamp,
            deletion_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp == NO_TIMESTAMP
    }

    /// Keep the stronger of the two deletions.
    pub fn apply(&mut self, other: Tombstone) {
        if *self < other {
            *self = other;
        }
    }

    /// Whether a write at `timestamp` is deleted by this tombstone.
    pub fn deletes(&self, timestamp: Timestamp) -> bool {
        !self.is_empty() && timestamp <= self.timestamp
    }
}

impl Default for Tombstone {
    fn default() -> Self {
        Tombstone::NONE
    }
}

/// The tombstone state of a single row: a regular part and a shadowable
/// part.
///
/// The shadowable part is revived (ignored for cell shadowing) by a live
/// row marker with a greater timestamp; the regular part always applies.
/// Invariant: `shadowable >= regular`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowTombstone {
    regular: Tombstone,
    shadowable: Tombstone,
}

impl RowTombstone {
    pub const NONE: RowTombstone = RowTombstone {
        regular: Tombstone::NONE,
        shadowable: Tombstone::NONE,
    };

    pub fn new(regular: Tombstone) -> Self {
        Self {
            regular,
            shadowable: regular,
        }
    }

    pub fn new_shadowable(shadowable: Tombstone) -> Self {
        Self {
            regular: Tombstone::NONE,
            shadowable,
        }
    }

    /// The effective tombstone: the stronger of the two parts.
    pub fn tomb(&self) -> Tombstone {
        self.shadowable
    }

    pub fn regular(&self) -> Tombstone {
        self.regular
    }

    pub fn is_empty(&self) -> bool {
        self.shadowable.is_empty()
    }

    /// Apply a plain tombstone to the regular part, restoring the
    /// `shadowable >= regular` invariant.
    pub fn apply(&mut self, t: Tombstone) {
        self.regular.apply(t);
        self.shadowable.apply(self.regular);
    }

    pub fn max_deletion_time(&self) -> WallTime {
        self.regular.deletion_time.max(self.shadowable.deletion_time)
    }

    /// Whether the shadowable part is suppressed by `marker`: a live
    /// marker newer than the shadowable deletion revives the row's cells.
    pub fn shadowable_is_shadowed_by(&self, marker: &RowMarker) -> bool {
        marker.is_live() && marker.timestamp() > self.shadowable.timestamp
    }

    /// The tombstone cells of this row are compacted against, given the
    /// row's (already compacted) marker.
    pub fn tomb_for_cells(&self, marker: &RowMarker) -> Tombstone {
        if self.shadowable != self.regular && self.shadowable_is_shadowed_by(marker) {
            self.regular
        } else {
            self.shadowable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ts: Timestamp, dt: i64) -> Tombstone {
        Tombstone::new(ts, WallTime(dt))
    }

    #[test]
    fn empty_sorts_below_everything() {
        assert!(Tombstone::NONE < t(i64::MIN + 1, 0));
        assert!(Tombstone::NONE < t(0, 0));
        assert!(t(5, 0) < t(5, 1));
        assert!(t(5, 9) < t(6, 0));
    }

    #[test]
    fn apply_keeps_the_stronger_deletion() {
        let mut a = t(5, 100);
        a.apply(t(3, 200));
        assert_eq!(a, t(5, 100));
        a.apply(t(7, 50));
        assert_eq!(a, t(7, 50));
        a.apply(Tombstone::NONE);
        assert_eq!(a, t(7, 50));
    }

    #[test]
    fn row_tombstone_apply_restores_invariant() {
        let mut rt = RowTombstone::new_shadowable(t(10, 0));
        assert_eq!(rt.regular(), Tombstone::NONE);
        assert_eq!(rt.tomb(), t(10, 0));

        rt.apply(t(12, 0));
        assert_eq!(rt.regular(), t(12, 0));
        assert_eq!(rt.tomb(), t(12, 0));
    }

    #[test]
    fn shadowable_revived_by_newer_live_marker() {
        let rt = RowTombstone::new_shadowable(t(10, 0));
        let newer = RowMarker::live(11);
        let older = RowMarker::live(9);
        assert!(rt.shadowable_is_shadowed_by(&newer));
        assert!(!rt.shadowable_is_shadowed_by(&older));
        assert_eq!(rt.tomb_for_cells(&newer), Tombstone::NONE);
        assert_eq!(rt.tomb_for_cells(&older), t(10, 0));
    }
}
