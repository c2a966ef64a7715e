//! Write timestamps and the garbage-collection wall clock.

/// Write timestamp of a cell, marker or tombstone. Microseconds by
/// convention; the compactor only ever compares them.
pub type Timestamp = i64;

/// The missing timestamp. Sorts below every real timestamp.
pub const NO_TIMESTAMP: Timestamp = i64::MIN;

/// A point on the garbage-collection wall clock, in whole seconds.
///
/// Deletion times and TTL expiries live on this clock. It is supplied by
/// the caller (query time or compaction time); the crate never reads the
/// system clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WallTime(pub i64);

impl WallTime {
    pub const MIN: WallTime = WallTime(i64::MIN);
    pub const MAX: WallTime = WallTime(i64::MAX);

    pub fn saturating_sub_secs(self, secs: i64) -> WallTime {
        WallTime(self.0.saturating_sub(secs))
    }

    pub fn saturating_add_secs(self, secs: i64) -> WallTime {
        WallTime(self.0.saturating_add(secs))
    }
}
