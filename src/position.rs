//! Positions in the clustering space of a partition.

use std::cmp::Ordering;

use crate::key::{ClusteringKey, DecoratedKey};

/// The regions of a partition, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionRegion {
    PartitionStart,
    StaticRow,
    Clustered,
    EndOfPartition,
}

/// Whether a clustered position sits before, at or after its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundWeight {
    Before,
    At,
    After,
}

/// A totally ordered cursor over the clustering space of one partition.
///
/// `partition_start` and `static_row` are sentinels below every clustered
/// position; `end_of_partition` is above. Within the clustered region a
/// key-less position with weight `Before`/`After` bounds the whole row
/// range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionInPartition {
    region: PartitionRegion,
    key: Option<ClusteringKey>,
    weight: BoundWeight,
}

impl PositionInPartition {
    pub fn partition_start() -> Self {
        Self {
            region: PartitionRegion::PartitionStart,
            key: None,
            weight: BoundWeight::At,
        }
    }

    pub fn static_row() -> Self {
        Self {
            region: PartitionRegion::StaticRow,
            key: None,
            weight: BoundWeight::At,
        }
    }

    pub fn end_of_partition() -> Self {
        Self {
            region: PartitionRegion::EndOfPartition,
            key: None,
            weight: BoundWeight::At,
        }
    }

    pub fn before_all_rows() -> Self {
        Self {
            region: PartitionRegion::Clustered,
            key: None,
            weight: BoundWeight::Before,
        }
    }

    pub fn after_all_rows() -> Self {
        Self {
            region: PartitionRegion::Clustered,
            key: None,
            weight: BoundWeight::After,
        }
    }

    pub fn before_key(key: ClusteringKey) -> Self {
        Self {
            region: PartitionRegion::Clustered,
            key: Some(key),
            weight: BoundWeight::Before,
        }
    }

    pub fn at_key(key: ClusteringKey) -> Self {
        Self {
            region: PartitionRegion::Clustered,
            key: Some(key),
            weight: BoundWeight::At,
        }
    }

    /// The position immediately after everything at `pos`.
    ///
    /// For positions preceding the clustered region this is the start of
    /// the row range, so a range reopened "after" a static row covers all
    /// clustering keys.
    pub fn after_key(pos: &PositionInPartition) -> Self {
        match pos.region {
            PartitionRegion::Clustered => Self {
                region: PartitionRegion::Clustered,
                key: pos.key.clone(),
                weight: BoundWeight::After,
            },
            PartitionRegion::PartitionStart | PartitionRegion::StaticRow => {
                Self::before_all_rows()
            }
            PartitionRegion::EndOfPartition => Self::end_of_partition(),
        }
    }

    pub fn region(&self) -> PartitionRegion {
        self.region
    }

    pub fn key(&self) -> Option<&ClusteringKey> {
        self.key.as_ref()
    }

    pub fn weight(&self) -> BoundWeight {
        self.weight
    }
}

impl Ord for PositionInPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region.cmp(&other.region).then_with(|| {
            if self.region != PartitionRegion::Clustered {
                return Ordering::Equal;
            }
            match (&self.key, &other.key) {
                (None, None) => self.weight.cmp(&other.weight),
                (None, Some(_)) => match self.weight {
                    BoundWeight::After => Ordering::Greater,
                    _ => Ordering::Less,
                },
                (Some(_), None) => match other.weight {
                    BoundWeight::After => Ordering::Less,
                    _ => Ordering::Greater,
                },
                (Some(a), Some(b)) => a.cmp(b).then(self.weight.cmp(&other.weight)),
            }
        })
    }
}

impl PartialOrd for PositionInPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A position in the whole data set: partition key plus the position
/// inside that partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPosition {
    pub key: DecoratedKey,
    pub position: PositionInPartition,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ck(s: &str) -> ClusteringKey {
        ClusteringKey::new(s.to_owned())
    }

    #[test]
    fn regions_order_as_the_stream_does() {
        let ps = PositionInPartition::partition_start();
        let sr = PositionInPartition::static_row();
        let row = PositionInPartition::at_key(ck("a"));
        let end = PositionInPartition::end_of_partition();
        assert!(ps < sr);
        assert!(sr < row);
        assert!(row < end);
    }

    #[test]
    fn clustered_positions_order_by_key_then_weight() {
        let before_a = PositionInPartition::before_key(ck("a"));
        let at_a = PositionInPartition::at_key(ck("a"));
        let after_a = PositionInPartition::after_key(&at_a);
        let before_b = PositionInPartition::before_key(ck("b"));
        assert!(before_a < at_a);
        assert!(at_a < after_a);
        assert!(after_a < before_b);
    }

    #[test]
    fn keyless_bounds_enclose_all_keys() {
        let lo = PositionInPartition::before_all_rows();
        let hi = PositionInPartition::after_all_rows();
        let at_a = PositionInPartition::at_key(ck("a"));
        assert!(lo < at_a);
        assert!(at_a < hi);
        assert!(lo < hi);
    }

    #[test]
    fn after_key_of_pre_clustered_positions_opens_the_row_range() {
        let sr = PositionInPartition::static_row();
        assert_eq!(
            PositionInPartition::after_key(&sr),
            PositionInPartition::before_all_rows()
        );
        let at_a = PositionInPartition::at_key(ck("a"));
        let after_a = PositionInPartition::after_key(&at_a);
        // Idempotent on already-after positions.
        assert_eq!(PositionInPartition::after_key(&after_a), after_a);
    }
}
