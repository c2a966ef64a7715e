//! Table metadata and query slices.

use std::ops::Bound;

use crate::key::ClusteringKey;

pub type ColumnId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Static,
    Regular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub id: ColumnId,
    pub name: String,
    pub kind: ColumnKind,
}

/// Table metadata the compactor needs: the column set and the
/// tombstone grace period.
#[derive(Debug, Clone)]
pub struct Schema {
    static_columns: Vec<ColumnDef>,
    regular_columns: Vec<ColumnDef>,
    gc_grace_seconds: u32,
}

impl Schema {
    pub fn new<S: Into<String>>(
        static_columns: impl IntoIterator<Item = S>,
        regular_columns: impl IntoIterator<Item = S>,
        gc_grace_seconds: u32,
    ) -> Self {
        let def = |kind: ColumnKind| {
            move |(id, name): (usize, S)| ColumnDef {
                id: id as ColumnId,
                name: name.into(),
                kind,
            }
        };
        Self {
            static_columns: static_columns
                .into_iter()
                .enumerate()
                .map(def(ColumnKind::Static))
                .collect(),
            regular_columns: regular_columns
                .into_iter()
                .enumerate()
                .map(def(ColumnKind::Regular))
                .collect(),
            gc_grace_seconds,
        }
    }

    pub fn column_at(&self, kind: ColumnKind, id: ColumnId) -> Option<&ColumnDef> {
        let columns = match kind {
            ColumnKind::Static => &self.static_columns,
            ColumnKind::Regular => &self.regular_columns,
        };
        columns.get(id as usize)
    }

    pub fn gc_grace_seconds(&self) -> u32 {
        self.gc_grace_seconds
    }

    /// The slice selecting everything: all clustering ranges, no limits.
    pub fn full_slice(&self) -> QuerySlice {
        QuerySlice::default()
    }
}

/// A range of clustering keys requested by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRange {
    pub start: Bound<ClusteringKey>,
    pub end: Bound<ClusteringKey>,
}

impl ClusteringRange {
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!((&self.start, &self.end), (Bound::Unbounded, Bound::Unbounded))
    }
}

/// Query-level options affecting row accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceOptions {
    /// `SELECT DISTINCT`: at most one row per partition.
    pub distinct: bool,
    /// Return static content even when no clustering row matches.
    pub always_return_static_content: bool,
}

/// What part of each partition a query wants, and how many rows of it.
#[derive(Debug, Clone)]
pub struct QuerySlice {
    pub row_ranges: Vec<ClusteringRange>,
    pub partition_row_limit: u64,
    pub options: SliceOptions,
}

impl QuerySlice {
    /// The per-partition row limit with the `distinct` option folded in.
    pub fn effective_partition_row_limit(&self) -> u64 {
        if self.options.distinct {
            1
        } else {
            self.partition_row_limit
        }
    }
}

impl Default for QuerySlice {
    fn default() -> Self {
        Self {
            row_ranges: vec![ClusteringRange::all()],
            partition_row_limit: u64::MAX,
            options: SliceOptions::default(),
        }
    }
}

/// Whether the range list restricts the clustering space. An empty list
/// is an "exclude all" restriction, like an empty partition-key range.
pub fn has_ck_selector(ranges: &[ClusteringRange]) -> bool {
    ranges.is_empty() || ranges.iter().any(|r| !r.is_full())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_slice_has_no_ck_selector() {
        let schema = Schema::new(["s"], ["v"], 3600);
        let slice = schema.full_slice();
        assert!(!has_ck_selector(&slice.row_ranges));
        assert!(has_ck_selector(&[]));
        assert!(has_ck_selector(&[ClusteringRange {
            start: Bound::Included(ClusteringKey::new("a")),
            end: Bound::Unbounded,
        }]));
    }

    #[test]
    fn distinct_caps_the_partition_row_limit() {
        let mut slice = QuerySlice::default();
        assert_eq!(slice.effective_partition_row_limit(), u64::MAX);
        slice.options.distinct = true;
        assert_eq!(slice.effective_partition_row_limit(), 1);
    }

    #[test]
    fn column_lookup_by_kind_and_id() {
        let schema = Schema::new(["s0"], ["r0", "r1"], 0);
        assert_eq!(schema.column_at(ColumnKind::Static, 0).unwrap().name, "s0");
        assert_eq!(schema.column_at(ColumnKind::Regular, 1).unwrap().name, "r1");
        assert!(schema.column_at(ColumnKind::Regular, 2).is_none());
    }
}
