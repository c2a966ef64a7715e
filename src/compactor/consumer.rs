//! The compacted-fragment consumer protocol.

use crate::fragment::{ClusteringRow, RangeTombstoneChange, StaticRow};
use crate::key::DecoratedKey;
use crate::tombstone::{RowTombstone, Tombstone};

/// Returned by every consume operation: whether the caller must stop
/// feeding fragments until a new page is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopIteration {
    No,
    Yes,
}

impl StopIteration {
    pub fn is_yes(self) -> bool {
        matches!(self, StopIteration::Yes)
    }

    pub fn or(self, other: StopIteration) -> StopIteration {
        if self.is_yes() || other.is_yes() {
            StopIteration::Yes
        } else {
            StopIteration::No
        }
    }
}

/// A downstream consumer of compacted fragments.
///
/// The compactor drives two of these: the main consumer receives live
/// data, the GC consumer receives purged data. Partition starts are
/// delivered lazily, on the first fragment that is not elided, so a fully
/// elided partition never reaches the consumer at all.
pub trait CompactedFragmentsConsumer {
    /// The end-of-stream result. `()` for consumers with nothing to say.
    type Output;

    fn consume_new_partition(&mut self, key: &DecoratedKey) -> anyhow::Result<()>;

    fn consume_partition_tombstone(&mut self, tomb: Tombstone) -> anyhow::Result<()>;

    fn consume_static_row(
        &mut self,
        sr: StaticRow,
        tomb: Tombstone,
        is_live: bool,
    ) -> anyhow::Result<StopIteration>;

    fn consume_clustering_row(
        &mut self,
        cr: ClusteringRow,
        tomb: RowTombstone,
        is_live: bool,
    ) -> anyhow::Result<StopIteration>;

    fn consume_range_tombstone_change(
        &mut self,
        rtc: RangeTombstoneChange,
    ) -> anyhow::Result<StopIteration>;

    fn consume_end_of_partition(&mut self) -> anyhow::Result<StopIteration>;

    fn consume_end_of_stream(&mut self) -> anyhow::Result<Self::Output>;
}

/// Accepts and discards everything. The default GC consumer in query
/// mode, and the internal sink for page-start replays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConsumer;

impl CompactedFragmentsConsumer for NoopConsumer {
    type Output = ();

    fn consume_new_partition(&mut self, _key: &DecoratedKey) -> anyhow::Result<()> {
        Ok(())
    }

    fn consume_partition_tombstone(&mut self, _tomb: Tombstone) -> anyhow::Result<()> {
        Ok(())
    }

    fn consume_static_row(
        &mut self,
        _sr: StaticRow,
        _tomb: Tombstone,
        _is_live: bool,
    ) -> anyhow::Result<StopIteration> {
        Ok(StopIteration::No)
    }

    fn consume_clustering_row(
        &mut self,
        _cr: ClusteringRow,
        _tomb: RowTombstone,
        _is_live: bool,
    ) -> anyhow::Result<StopIteration> {
        Ok(StopIteration::No)
    }

    fn consume_range_tombstone_change(
        &mut self,
        _rtc: RangeTombstoneChange,
    ) -> anyhow::Result<StopIteration> {
        Ok(StopIteration::No)
    }

    fn consume_end_of_partition(&mut self) -> anyhow::Result<StopIteration> {
        Ok(StopIteration::No)
    }

    fn consume_end_of_stream(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One observed call on a consumer, with the liveness and tombstone
/// context the compactor attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    PartitionStart(DecoratedKey),
    PartitionTombstone(Tombstone),
    StaticRow {
        row: StaticRow,
        tomb: Tombstone,
        is_live: bool,
    },
    ClusteringRow {
        row: ClusteringRow,
        tomb: RowTombstone,
        is_live: bool,
    },
    RangeTombstoneChange(RangeTombstoneChange),
    PartitionEnd,
}

/// A consumer that materializes the compacted stream as a vector of
/// [`Emission`]s, yielded at end of stream.
#[derive(Debug, Default)]
pub struct EmissionLog {
    emissions: Vec<Emission>,
}

impl EmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The calls observed so far, without waiting for end of stream.
    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }
}

impl CompactedFragmentsConsumer for EmissionLog {
    type Output = Vec<Emission>;

    fn consume_new_partition(&mut self, key: &DecoratedKey) -> anyhow::Result<()> {
        self.emissions.push(Emission::PartitionStart(key.clone()));
        Ok(())
    }

    fn consume_partition_tombstone(&mut self, tomb: Tombstone) -> anyhow::Result<()> {
        self.emissions.push(Emission::PartitionTombstone(tomb));
        Ok(())
    }

    fn consume_static_row(
        &mut self,
        sr: StaticRow,
        tomb: Tombstone,
        is_live: bool,
    ) -> anyhow::Result<StopIteration> {
        self.emissions.push(Emission::StaticRow {
            row: sr,
            tomb,
            is_live,
        });
        Ok(StopIteration::No)
    }

    fn consume_clustering_row(
        &mut self,
        cr: ClusteringRow,
        tomb: RowTombstone,
        is_live: bool,
    ) -> anyhow::Result<StopIteration> {
        self.emissions.push(Emission::ClusteringRow {
            row: cr,
            tomb,
            is_live,
        });
        Ok(StopIteration::No)
    }

    fn consume_range_tombstone_change(
        &mut self,
        rtc: RangeTombstoneChange,
    ) -> anyhow::Result<StopIteration> {
        self.emissions.push(Emission::RangeTombstoneChange(rtc));
        Ok(StopIteration::No)
    }

    fn consume_end_of_partition(&mut self) -> anyhow::Result<StopIteration> {
        self.emissions.push(Emission::PartitionEnd);
        Ok(StopIteration::No)
    }

    fn consume_end_of_stream(&mut self) -> anyhow::Result<Vec<Emission>> {
        Ok(std::mem::take(&mut self.emissions))
    }
}
