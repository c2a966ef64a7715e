//! The mutation compactor.
//!
//! A streaming state machine consuming the fragmented representation of a
//! partition and emitting a compacted stream to one or two downstream
//! consumers: tombstones are applied to shadowed data, TTL'd cells are
//! expired, tombstones past their grace period are purged, and per-query
//! row/partition limits are enforced with mid-partition resumability.
//!
//! Two modes share the engine:
//! - query mode enforces limits and never emits purged data;
//! - SSTable mode has no limits and forwards purged data to a GC
//!   consumer, so a rewrite can segregate garbage from live data.

mod consumer;

pub use consumer::{
    CompactedFragmentsConsumer, Emission, EmissionLog, NoopConsumer, StopIteration,
};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;

use crate::fragment::{
    ClusteringRow, MutationFragment, PartitionStart, RangeTombstoneChange, StaticRow,
};
use crate::gc::{gc_before_for_key, GarbageBuffer, MaxPurgeableFn};
use crate::key::DecoratedKey;
use crate::position::{FullPosition, PartitionRegion, PositionInPartition};
use crate::row::RowMarker;
use crate::schema::{has_ck_selector, QuerySlice, Schema};
use crate::time::{Timestamp, WallTime};
use crate::tombstone::{RowTombstone, Tombstone};

const LOG_TARGET: &str = "stratadb::compact";

/// Live/dead row counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub live: u64,
    pub dead: u64,
}

impl RowStats {
    pub fn account(&mut self, is_live: bool) {
        self.live += u64::from(is_live);
        self.dead += u64::from(!is_live);
    }

    pub fn total(&self) -> u64 {
        self.live + self.dead
    }
}

/// Counters for one page of compaction. Reset by `start_new_page`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub partitions: u64,
    pub static_rows: RowStats,
    pub clustering_rows: RowStats,
    pub range_tombstones: u64,
}

/// The fragments needed to resume compaction mid-partition on the next
/// page: the partition header, the cached static row, and the open range
/// tombstone if there is one. Replaying them through a fresh compactor
/// restores an equivalent state.
#[derive(Debug, Clone)]
pub struct DetachedCompactionState {
    pub partition_start: PartitionStart,
    pub static_row: Option<StaticRow>,
    pub current_tombstone: Option<RangeTombstoneChange>,
}

/// Purge authority: query-time compaction may strip anything it proves
/// shadowed, while an SSTable rewrite must also clear every discard with
/// the purgeable-timestamp oracle.
enum GcState {
    Query,
    Sstable {
        get_max_purgeable: MaxPurgeableFn,
        /// Oracle answer for the current partition, fetched on first use.
        max_purgeable: Option<Timestamp>,
    },
}

/// All per-partition and per-page bookkeeping of the compactor, plus the
/// fragment-consume operations.
///
/// Shared between the facade and external observers through
/// `Rc<RefCell<_>>`; the compactor is single-threaded and non-suspending,
/// so plain reference counting is all the sharing it needs.
pub struct CompactionState {
    schema: Arc<Schema>,
    query_time: WallTime,
    gc: GcState,
    /// Grace cutoff for the current partition, computed on first use.
    gc_before: Option<WallTime>,
    slice: QuerySlice,
    row_limit: u64,
    partition_limit: u32,
    partition_row_limit: u64,

    partition_tombstone: Tombstone,
    static_row_live: bool,
    rows_in_partition: u64,
    current_partition_limit: u64,
    empty_partition: bool,
    empty_partition_in_gc: bool,
    dk: Option<DecoratedKey>,
    return_static_content_on_empty_rows: bool,

    last_static_row: Option<StaticRow>,
    last_pos: PositionInPartition,
    /// Currently active range tombstone. Can differ from
    /// `current_emitted_tombstone`: a purged tombstone is not emitted but
    /// still applies to the data it covers.
    effective_tombstone: Tombstone,
    /// Last tombstone emitted to the main and GC consumers respectively.
    /// Whoever saw a range opened must see it closed.
    current_emitted_tombstone: Tombstone,
    current_emitted_gc_tombstone: Tombstone,

    collector: Option<GarbageBuffer>,

    stats: CompactionStats,
    /// Latched when a consume operation requested a stop mid-partition.
    stop: StopIteration,
}

impl CompactionState {
    /// Query mode: limits are enforced, tombstones are applied but purged
    /// data is never forwarded anywhere.
    pub fn new_for_query(
        schema: Arc<Schema>,
        query_time: WallTime,
        slice: QuerySlice,
        row_limit: u64,
        partition_limit: u32,
    ) -> Self {
        let partition_row_limit = slice.effective_partition_row_limit();
        Self {
            schema,
            query_time,
            gc: GcState::Query,
            gc_before: None,
            slice,
            row_limit,
            partition_limit,
            partition_row_limit,
            partition_tombstone: Tombstone::NONE,
            static_row_live: false,
            rows_in_partition: 0,
            current_partition_limit: 0,
            empty_partition: true,
            empty_partition_in_gc: true,
            dk: None,
            return_static_content_on_empty_rows: false,
            last_static_row: None,
            last_pos: PositionInPartition::end_of_partition(),
            effective_tombstone: Tombstone::NONE,
            current_emitted_tombstone: Tombstone::NONE,
            current_emitted_gc_tombstone: Tombstone::NONE,
            collector: None,
            stats: CompactionStats::default(),
            stop: StopIteration::No,
        }
    }

    /// SSTable mode: no limits, and purged cells, markers and tombstones
    /// are forwarded to the GC consumer.
    pub fn new_for_compaction(
        schema: Arc<Schema>,
        compaction_time: WallTime,
        get_max_purgeable: MaxPurgeableFn,
    ) -> Self {
        let slice = schema.full_slice();
        let mut state =
            Self::new_for_query(schema, compaction_time, slice, u64::MAX, u32::MAX);
        state.gc = GcState::Sstable {
            get_max_purgeable,
            max_purgeable: None,
        };
        state.collector = Some(GarbageBuffer::new());
        state
    }

    fn sstable_compaction(&self) -> bool {
        matches!(self.gc, GcState::Sstable { .. })
    }

    fn can_gc_in(
        gc: &mut GcState,
        dk: Option<&DecoratedKey>,
        t: Tombstone,
    ) -> anyhow::Result<bool> {
        match gc {
            GcState::Query => Ok(true),
            GcState::Sstable {
                get_max_purgeable,
                max_purgeable,
            } => {
                if t.is_empty() {
                    return Ok(false);
                }
                let max = match *max_purgeable {
                    Some(max) => max,
                    None => {
                        let dk = dk.context("no partition to resolve a purgeable timestamp for")?;
                        let max = get_max_purgeable(dk)?;
                        *max_purgeable = Some(max);
                        max
                    }
                };
                Ok(t.timestamp < max)
            }
        }
    }

    fn can_gc(&mut self, t: Tombstone) -> anyhow::Result<bool> {
        Self::can_gc_in(&mut self.gc, self.dk.as_ref(), t)
    }

    fn get_gc_before(&mut self) -> WallTime {
        if let Some(gc_before) = self.gc_before {
            return gc_before;
        }
        match &self.dk {
            Some(dk) => {
                let gc_before = gc_before_for_key(&self.schema, dk, self.query_time);
                self.gc_before = Some(gc_before);
                gc_before
            }
            None => WallTime::MIN,
        }
    }

    fn can_purge_tombstone(&mut self, t: Tombstone) -> anyhow::Result<bool> {
        Ok(self.can_gc(t)? && t.deletion_time < self.get_gc_before())
    }

    fn can_purge_row_tombstone(&mut self, t: RowTombstone) -> anyhow::Result<bool> {
        Ok(self.can_gc(t.tomb())? && t.max_deletion_time() < self.get_gc_before())
    }

    fn current_key(&self) -> anyhow::Result<&DecoratedKey> {
        self.dk.as_ref().context("no partition start consumed")
    }

    /// First non-elided fragment for the main consumer: deliver the
    /// deferred partition header, and the partition tombstone unless it is
    /// purgeable.
    fn partition_is_not_empty<C: CompactedFragmentsConsumer>(
        &mut self,
        consumer: &mut C,
    ) -> anyhow::Result<()> {
        if !self.empty_partition {
            return Ok(());
        }
        self.empty_partition = false;
        self.stats.partitions += 1;
        let pt = self.partition_tombstone;
        let forward = !pt.is_empty() && !self.can_purge_tombstone(pt)?;
        consumer.consume_new_partition(self.current_key()?)?;
        if forward {
            consumer.consume_partition_tombstone(pt)?;
        }
        Ok(())
    }

    /// GC-consumer counterpart: the partition tombstone is forwarded only
    /// when it is itself purgeable.
    fn partition_is_not_empty_for_gc<G: CompactedFragmentsConsumer>(
        &mut self,
        gc_consumer: &mut G,
    ) -> anyhow::Result<()> {
        if !self.empty_partition_in_gc {
            return Ok(());
        }
        self.empty_partition_in_gc = false;
        let pt = self.partition_tombstone;
        let forward = !pt.is_empty() && self.can_purge_tombstone(pt)?;
        gc_consumer.consume_new_partition(self.current_key()?)?;
        if forward {
            gc_consumer.consume_partition_tombstone(pt)?;
        }
        Ok(())
    }

    /// Reset the per-partition state for `dk`.
    pub fn consume_new_partition(&mut self, dk: &DecoratedKey) {
        self.stop = StopIteration::No;
        self.dk = Some(dk.clone());
        self.return_static_content_on_empty_rows =
            self.slice.options.always_return_static_content
                || !has_ck_selector(&self.slice.row_ranges);
        self.empty_partition = true;
        self.empty_partition_in_gc = true;
        self.rows_in_partition = 0;
        self.static_row_live = false;
        self.partition_tombstone = Tombstone::NONE;
        self.current_partition_limit = self.row_limit.min(self.partition_row_limit);
        if let GcState::Sstable { max_purgeable, .. } = &mut self.gc {
            *max_purgeable = None;
        }
        self.gc_before = None;
        self.last_static_row = None;
        self.last_pos = PositionInPartition::partition_start();
        self.effective_tombstone = Tombstone::NONE;
        self.current_emitted_tombstone = Tombstone::NONE;
        self.current_emitted_gc_tombstone = Tombstone::NONE;
    }

    /// Store the partition tombstone and route the deferred partition
    /// header to whichever consumer will own it.
    pub fn consume_partition_tombstone<C, G>(
        &mut self,
        t: Tombstone,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<()>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        self.partition_tombstone = t;
        if self.can_purge_tombstone(t)? {
            self.partition_is_not_empty_for_gc(gc_consumer)
        } else {
            self.partition_is_not_empty(consumer)
        }
    }

    /// Deliver the partition header even though nothing was emitted yet.
    pub fn force_partition_not_empty<C: CompactedFragmentsConsumer>(
        &mut self,
        consumer: &mut C,
    ) -> anyhow::Result<()> {
        self.partition_is_not_empty(consumer)
    }

    pub fn consume_static_row<C, G>(
        &mut self,
        sr: StaticRow,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<StopIteration>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        debug_assert!(
            !self.stop.is_yes(),
            "fragment fed after a stop without start_new_page"
        );
        let mut sr = sr;
        // Cache the pre-compaction copy for page replays.
        self.last_static_row = Some(sr.clone());
        self.last_pos = PositionInPartition::static_row();
        let mut current_tombstone = self.partition_tombstone;
        if let Some(collector) = &mut self.collector {
            collector.start_collecting_static_row();
        }
        let gc_before = self.get_gc_before();
        let query_time = self.query_time;
        let Self {
            gc, dk, collector, ..
        } = self;
        let mut can_gc = |t: Tombstone| Self::can_gc_in(gc, dk.as_ref(), t);
        let is_live = sr.cells.compact_and_expire(
            RowTombstone::new(current_tombstone),
            query_time,
            &mut can_gc,
            gc_before,
            &RowMarker::Missing,
            collector.as_mut(),
        )?;
        self.stats.static_rows.account(is_live);
        if self.sstable_compaction() {
            if let Some(garbage) = self.collector.as_mut().and_then(|c| c.take_static_row()) {
                self.partition_is_not_empty_for_gc(gc_consumer)?;
                // Only dead (purged) data goes this way.
                gc_consumer.consume_static_row(garbage, current_tombstone, false)?;
            }
        } else if self.can_purge_tombstone(current_tombstone)? {
            current_tombstone = Tombstone::NONE;
        }
        self.static_row_live = is_live;
        if is_live || !sr.is_empty() {
            self.partition_is_not_empty(consumer)?;
            self.stop = consumer.consume_static_row(sr, current_tombstone, is_live)?;
        }
        Ok(self.stop)
    }

    pub fn consume_clustering_row<C, G>(
        &mut self,
        cr: ClusteringRow,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<StopIteration>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        debug_assert!(
            !self.stop.is_yes(),
            "fragment fed after a stop without start_new_page"
        );
        let mut cr = cr;
        if !self.sstable_compaction() {
            debug_assert!(self.last_pos < cr.position(), "clustering row out of order");
            self.last_pos = cr.position();
        }
        let mut current_tombstone = self.partition_tombstone;
        current_tombstone.apply(self.effective_tombstone);
        let mut t = cr.tomb;
        t.apply(current_tombstone);

        if let Some(collector) = &mut self.collector {
            collector.start_collecting_clustering_row(cr.key.clone());
        }

        let rt = cr.tomb;
        if rt.tomb() <= current_tombstone {
            cr.remove_tombstone();
        } else if self.can_purge_row_tombstone(rt)? {
            if let Some(collector) = &mut self.collector {
                collector.collect_tombstone(rt);
            }
            cr.remove_tombstone();
        }

        let gc_before = self.get_gc_before();
        let query_time = self.query_time;
        let Self {
            gc, dk, collector, ..
        } = self;
        let mut can_gc = |tomb: Tombstone| Self::can_gc_in(gc, dk.as_ref(), tomb);
        let ClusteringRow { marker, cells, .. } = &mut cr;
        let mut is_live = marker.compact_and_expire(
            t.regular(),
            query_time,
            &mut can_gc,
            gc_before,
            collector.as_mut(),
        )?;
        is_live |= cells.compact_and_expire(
            t,
            query_time,
            &mut can_gc,
            gc_before,
            marker,
            collector.as_mut(),
        )?;
        self.stats.clustering_rows.account(is_live);

        if self.sstable_compaction() {
            if let Some(garbage) = self
                .collector
                .as_mut()
                .and_then(|c| c.take_clustering_row())
            {
                self.partition_is_not_empty_for_gc(gc_consumer)?;
                // Only dead (purged) data goes this way.
                gc_consumer.consume_clustering_row(garbage, t, false)?;
            }
        } else if self.can_purge_row_tombstone(t)? {
            t = RowTombstone::NONE;
        }

        if !cr.is_empty() {
            self.partition_is_not_empty(consumer)?;
            self.stop = consumer.consume_clustering_row(cr, t, is_live)?;
        }
        if !self.sstable_compaction() && is_live {
            self.rows_in_partition += 1;
            if self.rows_in_partition == self.current_partition_limit {
                self.stop = StopIteration::Yes;
            }
        }
        Ok(self.stop)
    }

    pub fn consume_range_tombstone_change<C, G>(
        &mut self,
        rtc: RangeTombstoneChange,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<StopIteration>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        debug_assert!(
            !self.stop.is_yes(),
            "fragment fed after a stop without start_new_page"
        );
        if !self.sstable_compaction() {
            debug_assert!(
                self.last_pos < rtc.position,
                "range tombstone change out of order"
            );
            self.last_pos = rtc.position.clone();
        }
        self.stats.range_tombstones += 1;
        let stop = self.do_consume_rtc(rtc, consumer, gc_consumer)?;
        self.stop = stop;
        Ok(stop)
    }

    fn do_consume_rtc<C, G>(
        &mut self,
        mut rtc: RangeTombstoneChange,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<StopIteration>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        let mut gc_stop = StopIteration::No;
        let mut stop = StopIteration::No;
        if rtc.tombstone <= self.partition_tombstone {
            rtc.tombstone = Tombstone::NONE;
        }
        self.effective_tombstone = rtc.tombstone;
        let can_purge =
            !rtc.tombstone.is_empty() && self.can_purge_tombstone(rtc.tombstone)?;
        if can_purge || !self.current_emitted_gc_tombstone.is_empty() {
            self.partition_is_not_empty_for_gc(gc_consumer)?;
            let tomb = if can_purge {
                rtc.tombstone
            } else {
                Tombstone::NONE
            };
            self.current_emitted_gc_tombstone = tomb;
            gc_stop = gc_consumer
                .consume_range_tombstone_change(RangeTombstoneChange::new(
                    rtc.position.clone(),
                    tomb,
                ))?;
            if can_purge {
                rtc.tombstone = Tombstone::NONE;
            }
        }
        // A previously emitted tombstone must be closed even if the change
        // itself was purged away.
        if !self.current_emitted_tombstone.is_empty() || !rtc.tombstone.is_empty() {
            self.partition_is_not_empty(consumer)?;
            self.current_emitted_tombstone = rtc.tombstone;
            stop = consumer.consume_range_tombstone_change(rtc)?;
        }
        Ok(gc_stop.or(stop))
    }

    pub fn consume_end_of_partition<C, G>(
        &mut self,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<StopIteration>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        if !self.effective_tombstone.is_empty() {
            let rtc = RangeTombstoneChange::new(
                PositionInPartition::after_key(&self.last_pos),
                Tombstone::NONE,
            );
            // do_consume_rtc overwrites the active tombstone; it has to
            // survive the partition end for detach/resume.
            let prev = self.effective_tombstone;
            self.do_consume_rtc(rtc, consumer, gc_consumer)?;
            self.effective_tombstone = prev;
        }
        if !self.empty_partition_in_gc {
            gc_consumer.consume_end_of_partition()?;
        }
        if self.empty_partition && !self.empty_partition_in_gc {
            log::trace!(
                target: LOG_TARGET,
                "event=partition_fully_purged token={:?}",
                self.dk.as_ref().map(|dk| dk.token())
            );
        }
        if !self.empty_partition {
            // A static-only partition counts as one row, but only for
            // queries without a clustering selector.
            if self.rows_in_partition == 0
                && self.static_row_live
                && self.return_static_content_on_empty_rows
            {
                self.rows_in_partition += 1;
            }
            self.row_limit = self.row_limit.saturating_sub(self.rows_in_partition);
            self.partition_limit = self
                .partition_limit
                .saturating_sub(u32::from(self.rows_in_partition > 0));
            let stop = consumer.consume_end_of_partition()?;
            if !self.sstable_compaction() {
                let stop = if self.row_limit > 0 && self.partition_limit > 0 && !stop.is_yes() {
                    StopIteration::No
                } else {
                    StopIteration::Yes
                };
                // A mid-partition stop that we now ride past means "skip
                // the rest of this partition"; clear the latch as if the
                // partition was exhausted.
                if self.stop.is_yes() && !stop.is_yes() {
                    self.stop = StopIteration::No;
                }
                return Ok(stop);
            }
        }
        Ok(StopIteration::No)
    }

    /// Forward end-of-stream to both consumers and return both results.
    pub fn consume_end_of_stream<C, G>(
        &mut self,
        consumer: &mut C,
        gc_consumer: &mut G,
    ) -> anyhow::Result<(C::Output, G::Output)>
    where
        C: CompactedFragmentsConsumer,
        G: CompactedFragmentsConsumer,
    {
        let output = consumer.consume_end_of_stream()?;
        let gc_output = gc_consumer.consume_end_of_stream()?;
        Ok((output, gc_output))
    }

    /// Reset limits and query time for a new page, and re-emit the cached
    /// static row and the open range tombstone so the new page's consumer
    /// sees them.
    pub fn start_new_page<C: CompactedFragmentsConsumer>(
        &mut self,
        row_limit: u64,
        partition_limit: u32,
        query_time: WallTime,
        next_fragment_region: PartitionRegion,
        consumer: &mut C,
    ) -> anyhow::Result<()> {
        log::trace!(
            target: LOG_TARGET,
            "event=start_new_page row_limit={row_limit} partition_limit={partition_limit}"
        );
        self.empty_partition = true;
        self.static_row_live = false;
        self.row_limit = row_limit;
        self.partition_limit = partition_limit;
        self.rows_in_partition = 0;
        self.current_partition_limit = self.row_limit.min(self.partition_row_limit);
        self.query_time = query_time;
        self.stats = CompactionStats::default();
        self.stop = StopIteration::No;

        let mut noop = NoopConsumer;
        if next_fragment_region == PartitionRegion::Clustered {
            if let Some(sr) = self.last_static_row.take() {
                // Re-consuming caches the row again; the stop flag is
                // ignored because stopping here would loop the pager.
                let _ = self.consume_static_row(sr, consumer, &mut noop)?;
            }
        }
        if !self.effective_tombstone.is_empty() {
            let rtc = RangeTombstoneChange::new(
                PositionInPartition::after_key(&self.last_pos),
                self.effective_tombstone,
            );
            self.do_consume_rtc(rtc, consumer, &mut noop)?;
        }
        Ok(())
    }

    pub fn are_limits_reached(&self) -> bool {
        self.row_limit == 0 || self.partition_limit == 0
    }

    /// Detach the state needed to resume compaction on the next page.
    ///
    /// Returns `None` when the current partition was exhausted (no stop is
    /// latched): there is nothing to restore then.
    pub fn detach_state(&self) -> Option<DetachedCompactionState> {
        if !self.stop.is_yes() {
            return None;
        }
        let dk = self.dk.clone()?;
        let partition_start = PartitionStart::new(dk, self.partition_tombstone);
        let current_tombstone = (!self.effective_tombstone.is_empty()).then(|| {
            RangeTombstoneChange::new(
                PositionInPartition::after_key(&self.last_pos),
                self.effective_tombstone,
            )
        });
        Some(DetachedCompactionState {
            partition_start,
            static_row: self.last_static_row.clone(),
            current_tombstone,
        })
    }

    /// The partition the compaction is positioned in, if it started.
    pub fn current_partition(&self) -> Option<&DecoratedKey> {
        self.dk.as_ref()
    }

    /// Only meaningful in query mode once compaction has started.
    pub fn current_position(&self) -> &PositionInPartition {
        &self.last_pos
    }

    pub fn current_full_position(&self) -> Option<FullPosition> {
        Some(FullPosition {
            key: self.dk.clone()?,
            position: self.last_pos.clone(),
        })
    }

    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }
}

/// Binds a [`CompactionState`] to a concrete pair of consumers and
/// forwards the fragment protocol to it.
pub struct Compactor<C, G = NoopConsumer>
where
    C: CompactedFragmentsConsumer,
    G: CompactedFragmentsConsumer,
{
    state: Rc<RefCell<CompactionState>>,
    consumer: C,
    gc_consumer: G,
}

impl<C: CompactedFragmentsConsumer> Compactor<C, NoopConsumer> {
    /// Query-time compaction: the GC consumer is a no-op.
    pub fn new_for_query(
        schema: Arc<Schema>,
        query_time: WallTime,
        slice: QuerySlice,
        row_limit: u64,
        partition_limit: u32,
        consumer: C,
    ) -> Self {
        Self::from_state(
            Rc::new(RefCell::new(CompactionState::new_for_query(
                schema,
                query_time,
                slice,
                row_limit,
                partition_limit,
            ))),
            consumer,
            NoopConsumer,
        )
    }
}

impl<C, G> Compactor<C, G>
where
    C: CompactedFragmentsConsumer,
    G: CompactedFragmentsConsumer,
{
    /// SSTable-rewrite compaction: purged data goes to `gc_consumer`.
    pub fn new_for_compaction(
        schema: Arc<Schema>,
        compaction_time: WallTime,
        get_max_purgeable: MaxPurgeableFn,
        consumer: C,
        gc_consumer: G,
    ) -> Self {
        Self::from_state(
            Rc::new(RefCell::new(CompactionState::new_for_compaction(
                schema,
                compaction_time,
                get_max_purgeable,
            ))),
            consumer,
            gc_consumer,
        )
    }

    /// Bind consumers to an existing (e.g. resumed) state.
    pub fn from_state(state: Rc<RefCell<CompactionState>>, consumer: C, gc_consumer: G) -> Self {
        Self {
            state,
            consumer,
            gc_consumer,
        }
    }

    /// The shared state handle, for pagination and detach.
    pub fn state(&self) -> Rc<RefCell<CompactionState>> {
        self.state.clone()
    }

    pub fn consume_new_partition(&mut self, dk: &DecoratedKey) {
        self.state.borrow_mut().consume_new_partition(dk);
    }

    pub fn consume_partition_tombstone(&mut self, t: Tombstone) -> anyhow::Result<()> {
        self.state.borrow_mut().consume_partition_tombstone(
            t,
            &mut self.consumer,
            &mut self.gc_consumer,
        )
    }

    pub fn consume_static_row(&mut self, sr: StaticRow) -> anyhow::Result<StopIteration> {
        self.state
            .borrow_mut()
            .consume_static_row(sr, &mut self.consumer, &mut self.gc_consumer)
    }

    pub fn consume_clustering_row(&mut self, cr: ClusteringRow) -> anyhow::Result<StopIteration> {
        self.state
            .borrow_mut()
            .consume_clustering_row(cr, &mut self.consumer, &mut self.gc_consumer)
    }

    pub fn consume_range_tombstone_change(
        &mut self,
        rtc: RangeTombstoneChange,
    ) -> anyhow::Result<StopIteration> {
        self.state.borrow_mut().consume_range_tombstone_change(
            rtc,
            &mut self.consumer,
            &mut self.gc_consumer,
        )
    }

    pub fn consume_end_of_partition(&mut self) -> anyhow::Result<StopIteration> {
        self.state
            .borrow_mut()
            .consume_end_of_partition(&mut self.consumer, &mut self.gc_consumer)
    }

    pub fn consume_end_of_stream(&mut self) -> anyhow::Result<(C::Output, G::Output)> {
        self.state
            .borrow_mut()
            .consume_end_of_stream(&mut self.consumer, &mut self.gc_consumer)
    }

    /// Dispatch one fragment of the partition stream.
    pub fn consume(&mut self, fragment: MutationFragment) -> anyhow::Result<StopIteration> {
        match fragment {
            MutationFragment::PartitionStart(ps) => {
                let mut state = self.state.borrow_mut();
                state.consume_new_partition(&ps.key);
                state.consume_partition_tombstone(
                    ps.partition_tombstone,
                    &mut self.consumer,
                    &mut self.gc_consumer,
                )?;
                Ok(StopIteration::No)
            }
            MutationFragment::StaticRow(sr) => self.consume_static_row(sr),
            MutationFragment::ClusteringRow(cr) => self.consume_clustering_row(cr),
            MutationFragment::RangeTombstoneChange(rtc) => {
                self.consume_range_tombstone_change(rtc)
            }
            MutationFragment::PartitionEnd => self.consume_end_of_partition(),
        }
    }

    /// Feed fragments until the stream ends or the compactor requests a
    /// stop.
    pub fn consume_all(
        &mut self,
        fragments: impl IntoIterator<Item = MutationFragment>,
    ) -> anyhow::Result<StopIteration> {
        for fragment in fragments {
            if self.consume(fragment)?.is_yes() {
                return Ok(StopIteration::Yes);
            }
        }
        Ok(StopIteration::No)
    }

    /// Deliver the partition header even though nothing was emitted yet.
    pub fn force_partition_not_empty(&mut self) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .force_partition_not_empty(&mut self.consumer)
    }

    /// Start a new page on the bound main consumer.
    pub fn start_new_page(
        &mut self,
        row_limit: u64,
        partition_limit: u32,
        query_time: WallTime,
        next_fragment_region: PartitionRegion,
    ) -> anyhow::Result<()> {
        self.state.borrow_mut().start_new_page(
            row_limit,
            partition_limit,
            query_time,
            next_fragment_region,
            &mut self.consumer,
        )
    }

    pub fn detach_state(&self) -> Option<DetachedCompactionState> {
        self.state.borrow().detach_state()
    }

    pub fn stats(&self) -> CompactionStats {
        *self.state.borrow().stats()
    }
}
