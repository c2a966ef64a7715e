use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stratadb::{
    Cell, ClusteringKey, ClusteringRow, ColumnValue, Compactor, DecoratedKey, MutationFragment,
    NoopConsumer, PartitionStart, PositionInPartition, QuerySlice, RangeTombstoneChange, Row,
    RowMarker, RowTombstone, Schema, Tombstone, WallTime,
};

const ROWS: usize = 10_000;
const QUERY_TIME: i64 = 1_000_000;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(["s0"], ["v0", "v1"], 3600))
}

fn key(i: usize) -> ClusteringKey {
    // Fixed-width keys ensure stable ordering.
    ClusteringKey::new(format!("k{i:08}"))
}

fn partition(rng: &mut StdRng) -> Vec<MutationFragment> {
    let mut fragments = Vec::with_capacity(ROWS + 2);
    fragments.push(MutationFragment::PartitionStart(PartitionStart::new(
        DecoratedKey::new("pk"),
        Tombstone::new(50, WallTime(10)),
    )));
    for i in 0..ROWS {
        if rng.gen_ratio(1, 64) {
            let tomb = if rng.gen_bool(0.5) {
                Tombstone::new(rng.gen_range(1..200), WallTime(rng.gen_range(0..QUERY_TIME)))
            } else {
                Tombstone::NONE
            };
            fragments.push(MutationFragment::RangeTombstoneChange(
                RangeTombstoneChange::new(PositionInPartition::before_key(key(i)), tomb),
            ));
        }
        let mut cells = Row::new();
        cells.apply(
            0,
            ColumnValue::Atomic(Cell::live(rng.gen_range(1..200), "value")),
        );
        if rng.gen_bool(0.3) {
            cells.apply(
                1,
                ColumnValue::Atomic(Cell::expiring(
                    rng.gen_range(1..200),
                    "ttl",
                    60,
                    WallTime(rng.gen_range(0..2 * QUERY_TIME)),
                )),
            );
        }
        fragments.push(MutationFragment::ClusteringRow(ClusteringRow::new(
            key(i),
            RowTombstone::NONE,
            RowMarker::live(rng.gen_range(1..200)),
            cells,
        )));
    }
    fragments.push(MutationFragment::PartitionEnd);
    fragments
}

fn bench_query_compaction(c: &mut Criterion) {
    c.bench_function("compact_query/10k_rows", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let fragments = partition(&mut rng);
        b.iter_batched(
            || fragments.clone(),
            |fragments| {
                let mut compactor = Compactor::new_for_query(
                    schema(),
                    WallTime(QUERY_TIME),
                    QuerySlice::default(),
                    u64::MAX,
                    u32::MAX,
                    NoopConsumer,
                );
                compactor.consume_all(fragments).expect("consume");
                compactor.consume_end_of_stream().expect("end of stream");
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_sstable_compaction(c: &mut Criterion) {
    c.bench_function("compact_sstable/10k_rows", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let fragments = partition(&mut rng);
        b.iter_batched(
            || fragments.clone(),
            |fragments| {
                let mut compactor = Compactor::new_for_compaction(
                    schema(),
                    WallTime(QUERY_TIME),
                    Box::new(|_| Ok(i64::MAX)),
                    NoopConsumer,
                    NoopConsumer,
                );
                compactor.consume_all(fragments).expect("consume");
                compactor.consume_end_of_stream().expect("end of stream");
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_query_compaction, bench_sstable_compaction);
criterion_main!(benches);
