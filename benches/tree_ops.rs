//! Insert throughput through the buffer pool.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

use burrowdb::{BTreeFile, BufferPool, Catalog, Field, TableId, TransactionId, TreeParams, Tuple};

fn bench_inserts(c: &mut Criterion) {
    c.bench_function("insert_1000_sequential", |b| {
        b.iter_with_setup(
            || {
                let dir = tempdir().unwrap();
                let table = TableId(1);
                let catalog = Arc::new(Catalog::new());
                let file =
                    BTreeFile::create(dir.path().join("bench.tbl"), table, TreeParams::default())
                        .unwrap();
                catalog.register(Arc::new(file));
                let pool = BufferPool::new(catalog, 64);
                (dir, pool, table)
            },
            |(_dir, pool, table)| {
                let tid = TransactionId::new();
                for k in 0..1000i64 {
                    pool.insert_tuple(tid, table, Tuple::new(vec![Field(k), Field(-k)]))
                        .unwrap();
                }
            },
        )
    });
}

criterion_group!(benches, bench_inserts);
criterion_main!(benches);
