use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kvlite_sql::{SQLStore, SqliteStore, Value};

const CREATE: &str = "CREATE TABLE bench (k NOT NULL, v, UNIQUE (k))";

fn key(i: i64) -> Value {
    Value::Text(format!("{:040}", i))
}

fn populated(n: i64) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ddl(CREATE).unwrap();
    let batch: Vec<Vec<Value>> = (0..n)
        .map(|i| vec![key(i), Value::Blob(vec![0u8; 64])])
        .collect();
    store
        .exec_batch("INSERT INTO bench (k, v) VALUES (?1, ?2)", &batch)
        .unwrap();
    store.commit().unwrap();
    store
}

fn bench_upsert(c: &mut Criterion) {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ddl(CREATE).unwrap();

    let mut i = 0i64;
    c.bench_function("sqlite_upsert", |b| {
        b.iter(|| {
            store
                .exec(
                    "INSERT OR REPLACE INTO bench (k, v) VALUES (?1, ?2)",
                    &[key(i % 1000), Value::Blob(b"hello world".to_vec())],
                )
                .unwrap();
            i += 1;
        });
    });
    store.commit().unwrap();
}

fn bench_query_by_key(c: &mut Criterion) {
    let store = populated(10000);

    let mut i = 0i64;
    c.bench_function("sqlite_query_by_key", |b| {
        b.iter(|| {
            let rows = store
                .query(
                    "SELECT k, v FROM bench WHERE k = ?1",
                    &[black_box(key(i % 10000))],
                )
                .unwrap();
            assert_eq!(rows.len(), 1);
            i += 1;
        });
    });
}

fn bench_query_watermark_page(c: &mut Criterion) {
    let store = populated(10000);

    let mut rowid = 0i64;
    c.bench_function("sqlite_query_watermark_100", |b| {
        b.iter(|| {
            let rows = store
                .query(
                    "SELECT rowid, k, v FROM bench WHERE rowid > ?1 ORDER BY rowid LIMIT 100",
                    &[Value::Integer(black_box(rowid % 9900))],
                )
                .unwrap();
            assert_eq!(rows.len(), 100);
            rowid += 100;
        });
    });
}

criterion_group!(benches, bench_upsert, bench_query_by_key, bench_query_watermark_page);
criterion_main!(benches);
