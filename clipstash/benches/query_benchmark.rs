use chrono::{TimeZone, Utc};
use clipstash::{
    ClipboardQueryBuilder, FilterStrategy, ItemType, QueryDescriptor, RecordStore, SaveRequest,
    StoreOptions,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

const RECORDS: i64 = 5_000;

fn setup_store(strategy: FilterStrategy) -> (RecordStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut store = RecordStore::new(StoreOptions::default().with_strategy(strategy));
    store.open(temp_dir.path()).unwrap();

    for i in 0..RECORDS {
        let item_type = ItemType::ALL[(i as usize) % ItemType::ALL.len()];
        let request = SaveRequest::text(format!("entry {i} hello world it's item #{}", i % 97))
            .with_item_type(item_type)
            .with_copy_date(Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap())
            .with_favorite(i % 11 == 0);
        store.save(request).unwrap();
    }
    (store, temp_dir)
}

fn bench_query(c: &mut Criterion) {
    let queries: Vec<(&str, QueryDescriptor)> = vec![
        ("first_page", ClipboardQueryBuilder::new().with_limit(50, 0).build()),
        (
            "contains_content",
            ClipboardQueryBuilder::new()
                .with_containing_content(Some("item #42"))
                .build(),
        ),
        (
            "types_and_favorites",
            ClipboardQueryBuilder::new()
                .with_item_types(Some(&[ItemType::Text, ItemType::Link, ItemType::Code]))
                .with_favorites(Some(true))
                .with_limit(20, 10)
                .build(),
        ),
    ];

    let mut group = c.benchmark_group("query");
    group.sample_size(20);

    for strategy in [FilterStrategy::Pushdown, FilterStrategy::InMemory] {
        let (mut store, _temp) = setup_store(strategy);
        for (name, descriptor) in &queries {
            group.bench_with_input(
                BenchmarkId::new(format!("{strategy:?}"), name),
                descriptor,
                |b, descriptor| b.iter(|| store.query(descriptor)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_query);
criterion_main!(benches);
