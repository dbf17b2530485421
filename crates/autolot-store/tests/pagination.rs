use std::collections::HashSet;

use chrono::{TimeZone, Utc};

use autolot_core::{CatalogQuery, PageResult, QueryLimits, Record};
use autolot_store::{CacheConfig, CachedRecordStore, MemoryRecordStore, RecordStore};

/// 217 listings with heavily repeated prices and a few missing ones.
fn catalog() -> Vec<Record> {
    (0..217)
        .map(|i| {
            let mut record = Record::new(format!("car-{:03}", (i * 89) % 217))
                .with_year(2000 + (i % 24) as i32)
                .with_mileage((i * 1371 % 200_000) as i64)
                .with_created_at(Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap())
                .with_name(format!("Model {}", i % 13));
            if i % 17 != 0 {
                record = record.with_price(((i * 37) % 41) as f64 * 500.0);
            }
            record
        })
        .collect()
}

fn query(params: &[(&str, &str)]) -> CatalogQuery {
    CatalogQuery::from_params(params.iter().copied(), QueryLimits::default()).unwrap()
}

async fn all_pages(store: &impl RecordStore, params: &[(&str, &str)]) -> Vec<PageResult> {
    let mut pages = Vec::new();
    let mut next = query(params);
    loop {
        let page = store.query_page(&next).await.unwrap();
        let more = page.has_next;
        pages.push(page);
        if !more {
            return pages;
        }
        next = next.next_page();
    }
}

#[tokio::test]
async fn test_pages_partition_the_catalog() {
    let store = MemoryRecordStore::with_records(catalog());

    let pages = all_pages(
        &store,
        &[("sort", "price"), ("direction", "asc"), ("pageSize", "50")],
    )
    .await;

    let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![50, 50, 50, 50, 17]);
    assert!(pages.iter().all(|p| p.total == 217 && p.total_pages == 5));

    let ids: Vec<&str> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|r| r.id.as_str()))
        .collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 217);
    assert_eq!(unique.len(), 217);
}

#[tokio::test]
async fn test_sort_is_global_across_pages() {
    let store = MemoryRecordStore::with_records(catalog());
    let pages = all_pages(
        &store,
        &[("sort", "price"), ("direction", "asc"), ("pageSize", "50")],
    )
    .await;

    for pair in pages.windows(2) {
        let max_here = pair[0].items.iter().filter_map(|r| r.price).fold(f64::MIN, f64::max);
        let min_next = pair[1].items.iter().filter_map(|r| r.price).fold(f64::MAX, f64::min);
        assert!(max_here <= min_next, "{} > {}", max_here, min_next);
    }

    // Listings without a price come last.
    let last = &pages[pages.len() - 1].items;
    assert!(last.last().unwrap().price.is_none());

    // Concatenated pages equal one sort of the whole catalog.
    let mut expected = catalog();
    let sort = query(&[("sort", "price"), ("direction", "asc")]).sort;
    expected.sort_by(|a, b| sort.compare(a, b));
    let paged: Vec<String> = pages
        .into_iter()
        .flat_map(|p| p.items.into_iter().map(|r| r.id))
        .collect();
    let whole: Vec<String> = expected.into_iter().map(|r| r.id).collect();
    assert_eq!(paged, whole);
}

#[tokio::test]
async fn test_descending_keeps_missing_values_last() {
    let store = MemoryRecordStore::with_records(catalog());
    let pages = all_pages(
        &store,
        &[("sort", "price"), ("direction", "desc"), ("pageSize", "100")],
    )
    .await;

    let prices: Vec<Option<f64>> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|r| r.price))
        .collect();
    let first_missing = prices.iter().position(Option::is_none).unwrap();
    assert!(prices[first_missing..].iter().all(Option::is_none));
    assert!(prices[..first_missing]
        .windows(2)
        .all(|w| w[0].unwrap() >= w[1].unwrap()));
}

#[tokio::test]
async fn test_ties_break_on_id() {
    let records: Vec<Record> = ["d", "a", "c", "b"]
        .iter()
        .map(|id| Record::new(*id).with_price(100.0))
        .collect();
    let store = MemoryRecordStore::with_records(records);

    let first = store
        .query_page(&query(&[("sort", "price"), ("pageSize", "2")]))
        .await
        .unwrap();
    let second = store
        .query_page(&query(&[("sort", "price"), ("pageSize", "2"), ("page", "2")]))
        .await
        .unwrap();

    let ids: Vec<&str> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_filters_apply_before_paging() {
    let store = MemoryRecordStore::with_records(catalog());
    let params = [
        ("sort", "mileage"),
        ("direction", "asc"),
        ("year_min", "2010"),
        ("year_max", "2015"),
        ("pageSize", "10"),
    ];

    let pages = all_pages(&store, &params).await;
    let expected = catalog()
        .into_iter()
        .filter(|r| matches!(r.year, Some(y) if (2010..=2015).contains(&y)))
        .count() as u64;

    assert_eq!(pages[0].total, expected);
    let seen: usize = pages.iter().map(|p| p.items.len()).sum();
    assert_eq!(seen as u64, expected);
    assert!(pages
        .iter()
        .flat_map(|p| p.items.iter())
        .all(|r| matches!(r.year, Some(y) if (2010..=2015).contains(&y))));
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let store = MemoryRecordStore::with_records(catalog());

    let page = store
        .query_page(&query(&[("pageSize", "50"), ("page", "6")]))
        .await
        .unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.total, 217);
    assert!(!page.has_next);
    assert!(page.has_prev);
    assert!(page.is_out_of_range());

    let far = store
        .query_page(&query(&[("pageSize", "50"), ("page", "1000000")]))
        .await
        .unwrap();
    assert!(far.items.is_empty());
    assert_eq!(far.total, 217);
    assert!(!far.has_next);
}

#[tokio::test]
async fn test_reingesting_is_idempotent() {
    let store = MemoryRecordStore::new();
    store.upsert(catalog()).await.unwrap();
    let before = store.get("car-042").unwrap();

    store.upsert(catalog()).await.unwrap();

    assert_eq!(store.len(), 217);
    assert_eq!(store.get("car-042").unwrap(), before);
}

#[tokio::test]
async fn test_cached_store_pages_match_inner_store() {
    let inner = MemoryRecordStore::with_records(catalog());
    let cached = CachedRecordStore::new(inner.clone(), CacheConfig::default());
    let params = [("sort", "created_at"), ("pageSize", "30")];

    let direct = all_pages(&inner, &params).await;
    let first = all_pages(&cached, &params).await;
    let second = all_pages(&cached, &params).await;

    assert_eq!(first, direct);
    assert_eq!(second, direct);
    assert_eq!(cached.stats().hits, direct.len() as u64);
}
