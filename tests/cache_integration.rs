//! Exercises `Cache` against a real on-disk SQLite file instead of the
//! in-memory connection the unit tests use.

use agentweb::cache::{Cache, CacheConfig};
use agentweb::page::RenderResult;
use tempfile::TempDir;

fn open_test_cache() -> (Cache, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("nested").join("cache.db");
    let cache = Cache::open(&CacheConfig {
        db_path,
        max_entries: 500,
        verbose: false,
    })
    .expect("failed to open cache");
    (cache, temp_dir)
}

fn sample_result(url: &str) -> RenderResult {
    RenderResult {
        url: url.to_string(),
        backend: "lite".to_string(),
        detection: None,
        data: None,
        chunks: vec![],
        summary: "summary".to_string(),
        ms: 5,
        cached: false,
        error: None,
    }
}

#[test]
fn creates_parent_directories_for_db_path() {
    let (cache, temp_dir) = open_test_cache();
    assert!(temp_dir.path().join("nested").join("cache.db").exists());
    drop(cache);
}

#[test]
fn persists_across_a_get_after_set() {
    let (cache, _temp) = open_test_cache();
    let result = sample_result("https://example.com/page");
    cache
        .set("https://example.com/page", "", &result, 60_000)
        .expect("set failed");

    let fetched = cache
        .get("https://example.com/page", "")
        .expect("get failed")
        .expect("expected a cache hit");
    assert_eq!(fetched.url, result.url);
    assert_eq!(fetched.summary, result.summary);
}

#[test]
fn separate_query_variants_do_not_collide() {
    let (cache, _temp) = open_test_cache();
    let a = sample_result("https://example.com/page");
    let mut b = sample_result("https://example.com/page");
    b.summary = "other summary".to_string();

    cache.set("https://example.com/page", "", &a, 60_000).unwrap();
    cache
        .set("https://example.com/page", "pricing", &b, 60_000)
        .unwrap();

    let default_hit = cache.get("https://example.com/page", "").unwrap().unwrap();
    let query_hit = cache
        .get("https://example.com/page", "pricing")
        .unwrap()
        .unwrap();
    assert_eq!(default_hit.summary, "summary");
    assert_eq!(query_hit.summary, "other summary");
}

#[test]
fn purge_expired_removes_only_stale_rows() {
    let (cache, _temp) = open_test_cache();
    let fresh = sample_result("https://example.com/fresh");
    let stale = sample_result("https://example.com/stale");

    cache.set("https://example.com/fresh", "", &fresh, 60_000).unwrap();
    cache.set("https://example.com/stale", "", &stale, 0).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));

    let purged = cache.purge_expired().unwrap();
    assert_eq!(purged, 1);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.entries, 1);
}
