mod common;

use common::FakeTransport;
use pmokuwo::{CacheKey, ContentSource, KeyValueCache, RetryPolicy};
use std::sync::Arc;
use tempfile::TempDir;

const URL: &str = "http://img4.kwcdn.kuwo.cn:81/star/albumcover/a.jpg";
const CANONICAL_URL: &str = "http://img4.kwcdn.kuwo.cn/star/albumcover/a.jpg";

fn create_test_cache() -> (TempDir, KeyValueCache) {
    let temp_dir = tempfile::tempdir().unwrap();
    let kv = KeyValueCache::open(&temp_dir.path().join("cache.db")).unwrap();
    (temp_dir, kv)
}

fn source(transport: &Arc<FakeTransport>) -> ContentSource {
    ContentSource::new(transport.clone(), RetryPolicy::default())
}

#[tokio::test]
async fn test_urlopen_hit_makes_no_network_call() {
    let (_dir, kv) = create_test_cache();
    let transport = Arc::new(FakeTransport::new().with_body(CANONICAL_URL, "img"));
    let source = source(&transport);

    assert_eq!(kv.urlopen(&source, URL, true).await.as_deref(), Some(&b"img"[..]));
    assert_eq!(transport.gets(), 1);

    assert_eq!(kv.urlopen(&source, URL, true).await.as_deref(), Some(&b"img"[..]));
    assert_eq!(transport.gets(), 1);
}

#[tokio::test]
async fn test_urlopen_without_cache_always_fetches() {
    let (_dir, kv) = create_test_cache();
    let transport = Arc::new(FakeTransport::new().with_body(CANONICAL_URL, "v"));
    let source = source(&transport);

    kv.urlopen(&source, URL, false).await.unwrap();
    kv.urlopen(&source, URL, false).await.unwrap();
    assert_eq!(transport.gets(), 2);
    assert!(kv.is_empty().unwrap());
}

#[tokio::test]
async fn test_port_81_is_requested_on_standard_port() {
    let (_dir, kv) = create_test_cache();
    // Seule l'URL sans `:81` répond
    let transport = Arc::new(FakeTransport::new().with_body(CANONICAL_URL, "img"));
    let source = source(&transport);

    assert_eq!(kv.urlopen(&source, URL, false).await.as_deref(), Some(&b"img"[..]));
    assert_eq!(transport.gets(), 1);

    assert_eq!(kv.urlopen(&source, URL, true).await.as_deref(), Some(&b"img"[..]));
    assert!(kv.contains(&CacheKey::from_url(CANONICAL_URL)).unwrap());
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let (_dir, kv) = create_test_cache();

    let broken = Arc::new(FakeTransport::new().with_body(CANONICAL_URL, "v").failing_first(3));
    assert!(kv.urlopen(&source(&broken), URL, true).await.is_none());
    assert!(!kv.contains(&CacheKey::from_url(URL)).unwrap());

    let healthy = Arc::new(FakeTransport::new().with_body(CANONICAL_URL, "v"));
    assert!(kv.urlopen(&source(&healthy), URL, true).await.is_some());
    assert_eq!(healthy.gets(), 1);
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = temp_dir.path().join("cache.db");
    let key = CacheKey::from_url(URL);

    {
        let kv = KeyValueCache::open(&db).unwrap();
        kv.put(&key, b"persisted").unwrap();
        kv.close().unwrap();
    }

    let kv = KeyValueCache::open(&db).unwrap();
    assert_eq!(kv.get(&key).unwrap().as_deref(), Some(&b"persisted"[..]));
}
