//! End-to-end behaviour of the media handler against an in-memory store
//! and edge cache.

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use media_delivery::{
    EdgeCache, MediaError, MediaHandler, MediaResponse, MemoryEdgeCache, MemoryStore,
    ObjectMetadata, ObjectStore, GetOptions, StoredObject,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn create_test_handler() -> (MediaHandler, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .put("docs/hello.txt", Some("text/plain"), "abcdefghijk")
        .unwrap();
    store
        .put("private/secret.txt", Some("text/plain"), "top secret")
        .unwrap();
    let cache = Arc::new(MemoryEdgeCache::new(Duration::from_secs(3600)));
    let handler = MediaHandler::new(store.clone()).with_cache(cache);
    (handler, store)
}

fn get(path: &str) -> Request<()> {
    Request::builder().method(Method::GET).uri(path).body(()).unwrap()
}

fn get_with_range(path: &str, range: &str) -> Request<()> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("range", range)
        .body(())
        .unwrap()
}

fn head(path: &str) -> Request<()> {
    Request::builder().method(Method::HEAD).uri(path).body(()).unwrap()
}

fn strip_cache_status(mut headers: HeaderMap) -> HeaderMap {
    headers.remove("cf-cache-status");
    headers
}

#[tokio::test]
async fn test_full_get() {
    let (handler, _store) = create_test_handler();

    let response = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Bytes::from("abcdefghijk"));
    assert_eq!(
        response.headers.get("cache-control").unwrap(),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(response.headers.get("content-type").unwrap(), "text/plain");
    assert_eq!(response.headers.get("accept-ranges").unwrap(), "bytes");
    assert_eq!(response.headers.get("content-length").unwrap(), "11");
    assert!(response.headers.get("etag").is_some());
    assert!(response.headers.get("last-modified").is_some());
    assert!(response.headers.get("cf-cache-status").is_none());
}

#[tokio::test]
async fn test_missing_object_is_404() {
    let (handler, _store) = create_test_handler();
    let response = handler.handle(&get("/media/docs/missing.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_byte_range() {
    let (handler, _store) = create_test_handler();

    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=0-3"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body, Bytes::from("abcd"));
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 0-3/11");
    assert_eq!(response.headers.get("content-length").unwrap(), "4");
    assert_eq!(response.headers.get("accept-ranges").unwrap(), "bytes");
}

#[tokio::test]
async fn test_open_and_suffix_ranges() {
    let (handler, _store) = create_test_handler();

    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=8-"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body, Bytes::from("ijk"));
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 8-10/11");

    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=-2"))
        .await
        .unwrap();
    assert_eq!(response.body, Bytes::from("jk"));
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 9-10/11");

    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=-100"))
        .await
        .unwrap();
    assert_eq!(response.body, Bytes::from("abcdefghijk"));
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 0-10/11");
}

#[tokio::test]
async fn test_overlong_range_is_clamped() {
    let (handler, _store) = create_test_handler();
    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=5-999"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body, Bytes::from("fghijk"));
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes 5-10/11");
    assert_eq!(response.headers.get("content-length").unwrap(), "6");
}

#[tokio::test]
async fn test_second_get_served_from_cache() {
    let (handler, store) = create_test_handler();

    let first = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();
    let second = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();

    assert_eq!(store.get_calls(), 1);
    assert_eq!(first.body, second.body);
    assert!(!first.is_cache_hit());
    assert!(second.is_cache_hit());
    assert_eq!(second.headers.get("cf-cache-status").unwrap(), "HIT");
}

#[tokio::test]
async fn test_repeated_get_is_idempotent() {
    let (handler, _store) = create_test_handler();

    let first = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();
    let second = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.body, second.body);
    assert_eq!(
        strip_cache_status(first.headers),
        strip_cache_status(second.headers)
    );
}

#[tokio::test]
async fn test_ranged_requests_bypass_cache() {
    let (handler, store) = create_test_handler();

    handler.handle(&get("/media/docs/hello.txt")).await.unwrap();
    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=0-1"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert!(!response.is_cache_hit());
    assert_eq!(store.get_calls(), 2);

    // The partial response must not have replaced the full one
    let response = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();
    assert!(response.is_cache_hit());
    assert_eq!(response.body, Bytes::from("abcdefghijk"));
}

#[tokio::test]
async fn test_cache_varies_on_accept() {
    let (handler, store) = create_test_handler();

    let with_accept = |accept: &'static str| {
        Request::builder()
            .uri("/media/docs/hello.txt")
            .header("accept", accept)
            .body(())
            .unwrap()
    };

    handler.handle(&with_accept("image/webp")).await.unwrap();
    let response = handler.handle(&with_accept("image/png")).await.unwrap();
    assert!(!response.is_cache_hit());
    let response = handler.handle(&with_accept("image/webp")).await.unwrap();
    assert!(response.is_cache_hit());
    assert_eq!(store.get_calls(), 2);
}

#[tokio::test]
async fn test_protected_prefix_is_403_regardless_of_existence() {
    let (handler, store) = create_test_handler();

    let response = handler.handle(&get("/media/private/secret.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = handler.handle(&get("/media/private/absent.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = handler.handle(&get("/media//private%2Fsecret.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    assert_eq!(store.get_calls(), 0);
}

#[tokio::test]
async fn test_head_existing_object() {
    let (handler, store) = create_test_handler();

    let response = handler.handle(&head("/media/docs/hello.txt")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(response.headers.get("content-type").unwrap(), "text/plain");
    assert_eq!(
        response.headers.get("cache-control").unwrap(),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(response.headers.get("content-length").unwrap(), "11");
    assert_eq!(store.get_calls(), 0);
}

#[tokio::test]
async fn test_head_missing_object() {
    let (handler, _store) = create_test_handler();
    let response = handler.handle(&head("/media/docs/missing.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_head_does_not_populate_cache() {
    let (handler, store) = create_test_handler();
    handler.handle(&head("/media/docs/hello.txt")).await.unwrap();
    let response = handler.handle(&get("/media/docs/hello.txt")).await.unwrap();
    assert!(!response.is_cache_hit());
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test]
async fn test_end_before_start_is_416() {
    let (handler, _store) = create_test_handler();
    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=5-1"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes */11");
}

#[tokio::test]
async fn test_multi_range_is_416() {
    let (handler, _store) = create_test_handler();
    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=0-1,3-4"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_if_none_match_yields_304() {
    let (handler, store) = create_test_handler();
    let etag = store.head("docs/hello.txt").await.unwrap().unwrap().etag.unwrap();

    let req = Request::builder()
        .uri("/media/docs/hello.txt")
        .header("if-none-match", etag.as_str())
        .header("range", "bytes=0-3")
        .body(())
        .unwrap();
    let response = handler.handle(&req).await.unwrap();

    assert_eq!(response.status, StatusCode::NOT_MODIFIED);
    assert!(response.body.is_empty());
    assert_eq!(response.headers.get("etag").unwrap(), etag.as_str());
    assert!(response.headers.get("content-range").is_none());
}

#[tokio::test]
async fn test_traversal_key_is_400() {
    let (handler, store) = create_test_handler();
    for path in ["/media/../etc/passwd", "/media/docs/%2e%2e/x", "/media/%zz"] {
        let response = handler.handle(&get(path)).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "path {}", path);
    }
    assert_eq!(store.get_calls(), 0);
}

#[tokio::test]
async fn test_percent_encoded_key() {
    let (handler, store) = create_test_handler();
    store.put("docs/queen size.txt", Some("text/plain"), "zz").unwrap();
    let response = handler.handle(&get("/media/docs/queen%20size.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Bytes::from("zz"));
}

/// Store whose every call fails
struct FailingStore {
    calls: AtomicU64,
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn get(&self, _key: &str, _options: &GetOptions) -> media_delivery::Result<Option<StoredObject>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(MediaError::UpstreamFailure("bucket unavailable".to_string()))
    }

    async fn head(&self, _key: &str) -> media_delivery::Result<Option<ObjectMetadata>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(MediaError::UpstreamFailure("bucket unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let handler = MediaHandler::new(Arc::new(FailingStore { calls: AtomicU64::new(0) }));
    let err = handler.handle(&get("/media/docs/hello.txt")).await.unwrap_err();
    assert_eq!(err.to_http_status(), 500);

    let err = handler.handle(&head("/media/docs/hello.txt")).await.unwrap_err();
    assert!(matches!(err, MediaError::UpstreamFailure(_)));
}

#[tokio::test]
async fn test_size_lookup_failure_degrades_to_star() {
    let handler = MediaHandler::new(Arc::new(FailingStore { calls: AtomicU64::new(0) }));
    let response = handler
        .handle(&get_with_range("/media/docs/hello.txt", "bytes=abc"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers.get("content-range").unwrap(), "bytes */*");
}

/// Cache whose every call fails
struct BrokenCache;

#[async_trait]
impl EdgeCache for BrokenCache {
    async fn lookup(&self, _key: &media_delivery::CacheKey) -> media_delivery::Result<Option<MediaResponse>> {
        Err(MediaError::UpstreamFailure("cache down".to_string()))
    }

    async fn store(&self, _key: &media_delivery::CacheKey, _response: MediaResponse) -> media_delivery::Result<()> {
        Err(MediaError::UpstreamFailure("cache down".to_string()))
    }
}

#[tokio::test]
async fn test_cache_failures_do_not_fail_requests() {
    let store = Arc::new(MemoryStore::new());
    store.put("a.txt", Some("text/plain"), "hello").unwrap();
    let handler = MediaHandler::new(store.clone()).with_cache(Arc::new(BrokenCache));

    let response = handler.handle(&get("/media/a.txt")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Bytes::from("hello"));

    let stats = handler.metrics().get_stats();
    assert_eq!(stats.cache_errors, 2);
}

#[tokio::test]
async fn test_custom_metadata_is_not_exposed() {
    let store = Arc::new(MemoryStore::new());
    let mut metadata = ObjectMetadata::new("a.bin", 0, std::time::SystemTime::now());
    metadata
        .custom_metadata
        .insert("uploader".to_string(), "admin@example.com".to_string());
    store.insert(metadata, Bytes::from_static(b"\x00\x01")).unwrap();

    let handler = MediaHandler::new(store);
    let response = handler.handle(&get("/media/a.bin")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get("content-length").unwrap(), "2");
    assert!(response.headers.iter().all(|(_, v)| v != "admin@example.com"));
    assert!(response.headers.get("content-type").is_none());
}
