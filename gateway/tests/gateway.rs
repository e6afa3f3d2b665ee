use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use tonic::async_trait;
use tower::ServiceExt;

use coral_gateway::{AppState, CacheMethod, GatewayConfig};
use coral_store::cachestore::{CacheStore, FsCacheStore, MemoryCacheStore};
use coral_store::proto::CachedEntry;
use coral_store::storagerpc::{MemoryStorage, StorageRpc};
use coral_store::{chunk_key, md5, Error};

struct Harness {
    router: Router,
    storage: MemoryStorage,
    cache: MemoryCacheStore,
}

fn harness(config: GatewayConfig) -> Harness {
    let storage = MemoryStorage::default();
    let cache = MemoryCacheStore::default();
    let state = AppState::new(
        Arc::new(storage.clone()),
        Arc::new(cache.clone()),
        config,
    );

    Harness {
        router: coral_gateway::gen_router(state),
        storage,
        cache,
    }
}

/// Tiny thresholds so the chunked path engages without megabytes of
/// test data.
fn small_chunk_config() -> GatewayConfig {
    GatewayConfig {
        threshold_obj_len: 1024,
        chunked_obj_len: 1024,
        ..Default::default()
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("infallible")
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body must collect")
}

fn put_request(uri: &str, body: impl Into<Bytes>) -> Request<Body> {
    let body = body.into();
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .expect("request must build")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request must build")
}

#[tokio::test]
async fn small_object_round_trip() {
    let h = harness(GatewayConfig::default());

    let resp = send(&h.router, put_request("/x/y", &b"hello world"[..])).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(
        "5eb63bbbe01eeed093cb22bb8f5acdc3",
        resp.headers()[header::ETAG]
    );
    assert!(resp.headers()[header::SERVER]
        .to_str()
        .unwrap()
        .starts_with("coral-gateway/"));

    let resp = send(&h.router, get_request("/x/y")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("11", resp.headers()[header::CONTENT_LENGTH]);
    assert_eq!(
        "5eb63bbbe01eeed093cb22bb8f5acdc3",
        resp.headers()[header::ETAG]
    );
    assert!(resp.headers().contains_key(header::LAST_MODIFIED));
    assert_eq!(b"hello world"[..], body_bytes(resp).await[..]);
}

#[tokio::test]
async fn get_missing_is_404() {
    let h = harness(GatewayConfig::default());
    let resp = send(&h.router, get_request("/no/such/key")).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
}

#[tokio::test]
async fn head_reports_metadata_without_body() {
    let h = harness(GatewayConfig::default());
    send(&h.router, put_request("/x/y", &b"hello world"[..])).await;

    let resp = send(
        &h.router,
        Request::builder()
            .method(Method::HEAD)
            .uri("/x/y")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("11", resp.headers()[header::CONTENT_LENGTH]);
    assert_eq!(
        "5eb63bbbe01eeed093cb22bb8f5acdc3",
        resp.headers()[header::ETAG]
    );
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn delete_is_204_even_when_missing() {
    let h = harness(GatewayConfig::default());
    send(&h.router, put_request("/x/y", &b"payload"[..])).await;

    let delete = |uri: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let resp = send(&h.router, delete("/x/y")).await;
    assert_eq!(StatusCode::NO_CONTENT, resp.status());
    assert_eq!(Ok(None), h.cache.get(b"x/y").await);

    let resp = send(&h.router, get_request("/x/y")).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());

    let resp = send(&h.router, delete("/never/existed")).await;
    assert_eq!(StatusCode::NO_CONTENT, resp.status());
}

/// A 10 MiB upload with 2 MiB windows lands as five chunk records plus
/// a manifest, with the etag of the assembled bytes.
#[tokio::test]
async fn large_upload_writes_chunks_and_manifest() {
    let h = harness(GatewayConfig {
        threshold_obj_len: 1024 * 1024,
        chunked_obj_len: 2 * 1024 * 1024,
        ..Default::default()
    });
    let body = Bytes::from(vec![0x41; 10 * 1024 * 1024]);

    let resp = send(&h.router, put_request("/a/b", body.clone())).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(
        "8b8378787c0925f42ccb829f6cc2fb97",
        resp.headers()[header::ETAG]
    );
    assert_eq!(md5(&body).to_string(), resp.headers()[header::ETAG]);

    let manifest = h.storage.head(b"a/b").await.expect("manifest must exist");
    assert_eq!(5, manifest.cnumber);
    assert_eq!(body.len() as u64, manifest.dsize);

    for index in 1..=5 {
        let meta = h
            .storage
            .head(&chunk_key(b"a/b", index))
            .await
            .expect("chunk must exist");
        assert_eq!(2 * 1024 * 1024, meta.dsize);
        assert_eq!(0, meta.cnumber);
    }
    assert_eq!(
        Err(Error::NotFound),
        h.storage.head(&chunk_key(b"a/b", 6)).await
    );

    // the parent key itself is not cached
    assert_eq!(Ok(None), h.cache.get(b"a/b").await);

    // reading it back streams the assembled object
    let resp = send(&h.router, get_request("/a/b")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("10485760", resp.headers()[header::CONTENT_LENGTH]);
    assert_eq!(
        "8b8378787c0925f42ccb829f6cc2fb97",
        resp.headers()[header::ETAG]
    );
    assert_eq!(body[..], body_bytes(resp).await[..]);
    assert_eq!(Ok(None), h.cache.get(b"a/b").await);
}

/// An upload that isn't a multiple of the window leaves a short last
/// chunk.
#[tokio::test]
async fn large_upload_with_tail_chunk() {
    let h = harness(small_chunk_config());
    let body = Bytes::from(vec![0x42; 1024 * 5 + 100]);

    let resp = send(&h.router, put_request("/a/tail", body.clone())).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(md5(&body).to_string(), resp.headers()[header::ETAG]);

    let manifest = h.storage.head(b"a/tail").await.expect("manifest must exist");
    assert_eq!(6, manifest.cnumber);

    let last = h
        .storage
        .head(&chunk_key(b"a/tail", 6))
        .await
        .expect("tail chunk must exist");
    assert_eq!(100, last.dsize);

    let resp = send(&h.router, get_request("/a/tail")).await;
    assert_eq!(body[..], body_bytes(resp).await[..]);
}

#[tokio::test]
async fn oversized_put_is_rejected() {
    let h = harness(GatewayConfig {
        max_len_for_obj: 1024,
        ..Default::default()
    });

    let resp = send(&h.router, put_request("/too/big", vec![0u8; 2048])).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
}

/// A PUT carrying an uploadId query parameter is a multipart part and
/// takes the small path regardless of its size.
#[tokio::test]
async fn multipart_part_takes_small_path() {
    let h = harness(small_chunk_config());
    let body = Bytes::from(vec![0x43; 4096]);

    let resp = send(
        &h.router,
        put_request("/mp/obj?uploadId=abc&partNumber=1", body.clone()),
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());

    // stored as one leaf record, no chunk children
    let meta = h.storage.head(b"mp/obj").await.expect("object must exist");
    assert_eq!(0, meta.cnumber);
    assert_eq!(
        Err(Error::NotFound),
        h.storage.head(&chunk_key(b"mp/obj", 1)).await
    );
}

#[tokio::test]
async fn ranged_get_from_middle_chunk() {
    let h = harness(GatewayConfig {
        threshold_obj_len: 1024 * 1024,
        chunked_obj_len: 2 * 1024 * 1024,
        ..Default::default()
    });
    let body = Bytes::from(vec![0x41; 10 * 1024 * 1024]);
    send(&h.router, put_request("/a/b", body)).await;

    let resp = send(
        &h.router,
        Request::builder()
            .method(Method::GET)
            .uri("/a/b")
            .header(header::RANGE, "bytes=5242880-5242883")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    // concatenated single-200 policy, not 206
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(vec![0x41; 4], body_bytes(resp).await.to_vec());
}

#[tokio::test]
async fn ranged_get_on_chunked_object_slices() {
    let h = harness(small_chunk_config());
    // 3.5 windows of distinct bytes so offsets are observable
    let mut body = Vec::new();
    for b in [b'a', b'b', b'c'] {
        body.extend_from_slice(&vec![b; 1024]);
    }
    body.extend_from_slice(&vec![b'd'; 512]);
    let body = Bytes::from(body);

    send(&h.router, put_request("/r/obj", body.clone())).await;

    let ranged = |spec: &str| {
        Request::builder()
            .method(Method::GET)
            .uri("/r/obj")
            .header(header::RANGE, spec)
            .body(Body::empty())
            .unwrap()
    };

    // crossing a chunk boundary
    let resp = send(&h.router, ranged("bytes=1000-1100")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(body[1000..=1100], body_bytes(resp).await[..]);

    // suffix range covers the short tail chunk
    let resp = send(&h.router, ranged("bytes=-600")).await;
    assert_eq!(body[body.len() - 600..], body_bytes(resp).await[..]);

    // open-ended range runs to the last byte
    let resp = send(&h.router, ranged("bytes=3000-")).await;
    assert_eq!(body[3000..], body_bytes(resp).await[..]);

    // multiple ranges are emitted back-to-back
    let resp = send(&h.router, ranged("bytes=0-1,2048-2049")).await;
    assert_eq!(b"aacc"[..], body_bytes(resp).await[..]);
}

#[tokio::test]
async fn ranged_get_on_leaf_object() {
    let h = harness(GatewayConfig::default());
    send(&h.router, put_request("/s/obj", &b"0123456789"[..])).await;

    let ranged = |spec: &str| {
        Request::builder()
            .method(Method::GET)
            .uri("/s/obj")
            .header(header::RANGE, spec)
            .body(Body::empty())
            .unwrap()
    };

    let resp = send(&h.router, ranged("bytes=2-4")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(b"234"[..], body_bytes(resp).await[..]);

    let resp = send(&h.router, ranged("bytes=0-1,5-6")).await;
    assert_eq!(b"0156"[..], body_bytes(resp).await[..]);

    let resp = send(&h.router, ranged("bytes=-4")).await;
    assert_eq!(b"6789"[..], body_bytes(resp).await[..]);

    let resp = send(&h.router, ranged("bytes=99-")).await;
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, resp.status());

    // a malformed header is ignored and the full object served
    let resp = send(&h.router, ranged("bytes=oops")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(b"0123456789"[..], body_bytes(resp).await[..]);
}

/// Inline mode: a PUT populates the cache, the next GET revalidates by
/// etag and answers from memory, and an out-of-band overwrite is picked
/// up on the GET after that.
#[tokio::test]
async fn inline_cache_serves_and_revalidates() {
    let h = harness(GatewayConfig::default());

    send(&h.router, put_request("/c/obj", &b"version one"[..])).await;
    assert!(h.cache.get(b"c/obj").await.unwrap().is_some());

    let resp = send(&h.router, get_request("/c/obj")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("True/via memory", resp.headers()["x-from-cache"]);
    assert_eq!(b"version one"[..], body_bytes(resp).await[..]);

    // someone rewrites the object behind the gateway's back
    h.storage
        .put(b"c/obj", Bytes::from_static(b"version two!"), 12, 0)
        .await
        .expect("direct put must succeed");

    let resp = send(&h.router, get_request("/c/obj")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert!(!resp.headers().contains_key("x-from-cache"));
    assert_eq!(b"version two!"[..], body_bytes(resp).await[..]);

    // the refreshed copy is what the cache now holds
    let entry = h.cache.get(b"c/obj").await.unwrap().expect("entry");
    assert_eq!(b"version two!"[..], entry.body[..]);

    // and the next GET is a memory hit again
    let resp = send(&h.router, get_request("/c/obj")).await;
    assert_eq!("True/via memory", resp.headers()["x-from-cache"]);
}

/// Inline mode with an on-disk cache backend: hits are served by
/// streaming the data file.
#[tokio::test]
async fn inline_cache_serves_from_disk() {
    let tmpdir = tempfile::TempDir::new().unwrap();
    let storage = MemoryStorage::default();
    let cache = FsCacheStore::new(tmpdir.path().to_path_buf())
        .await
        .expect("cache must initialize");
    let state = AppState::new(
        Arc::new(storage.clone()),
        Arc::new(cache.clone()),
        GatewayConfig::default(),
    );
    let router = coral_gateway::gen_router(state);

    send(&router, put_request("/d/obj", &b"disk resident body"[..])).await;

    let resp = send(&router, get_request("/d/obj")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("True/via disk", resp.headers()["x-from-cache"]);
    assert_eq!("18", resp.headers()[header::CONTENT_LENGTH]);
    assert_eq!(b"disk resident body"[..], body_bytes(resp).await[..]);
}

/// Keys containing the chunk separator are stored but never cached.
#[tokio::test]
async fn separator_keys_bypass_the_cache() {
    let h = harness(GatewayConfig::default());

    let resp = send(&h.router, put_request("/weird%0Akey", &b"strange"[..])).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(Ok(None), h.cache.get(b"weird\nkey").await);

    let resp = send(&h.router, get_request("/weird%0Akey")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert!(!resp.headers().contains_key("x-from-cache"));
    assert_eq!(b"strange"[..], body_bytes(resp).await[..]);
    assert_eq!(Ok(None), h.cache.get(b"weird\nkey").await);
}

/// A client that dies mid-upload leaves nothing behind: the stored
/// chunks are rolled back and the manifest is never written.
#[tokio::test]
async fn disconnect_mid_upload_rolls_back() {
    let h = harness(small_chunk_config());

    let parts: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(vec![0x41; 1024])),
        Ok(Bytes::from(vec![0x42; 1024])),
        Ok(Bytes::from(vec![0x43; 1024])),
        Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "client disconnected",
        )),
    ];
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/a/b")
        .header(header::CONTENT_LENGTH, 5 * 1024)
        .body(Body::from_stream(futures::stream::iter(parts)))
        .unwrap();

    let resp = send(&h.router, request).await;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());

    assert_eq!(Err(Error::NotFound), h.storage.head(b"a/b").await);
    for index in 1..=3 {
        assert_eq!(
            Err(Error::NotFound),
            h.storage.head(&chunk_key(b"a/b", index)).await,
            "chunk {} must be rolled back",
            index
        );
        assert_eq!(Ok(None), h.cache.get(&chunk_key(b"a/b", index)).await);
    }
}

/// A body shorter than the announced Content-Length is rolled back too.
#[tokio::test]
async fn short_body_rolls_back() {
    let h = harness(small_chunk_config());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/a/short")
        .header(header::CONTENT_LENGTH, 5000)
        .body(Body::from(Bytes::from(vec![0x41; 4096])))
        .unwrap();

    let resp = send(&h.router, request).await;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());
    assert_eq!(Err(Error::NotFound), h.storage.head(b"a/short").await);
    for index in 1..=4 {
        assert_eq!(
            Err(Error::NotFound),
            h.storage.head(&chunk_key(b"a/short", index)).await
        );
    }
}

/// A cache that fails every operation never changes what clients see.
mod failing_cache {
    use super::*;

    struct FailingCache;

    #[async_trait]
    impl CacheStore for FailingCache {
        async fn get(&self, _key: &[u8]) -> Result<Option<CachedEntry>, Error> {
            Err(Error::StorageError("injected cache failure".to_string()))
        }

        async fn put(&self, _key: &[u8], _entry: CachedEntry) -> Result<(), Error> {
            Err(Error::StorageError("injected cache failure".to_string()))
        }

        async fn delete(&self, _key: &[u8]) -> Result<(), Error> {
            Err(Error::StorageError("injected cache failure".to_string()))
        }
    }

    fn failing_harness(config: GatewayConfig) -> (Router, MemoryStorage) {
        let storage = MemoryStorage::default();
        let state = AppState::new(Arc::new(storage.clone()), Arc::new(FailingCache), config);
        (coral_gateway::gen_router(state), storage)
    }

    #[tokio::test]
    async fn inline_mode_survives() {
        let (router, _) = failing_harness(GatewayConfig::default());

        let resp = send(&router, put_request("/x/y", &b"hello world"[..])).await;
        assert_eq!(StatusCode::OK, resp.status());

        let resp = send(&router, get_request("/x/y")).await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(b"hello world"[..], body_bytes(resp).await[..]);

        let resp = send(
            &router,
            Request::builder()
                .method(Method::DELETE)
                .uri("/x/y")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(StatusCode::NO_CONTENT, resp.status());
    }

    #[tokio::test]
    async fn chunked_path_survives() {
        let (router, storage) = failing_harness(super::small_chunk_config());
        let body = Bytes::from(vec![0x44; 3 * 1024]);

        let resp = send(&router, put_request("/big/obj", body.clone())).await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(3, storage.head(b"big/obj").await.unwrap().cnumber);

        let resp = send(&router, get_request("/big/obj")).await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(body[..], body_bytes(resp).await[..]);
    }

    #[tokio::test]
    async fn interceptor_mode_survives() {
        let (router, _) = failing_harness(GatewayConfig {
            cache_method: CacheMethod::Outer,
            ..Default::default()
        });

        send(&router, put_request("/x/y", &b"hello world"[..])).await;

        for _ in 0..2 {
            let resp = send(&router, get_request("/x/y")).await;
            assert_eq!(StatusCode::OK, resp.status());
            assert_eq!(b"hello world"[..], body_bytes(resp).await[..]);
        }
    }
}

mod interceptor {
    use super::*;

    fn outer_config() -> GatewayConfig {
        GatewayConfig {
            cache_method: CacheMethod::Outer,
            ..Default::default()
        }
    }

    /// First GET fills the cache from the origin response, the second
    /// is served from the cache with an Age, and If-Modified-Since
    /// against the recorded mtime yields an empty 304.
    #[tokio::test]
    async fn caches_and_answers_conditionals() {
        let h = harness(outer_config());
        send(&h.router, put_request("/img/logo.png", &b"pngbytes"[..])).await;

        let first = send(&h.router, get_request("/img/logo.png")).await;
        assert_eq!(StatusCode::OK, first.status());
        assert!(!first.headers().contains_key(header::AGE));
        assert_eq!("max-age=300", first.headers()[header::CACHE_CONTROL]);
        assert!(first.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(b"pngbytes"[..], body_bytes(first).await[..]);

        let entry = h
            .cache
            .get(b"img/logo.png")
            .await
            .unwrap()
            .expect("entry must be cached");
        assert_eq!(md5(b"pngbytes").as_slice(), &entry.etag[..]);

        let second = send(&h.router, get_request("/img/logo.png")).await;
        assert_eq!(StatusCode::OK, second.status());
        assert!(second.headers().contains_key(header::AGE));
        assert!(!second.headers().contains_key("x-from-cache"));
        assert_eq!("max-age=300", second.headers()[header::CACHE_CONTROL]);
        assert_eq!(
            md5(b"pngbytes").to_string(),
            second.headers()[header::ETAG]
        );
        let last_modified = second.headers()[header::LAST_MODIFIED].clone();
        assert_eq!(b"pngbytes"[..], body_bytes(second).await[..]);

        let third = send(
            &h.router,
            Request::builder()
                .method(Method::GET)
                .uri("/img/logo.png")
                .header(header::IF_MODIFIED_SINCE, last_modified)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(StatusCode::NOT_MODIFIED, third.status());
        assert!(third.headers().contains_key(header::AGE));
        assert!(body_bytes(third).await.is_empty());
    }

    /// An If-Modified-Since that doesn't equal the recorded mtime gets
    /// the full body.
    #[tokio::test]
    async fn mismatched_if_modified_since_gets_body() {
        let h = harness(outer_config());
        send(&h.router, put_request("/img/a.png", &b"bytes"[..])).await;
        send(&h.router, get_request("/img/a.png")).await;

        let resp = send(
            &h.router,
            Request::builder()
                .method(Method::GET)
                .uri("/img/a.png")
                .header(header::IF_MODIFIED_SINCE, "Mon, 01 Jan 1990 00:00:00 GMT")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(b"bytes"[..], body_bytes(resp).await[..]);
    }

    #[tokio::test]
    async fn path_pattern_filters_cachability() {
        let h = harness(GatewayConfig {
            cache_method: CacheMethod::Outer,
            cachable_path_pattern: vec![regex::Regex::new(r"\.png$").unwrap()],
            ..Default::default()
        });
        send(&h.router, put_request("/doc/readme.txt", &b"text"[..])).await;
        send(&h.router, put_request("/img/logo.png", &b"png"[..])).await;

        send(&h.router, get_request("/doc/readme.txt")).await;
        assert_eq!(Ok(None), h.cache.get(b"doc/readme.txt").await);

        send(&h.router, get_request("/img/logo.png")).await;
        assert!(h.cache.get(b"img/logo.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn content_type_filters_cachability() {
        let h = harness(GatewayConfig {
            cache_method: CacheMethod::Outer,
            cachable_content_type: vec!["image/png".to_string()],
            ..Default::default()
        });
        send(&h.router, put_request("/img/logo.png", &b"png"[..])).await;

        // responses are served as application/octet-stream, which the
        // allow-list rejects
        send(&h.router, get_request("/img/logo.png")).await;
        assert_eq!(Ok(None), h.cache.get(b"img/logo.png").await);
    }

    #[tokio::test]
    async fn cache_control_suppresses_caching() {
        let h = harness(outer_config());
        send(&h.router, put_request("/x/y", &b"body"[..])).await;

        let resp = send(
            &h.router,
            Request::builder()
                .method(Method::GET)
                .uri("/x/y")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(Ok(None), h.cache.get(b"x/y").await);
    }

    #[tokio::test]
    async fn bodies_above_the_limit_are_not_cached() {
        let h = harness(GatewayConfig {
            cache_method: CacheMethod::Outer,
            cache_max_content_len: 16,
            ..Default::default()
        });
        send(&h.router, put_request("/x/y", &b"larger than sixteen bytes"[..])).await;

        let resp = send(&h.router, get_request("/x/y")).await;
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(
            b"larger than sixteen bytes"[..],
            body_bytes(resp).await[..]
        );
        assert_eq!(Ok(None), h.cache.get(b"x/y").await);
    }

    /// An expired entry is dropped on lookup and refilled from origin.
    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let h = harness(outer_config());
        send(&h.router, put_request("/x/y", &b"body"[..])).await;
        send(&h.router, get_request("/x/y")).await;

        // age the entry past the TTL
        let mut entry = h.cache.get(b"x/y").await.unwrap().expect("entry");
        entry.mtime -= 1000;
        h.cache.put(b"x/y", entry).await.unwrap();

        let resp = send(&h.router, get_request("/x/y")).await;
        assert_eq!(StatusCode::OK, resp.status());
        assert!(!resp.headers().contains_key(header::AGE));

        // the lookup replaced the stale entry with a fresh one
        let entry = h.cache.get(b"x/y").await.unwrap().expect("entry");
        assert!(entry.mtime + 1000 >= coral_store::unix_now());
    }
}

/// Nested manifests stream in pre-order: a child that is itself a
/// manifest contributes its grandchildren in place.
#[tokio::test]
async fn get_streams_grand_children() {
    let h = harness(GatewayConfig::default());

    let inner = chunk_key(b"n/obj", 2);
    h.storage
        .put(&chunk_key(b"n/obj", 1), Bytes::from_static(b"head-"), 5, 1)
        .await
        .unwrap();
    h.storage
        .put(&chunk_key(&inner, 1), Bytes::from_static(b"mid-"), 4, 1)
        .await
        .unwrap();
    h.storage
        .put(&chunk_key(&inner, 2), Bytes::from_static(b"tail"), 4, 2)
        .await
        .unwrap();
    h.storage
        .put_manifest(&inner, 8, 4, 2, &md5(b"mid-tail"))
        .await
        .unwrap();
    h.storage
        .put_manifest(b"n/obj", 13, 5, 2, &md5(b"head-mid-tail"))
        .await
        .unwrap();

    let resp = send(&h.router, get_request("/n/obj")).await;
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(b"head-mid-tail"[..], body_bytes(resp).await[..]);
}
