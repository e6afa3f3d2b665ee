use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use axum::http::StatusCode;
use axum::response::Response;
use bstr::ByteSlice;
use tokio_util::io::ReaderStream;
use tracing::warn;

use coral_store::cachestore::CacheStore;
use coral_store::proto::CachedEntry;
use coral_store::storagerpc::ConditionalGet;
use coral_store::{unix_now, Error, Md5Digest};

use crate::error::GatewayError;
use crate::object;
use crate::AppState;

/// Marks responses served straight from the edge cache.
pub(crate) const X_FROM_CACHE: &str = "x-from-cache";

/// Cache lookups wrapped so backend failures never leak into the data
/// path: an error is logged and reported as a miss.
pub(crate) async fn get_quiet(cache: &dyn CacheStore, key: &[u8]) -> Option<CachedEntry> {
    match cache.get(key).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(cache.key=%key.as_bstr(), err=%e, "cache get failed");
            None
        }
    }
}

pub(crate) async fn put_quiet(cache: &dyn CacheStore, key: &[u8], entry: CachedEntry) {
    if let Err(e) = cache.put(key, entry).await {
        warn!(cache.key=%key.as_bstr(), err=%e, "cache put failed");
    }
}

pub(crate) async fn delete_quiet(cache: &dyn CacheStore, key: &[u8]) {
    if let Err(e) = cache.delete(key).await {
        warn!(cache.key=%key.as_bstr(), err=%e, "cache delete failed");
    }
}

/// Looks up `key` and applies the TTL: an entry older than
/// `cache_expire` is dropped and reported as a miss.
pub(crate) async fn fresh_entry(state: &AppState, key: &[u8]) -> Option<CachedEntry> {
    let entry = get_quiet(&*state.cache, key).await?;

    if unix_now().saturating_sub(entry.mtime) > state.config.cache_expire {
        delete_quiet(&*state.cache, key).await;
        return None;
    }
    Some(entry)
}

/// The inline GET path over a cache hit: revalidates the entry against
/// storage by its etag and serves whichever copy wins.
pub(crate) async fn serve_hit(
    state: &AppState,
    key: &[u8],
    entry: CachedEntry,
) -> Result<Response, GatewayError> {
    let etag = match Md5Digest::try_from(entry.etag.clone()) {
        Ok(etag) => etag,
        Err(_) => {
            // malformed record, drop it and start over
            delete_quiet(&*state.cache, key).await;
            return object::plain_get(state, key).await;
        }
    };

    match state.storage.get_with_etag(key, &etag).await {
        Ok(ConditionalGet::NotModified) => serve_entry(state, key, entry).await,
        Ok(ConditionalGet::Modified { meta, body }) => {
            if meta.is_deleted() {
                delete_quiet(&*state.cache, key).await;
                return Err(Error::NotFound.into());
            }

            if meta.is_chunked() {
                // chunked objects are never cached at the parent key
                delete_quiet(&*state.cache, key).await;
                return Ok(object::streamed_response(state, key, &meta));
            }

            let content_type = entry.content_type;
            let refreshed = CachedEntry {
                mtime: unix_now(),
                etag: meta.checksum.clone(),
                content_type: content_type.clone(),
                body: body.clone(),
                size: body.len() as u64,
                file_path: String::new(),
            };
            put_quiet(&*state.cache, key, refreshed).await;

            Ok(object::small_response(&meta, body, Some(&content_type)))
        }
        Err(Error::NotFound) => {
            delete_quiet(&*state.cache, key).await;
            Err(Error::NotFound.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Serves a revalidated cache entry, from memory or from its data file.
async fn serve_entry(
    state: &AppState,
    key: &[u8],
    entry: CachedEntry,
) -> Result<Response, GatewayError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, entry.content_type.as_str())
        .header(LAST_MODIFIED, object::http_date(entry.mtime));
    if let Some(etag) = object::format_etag(&entry.etag) {
        builder = builder.header(ETAG, etag);
    }

    if entry.is_on_disk() {
        match tokio::fs::File::open(&entry.file_path).await {
            Ok(file) => Ok(builder
                .header(X_FROM_CACHE, "True/via disk")
                .header(CONTENT_LENGTH, entry.size)
                .body(Body::from_stream(ReaderStream::new(file)))
                .unwrap()),
            Err(e) => {
                // an unreadable data file counts as a miss
                warn!(cache.key=%key.as_bstr(), err=%e, "cache data file unreadable");
                delete_quiet(&*state.cache, key).await;
                object::plain_get(state, key).await
            }
        }
    } else {
        Ok(builder
            .header(X_FROM_CACHE, "True/via memory")
            .header(CONTENT_LENGTH, entry.body.len())
            .body(Body::from(entry.body))
            .unwrap())
    }
}
