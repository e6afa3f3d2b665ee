use std::time::{Duration, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{instrument, warn};

use coral_store::proto::{CachedEntry, ObjectMeta};
use coral_store::storagerpc::StorageRpc;
use coral_store::{contains_separator, unix_now, Error};

use crate::edge_cache;
use crate::error::GatewayError;
use crate::range::{self, RawRange};
use crate::streamer::LargeReadStreamer;
use crate::upload::LargeUploadSession;
use crate::AppState;

pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

/// Capacity of the pipe between a streaming task and the response body.
const STREAM_PIPE_CAPACITY: usize = 8 * 1024;

/// Renders a timestamp the way `Last-Modified` wants it.
pub(crate) fn http_date(secs: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Renders a stored checksum as the 32-hex-character ETag value, or
/// nothing if the checksum has an unexpected width.
pub(crate) fn format_etag(checksum: &[u8]) -> Option<String> {
    coral_store::Md5Digest::try_from(checksum.to_vec())
        .ok()
        .map(|d| d.to_string())
}

fn object_headers(
    builder: axum::http::response::Builder,
    meta: &ObjectMeta,
) -> axum::http::response::Builder {
    let builder = match meta.etag() {
        Some(etag) => builder.header(ETAG, etag.to_string()),
        None => builder,
    };
    builder.header(LAST_MODIFIED, http_date(meta.timestamp))
}

pub(crate) fn small_response(meta: &ObjectMeta, body: Bytes, content_type: Option<&str>) -> Response {
    object_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, body.len())
            .header(CONTENT_TYPE, content_type.unwrap_or(OCTET_STREAM)),
        meta,
    )
    .body(Body::from(body))
    .unwrap()
}

/// Streams a chunked object through a pipe: a spawned task walks the
/// chunk tree and writes into one end, the response body drains the
/// other. A mid-stream failure truncates the response.
pub(crate) fn streamed_response(state: &AppState, key: &[u8], meta: &ObjectMeta) -> Response {
    let (w, r) = tokio::io::duplex(STREAM_PIPE_CAPACITY);

    let streamer = LargeReadStreamer::new(
        state.storage.clone(),
        state.cache.clone(),
        Bytes::copy_from_slice(key),
        meta.cnumber,
        w,
    );
    tokio::spawn(async move {
        if let Err(e) = streamer.stream_all().await {
            warn!(err=%e, "failed to stream chunked object");
        }
    });

    object_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, meta.dsize)
            .header(CONTENT_TYPE, OCTET_STREAM),
        meta,
    )
    .body(Body::from_stream(ReaderStream::new(r)))
    .unwrap()
}

/// GET without the edge cache: fetch, stream if chunked, and populate
/// the cache for qualifying leaf objects in inline mode.
pub(crate) async fn plain_get(state: &AppState, key: &[u8]) -> Result<Response, GatewayError> {
    let (meta, body) = state.storage.get(key).await?;
    if meta.is_deleted() {
        return Err(Error::NotFound.into());
    }

    if meta.is_chunked() {
        return Ok(streamed_response(state, key, &meta));
    }

    if state.config.inner_cache_active()
        && !contains_separator(key)
        && (body.len() as u64) < state.config.cache_max_content_len
    {
        let entry = CachedEntry {
            mtime: unix_now(),
            etag: meta.checksum.clone(),
            content_type: OCTET_STREAM.to_string(),
            body: body.clone(),
            size: body.len() as u64,
            file_path: String::new(),
        };
        edge_cache::put_quiet(&*state.cache, key, entry).await;
    }

    Ok(small_response(&meta, body, None))
}

#[instrument(skip(state, headers), fields(object.key=%key))]
pub(crate) async fn get(
    Path(key): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let key = key.into_bytes();

    if let Some(ranges) = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(range::parse_range_header)
    {
        return ranged_get(&state, &key, ranges).await;
    }

    if state.config.inner_cache_active() && !contains_separator(&key) {
        if let Some(entry) = edge_cache::fresh_entry(&state, &key).await {
            return edge_cache::serve_hit(&state, &key, entry).await;
        }
    }

    plain_get(&state, &key).await
}

/// Serves one or more resolved ranges back-to-back in a single 200.
/// The body is chunked transfer, so no Content-Length is promised.
async fn ranged_get(
    state: &AppState,
    key: &[u8],
    ranges: Vec<RawRange>,
) -> Result<Response, GatewayError> {
    let meta = state.storage.head(key).await?;
    if meta.is_deleted() {
        return Err(Error::NotFound.into());
    }

    let ranges = ranges
        .into_iter()
        .map(|r| r.resolve(meta.dsize))
        .collect::<Result<Vec<_>, Error>>()?;

    let (w, r) = tokio::io::duplex(STREAM_PIPE_CAPACITY);
    let storage = state.storage.clone();
    let cache = state.cache.clone();
    let key_owned = Bytes::copy_from_slice(key);
    let chunked = meta.is_chunked();
    let total = meta.cnumber;

    tokio::spawn(async move {
        let mut w = w;
        for (start, end) in ranges {
            let res = if chunked {
                LargeReadStreamer::new(
                    storage.clone(),
                    cache.clone(),
                    key_owned.clone(),
                    total,
                    &mut w,
                )
                .stream_range(start, end)
                .await
            } else {
                leaf_range(&*storage, &key_owned, start, end, &mut w).await
            };

            if let Err(e) = res {
                warn!(err=%e, "failed to stream object range");
                break;
            }
        }
    });

    Ok(object_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, OCTET_STREAM),
        &meta,
    )
    .body(Body::from_stream(ReaderStream::new(r)))
    .unwrap())
}

async fn leaf_range(
    storage: &dyn StorageRpc,
    key: &[u8],
    start: u64,
    end: u64,
    w: &mut (impl AsyncWrite + Unpin),
) -> Result<(), Error> {
    let (_, body) = storage.get_range(key, start, end).await?;
    w.write_all(&body).await?;
    Ok(())
}

#[instrument(skip(state), fields(object.key=%key))]
pub(crate) async fn head(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, GatewayError> {
    let key = key.into_bytes();

    let meta = state.storage.head(&key).await?;
    if meta.is_deleted() {
        return Err(Error::NotFound.into());
    }

    Ok(object_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, meta.dsize)
            .header(CONTENT_TYPE, OCTET_STREAM),
        &meta,
    )
    .body(Body::empty())
    .unwrap())
}

#[instrument(skip(state), fields(object.key=%key))]
pub(crate) async fn delete(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, GatewayError> {
    let key = key.into_bytes();

    edge_cache::delete_quiet(&*state.cache, &key).await;

    match state.storage.delete(&key).await {
        // a key that was never there is as deleted as it gets
        Ok(()) | Err(Error::NotFound) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state, request), fields(object.key=%key))]
pub(crate) async fn put(
    Path(key): Path<String>,
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let key = key.into_bytes();

    let content_length = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(len) = content_length {
        if len >= state.config.max_len_for_obj {
            return Err(Error::InvalidRequest(format!(
                "object of {} bytes exceeds the configured maximum",
                len
            ))
            .into());
        }
    }

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(OCTET_STREAM)
        .to_string();

    // Parts of a multipart upload are assembled elsewhere and always
    // take the small path.
    let multipart_part = request
        .uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == "uploadId"))
        .unwrap_or(false);

    match content_length {
        Some(len) if len >= state.config.threshold_obj_len && !multipart_part => {
            large_put(&state, &key, len, request).await
        }
        _ => small_put(&state, &key, content_type, request).await,
    }
}

async fn small_put(
    state: &AppState,
    key: &[u8],
    content_type: String,
    request: Request,
) -> Result<Response, GatewayError> {
    let body = axum::body::to_bytes(request.into_body(), state.config.max_len_for_obj as usize)
        .await
        .map_err(|e| Error::InvalidRequest(format!("unable to read request body: {}", e)))?;

    let etag = state
        .storage
        .put(key, body.clone(), body.len() as u64, 0)
        .await?;

    if state.config.inner_cache_active()
        && !contains_separator(key)
        && (body.len() as u64) < state.config.cache_max_content_len
    {
        let entry = CachedEntry {
            mtime: unix_now(),
            etag: etag.clone().into(),
            content_type,
            size: body.len() as u64,
            body,
            file_path: String::new(),
        };
        edge_cache::put_quiet(&*state.cache, key, entry).await;
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(ETAG, etag.to_string())
        .body(Body::empty())
        .unwrap())
}

/// The chunked upload path: cut the request body into fixed windows,
/// put each as a child chunk, then commit the manifest. Every failure
/// mode ends in a rollback of whatever was stored.
async fn large_put(
    state: &AppState,
    key: &[u8],
    content_length: u64,
    request: Request,
) -> Result<Response, GatewayError> {
    let chunk_len = state.config.chunked_obj_len as usize;

    // a stale cache entry for the parent must not outlive the rewrite
    edge_cache::delete_quiet(&*state.cache, key).await;

    let mut session = LargeUploadSession::open(
        state.storage.clone(),
        state.cache.clone(),
        Bytes::copy_from_slice(key),
    );

    let stream = request.into_body().into_data_stream().map_err(|e| {
        warn!(err=%e, "failed to read request body");
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string())
    });
    let mut body_reader = StreamReader::new(stream);

    let mut index: u64 = 0;
    let mut received: u64 = 0;
    let mut window = BytesMut::with_capacity(chunk_len);

    loop {
        let n = {
            let remaining = chunk_len - window.len();
            let mut dst = (&mut window).limit(remaining);
            match body_reader.read_buf(&mut dst).await {
                Ok(n) => n,
                Err(e) => {
                    // the client went away mid-upload
                    session.rollback(index).await;
                    return Err(Error::StorageError(format!("upload aborted: {}", e)).into());
                }
            }
        };

        if n == 0 {
            break;
        }
        received += n as u64;

        if window.len() == chunk_len {
            index += 1;
            if let Err(e) = session.put_chunk(index, window.split().freeze()).await {
                // recorded in the session ledger; commit aggregates
                warn!(chunk.index = index, err=%e, "chunk upload failed");
            }
        }
    }

    if !window.is_empty() {
        index += 1;
        if let Err(e) = session.put_chunk(index, window.split().freeze()).await {
            warn!(chunk.index = index, err=%e, "chunk upload failed");
        }
    }

    let total = index;

    let digest = match session.commit() {
        Ok(digest) => digest,
        Err(failed) => {
            let n = failed.len();
            session.rollback(total).await;
            return Err(Error::RolledBackUpload(n).into());
        }
    };

    if received != content_length {
        session.rollback(total).await;
        return Err(Error::StorageError(format!(
            "expected {} bytes, received {}",
            content_length, received
        ))
        .into());
    }

    match state
        .storage
        .put_manifest(key, received, state.config.chunked_obj_len, total, &digest)
        .await
    {
        Ok(_) => {
            session.finish();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(ETAG, digest.to_string())
                .body(Body::empty())
                .unwrap())
        }
        Err(e) => {
            session.rollback(total).await;
            Err(e.into())
        }
    }
}
