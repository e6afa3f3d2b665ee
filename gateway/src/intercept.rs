use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{
    AGE, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, LAST_MODIFIED,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body::Body as _;
use tokio_util::io::ReaderStream;
use tracing::warn;

use coral_store::proto::CachedEntry;
use coral_store::{contains_separator, md5, unix_now};

use crate::edge_cache;
use crate::object;
use crate::AppState;

/// Reverse-proxy style edge cache: a request interceptor that can
/// short-circuit GETs from the cache, and a response interceptor that
/// captures cachable 200s, leaving the object handlers untouched.
pub(crate) async fn edge_cache(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // the cache key of a request is its path without the leading slash
    let key = request.uri().path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return next.run(request).await;
    }

    if !contains_separator(key.as_bytes()) {
        if let Some(entry) = edge_cache::fresh_entry(&state, key.as_bytes()).await {
            if let Some(response) = serve_cached(&state, request.headers(), entry).await {
                return response;
            }
        }
    }

    let request_no_store = request.headers().contains_key(CACHE_CONTROL);
    let response = next.run(request).await;

    capture_response(&state, key, request_no_store, response).await
}

/// Serves a fresh hit, honoring `If-Modified-Since` against the
/// recorded mtime. None means the entry turned out unusable and the
/// handler should run after all.
async fn serve_cached(
    state: &AppState,
    request_headers: &HeaderMap,
    entry: CachedEntry,
) -> Option<Response> {
    let age = unix_now().saturating_sub(entry.mtime);

    let mut builder = Response::builder()
        .header(LAST_MODIFIED, object::http_date(entry.mtime))
        .header(CONTENT_TYPE, entry.content_type.as_str())
        .header(AGE, age)
        .header(
            CACHE_CONTROL,
            format!("max-age={}", state.config.cache_expire),
        );
    if let Some(etag) = object::format_etag(&entry.etag) {
        builder = builder.header(ETAG, etag);
    }

    let not_modified = request_headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() == entry.mtime)
        .unwrap_or(false);

    if not_modified {
        return Some(
            builder
                .status(StatusCode::NOT_MODIFIED)
                .body(Body::empty())
                .unwrap(),
        );
    }

    let body = if entry.is_on_disk() {
        match tokio::fs::File::open(&entry.file_path).await {
            Ok(file) => Body::from_stream(ReaderStream::new(file)),
            Err(e) => {
                warn!(err=%e, "cache data file unreadable");
                return None;
            }
        }
    } else {
        Body::from(entry.body.clone())
    };

    Some(
        builder
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, entry.size)
            .body(body)
            .unwrap(),
    )
}

/// Applies the cachability predicates to a handler response and stores
/// the body when they all pass. The response flows on either way.
async fn capture_response(
    state: &AppState,
    key: String,
    request_no_store: bool,
    response: Response,
) -> Response {
    if response.status() != StatusCode::OK {
        return response;
    }

    // no Cache-Control on either side
    if request_no_store || response.headers().contains_key(CACHE_CONTROL) {
        return response;
    }

    if contains_separator(key.as_bytes()) || !state.config.path_cachable(&key) {
        return response;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(object::OCTET_STREAM)
        .to_string();
    if !state.config.content_type_cachable(&content_type) {
        return response;
    }

    // streamed bodies report no upper bound and are not buffered
    let max = state.config.cache_max_content_len;
    match response.body().size_hint().upper() {
        Some(upper) if upper > 0 && upper < max => {}
        _ => return response,
    }

    let (parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, max as usize).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(err=%e, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if body.is_empty() {
        return Response::from_parts(parts, Body::from(body));
    }

    let now = unix_now();
    let entry = CachedEntry {
        mtime: now,
        etag: md5(&body).into(),
        content_type,
        size: body.len() as u64,
        body: body.clone(),
        file_path: String::new(),
    };
    edge_cache::put_quiet(&*state.cache, key.as_bytes(), entry).await;

    let mut response = Response::from_parts(parts, Body::from(body));
    let headers = response.headers_mut();
    headers.remove(LAST_MODIFIED);
    headers.insert(
        LAST_MODIFIED,
        HeaderValue::from_str(&object::http_date(now)).unwrap(),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_str(&format!("max-age={}", state.config.cache_expire)).unwrap(),
    );
    response
}
