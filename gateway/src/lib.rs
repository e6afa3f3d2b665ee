use std::sync::Arc;

use axum::http::header::SERVER;
use axum::http::HeaderValue;
use axum::routing::{delete, get, head, put};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use coral_store::cachestore::CacheStore;
use coral_store::storagerpc::StorageRpc;

mod config;
mod edge_cache;
mod error;
mod intercept;
mod object;
mod range;
mod streamer;
mod upload;

pub use config::{CacheMethod, GatewayConfig};
pub use streamer::LargeReadStreamer;
pub use upload::LargeUploadSession;

/// Value of the `Server` header stamped on every response.
const SERVER_ID: &str = concat!("coral-gateway/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn StorageRpc>,
    cache: Arc<dyn CacheStore>,
    config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn StorageRpc>,
        cache: Arc<dyn CacheStore>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            config: Arc::new(config),
        }
    }
}

/// Builds the object router. Every path is an object key; the edge
/// cache interceptors wrap the handlers when the configuration selects
/// the reverse-proxy style mode.
pub fn gen_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/*key", get(object::get))
        .route("/*key", head(object::head))
        .route("/*key", put(object::put))
        .route("/*key", delete(object::delete));

    if state.config.interceptor_active() {
        router = router.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            intercept::edge_cache,
        ));
    }

    router
        .layer(SetResponseHeaderLayer::overriding(
            SERVER,
            HeaderValue::from_static(SERVER_ID),
        ))
        .with_state(state)
}

async fn root() -> &'static str {
    "Hello from coral-gateway"
}
