use clap::Parser;
use mimalloc::MiMalloc;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;

use coral_gateway::{AppState, CacheMethod, GatewayConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Expose the object-serving HTTP data plane of a coral storage cluster.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the storage cluster RPC endpoint.
    #[arg(long, env, default_value = "grpc+http://[::1]:18080")]
    storage_service_addr: String,

    /// Address of the edge cache backend.
    #[arg(long, env, default_value = "memory://")]
    cache_service_addr: String,

    /// Whether the edge cache participates in request handling.
    /// Set --cache-enabled=false to disable.
    #[arg(long, env, default_missing_value = "true", default_value = "true", num_args(0..=1), require_equals(true), action(clap::ArgAction::Set))]
    cache_enabled: bool,

    /// Cache wiring: "inner" consults the cache inline in the object
    /// handlers, anything else bolts it on as interceptors.
    #[arg(long, env, default_value = "inner")]
    cache_method: String,

    /// Freshness TTL of cached responses, in seconds.
    #[arg(long, env, default_value_t = 300)]
    cache_expire: u64,

    /// Upper bound on cacheable body size, in bytes.
    #[arg(long, env, default_value_t = 1024 * 1024)]
    cache_max_content_len: u64,

    /// Allow-list of cachable content types (empty = any).
    #[arg(long, env, value_delimiter = ',')]
    cachable_content_type: Vec<String>,

    /// Allow-list of cachable path regexes (empty = any).
    #[arg(long, env, value_delimiter = ',')]
    cachable_path_pattern: Vec<String>,

    /// Body size at/above which the chunked upload path engages.
    #[arg(long, env, default_value_t = 5 * 1024 * 1024 + 512 * 1024)]
    threshold_obj_len: u64,

    /// Chunk window size for large uploads.
    #[arg(long, env, default_value_t = 5 * 1024 * 1024)]
    chunked_obj_len: u64,

    /// Absolute upper bound on object size; larger PUTs are rejected.
    #[arg(long, env, default_value_t = 500 * 1024 * 1024)]
    max_len_for_obj: u64,

    /// The address to listen on.
    #[clap(flatten)]
    listen_args: tokio_listener::ListenerAddressLFlag,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cachable_path_pattern = cli
        .cachable_path_pattern
        .iter()
        .map(|p| regex::Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    let config = GatewayConfig {
        cache_enabled: cli.cache_enabled,
        cache_method: CacheMethod::from_option(&cli.cache_method),
        cache_expire: cli.cache_expire,
        cache_max_content_len: cli.cache_max_content_len,
        cachable_content_type: cli.cachable_content_type,
        cachable_path_pattern,
        threshold_obj_len: cli.threshold_obj_len,
        chunked_obj_len: cli.chunked_obj_len,
        max_len_for_obj: cli.max_len_for_obj,
    };

    // connect the collaborators
    let storage = coral_store::storagerpc::from_addr(&cli.storage_service_addr).await?;
    let cache = coral_store::cachestore::from_addr(&cli.cache_service_addr).await?;

    let state = AppState::new(storage, cache, config);

    let app = coral_gateway::gen_router(state).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)),
        ),
    );

    let listen_address = &cli.listen_args.listen_address.unwrap_or_else(|| {
        "[::]:8080"
            .parse()
            .expect("invalid fallback listen address")
    });

    let listener = tokio_listener::Listener::bind(
        listen_address,
        &Default::default(),
        &cli.listen_args.listener_options,
    )
    .await?;

    info!(listen_address=%listen_address, "starting daemon");

    tokio_listener::axum07::serve(
        listener,
        app.into_make_service_with_connect_info::<tokio_listener::SomeSocketAddrClonable>(),
    )
    .await?;

    Ok(())
}
