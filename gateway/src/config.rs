use regex::Regex;

/// How the edge cache is wired into the request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMethod {
    /// Consulted inline by the object handlers.
    Inner,
    /// Bolted on around the handlers as request/response interceptors.
    Outer,
}

impl CacheMethod {
    /// Everything that is not `"inner"` selects the interceptor mode.
    pub fn from_option(s: &str) -> Self {
        if s == "inner" {
            CacheMethod::Inner
        } else {
            CacheMethod::Outer
        }
    }
}

/// Tuning knobs of the HTTP data plane, mirroring the `http_options`
/// section of the deployment configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Whether the edge cache participates in request handling at all.
    pub cache_enabled: bool,
    pub cache_method: CacheMethod,
    /// Freshness TTL of cached responses, in seconds.
    pub cache_expire: u64,
    /// Upper bound on cacheable body size, in bytes.
    pub cache_max_content_len: u64,
    /// Allow-list of cachable content types (empty = any).
    pub cachable_content_type: Vec<String>,
    /// Allow-list of cachable path regexes (empty = any).
    pub cachable_path_pattern: Vec<Regex>,
    /// Body size at/above which the chunked upload path engages.
    pub threshold_obj_len: u64,
    /// Chunk window size for large uploads.
    pub chunked_obj_len: u64,
    /// Absolute upper bound on object size; larger PUTs are rejected.
    pub max_len_for_obj: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_method: CacheMethod::Inner,
            cache_expire: 300,
            cache_max_content_len: 1024 * 1024,
            cachable_content_type: vec![],
            cachable_path_pattern: vec![],
            threshold_obj_len: 5 * 1024 * 1024 + 512 * 1024,
            chunked_obj_len: 5 * 1024 * 1024,
            max_len_for_obj: 500 * 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    /// Whether the object handlers consult the cache inline.
    pub fn inner_cache_active(&self) -> bool {
        self.cache_enabled && self.cache_method == CacheMethod::Inner
    }

    /// Whether the interceptor pair wraps the router.
    pub fn interceptor_active(&self) -> bool {
        self.cache_enabled && self.cache_method == CacheMethod::Outer
    }

    /// Whether a response with this content type may be cached in
    /// interceptor mode.
    pub fn content_type_cachable(&self, content_type: &str) -> bool {
        self.cachable_content_type.is_empty()
            || self.cachable_content_type.iter().any(|t| t == content_type)
    }

    /// Whether a key passes the path allow-list.
    pub fn path_cachable(&self, key: &str) -> bool {
        self.cachable_path_pattern.is_empty()
            || self.cachable_path_pattern.iter().any(|p| p.is_match(key))
    }
}
