use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level, immutable configuration for the Tezos RPC proxy. Loaded once at
/// startup (see `GatewayConfig::load`) and handed to every component by
/// reference; there is no module-level mutable configuration state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub tezos: TezosConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TezosConfig {
    /// Default reverse-proxy (passthrough) target host.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_node_port")]
    pub port: u16,

    /// Base used for cacheable reads.
    #[serde(default = "default_host")]
    pub archive_host: String,
    #[serde(default = "default_node_port")]
    pub archive_port: u16,

    /// Base used when a path matches a rolling-redirect pattern.
    #[serde(default = "default_host")]
    pub rolling_host: String,
    #[serde(default = "default_node_port")]
    pub rolling_port: u16,
}

impl TezosConfig {
    pub fn default_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn archive_base(&self) -> String {
        format!("http://{}:{}", self.archive_host, self.archive_port)
    }

    pub fn rolling_base(&self) -> String {
        format!("http://{}:{}", self.rolling_host, self.rolling_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Allow regex set.
    #[serde(default)]
    pub whitelisted_methods: Vec<String>,
    /// Deny regex set, applied only within the allow surface.
    #[serde(default)]
    pub blocked_methods: Vec<String>,
    /// No-cache regex set.
    #[serde(default)]
    pub dont_cache: Vec<String>,
    /// Rolling-redirect regex set.
    #[serde(default)]
    pub whitelisted_rolling: Vec<String>,

    /// Size threshold triggering an inline metrics drain.
    #[serde(default = "default_cache_max_metric_items")]
    pub cache_max_metric_items: usize,
    /// Sleep between time-triggered drains.
    #[serde(default = "default_routine_delay_secs")]
    pub routine_delay_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Bounded response cache capacity (entries), an implementation detail of
    /// the LRU adapter — not part of the distilled spec's configuration table,
    /// but required for the cache to be instantiable at all.
    #[serde(default = "default_response_cache_capacity")]
    pub response_cache_capacity: u64,

    /// Backpressure cap on the metrics buffer, expressed as a multiple of
    /// `cache_max_metric_items`. Once the buffer exceeds
    /// `cache_max_metric_items * metrics_buffer_overflow_factor`, the oldest
    /// records are dropped (see DESIGN.md's flush-size-check decision).
    #[serde(default = "default_metrics_buffer_overflow_factor")]
    pub metrics_buffer_overflow_factor: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Inbound listen port.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for TezosConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_node_port(),
            archive_host: default_host(),
            archive_port: default_node_port(),
            rolling_host: default_host(),
            rolling_port: default_node_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            whitelisted_methods: vec![],
            blocked_methods: vec![],
            dont_cache: vec![],
            whitelisted_rolling: vec![],
            cache_max_metric_items: default_cache_max_metric_items(),
            routine_delay_secs: default_routine_delay_secs(),
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
            idle_timeout_secs: default_timeout_secs(),
            response_cache_capacity: default_response_cache_capacity(),
            metrics_buffer_overflow_factor: default_metrics_buffer_overflow_factor(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_server_port() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_database_url(), max_connections: default_max_connections() }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional YAML file, layered under
    /// `PROXY_`-prefixed environment variables (double-underscore nesting,
    /// e.g. `PROXY_TEZOS__ARCHIVE_HOST`).
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        } else {
            for default_path in &["tzproxy.yaml", "/etc/tzproxy/tzproxy.yaml", "config/tzproxy.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("PROXY_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_node_port() -> u16 {
    8732
}

fn default_cache_max_metric_items() -> usize {
    100
}

fn default_routine_delay_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_response_cache_capacity() -> u64 {
    10_000
}

fn default_metrics_buffer_overflow_factor() -> usize {
    10
}

fn default_server_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "postgres://localhost/tzproxy".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}
