use gateway::{GatewayConfig, Secret};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Paths the server owns; the configurable vectorize route may not shadow them.
pub const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Rate limit: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// API keys accepted on the vectorize routes. Empty disables auth.
    #[serde(default)]
    pub api_keys: Vec<Secret>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level (an `EnvFilter` directive; `RUST_LOG` wins when set)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Extra path the vectorize endpoint is served on, besides `/api/v1/vectorize`.
    /// Indexer skill callouts usually post to the root.
    #[serde(default = "default_route")]
    pub route: String,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            api_keys: Vec::new(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_enabled: default_true(),
            route: default_route(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `vecgate.{toml,yaml,json}`
    /// file and `VECGATE__*` environment variables, in increasing priority.
    ///
    /// Nested keys use `__`, e.g. `VECGATE__GATEWAY__PROVIDER__ENDPOINT`.
    /// `VECGATE__API_KEYS` takes a comma-separated list.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("vecgate").required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("VECGATE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api_keys"),
            );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.route.starts_with('/') {
            anyhow::bail!("route must start with '/', got {:?}", self.route);
        }
        if RESERVED_PATHS.contains(&self.route.as_str()) {
            anyhow::bail!("route {:?} collides with a built-in endpoint", self.route);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        self.gateway.validate()?;
        if self.gateway.batch_timeout > self.timeout() {
            tracing::warn!(
                batch_timeout_ms = self.gateway.batch_timeout.as_millis() as u64,
                timeout_secs = self.timeout_secs,
                "gateway batch timeout exceeds the HTTP request timeout"
            );
        }
        Ok(())
    }

    /// Whether the vectorize routes require an API key.
    pub fn auth_enabled(&self) -> bool {
        self.api_keys.iter().any(|key| !key.is_empty())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_rate_limit_per_minute() -> u32 {
    600
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_route() -> String {
    "/".to_string()
}
