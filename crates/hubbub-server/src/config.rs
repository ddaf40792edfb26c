//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`--config`, or the first of the default paths)
//! - Environment variables (`HUBBUB_*`, `__` between nested keys), which win
//!   over the file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Files probed when no explicit path is given.
const CONFIG_PATHS: [&str; 3] = [
    "hubbub.toml",
    "/etc/hubbub/hubbub.toml",
    "~/.config/hubbub/hubbub.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP surface.
    #[serde(default)]
    pub http: HttpConfig,

    /// Push-stream settings.
    #[serde(default)]
    pub sse: SseConfig,

    /// Message history.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Development-only endpoints.
    #[serde(default)]
    pub dev: DevConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Extra prefix the REST routes are also served under.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Longest a single broadcast write to one socket may take before the
    /// socket is dropped.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

/// Push-stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Idle time before a keepalive comment is sent, in milliseconds.
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,
}

/// History configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages returned per history read.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the server from a browser.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Development configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Mount `POST /__dev__/reset`.
    #[serde(default = "default_true")]
    pub reset_enabled: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_keepalive_ms() -> u64 {
    25_000 // 25 seconds
}

fn default_history_limit() -> usize {
    hubbub_core::DEFAULT_HISTORY_LIMIT
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http: HttpConfig::default(),
            sse: SseConfig::default(),
            history: HistoryConfig::default(),
            cors: CorsConfig::default(),
            dev: DevConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            max_message_size: default_max_message_size(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            keepalive_ms: default_keepalive_ms(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            reset_enabled: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file (explicit or probed) overlaid with
    /// `HUBBUB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => CONFIG_PATHS
                .iter()
                .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
                .find(|path| path.exists()),
        };

        let mut builder = ::config::Config::builder();
        if let Some(path) = &file {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(::config::File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("HUBBUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins"),
        );

        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }
}
