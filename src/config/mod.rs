//! Configuration management for janus-proxy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_GATEWAY_ADDRESS: &str = "JANUS_PROXY_GATEWAY_ADDRESS";
pub const ENV_MEDIA_API_URL: &str = "JANUS_PROXY_MEDIA_API_URL";
pub const ENV_SERVER_KEY: &str = "JANUS_PROXY_SERVER_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket listener and gateway connection
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Gateway HTTP API used for compensating detaches
    #[serde(default)]
    pub gateway_http: GatewayHttpConfig,

    /// Media-control API
    #[serde(default)]
    pub media_api: MediaApiConfig,

    /// Job spool
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Status HTTP API
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address for client WebSockets
    #[serde(default = "default_proxy_host")]
    pub host: String,

    #[serde(default = "default_proxy_port")]
    pub port: u16,

    /// Gateway WebSocket URL
    #[serde(default = "default_gateway_address")]
    pub gateway_address: String,

    /// Subprotocol negotiated on both sides
    #[serde(default = "default_subprotocol")]
    pub subprotocol: String,

    /// Seconds a transaction may wait for its reply; 0 waits forever
    #[serde(default = "default_transaction_timeout_secs")]
    pub transaction_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHttpConfig {
    #[serde(default = "default_gateway_http_address")]
    pub address: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaApiConfig {
    #[serde(default = "default_media_api_url")]
    pub base_url: String,

    /// Shared secret sent with every call
    #[serde(default)]
    pub server_key: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Directory receiving one JSON file per job
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// HTTP bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP port for health and status
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            gateway_address: default_gateway_address(),
            subprotocol: default_subprotocol(),
            transaction_timeout_secs: default_transaction_timeout_secs(),
        }
    }
}

impl ProxyConfig {
    pub fn transaction_timeout(&self) -> Option<Duration> {
        match self.transaction_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for GatewayHttpConfig {
    fn default() -> Self {
        Self {
            address: default_gateway_http_address(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for MediaApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_media_api_url(),
            server_key: String::new(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `JANUS_PROXY_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_GATEWAY_ADDRESS) {
            self.proxy.gateway_address = address;
        }
        if let Some(url) = lookup(ENV_MEDIA_API_URL) {
            self.media_api.base_url = url;
        }
        if let Some(key) = lookup(ENV_SERVER_KEY) {
            self.media_api.server_key = key;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let gateway = self.proxy.gateway_address.as_str();
        if !gateway.starts_with("ws://") && !gateway.starts_with("wss://") {
            return Err("Proxy gateway_address must be a ws:// or wss:// URL".into());
        }

        if self.proxy.subprotocol.trim().is_empty() {
            return Err("Proxy subprotocol must not be empty".into());
        }

        if !self.gateway_http.address.starts_with("http://") && !self.gateway_http.address.starts_with("https://") {
            return Err("Gateway HTTP address must be an http:// or https:// URL".into());
        }

        if self.media_api.base_url.trim().is_empty() {
            return Err("Media API base_url must not be empty".into());
        }

        if self.media_api.timeout_secs == 0 || self.gateway_http.timeout_secs == 0 {
            return Err("HTTP client timeouts must be non-zero".into());
        }

        if self.http.enabled && self.http.port != 0 && self.http.port == self.proxy.port {
            return Err("Status HTTP port cannot equal the proxy port".into());
        }

        Ok(())
    }
}

fn default_proxy_host() -> String {
    "0.0.0.0".to_string()
}

fn default_proxy_port() -> u16 {
    8300
}

fn default_gateway_address() -> String {
    "ws://127.0.0.1:8188".to_string()
}

fn default_subprotocol() -> String {
    "janus-protocol".to_string()
}

fn default_transaction_timeout_secs() -> u64 {
    60
}

fn default_gateway_http_address() -> String {
    "http://127.0.0.1:8088/janus".to_string()
}

fn default_media_api_url() -> String {
    "http://127.0.0.1/rpc".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/var/spool/janus-proxy")
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8301
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.proxy.port, 8300);
        assert_eq!(cfg.proxy.subprotocol, "janus-protocol");
        assert_eq!(cfg.proxy.transaction_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(&PathBuf::from("/nonexistent/janus-proxy.toml")).unwrap();
        assert_eq!(cfg.proxy.gateway_address, "ws://127.0.0.1:8188");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[proxy]\nport = 9000\ntransaction_timeout_secs = 0\n\n[media_api]\nserver_key = \"secret\""
        )
        .unwrap();

        let cfg = Config::load(&file.path().to_path_buf()).unwrap();
        assert_eq!(cfg.proxy.port, 9000);
        assert_eq!(cfg.proxy.transaction_timeout(), None);
        assert_eq!(cfg.proxy.host, "0.0.0.0");
        assert_eq!(cfg.media_api.server_key, "secret");
        assert!(cfg.http.enabled);
    }

    #[test]
    fn validate_rejects_non_websocket_gateway() {
        let mut cfg = Config::default();
        cfg.proxy.gateway_address = "http://127.0.0.1:8188".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_port_clash() {
        let mut cfg = Config::default();
        cfg.http.port = cfg.proxy.port;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_configured_values() {
        let mut cfg = Config::default();
        cfg.apply_overrides(|name| match name {
            ENV_GATEWAY_ADDRESS => Some("ws://janus:8188".to_string()),
            ENV_SERVER_KEY => Some("key".to_string()),
            _ => None,
        });
        assert_eq!(cfg.proxy.gateway_address, "ws://janus:8188");
        assert_eq!(cfg.media_api.server_key, "key");
        assert_eq!(cfg.media_api.base_url, default_media_api_url());
    }
}
