//! Bridge configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wsb_core::{BridgeError, BridgeResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub listen: ListenSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub relay: RelaySection,
}

/// `[listen]` section: where front-end WebSocket clients connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenSection {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

/// `[backend]` section: the fixed TCP endpoint every pair connects to.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// `[relay]` section: per-pair relay tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub outbound: OutboundKind,
    #[serde(default)]
    pub idle_timeout: u64,
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            max_message_size: default_max_message_size(),
            outbound: OutboundKind::default(),
            idle_timeout: 0,
            max_pairs: default_max_pairs(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// WebSocket message type used for backend chunks sent to the front-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    #[default]
    Binary,
    /// Text when the chunk is valid UTF-8, binary otherwise.
    Text,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_handshake_timeout() -> u64 {
    10
}
fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backend_port() -> u16 {
    12345
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_read_buffer_size() -> usize {
    8192
}
fn default_max_message_size() -> usize {
    1_048_576
}
fn default_max_pairs() -> usize {
    1024
}
fn default_shutdown_grace() -> u64 {
    5
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen_host: Option<String>,
    pub port: Option<u16>,
    pub backend_host: Option<String>,
    pub backend_port: Option<u16>,
    pub idle_timeout: Option<u64>,
    pub max_pairs: Option<usize>,
}

/// Resolved bridge configuration (file merged with CLI overrides, validated).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Longest a client may take to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,
    pub backend_host: String,
    pub backend_port: u16,
    pub connect_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
    pub outbound: OutboundKind,
    /// `None` disables idle reclamation.
    pub idle_timeout: Option<Duration>,
    pub max_pairs: usize,
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default(), CliOverrides::default())
    }
}

impl BridgeConfig {
    /// Load config from a TOML file (if present), then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: CliOverrides) -> BridgeResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| BridgeError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let config = Self::from_file(file_config, overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile, cli: CliOverrides) -> Self {
        let idle_secs = cli.idle_timeout.unwrap_or(file.relay.idle_timeout);
        Self {
            listen_host: cli.listen_host.unwrap_or(file.listen.host),
            listen_port: cli.port.unwrap_or(file.listen.port),
            handshake_timeout: Duration::from_secs(file.listen.handshake_timeout),
            backend_host: cli.backend_host.unwrap_or(file.backend.host),
            backend_port: cli.backend_port.unwrap_or(file.backend.port),
            connect_timeout: Duration::from_secs(file.backend.connect_timeout),
            read_buffer_size: file.relay.read_buffer_size,
            max_message_size: file.relay.max_message_size,
            outbound: file.relay.outbound,
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            max_pairs: cli.max_pairs.unwrap_or(file.relay.max_pairs),
            shutdown_grace: Duration::from_secs(file.relay.shutdown_grace),
        }
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.backend_host.trim().is_empty() {
            return Err(BridgeError::Config("backend host must not be empty".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(BridgeError::Config("read_buffer_size must be > 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(BridgeError::Config("max_message_size must be > 0".into()));
        }
        if self.max_pairs == 0 {
            return Err(BridgeError::Config("max_pairs must be > 0".into()));
        }
        if self.handshake_timeout.is_zero() {
            return Err(BridgeError::Config("handshake_timeout must be > 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(BridgeError::Config("connect_timeout must be > 0".into()));
        }
        Ok(())
    }

    /// Front-end bind address. Accepts IP literals (including bare IPv6
    /// such as `::`) and hostnames; a hostname binds its first address.
    pub async fn listen_addr(&self) -> BridgeResult<SocketAddr> {
        let host = self.listen_host.trim_start_matches('[').trim_end_matches(']');
        tokio::net::lookup_host((host, self.listen_port))
            .await
            .map_err(|e| {
                BridgeError::Config(format!("invalid listen host {}: {e}", self.listen_host))
            })?
            .next()
            .ok_or_else(|| {
                BridgeError::Config(format!("listen host {} has no address", self.listen_host))
            })
    }

    /// Backend endpoint as `host:port` (resolved at connect time).
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.listen_port, 8080);
        assert_eq!(cfg.backend_host, "127.0.0.1");
        assert_eq!(cfg.backend_port, 12345);
        assert_eq!(cfg.read_buffer_size, 8192);
        assert_eq!(cfg.outbound, OutboundKind::Binary);
        assert!(cfg.idle_timeout.is_none());
        assert_eq!(cfg.backend_addr(), "127.0.0.1:12345");
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[listen]
host = "127.0.0.1"
port = 9000

[backend]
host = "llm.internal"
port = 7000
connect_timeout = 2

[relay]
outbound = "text"
idle_timeout = 30
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cfg = BridgeConfig::from_file(file, CliOverrides::default());
        assert_eq!(cfg.listen_port, 9000);
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(10));
        assert_eq!(cfg.backend_addr(), "llm.internal:7000");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
        assert_eq!(cfg.outbound, OutboundKind::Text);
        assert_eq!(cfg.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.max_pairs, 1024);
    }

    #[tokio::test]
    async fn test_listen_addr_accepts_ip_literals() {
        let mut cfg = BridgeConfig::default();
        cfg.listen_host = "127.0.0.1".into();
        cfg.listen_port = 9000;
        assert_eq!(cfg.listen_addr().await.unwrap(), "127.0.0.1:9000".parse().unwrap());

        cfg.listen_host = "::".into();
        assert_eq!(cfg.listen_addr().await.unwrap(), "[::]:9000".parse().unwrap());

        cfg.listen_host = "[::1]".into();
        assert_eq!(cfg.listen_addr().await.unwrap(), "[::1]:9000".parse().unwrap());
    }

    #[tokio::test]
    async fn test_listen_addr_resolves_localhost() {
        let mut cfg = BridgeConfig::default();
        cfg.listen_host = "localhost".into();
        cfg.listen_port = 9000;
        let addr = cfg.listen_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);
    }

    #[tokio::test]
    async fn test_listen_addr_rejects_garbage_host() {
        let mut cfg = BridgeConfig::default();
        cfg.listen_host = "not a host!".into();
        assert!(matches!(cfg.listen_addr().await, Err(BridgeError::Config(_))));
    }

    #[test]
    fn cli_overrides_win() {
        let file: ConfigFile = toml::from_str("[backend]\nport = 7000\n").unwrap();
        let cfg = BridgeConfig::from_file(
            file,
            CliOverrides {
                backend_port: Some(7001),
                port: Some(9001),
                idle_timeout: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(cfg.backend_port, 7001);
        assert_eq!(cfg.listen_port, 9001);
        assert!(cfg.idle_timeout.is_none());
    }

    #[test]
    fn unknown_outbound_kind_rejected() {
        let parsed = toml::from_str::<ConfigFile>("[relay]\noutbound = \"morse\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BridgeConfig::load(
            Some(&dir.path().join("absent.toml")),
            CliOverrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.listen_port, 8080);
    }

    #[test]
    fn load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend\nport = ").unwrap();
        let err = BridgeConfig::load(Some(file.path()), CliOverrides::default()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn load_rejects_zero_buffer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nread_buffer_size = 0").unwrap();
        assert!(BridgeConfig::load(Some(file.path()), CliOverrides::default()).is_err());
    }

    #[test]
    fn load_rejects_empty_backend_host() {
        let overrides = CliOverrides {
            backend_host: Some(" ".into()),
            ..Default::default()
        };
        assert!(BridgeConfig::load(None, overrides).is_err());
    }
}
