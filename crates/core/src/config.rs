//! `ServerConfig` loading (§3.1, §6): TOML via `serde`, a `Raw*`-struct-
//! with-`Option`-fields layer, defaults applied once converted into the
//! fully-resolved typed config — the same two-layer shape as the teacher's
//! `ForwarderConfig`/`RawConfig` pair in `forwarder::config`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("parsing TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Fully-resolved server configuration. Constructed directly (no global
/// singleton) and passed by value into [`crate::Server::new`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: BindConfig,
    pub tls: Option<TlsConfig>,
    pub monitor_interval: Duration,
    pub heartbeat_interval: Duration,
    pub liveness_timeout: Duration,
    pub max_packet_size: u32,
    pub accepted_protocol_versions: Vec<u8>,
    pub enable_traffic_monitor: bool,
    pub encryption_key: Option<[u8; 32]>,
    pub transfer_root: PathBuf,
    pub pending_queue_cap: usize,
    pub dispatch_depth_threshold: usize,
}

#[derive(Debug, Clone)]
pub struct BindConfig {
    pub tcp: Option<SocketAddr>,
    pub tls: Option<SocketAddr>,
    pub udp: Option<SocketAddr>,
    pub http: Option<SocketAddr>,
    pub https: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Accepted for config fidelity with §6's `server_cert_password`; the
    /// loader only supports unencrypted PEM private keys, so this is
    /// presently unused (see DESIGN.md).
    pub cert_password: Option<String>,
    pub trusted_client_cert_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    bind: Option<RawBindConfig>,
    tls: Option<RawTlsConfig>,
    monitor_interval_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    liveness_timeout_seconds: Option<u64>,
    max_packet_size: Option<u32>,
    accepted_protocol_versions: Option<Vec<u8>>,
    enable_traffic_monitor: Option<bool>,
    encryption_key: Option<String>,
    transfer_root: Option<String>,
    pending_queue_cap: Option<usize>,
    dispatch_depth_threshold: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBindConfig {
    tcp: Option<String>,
    tls: Option<String>,
    udp: Option<String>,
    http: Option<String>,
    https: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTlsConfig {
    cert_path: Option<String>,
    key_path: Option<String>,
    cert_password: Option<String>,
    trusted_client_cert_path: Option<String>,
}

const DEFAULT_MONITOR_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;
const DEFAULT_LIVENESS_TIMEOUT_SECONDS: u64 = 45;
const DEFAULT_MAX_PACKET_SIZE: u32 = 128 * 1024 * 1024;
const DEFAULT_ACCEPTED_VERSIONS: [u8; 2] = [0x01, 0x02];
const DEFAULT_PENDING_QUEUE_CAP: usize = 1000;

impl ServerConfig {
    pub fn load_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
        let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::load_from_str(&toml_str)
    }

    pub fn load_from_str(toml_str: &str) -> Result<ServerConfig, ConfigError> {
        let raw: RawConfig = toml::from_str(toml_str)?;
        resolve(raw)
    }
}

fn resolve(raw: RawConfig) -> Result<ServerConfig, ConfigError> {
    let raw_bind = raw.bind.unwrap_or_default();
    let bind = BindConfig {
        tcp: parse_bind_addr("bind.tcp", raw_bind.tcp)?,
        tls: parse_bind_addr("bind.tls", raw_bind.tls)?,
        udp: parse_bind_addr("bind.udp", raw_bind.udp)?,
        http: parse_bind_addr("bind.http", raw_bind.http)?,
        https: parse_bind_addr("bind.https", raw_bind.https)?,
    };

    let tls = match raw.tls {
        Some(raw_tls) => Some(TlsConfig {
            cert_path: PathBuf::from(raw_tls.cert_path.ok_or(ConfigError::MissingField("tls.cert_path"))?),
            key_path: PathBuf::from(raw_tls.key_path.ok_or(ConfigError::MissingField("tls.key_path"))?),
            cert_password: raw_tls.cert_password,
            trusted_client_cert_path: raw_tls.trusted_client_cert_path.map(PathBuf::from),
        }),
        None => None,
    };

    let encryption_key = match raw.encryption_key {
        Some(hex_key) => Some(parse_key_hex(&hex_key)?),
        None => None,
    };

    let transfer_root = PathBuf::from(raw.transfer_root.unwrap_or_else(|| "./transfers".to_string()));

    Ok(ServerConfig {
        bind,
        tls,
        monitor_interval: Duration::from_millis(raw.monitor_interval_ms.unwrap_or(DEFAULT_MONITOR_INTERVAL_MS)),
        heartbeat_interval: Duration::from_millis(raw.heartbeat_interval_ms.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS)),
        liveness_timeout: Duration::from_secs(raw.liveness_timeout_seconds.unwrap_or(DEFAULT_LIVENESS_TIMEOUT_SECONDS)),
        max_packet_size: raw.max_packet_size.unwrap_or(DEFAULT_MAX_PACKET_SIZE),
        accepted_protocol_versions: raw.accepted_protocol_versions.unwrap_or_else(|| DEFAULT_ACCEPTED_VERSIONS.to_vec()),
        enable_traffic_monitor: raw.enable_traffic_monitor.unwrap_or(false),
        encryption_key,
        transfer_root,
        pending_queue_cap: raw.pending_queue_cap.unwrap_or(DEFAULT_PENDING_QUEUE_CAP),
        dispatch_depth_threshold: raw.dispatch_depth_threshold.unwrap_or(dispatch::DEFAULT_DEPTH_THRESHOLD),
    })
}

fn parse_bind_addr(field: &'static str, value: Option<String>) -> Result<Option<SocketAddr>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { field, reason: format!("'{raw}' is not a socket address") }),
    }
}

fn parse_key_hex(hex_key: &str) -> Result<[u8; 32], ConfigError> {
    if hex_key.len() != 64 {
        return Err(ConfigError::InvalidValue {
            field: "encryption_key",
            reason: "expected 64 hex characters (32 bytes)".to_string(),
        });
    }
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        let hex_byte = &hex_key[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(hex_byte, 16)
            .map_err(|_| ConfigError::InvalidValue { field: "encryption_key", reason: "not valid hex".to_string() })?;
    }
    Ok(key)
}
