//! Server configuration with TOML file support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kyc_session::{GuardPolicy, HandoffIssuer};
use kyc_types::params::{DEFAULT_GC_GRACE_SECS, DEFAULT_SESSION_TTL_SECS};
use kyc_types::SessionParams;

use crate::{LogFormat, ServerError};

/// Configuration for a handoff server.
///
/// Can be loaded from a TOML file via [`ServerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Data directory for session storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_lmdb_map_size")]
    pub lmdb_map_size: usize,

    /// HTTP API port. `0` picks a free port.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Whether to run the WebSocket push server.
    #[serde(default)]
    pub enable_websocket: bool,

    #[serde(default = "default_ws_port")]
    pub websocket_port: u16,

    /// Origin under which locator URLs are issued.
    #[serde(default = "default_base_origin")]
    pub base_origin: String,

    /// Origins a caller may request instead of `base_origin`.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Session lifetime from creation.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Poll interval suggested to initiating-device clients.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How long terminal sessions stay readable before removal.
    #[serde(default = "default_gc_grace_secs")]
    pub gc_grace_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Reject completing devices that do not classify as mobile.
    #[serde(default = "default_true")]
    pub require_mobile_device: bool,

    /// Endpoint of the external verification scorer. Without one every
    /// verify request is answered `scorer_unavailable`.
    #[serde(default)]
    pub scorer_url: Option<String>,

    #[serde(default = "default_scorer_timeout_secs")]
    pub scorer_timeout_secs: u64,

    /// Whether to serve Prometheus metrics at `/metrics`.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "debug,kyc_session=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./kyc_data")
}

fn default_lmdb_map_size() -> usize {
    kyc_store_lmdb::environment::DEFAULT_MAP_SIZE
}

fn default_rpc_port() -> u16 {
    7080
}

fn default_ws_port() -> u16 {
    7081
}

fn default_base_origin() -> String {
    "http://localhost:7080".to_string()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_gc_grace_secs() -> u64 {
    DEFAULT_GC_GRACE_SECS
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_scorer_timeout_secs() -> u64 {
    20
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ServerError> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("ServerConfig is always serializable to TOML")
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        let positive = [
            ("session_ttl_secs", self.session_ttl_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("scorer_timeout_secs", self.scorer_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{name} must be greater than zero")));
        }
        HandoffIssuer::new(&self.base_origin)
            .map_err(|e| ServerError::Config(format!("base_origin: {e}")))?;
        for origin in &self.allowed_origins {
            HandoffIssuer::new(origin)
                .map_err(|e| ServerError::Config(format!("allowed_origins: {e}")))?;
        }
        if let Some(url) = &self.scorer_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ServerError::Config(format!(
                    "scorer_url must be http(s): {url}"
                )));
            }
        }
        if self.enable_websocket && self.rpc_port != 0 && self.rpc_port == self.websocket_port {
            return Err(ServerError::Config(
                "rpc_port and websocket_port must differ".to_string(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams::new(self.session_ttl_secs, self.gc_grace_secs)
    }

    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            require_mobile_device: self.require_mobile_device,
        }
    }

    pub fn log_format(&self) -> Result<LogFormat, ServerError> {
        self.log_format.parse()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn scorer_timeout(&self) -> Duration {
        Duration::from_secs(self.scorer_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lmdb_map_size: default_lmdb_map_size(),
            rpc_port: default_rpc_port(),
            enable_websocket: false,
            websocket_port: default_ws_port(),
            base_origin: default_base_origin(),
            allowed_origins: Vec::new(),
            session_ttl_secs: default_session_ttl_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            gc_grace_secs: default_gc_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            require_mobile_device: default_true(),
            scorer_url: None,
            scorer_timeout_secs: default_scorer_timeout_secs(),
            enable_metrics: default_true(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
