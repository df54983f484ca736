//! Process configuration, loaded from TOML with every field's default
//! supplied by a `d_*` free function so `Default` and "field present but
//! null in the file" agree.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fanout: FanoutConfig::default(),
            store: StoreConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_port() -> u16 {
    4310
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fan-out (server + client tuning)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Server-to-client ping cadence.
    #[serde(default = "d_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Close threshold if no pong arrives after a ping.
    #[serde(default = "d_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Per-subscription replay buffer cap before BUFFER_OVERFLOW.
    #[serde(default = "d_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Client backoff lower bound.
    #[serde(default = "d_base_reconnect_delay_ms")]
    pub base_reconnect_delay_ms: u64,
    /// Client backoff upper bound.
    #[serde(default = "d_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: d_heartbeat_interval_ms(),
            heartbeat_timeout_ms: d_heartbeat_timeout_ms(),
            max_buffer_size: d_max_buffer_size(),
            base_reconnect_delay_ms: d_base_reconnect_delay_ms(),
            max_reconnect_delay_ms: d_max_reconnect_delay_ms(),
        }
    }
}

fn d_heartbeat_interval_ms() -> u64 {
    15_000
}

fn d_heartbeat_timeout_ms() -> u64 {
    45_000
}

fn d_max_buffer_size() -> usize {
    1_024
}

fn d_base_reconnect_delay_ms() -> u64 {
    250
}

fn d_max_reconnect_delay_ms() -> u64 {
    30_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path for the event store + ledger, or `:memory:`.
    #[serde(default = "d_database_path")]
    pub database_path: String,
    /// Prefixes stream/run keys for multi-tenant isolation of a shared store.
    #[serde(default = "d_namespace")]
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: d_database_path(),
            namespace: d_namespace(),
        }
    }
}

fn d_database_path() -> String {
    "sa-transcripts.sqlite3".into()
}

fn d_namespace() -> String {
    "default".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconciliation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Age past which an active run is considered stale.
    #[serde(default = "d_stale_threshold_ms")]
    pub default_stale_threshold_ms: u64,
    /// Interval between fleet-level stale-run scans.
    #[serde(default = "d_scan_interval_ms")]
    pub scan_interval_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            default_stale_threshold_ms: d_stale_threshold_ms(),
            scan_interval_ms: d_scan_interval_ms(),
        }
    }
}

fn d_stale_threshold_ms() -> u64 {
    5 * 60 * 1000
}

fn d_scan_interval_ms() -> u64 {
    60_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin bearer token checked before
    /// `sa-server recover` runs. If it resolves to nothing (or empty), the
    /// gate passes every caller.
    #[serde(default = "d_admin_token_env")]
    pub token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_admin_token_env(),
        }
    }
}

fn d_admin_token_env() -> String {
    "SA_ADMIN_TOKEN".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.fanout.heartbeat_timeout_ms <= self.fanout.heartbeat_interval_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "fanout.heartbeat_timeout_ms".into(),
                message: "heartbeat_timeout_ms must exceed heartbeat_interval_ms".into(),
            });
        }

        if self.fanout.max_buffer_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "fanout.max_buffer_size".into(),
                message: "max_buffer_size must be greater than 0".into(),
            });
        }

        if self.fanout.max_reconnect_delay_ms < self.fanout.base_reconnect_delay_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "fanout.max_reconnect_delay_ms".into(),
                message: "max_reconnect_delay_ms must be >= base_reconnect_delay_ms".into(),
            });
        }

        if self.store.namespace.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.namespace".into(),
                message: "namespace must not be empty".into(),
            });
        }

        if self.store.database_path.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.database_path".into(),
                message: "database_path must not be empty".into(),
            });
        }

        if self.reconciliation.default_stale_threshold_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "reconciliation.default_stale_threshold_ms".into(),
                message: "a zero stale threshold marks every active run stale immediately".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn heartbeat_timeout_must_exceed_interval() {
        let mut cfg = Config::default();
        cfg.fanout.heartbeat_timeout_ms = cfg.fanout.heartbeat_interval_ms;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "fanout.heartbeat_timeout_ms"
                && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn zero_buffer_size_is_error() {
        let mut cfg = Config::default();
        cfg.fanout.max_buffer_size = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "fanout.max_buffer_size" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn reconnect_bounds_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.fanout.base_reconnect_delay_ms = 10_000;
        cfg.fanout.max_reconnect_delay_ms = 1_000;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "fanout.max_reconnect_delay_ms"));
    }

    #[test]
    fn empty_namespace_is_error() {
        let mut cfg = Config::default();
        cfg.store.namespace = String::new();
        let issues = cfg.validate();
        assert!(issues.iter().any(|e| e.field == "store.namespace"));
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }
}
