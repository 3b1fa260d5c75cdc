//! Shared configuration for the stargaze hub and agent.
//!
//! TOML file + `STARGAZE_` environment layering, validation at the
//! boundary, agent API key resolution (env var, keyring, plaintext), and
//! translation to `stargaze_core` runtime configs.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use stargaze_api::{MAX_EVENT_LIMIT, TlsMode};
use stargaze_core::{AggregatorConfig, BackoffPolicy, CollectorConfig, SubnetLevel, Window};

/// Range `max_subnets` is clamped into.
pub const MAX_SUBNETS_RANGE: (usize, usize) = (5, 200);

/// Default agent HTTP port.
pub const DEFAULT_AGENT_PORT: u16 = 15119;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration shared by `stargaze hub` and `stargaze agent`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubSettings {
    /// Trailing window: "1m", "5m", "15m" or "1h".
    pub window: String,
    /// Grouping level: "/8", "/16" or "/24".
    pub subnet_level: String,
    pub snapshot_interval_ms: u64,
    /// Buckets per snapshot before the tail merges into "Others".
    pub max_subnets: usize,
    pub top_subnets: usize,
    pub top_ips: usize,
    pub top_ports: usize,
    pub polling_interval_ms: u64,
    pub polling_timeout_ms: u64,
    pub max_events_per_poll: u32,
    pub max_agents: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Agent registry document. Relative paths resolve against the data dir.
    pub registry_path: Option<PathBuf>,
    /// Accept any certificate from `https` agents.
    pub insecure: bool,
    /// Custom CA for `https` agents.
    pub ca_cert: Option<PathBuf>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            window: Window::default().to_string(),
            subnet_level: SubnetLevel::default().to_string(),
            snapshot_interval_ms: 1_000,
            max_subnets: 30,
            top_subnets: 5,
            top_ips: 10,
            top_ports: 5,
            polling_interval_ms: 2_000,
            polling_timeout_ms: 5_000,
            max_events_per_poll: stargaze_api::DEFAULT_EVENT_LIMIT,
            max_agents: 20,
            backoff_base_ms: 2_000,
            backoff_max_ms: 30_000,
            registry_path: None,
            insecure: false,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Defaults to the host name.
    pub agent_id: Option<String>,
    pub bind: String,
    /// Events kept in the ring buffer.
    pub buffer_capacity: usize,
    /// Producer lines queued ahead of the buffer.
    pub ingest_queue: usize,

    /// API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agent_id: None,
            bind: format!("0.0.0.0:{DEFAULT_AGENT_PORT}"),
            buffer_capacity: 100_000,
            ingest_queue: 4_096,
            api_key: None,
            api_key_env: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "stargaze", "stargaze")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("stargaze");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for state files such as the agent registry.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

// ── Config loading ──────────────────────────────────────────────────

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STARGAZE_").split("__"))
}

/// Load the full config from `path` (or the platform default) plus
/// environment. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), "loading config");
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

impl Config {
    /// Copy with plaintext secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.agent.api_key.is_some() {
            copy.agent.api_key = Some("********".into());
        }
        copy
    }
}

// ── Hub translation ─────────────────────────────────────────────────

fn positive_ms(field: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    Ok(Duration::from_millis(ms))
}

fn at_least_one(field: &str, n: usize) -> Result<usize, ConfigError> {
    if n == 0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(n)
}

impl HubSettings {
    pub fn parsed_window(&self) -> Result<Window, ConfigError> {
        self.window.parse().map_err(|_| {
            invalid(
                "hub.window",
                format!("expected 1m, 5m, 15m or 1h, got '{}'", self.window),
            )
        })
    }

    pub fn parsed_subnet_level(&self) -> Result<SubnetLevel, ConfigError> {
        self.subnet_level.parse().map_err(|_| {
            invalid(
                "hub.subnet_level",
                format!("expected /8, /16 or /24, got '{}'", self.subnet_level),
            )
        })
    }

    pub fn aggregator_config(&self) -> Result<AggregatorConfig, ConfigError> {
        let (lo, hi) = MAX_SUBNETS_RANGE;
        Ok(AggregatorConfig {
            window: self.parsed_window()?,
            subnet_level: self.parsed_subnet_level()?,
            max_subnets: self.max_subnets.clamp(lo, hi),
            top_subnets: at_least_one("hub.top_subnets", self.top_subnets)?,
            top_ips: at_least_one("hub.top_ips", self.top_ips)?,
            top_ports: at_least_one("hub.top_ports", self.top_ports)?,
            snapshot_interval: positive_ms("hub.snapshot_interval_ms", self.snapshot_interval_ms)?,
        })
    }

    pub fn collector_config(&self) -> Result<CollectorConfig, ConfigError> {
        if self.max_events_per_poll == 0 || self.max_events_per_poll > MAX_EVENT_LIMIT {
            return Err(invalid(
                "hub.max_events_per_poll",
                format!("must be between 1 and {MAX_EVENT_LIMIT}"),
            ));
        }
        let backoff = BackoffPolicy {
            base: positive_ms("hub.backoff_base_ms", self.backoff_base_ms)?,
            max: positive_ms("hub.backoff_max_ms", self.backoff_max_ms)?,
        };
        if backoff.max < backoff.base {
            return Err(invalid(
                "hub.backoff_max_ms",
                "must not be below hub.backoff_base_ms",
            ));
        }

        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };

        Ok(CollectorConfig {
            polling_interval: positive_ms("hub.polling_interval_ms", self.polling_interval_ms)?,
            polling_timeout: positive_ms("hub.polling_timeout_ms", self.polling_timeout_ms)?,
            max_events_per_poll: self.max_events_per_poll,
            max_agents: at_least_one("hub.max_agents", self.max_agents)?,
            backoff,
            tls,
            aggregator: self.aggregator_config()?,
        })
    }

    /// Where the agent registry document lives.
    pub fn registry_path(&self) -> PathBuf {
        match &self.registry_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir().join(p),
            None => data_dir().join("agents.json"),
        }
    }
}

// ── Agent translation ───────────────────────────────────────────────

impl AgentSettings {
    /// Configured id, else the host name.
    pub fn resolved_agent_id(&self) -> String {
        self.agent_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(hostname, str::to_owned)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| invalid("agent.bind", format!("'{}': {e}", self.bind)))
    }

    pub fn validated_capacity(&self) -> Result<usize, ConfigError> {
        at_least_one("agent.buffer_capacity", self.buffer_capacity)
    }

    pub fn validated_ingest_queue(&self) -> Result<usize, ConfigError> {
        at_least_one("agent.ingest_queue", self.ingest_queue)
    }
}

fn hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "stargaze-agent".into())
}

// ── Credential resolution ───────────────────────────────────────────

/// Keyring entry name for an agent's API key.
pub fn keyring_user(agent_id: &str) -> String {
    format!("{agent_id}/api-key")
}

/// Resolve the agent API key: `api_key_env` → keyring → plaintext.
///
/// `None` means the agent serves events unauthenticated.
pub fn resolve_api_key(settings: &AgentSettings, agent_id: &str) -> Option<SecretString> {
    // 1. Configured env var
    if let Some(ref env_name) = settings.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            if !val.is_empty() {
                return Some(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("stargaze", &keyring_user(agent_id)) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    settings
        .api_key
        .as_ref()
        .filter(|k| !k.is_empty())
        .map(|k| SecretString::from(k.clone()))
}

/// Store an agent API key in the system keyring.
pub fn store_api_key(agent_id: &str, key: &str) -> Result<(), ConfigError> {
    keyring::Entry::new("stargaze", &keyring_user(agent_id))
        .and_then(|entry| entry.set_password(key))
        .map_err(|e| invalid("keyring", e.to_string()))
}
