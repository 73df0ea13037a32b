//! Configuration for the cuplink daemon.
//!
//! One TOML file plus `CUPLINK_`-prefixed environment overrides, broker
//! password resolution (env var, keyring, plaintext), and translation to
//! the runtime types in `cuplink_api` and `cuplink_core`.

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

use cuplink_api::{BrokerConfig, Qos};
use cuplink_core::ConnectorConfig;

const KEYRING_SERVICE: &str = "cuplink";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
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

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile name; selects the keyring entry for the broker password.
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub connector: ConnectorSection,

    #[serde(default)]
    pub persistence: PersistenceSection,

    /// Device bindings known at start-up.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            broker: BrokerSection::default(),
            connector: ConnectorSection::default(),
            persistence: PersistenceSection::default(),
            devices: Vec::new(),
        }
    }
}

fn default_profile() -> String {
    "default".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerSection {
    /// Broker URL (e.g., "mqtt://localhost:1883").
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// MQTT client id; a random short id when unset.
    pub client_id: Option<String>,

    pub username: Option<String>,

    /// Plaintext password; the keyring or `password_env` take precedence.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            client_id: None,
            username: None,
            password: None,
            password_env: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".into()
}
fn default_keep_alive() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorSection {
    /// Topic root.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Wait between connect or disconnect attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// MQTT QoS level, 0..=2.
    #[serde(default)]
    pub qos: u8,
}

impl Default for ConnectorSection {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            device_type: default_device_type(),
            retry_interval_secs: default_retry_interval(),
            qos: 0,
        }
    }
}

fn default_server_name() -> String {
    "iotserver".into()
}
fn default_device_type() -> String {
    "connectedcup".into()
}
fn default_retry_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> usize {
    8
}

/// A device, its owner, and the address it pushes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub owner: String,
    pub address: String,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "cuplink", "cuplink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cuplink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from file + environment.
///
/// An explicit `path` must exist; the default path may be missing, in
/// which case defaults and environment variables apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound { path: p.to_owned() });
        }
        Some(p) => p.to_owned(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CUPLINK_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Check every value the runtime types cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse_broker_url()?;
        if self.connector.server_name.is_empty() {
            return Err(invalid("connector.server_name", "must not be empty"));
        }
        if self.connector.device_type.is_empty() {
            return Err(invalid("connector.device_type", "must not be empty"));
        }
        if self.connector.retry_interval_secs == 0 {
            return Err(invalid("connector.retry_interval_secs", "must be at least 1"));
        }
        Qos::try_from(self.connector.qos)
            .map_err(|e| invalid("connector.qos", e.to_string()))?;
        if self.persistence.max_connections == 0 {
            return Err(invalid("persistence.max_connections", "must be at least 1"));
        }
        for device in &self.devices {
            if device.id.is_empty() || device.owner.is_empty() || device.address.is_empty() {
                return Err(invalid(
                    "devices",
                    format!("entry '{}' needs id, owner and address", device.id),
                ));
            }
        }
        Ok(())
    }

    fn parse_broker_url(&self) -> Result<url::Url, ConfigError> {
        let url: url::Url = self
            .broker
            .url
            .parse()
            .map_err(|_| invalid("broker.url", format!("invalid URL: {}", self.broker.url)))?;
        BrokerConfig::new(url.clone())
            .host_and_port()
            .map_err(|e| invalid("broker.url", e.to_string()))?;
        Ok(url)
    }

    /// Build the broker connection settings, resolving the password.
    pub fn broker_config(&self) -> Result<BrokerConfig, ConfigError> {
        let mut config = BrokerConfig::new(self.parse_broker_url()?);
        if let Some(ref id) = self.broker.client_id {
            config.client_id.clone_from(id);
        }
        config.username.clone_from(&self.broker.username);
        config.password = resolve_broker_password(&self.broker, &self.profile);
        config.keep_alive = Duration::from_secs(self.broker.keep_alive_secs);
        Ok(config)
    }

    pub fn connector_config(&self) -> Result<ConnectorConfig, ConfigError> {
        if self.connector.retry_interval_secs == 0 {
            return Err(invalid("connector.retry_interval_secs", "must be at least 1"));
        }
        let qos = Qos::try_from(self.connector.qos)
            .map_err(|e| invalid("connector.qos", e.to_string()))?;
        Ok(ConnectorConfig {
            server_name: self.connector.server_name.clone(),
            device_type: self.connector.device_type.clone(),
            retry_interval: Duration::from_secs(self.connector.retry_interval_secs),
            qos,
        })
    }

    /// TOML rendering with the plaintext password masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.broker.password.is_some() {
            shown.broker.password = Some(REDACTED.into());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the broker password from the credential chain.
///
/// `None` means the broker is used anonymously or with an empty password.
pub fn resolve_broker_password(broker: &BrokerSection, profile: &str) -> Option<SecretString> {
    // 1. Section's password_env → env var lookup
    if let Some(ref env_name) = broker.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile}/broker-password")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    broker.password.clone().map(SecretString::from)
}
