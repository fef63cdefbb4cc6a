use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "roomcast.toml",
    "config/roomcast.toml",
    "crates/config/roomcast.toml",
    "../roomcast.toml",
    "../config/roomcast.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://roomcast.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Redis connection settings.
///
/// Without a URL the server keeps its queue in SQLite and bridges only
/// in-process, which is enough for a single instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// Settings of the relay core.
///
/// ```
/// use roomcast_config::RelayConfig;
///
/// let relay = RelayConfig::default();
/// assert_eq!(relay.queue_key, "MESSAGES");
/// assert_eq!(relay.quarantine_key, "FAILED_MESSAGES");
/// assert_eq!(relay.flush_interval().as_secs(), 10);
/// assert!(relay.instance_id.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "RelayConfig::default_queue_key")]
    pub queue_key: String,
    #[serde(default = "RelayConfig::default_quarantine_key")]
    pub quarantine_key: String,
    #[serde(default = "RelayConfig::default_channel")]
    pub channel: String,
    #[serde(default = "RelayConfig::default_flush_interval")]
    pub flush_interval_seconds: u64,
    #[serde(default = "RelayConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Name of this instance on the bridge; generated when absent
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl RelayConfig {
    fn default_queue_key() -> String {
        "MESSAGES".to_string()
    }

    fn default_quarantine_key() -> String {
        "FAILED_MESSAGES".to_string()
    }

    fn default_channel() -> String {
        "MESSAGES".to_string()
    }

    const fn default_flush_interval() -> u64 {
        10
    }

    const fn default_outbound_buffer() -> usize {
        100
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.flush_interval_seconds == 0 {
            bail!("relay.flush_interval_seconds must be greater than zero");
        }
        if self.queue_key.is_empty() || self.quarantine_key.is_empty() || self.channel.is_empty() {
            bail!("relay queue keys and channel must not be empty");
        }
        if self.queue_key == self.quarantine_key {
            bail!("relay.queue_key and relay.quarantine_key must differ");
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_key: Self::default_queue_key(),
            quarantine_key: Self::default_quarantine_key(),
            channel: Self::default_channel(),
            flush_interval_seconds: Self::default_flush_interval(),
            outbound_buffer: Self::default_outbound_buffer(),
            instance_id: None,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use roomcast_config::load;
///
/// std::env::remove_var("ROOMCAST_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let outbound_buffer = i64::try_from(defaults.relay.outbound_buffer).unwrap_or(i64::MAX);
    let flush_interval = i64::try_from(defaults.relay.flush_interval_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("relay.queue_key", defaults.relay.queue_key.clone())?
        .set_default("relay.quarantine_key", defaults.relay.quarantine_key.clone())?
        .set_default("relay.channel", defaults.relay.channel.clone())?
        .set_default("relay.flush_interval_seconds", flush_interval)?
        .set_default("relay.outbound_buffer", outbound_buffer)?;

    let environment_overrides = config::Environment::with_prefix("ROOMCAST").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("ROOMCAST_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via ROOMCAST_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.redis.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
        config.redis.url = None;
    }
    config.relay.validate().context("invalid configuration")?;

    debug!(?config, "loaded relay configuration");
    Ok(config)
}
