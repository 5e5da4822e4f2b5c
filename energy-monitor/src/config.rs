use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const CONFIG_ENV: &str = "ENERGY_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "energy-monitor.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/energy_data.db"),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Messages buffered between the broker event loop and the pipeline.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "home/energy_monitor".to_string(),
            client_id: "energy-monitor".to_string(),
            keep_alive_secs: 60,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub cost_per_kwh: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cost_per_kwh: crate::transform::DEFAULT_COST_PER_KWH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind_addr: String,
    pub latest_interval_ms: u64,
    pub chart_interval_ms: u64,
    pub default_lookback_minutes: u32,
    /// Value the lookback field starts with.
    pub initial_lookback: String,
    /// Lookbacks above this freeze the chart until the input changes.
    pub max_auto_refresh_minutes: u32,
    pub max_points: usize,
    pub smoothing_window: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8050".to_string(),
            latest_interval_ms: 500,
            chart_interval_ms: 1000,
            default_lookback_minutes: crate::dashboard::lookback::DEFAULT_LOOKBACK_MINUTES,
            initial_lookback: "5".to_string(),
            max_auto_refresh_minutes: crate::dashboard::lookback::MAX_AUTO_REFRESH_MINUTES,
            max_points: crate::dashboard::decimate::MAX_POINTS,
            smoothing_window: crate::dashboard::decimate::SMOOTHING_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub mqtt: MqttConfig,
    pub ingest: IngestConfig,
    pub dashboard: DashboardConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `$ENERGY_MONITOR_CONFIG`, else `./energy-monitor.toml` when it
    /// exists, else built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            Err(_) => {
                tracing::info!("no config file found, using defaults");
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: AppConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.mqtt.topic.trim().is_empty() {
            return invalid("mqtt.topic must not be empty");
        }
        if self.mqtt.channel_capacity == 0 {
            return invalid("mqtt.channel_capacity must be positive");
        }
        if !self.ingest.cost_per_kwh.is_finite() || self.ingest.cost_per_kwh < 0.0 {
            return invalid("ingest.cost_per_kwh must be a non-negative number");
        }
        if self.storage.max_connections == 0 {
            return invalid("storage.max_connections must be positive");
        }
        let d = &self.dashboard;
        if d.latest_interval_ms == 0 || d.chart_interval_ms == 0 {
            return invalid("dashboard refresh intervals must be positive");
        }
        if d.default_lookback_minutes == 0 {
            return invalid("dashboard.default_lookback_minutes must be positive");
        }
        if d.max_points == 0 || d.smoothing_window == 0 {
            return invalid("dashboard.max_points and dashboard.smoothing_window must be positive");
        }
        Ok(())
    }
}
