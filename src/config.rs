use serde::Deserialize;

use crate::naming::NameMode;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub portainer: PortainerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub naming: NamingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortainerConfig {
    /// Base URL of the control plane, e.g. "http://10.0.0.5:9000".
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Topology refresh cadence.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// How often to log app stats (cycle count, containers tracked) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Per-container stats poll cadence, independent of the topology scan.
    #[serde(default = "default_stats_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// EWMA factor for CPU%: 0 disables smoothing, 1 takes the raw value.
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// Subtract page cache from reported memory usage.
    #[serde(default = "default_mem_exclude_cache")]
    pub mem_exclude_cache: bool,
}

fn default_stats_scan_interval_secs() -> u64 {
    15
}

fn default_smoothing_alpha() -> f64 {
    0.2
}

fn default_mem_exclude_cache() -> bool {
    true
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_stats_scan_interval_secs(),
            smoothing_alpha: default_smoothing_alpha(),
            mem_exclude_cache: default_mem_exclude_cache(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamingConfig {
    /// How container entities are labelled: service, container or stack_service.
    #[serde(default)]
    pub container_label_mode: NameMode,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from TOML text; tests call this directly.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.portainer.url.starts_with("http://") || self.portainer.url.starts_with("https://"),
            "portainer.url must start with http:// or https://, got {:?}",
            self.portainer.url
        );
        anyhow::ensure!(
            !self.portainer.api_key.is_empty(),
            "portainer.api_key must be non-empty"
        );
        anyhow::ensure!(
            self.portainer.timeout_secs > 0,
            "portainer.timeout_secs must be > 0, got {}",
            self.portainer.timeout_secs
        );
        anyhow::ensure!(
            self.monitoring.scan_interval_secs > 0,
            "monitoring.scan_interval_secs must be > 0, got {}",
            self.monitoring.scan_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.stats.scan_interval_secs > 0,
            "stats.scan_interval_secs must be > 0, got {}",
            self.stats.scan_interval_secs
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.stats.smoothing_alpha),
            "stats.smoothing_alpha must be within 0.0..=1.0, got {}",
            self.stats.smoothing_alpha
        );
        Ok(())
    }
}
