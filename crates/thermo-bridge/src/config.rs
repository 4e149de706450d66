//! # Bridge Configuration
//!
//! Everything the server needs at startup, loaded once.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     THERMO_REGISTRY_URL=ws://10.0.0.5:9000/skud                        │
//! │     THERMO_DATABASE_PATH, THERMO_IMAGES_DIR                            │
//! │     THERMO_LIVE_PORT, THERMO_LOG                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, or THERMO_CONFIG, or                                │
//! │     ~/.config/thermo-bridge/thermo-bridge.toml (Linux)                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [[endpoints]]
//! id = 1
//! url = "ws://10.0.0.21:8080/ws"
//! cabin_id = 3
//! name = "North gate"
//!
//! [registry]
//! url = "ws://10.0.0.5:9000/skud"
//! request_timeout_ms = 3000
//!
//! [thresholds]
//! min = 34.0
//! max = 37.5
//!
//! [retention]
//! days = 30
//!
//! [live]
//! port = 8090
//! ```
//!
//! Validation failures are fatal at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use thermo_core::{
    validation::{validate_endpoint, validate_ws_url},
    EndpointDescriptor, StatusPolicy, DEFAULT_RETENTION_DAYS, DEFAULT_STALENESS_MINUTES,
};
use thermo_db::DbConfig;

use crate::aggregator::AggregatorConfig;
use crate::correlated::RegistryLinkConfig;
use crate::endpoint::{KioskLinkConfig, DEFAULT_IMAGE_URL_TEMPLATE};
use crate::error::{BridgeError, BridgeResult};
use crate::orchestrator::OrchestratorConfig;
use crate::publisher::DEFAULT_CHANNEL_CAPACITY;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "THERMO_CONFIG";

const CONFIG_FILE_NAME: &str = "thermo-bridge.toml";

/// Longest accepted pause between retention sweeps (one week).
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Longest accepted retention window.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

// =============================================================================
// Registry Settings
// =============================================================================

/// Registry link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// WebSocket URL of the registry.
    #[serde(default)]
    pub url: String,

    /// Pause between reconnect attempts (seconds).
    #[serde(default = "default_registry_reconnect")]
    pub reconnect_secs: u64,

    /// How long a lookup waits for its response (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Dial timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Outbound frame queue depth.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Per-caller response queue depth.
    #[serde(default = "default_waiter_capacity")]
    pub waiter_capacity: usize,
}

fn default_registry_reconnect() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_outbound_capacity() -> usize {
    10
}
fn default_waiter_capacity() -> usize {
    1
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            url: String::new(),
            reconnect_secs: default_registry_reconnect(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            outbound_capacity: default_outbound_capacity(),
            waiter_capacity: default_waiter_capacity(),
        }
    }
}

// =============================================================================
// Kiosk Settings
// =============================================================================

/// Settings shared by every kiosk link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskSettings {
    #[serde(default = "default_kiosk_reconnect")]
    pub reconnect_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Snapshot download timeout (milliseconds).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_ms: u64,

    /// Per-kiosk decoded event queue depth.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Snapshot URL with `{host}` and `{filename}` placeholders.
    #[serde(default = "default_image_url_template")]
    pub image_url_template: String,
}

fn default_kiosk_reconnect() -> u64 {
    5
}
fn default_download_timeout() -> u64 {
    2000
}
fn default_event_capacity() -> usize {
    20
}
fn default_image_url_template() -> String {
    DEFAULT_IMAGE_URL_TEMPLATE.to_string()
}

impl Default for KioskSettings {
    fn default() -> Self {
        KioskSettings {
            reconnect_secs: default_kiosk_reconnect(),
            connect_timeout_secs: default_connect_timeout(),
            download_timeout_ms: default_download_timeout(),
            event_capacity: default_event_capacity(),
            image_url_template: default_image_url_template(),
        }
    }
}

// =============================================================================
// Aggregator, Thresholds, Identity, Retention
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Merged queue depth.
    pub capacity: usize,

    /// Pause before a failed source group is restarted (milliseconds).
    pub restart_delay_ms: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        AggregatorSettings {
            capacity: 10,
            restart_delay_ms: 1000,
        }
    }
}

/// Temperature thresholds and the status message templates.
///
/// Templates may use `{temperature}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub min: f64,
    pub max: f64,
    pub normal_template: String,
    pub alarm_template: String,
    pub low_template: String,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let policy = StatusPolicy::default();
        ThresholdSettings {
            min: policy.min,
            max: policy.max,
            normal_template: policy.normal_template,
            alarm_template: policy.alarm_template,
            low_template: policy.low_template,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Stored identities older than this are refreshed in the background.
    pub staleness_minutes: i64,

    /// In-memory identity cache lifetime (seconds).
    pub cache_ttl_secs: u64,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        IdentitySettings {
            staleness_minutes: DEFAULT_STALENESS_MINUTES,
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub days: u32,
    pub sweep_interval_minutes: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        RetentionSettings {
            days: DEFAULT_RETENTION_DAYS,
            sweep_interval_minutes: 30,
        }
    }
}

// =============================================================================
// Storage, Live Feed, Log
// =============================================================================

/// Where the database and images live. Unset paths fall back to the
/// platform data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Bind address (default: 0.0.0.0 for all interfaces).
    pub bind_addr: String,
    pub port: u16,
    pub channel_capacity: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            bind_addr: "0.0.0.0".to_string(),
            port: 8090,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber` filter directive, e.g. `"info,thermo_bridge=debug"`.
    pub level: Option<String>,
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Kiosks to connect to.
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub kiosk: KioskSettings,

    #[serde(default)]
    pub aggregator: AggregatorSettings,

    #[serde(default)]
    pub thresholds: ThresholdSettings,

    #[serde(default)]
    pub identity: IdentitySettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub live: LiveSettings,

    #[serde(default)]
    pub log: LogSettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, then `THERMO_CONFIG`, then the platform default)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BridgeResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without validating it.
    pub fn from_toml(contents: &str) -> BridgeResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BridgeResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BridgeError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.endpoints.is_empty() {
            return Err(BridgeError::InvalidConfig("at least one endpoint is required".into()));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            validate_endpoint(endpoint).map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;
            if !seen.insert(endpoint.id) {
                return Err(BridgeError::InvalidConfig(format!(
                    "duplicate endpoint id {}",
                    endpoint.id
                )));
            }
        }

        if self.registry.url.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("registry.url is required".into()));
        }
        validate_ws_url("registry.url", &self.registry.url)
            .map_err(|e| BridgeError::InvalidUrl(e.to_string()))?;

        if self.thresholds.min >= self.thresholds.max {
            return Err(BridgeError::InvalidConfig(format!(
                "thresholds.min ({}) must be below thresholds.max ({})",
                self.thresholds.min, self.thresholds.max
            )));
        }

        let capacities = [
            ("registry.outbound_capacity", self.registry.outbound_capacity),
            ("registry.waiter_capacity", self.registry.waiter_capacity),
            ("kiosk.event_capacity", self.kiosk.event_capacity),
            ("aggregator.capacity", self.aggregator.capacity),
            ("live.channel_capacity", self.live.channel_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(BridgeError::InvalidConfig(format!("{} must be greater than 0", name)));
            }
        }

        let timeouts = [
            ("registry.request_timeout_ms", self.registry.request_timeout_ms),
            ("registry.connect_timeout_secs", self.registry.connect_timeout_secs),
            ("kiosk.connect_timeout_secs", self.kiosk.connect_timeout_secs),
            ("kiosk.download_timeout_ms", self.kiosk.download_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(BridgeError::InvalidConfig(format!("{} must be greater than 0", name)));
            }
        }

        if self.retention.days == 0 || self.retention.days > MAX_RETENTION_DAYS {
            return Err(BridgeError::InvalidConfig(format!(
                "retention.days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        self.staleness_window()?;
        self.sweep_interval()?;

        let template = &self.kiosk.image_url_template;
        if !template.contains("{host}") || !template.contains("{filename}") {
            return Err(BridgeError::InvalidConfig(
                "kiosk.image_url_template must contain {host} and {filename}".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) -> BridgeResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> BridgeResult<()> {
        if let Some(url) = var("THERMO_REGISTRY_URL") {
            debug!(url = %url, "Overriding registry URL from environment");
            self.registry.url = url;
        }

        if let Some(path) = var("THERMO_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = var("THERMO_IMAGES_DIR") {
            self.storage.images_dir = Some(PathBuf::from(dir));
        }

        if let Some(port) = var("THERMO_LIVE_PORT") {
            self.live.port = port.trim().parse::<u16>().map_err(|_| {
                BridgeError::InvalidConfig(format!("THERMO_LIVE_PORT is not a port: {:?}", port))
            })?;
            debug!(port = self.live.port, "Overriding live feed port from environment");
        }

        if let Some(level) = var("THERMO_LOG") {
            self.log.level = Some(level);
        }

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Component Settings
    // =========================================================================

    pub fn registry_link_config(&self) -> RegistryLinkConfig {
        RegistryLinkConfig {
            url: self.registry.url.clone(),
            reconnect_delay: Duration::from_secs(self.registry.reconnect_secs),
            connect_timeout: Duration::from_secs(self.registry.connect_timeout_secs),
            request_timeout: Duration::from_millis(self.registry.request_timeout_ms),
            outbound_capacity: self.registry.outbound_capacity,
            waiter_capacity: self.registry.waiter_capacity,
        }
    }

    pub fn kiosk_link_config(&self) -> KioskLinkConfig {
        KioskLinkConfig {
            reconnect_delay: Duration::from_secs(self.kiosk.reconnect_secs),
            connect_timeout: Duration::from_secs(self.kiosk.connect_timeout_secs),
            download_timeout: Duration::from_millis(self.kiosk.download_timeout_ms),
            event_capacity: self.kiosk.event_capacity,
            image_url_template: self.kiosk.image_url_template.clone(),
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            capacity: self.aggregator.capacity,
            restart_delay: Duration::from_millis(self.aggregator.restart_delay_ms),
        }
    }

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy {
            min: self.thresholds.min,
            max: self.thresholds.max,
            normal_template: self.thresholds.normal_template.clone(),
            alarm_template: self.thresholds.alarm_template.clone(),
            low_template: self.thresholds.low_template.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> BridgeResult<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            policy: self.status_policy(),
            staleness_window: self.staleness_window()?,
            retention_days: self.retention.days,
            sweep_interval: self.sweep_interval()?,
        })
    }

    /// Age after which a stored identity is refreshed.
    pub fn staleness_window(&self) -> BridgeResult<chrono::Duration> {
        let minutes = self.identity.staleness_minutes;
        if minutes <= 0 {
            return Err(BridgeError::InvalidConfig(
                "identity.staleness_minutes must be greater than 0".into(),
            ));
        }
        chrono::Duration::try_minutes(minutes).ok_or_else(|| {
            BridgeError::InvalidConfig(format!(
                "identity.staleness_minutes ({}) is out of range",
                minutes
            ))
        })
    }

    /// Pause between retention sweeps.
    pub fn sweep_interval(&self) -> BridgeResult<Duration> {
        let minutes = self.retention.sweep_interval_minutes;
        if minutes == 0 || minutes > MAX_SWEEP_INTERVAL_MINUTES {
            return Err(BridgeError::InvalidConfig(format!(
                "retention.sweep_interval_minutes must be between 1 and {}",
                MAX_SWEEP_INTERVAL_MINUTES
            )));
        }
        minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| BridgeError::InvalidConfig("retention.sweep_interval_minutes overflows".into()))
    }

    /// Database settings, filling unset paths from the platform data directory.
    pub fn db_config(&self) -> DbConfig {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let database_path = self
            .storage
            .database_path
            .clone()
            .unwrap_or_else(|| data_dir.join("thermo.db"));
        let mut config = DbConfig::new(database_path)
            .cache_ttl(Duration::from_secs(self.identity.cache_ttl_secs));
        if let Some(dir) = &self.storage.images_dir {
            config = config.images_dir(dir.clone());
        }
        config
    }

    /// Returns the live feed `host:port`.
    pub fn live_bind_address(&self) -> String {
        format!("{}:{}", self.live.bind_addr, self.live.port)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "thermo", "thermo-bridge")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [[endpoints]]
        id = 1
        url = "ws://10.0.0.21:8080/ws"
        cabin_id = 3
        name = "North gate"

        [[endpoints]]
        id = 2
        url = "ws://10.0.0.22:8080/ws"
        cabin_id = 4
        name = "South gate"
        description = "by the turnstile"

        [registry]
        url = "ws://10.0.0.5:9000/skud"
        request_timeout_ms = 1500

        [thresholds]
        min = 35.0
        max = 37.2

        [storage]
        database_path = "/var/lib/thermo/thermo.db"
    "#;

    fn sample() -> BridgeConfig {
        BridgeConfig::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_parses_with_defaults() {
        let config = sample();
        config.validate().unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[1].description.as_deref(), Some("by the turnstile"));
        assert_eq!(config.registry.request_timeout_ms, 1500);
        assert_eq!(config.registry.reconnect_secs, 10);
        assert_eq!(config.kiosk.reconnect_secs, 5);
        assert_eq!(config.kiosk.image_url_template, DEFAULT_IMAGE_URL_TEMPLATE);
        assert_eq!(config.aggregator.capacity, 10);
        assert_eq!(config.retention.days, 30);
        assert_eq!(config.live.port, 8090);
        assert!(config.log.level.is_none());
    }

    #[test]
    fn test_component_settings() {
        let config = sample();

        let registry = config.registry_link_config();
        assert_eq!(registry.request_timeout, Duration::from_millis(1500));
        assert_eq!(registry.waiter_capacity, 1);

        let policy = config.status_policy();
        assert_eq!(policy.min, 35.0);
        assert_eq!(policy.max, 37.2);

        let orchestrator = config.orchestrator_config().unwrap();
        assert_eq!(orchestrator.staleness_window, chrono::Duration::minutes(60));
        assert_eq!(orchestrator.sweep_interval, Duration::from_secs(30 * 60));

        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/var/lib/thermo/thermo.db"));
        assert_eq!(db.images_dir, PathBuf::from("/var/lib/thermo/images"));
        assert_eq!(db.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_validation_rules() {
        assert!(BridgeConfig::default().validate().is_err());

        let mut config = sample();
        config.endpoints[1].id = 1;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = sample();
        config.endpoints[0].url = "http://10.0.0.21".into();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.registry.url = "tcp://10.0.0.5".into();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.thresholds.min = 38.0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.aggregator.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.kiosk.image_url_template = "http://{host}/img".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_and_out_of_range_durations_are_rejected() {
        let cases: [fn(&mut BridgeConfig); 8] = [
            |c| c.retention.sweep_interval_minutes = 0,
            |c| c.retention.sweep_interval_minutes = u64::MAX,
            |c| c.retention.days = 0,
            |c| c.registry.request_timeout_ms = 0,
            |c| c.kiosk.download_timeout_ms = 0,
            |c| c.kiosk.connect_timeout_secs = 0,
            |c| c.identity.staleness_minutes = 0,
            |c| c.identity.staleness_minutes = i64::MAX,
        ];

        for (i, mutate) in cases.iter().enumerate() {
            let mut config = sample();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(err.is_config_error(), "case {}: {}", i, err);
        }

        let mut config = sample();
        config.retention.sweep_interval_minutes = 0;
        assert!(config.orchestrator_config().is_err());

        let mut config = sample();
        config.identity.staleness_minutes = i64::MAX;
        assert!(config.orchestrator_config().is_err());
    }

    #[test]
    fn test_zero_sweep_interval_in_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let contents = format!("{}\n[retention]\nsweep_interval_minutes = 0\n", SAMPLE);
        std::fs::write(&path, contents).unwrap();

        let err = BridgeConfig::load(Some(path)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("THERMO_REGISTRY_URL", "wss://registry.local/skud"),
            ("THERMO_IMAGES_DIR", "/srv/images"),
            ("THERMO_LIVE_PORT", "9100"),
            ("THERMO_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = sample();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.registry.url, "wss://registry.local/skud");
        assert_eq!(config.db_config().images_dir, PathBuf::from("/srv/images"));
        assert_eq!(config.live.port, 9100);
        assert_eq!(config.live_bind_address(), "0.0.0.0:9100");
        assert_eq!(config.log.level.as_deref(), Some("debug"));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_port_override_is_config_error() {
        let mut config = sample();
        let err = config
            .apply_overrides(|key| (key == "THERMO_LIVE_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(config.live.port, 8090);

        let err = config
            .apply_overrides(|key| (key == "THERMO_LIVE_PORT").then(|| "70000".to_string()))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_and_save_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        sample().save(Some(path.clone())).unwrap();
        let loaded = BridgeConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.endpoints.len(), 2);
        assert_eq!(loaded.thresholds.max, 37.2);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let err = BridgeConfig::from_toml("[[endpoints]]\nid = \"one\"").unwrap_err();
        assert!(err.is_config_error());
    }
}
