//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::{AlarmPolicy, AutomationEngine, Thresholds, DEFAULT_DANGER_PPM, DEFAULT_WARNING_PPM};
use crate::persistence::WorkerConfig;
use crate::websocket::HubConfig;

/// Prefix for every environment override
pub const ENV_PREFIX: &str = "HOMEWATCH_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Generated as `homewatch_<uuid>` when unset
    pub client_id: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_mqtt_keepalive")]
    pub keepalive_secs: u64,

    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Root of every inbound and outbound topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Pending client requests before publish calls wait
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,

    /// Messages buffered per inbound topic
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_keepalive() -> u64 {
    30
}

fn default_topic_prefix() -> String {
    "iotcihuy/home".to_string()
}

fn default_request_capacity() -> usize {
    64
}

fn default_lane_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
            username: None,
            password: None,
            keepalive_secs: default_mqtt_keepalive(),
            clean_session: true,
            topic_prefix: default_topic_prefix(),
            request_capacity: default_request_capacity(),
            lane_capacity: default_lane_capacity(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Viewer fan-out settings
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,

    /// Frames buffered per viewer before it is dropped as stalled
    #[serde(default = "default_viewer_queue")]
    pub viewer_queue: usize,

    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// A viewer silent for this long is disconnected
    #[serde(default = "default_read_deadline")]
    pub read_deadline_secs: u64,
}

fn default_max_viewers() -> usize {
    1000
}

fn default_viewer_queue() -> usize {
    64
}

fn default_keepalive() -> u64 {
    30
}

fn default_read_deadline() -> u64 {
    60
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_viewers: default_max_viewers(),
            viewer_queue: default_viewer_queue(),
            keepalive_secs: default_keepalive(),
            read_deadline_secs: default_read_deadline(),
        }
    }
}

impl HubSettings {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_viewers: self.max_viewers,
            viewer_queue: self.viewer_queue,
            keepalive_interval: Duration::from_secs(self.keepalive_secs),
            ..HubConfig::default()
        }
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }
}

/// Gas alarm automation
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    /// Readings above this are a warning
    #[serde(default = "default_warning_ppm")]
    pub gas_warning_ppm: i64,

    /// Readings above this are dangerous
    #[serde(default = "default_danger_ppm")]
    pub gas_danger_ppm: i64,

    /// Send buzzer `off` when a reading is back to normal
    #[serde(default = "default_true")]
    pub auto_off: bool,
}

fn default_warning_ppm() -> i64 {
    DEFAULT_WARNING_PPM
}

fn default_danger_ppm() -> i64 {
    DEFAULT_DANGER_PPM
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            gas_warning_ppm: default_warning_ppm(),
            gas_danger_ppm: default_danger_ppm(),
            auto_off: true,
        }
    }
}

impl AutomationConfig {
    pub fn engine(&self) -> Result<AutomationEngine, ConfigError> {
        let thresholds = Thresholds::new(self.gas_warning_ppm, self.gas_danger_ppm)
            .map_err(|e| ConfigError::Invalid(format!("automation: {}", e)))?;
        Ok(AutomationEngine::new(
            thresholds,
            AlarmPolicy {
                auto_off: self.auto_off,
            },
        ))
    }
}

/// Event store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// When false every record is discarded
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent saves
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_database() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("homewatch").join("events.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./homewatch_data/events.db".to_string())
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    8
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: default_database(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl PersistenceConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// The first file that exists wins. A file that exists but cannot be
    /// read or parsed is an error; defaults apply only when no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("homewatch").join("config.toml")),
            Some(PathBuf::from("/etc/homewatch/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths, env_lookup)
    }

    fn load_first(
        paths: &[PathBuf],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match paths.iter().find(|path| path.exists()) {
            Some(path) => {
                let config = Self::load(path)?;
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            None => {
                tracing::info!("Using default config with environment overrides");
                Config::default()
            }
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.automation.engine()?;

        if self.mqtt.keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.keepalive_secs must be greater than zero".to_string(),
            ));
        }
        if self.hub.keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "hub.keepalive_secs must be greater than zero".to_string(),
            ));
        }
        if self.hub.read_deadline_secs <= self.hub.keepalive_secs {
            return Err(ConfigError::Invalid(format!(
                "hub.read_deadline_secs ({}) must be longer than hub.keepalive_secs ({})",
                self.hub.read_deadline_secs, self.hub.keepalive_secs
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env_lookup)
    }

    /// `lookup` receives the variable name without the prefix
    ///
    /// Unparsable gas thresholds are rejected rather than ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // MQTT overrides
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT").and_then(|p| p.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = Some(client_id);
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }

        // API overrides
        if let Some(host) = lookup("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Automation overrides
        if let Some(ppm) = lookup("GAS_WARNING_PPM") {
            self.automation.gas_warning_ppm = parse_ppm("GAS_WARNING_PPM", &ppm)?;
        }
        if let Some(ppm) = lookup("GAS_DANGER_PPM") {
            self.automation.gas_danger_ppm = parse_ppm("GAS_DANGER_PPM", &ppm)?;
        }

        if let Some(database) = lookup("DATABASE") {
            self.persistence.database = database;
        }

        // Logging overrides
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

fn parse_ppm(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!(
            "{}{} must be an integer ppm value, got '{}'",
            ENV_PREFIX, key, value
        ))
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Homewatch Configuration
#
# Environment variables override these settings:
# - HOMEWATCH_MQTT_HOST, HOMEWATCH_MQTT_PORT, HOMEWATCH_MQTT_CLIENT_ID
# - HOMEWATCH_MQTT_USERNAME, HOMEWATCH_MQTT_PASSWORD
# - HOMEWATCH_API_HOST, HOMEWATCH_API_PORT
# - HOMEWATCH_GAS_WARNING_PPM, HOMEWATCH_GAS_DANGER_PPM
# - HOMEWATCH_DATABASE
# - HOMEWATCH_LOG_LEVEL, HOMEWATCH_LOG_FORMAT

[mqtt]
host = "localhost"
port = 1883

# Defaults to homewatch_<random>
# client_id = "homewatch_bridge"
# username = ""
# password = ""

keepalive_secs = 30
clean_session = true

# Sensors publish to <prefix>/<sensor>, devices to <prefix>/<device>/status,
# commands go to <prefix>/<device>/control
topic_prefix = "iotcihuy/home"

# Messages buffered per inbound topic
lane_capacity = 256

[api]
host = "0.0.0.0"
port = 8080

# Allowed CORS origins (empty allows any)
cors_origins = []

[hub]
max_viewers = 1000

# Frames buffered per viewer before it is dropped
viewer_queue = 64

# Ping interval for viewers
keepalive_secs = 30

# Viewers silent for longer than this are disconnected
read_deadline_secs = 60

[automation]
# Gas readings above warning_ppm sound the buzzer; above danger_ppm are dangerous
gas_warning_ppm = 200
gas_danger_ppm = 500

# Silence the buzzer automatically once readings are normal again
auto_off = true

[persistence]
enabled = true

# Defaults to <data dir>/homewatch/events.db
# database = "/var/lib/homewatch/events.db"

# Records waiting to be saved before new ones are dropped
queue_capacity = 1024
max_in_flight = 8

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.automation.gas_warning_ppm, 200);
        assert_eq!(config.automation.gas_danger_ppm, 500);
        assert!(config.automation.auto_off);
        assert_eq!(config.mqtt.topic_prefix, "iotcihuy/home");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.hub.read_deadline_secs, 60);
        assert_eq!(config.mqtt.client_id, None);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[automation]\ngas_warning_ppm = 500\ngas_danger_ppm = 1000\nauto_off = false").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.automation.gas_danger_ppm, 1000);
        assert!(!config.automation.auto_off);
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/homewatch.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let mut config = Config::default();
        config.automation.gas_warning_ppm = 500;
        config.automation.gas_danger_ppm = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_read_deadline_must_exceed_keepalive() {
        let mut config = Config::default();
        config.hub.read_deadline_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MQTT_HOST", "broker.local"),
            ("MQTT_PORT", "8883"),
            ("API_PORT", "not-a-port"),
            ("GAS_DANGER_PPM", "900"),
            ("LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.automation.gas_danger_ppm, 900);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_unparsable_threshold_override_rejected() {
        let mut config = Config::default();
        config.automation.gas_warning_ppm = 300;

        let result = config.apply_overrides(|key| match key {
            "GAS_WARNING_PPM" => Some("3OO".to_string()),
            _ => None,
        });

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(config.automation.gas_warning_ppm, 300);
    }

    #[test]
    fn test_malformed_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[automation]\ngas_warning_ppm = 500\ngas_danger_ppm = \"oops\"\n").unwrap();

        let result = Config::load_first(&[path], |_| None);

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_first_skips_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let present = dir.path().join("config.toml");
        std::fs::write(&present, "[automation]\ngas_warning_ppm = 300\n").unwrap();

        let config = Config::load_first(&[missing, present], |_| None).unwrap();

        assert_eq!(config.automation.gas_warning_ppm, 300);
        assert_eq!(config.automation.gas_danger_ppm, 500);
    }

    #[test]
    fn test_load_first_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_first(&[dir.path().join("none.toml")], |key| match key {
            "GAS_DANGER_PPM" => Some("800".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.automation.gas_warning_ppm, 200);
        assert_eq!(config.automation.gas_danger_ppm, 800);
    }

    #[test]
    fn test_hub_settings_conversion() {
        let settings = HubSettings {
            keepalive_secs: 10,
            ..HubSettings::default()
        };
        assert_eq!(settings.hub_config().keepalive_interval, Duration::from_secs(10));
        assert_eq!(settings.read_deadline(), Duration::from_secs(60));
    }
}
