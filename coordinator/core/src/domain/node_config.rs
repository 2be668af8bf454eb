// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for SensingTroops nodes, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node identity and tier role
// - Directory location and advertised endpoint
// - Liveness mode (heartbeat push or conditional poll) and deadlines
// - Retry policy for join and liveness calls
// - Alerting, static readings and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::node::NodeRole;
use crate::domain::retry::RetryPolicy;

pub const API_VERSION: &str = "sensingtroops/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "sensingtroops/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    pub node: NodeSection,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub readings: ReadingsConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Roster id of this node
    pub id: String,

    pub role: ServiceRole,

    /// Display name; the roster name wins once the node registers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Location tag; the roster place wins once the node registers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

/// What a process runs: the directory service or one tier of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Directory,
    Root,
    Relay,
    Leaf,
}

impl ServiceRole {
    pub fn node_role(&self) -> Option<NodeRole> {
        match self {
            ServiceRole::Directory => None,
            ServiceRole::Root => Some(NodeRole::Root),
            ServiceRole::Relay => Some(NodeRole::Relay),
            ServiceRole::Leaf => Some(NodeRole::Leaf),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Roster YAML served by the directory role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Address peers use to reach this node; derived from the host name when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMode {
    #[default]
    Heartbeat,
    Poll,
}

impl std::str::FromStr for LivenessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heartbeat" => Ok(LivenessMode::Heartbeat),
            "poll" => Ok(LivenessMode::Poll),
            other => Err(format!("unknown liveness mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default)]
    pub mode: LivenessMode,

    /// Seconds between heartbeats or polls sent upward
    #[serde(default = "default_signal_interval")]
    pub interval_seconds: u64,

    /// Seconds without a signal before a subordinate is evicted
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,

    /// Transmit derived directives to subordinates instead of waiting for their poll
    #[serde(default = "default_true")]
    pub push_directives: bool,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            mode: LivenessMode::default(),
            interval_seconds: default_signal_interval(),
            deadline_seconds: default_deadline(),
            push_directives: true,
        }
    }
}

impl LivenessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_retry_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.multiplier,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Reports retained for inspection on the root
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Slack-style incoming webhook; alerts are only logged when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingsConfig {
    /// Fixed readings served by name on a leaf
    #[serde(default, rename = "static", skip_serializing_if = "BTreeMap::is_empty")]
    pub static_values: BTreeMap<String, StaticReadingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticReadingConfig {
    pub value: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    53000
}

fn default_signal_interval() -> u64 {
    30
}

fn default_deadline() -> u64 {
    180
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_multiplier() -> u32 {
    2
}

fn default_cache_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "troops-node".to_string())
}

impl Default for NodeConfigSpec {
    fn default() -> Self {
        Self {
            node: NodeSection {
                id: local_hostname(),
                role: ServiceRole::Root,
                name: None,
                place: None,
            },
            directory: DirectoryConfig::default(),
            network: NetworkConfig::default(),
            liveness: LivenessConfig::default(),
            retry: RetryConfig::default(),
            reports: ReportsConfig::default(),
            alerts: AlertsConfig::default(),
            readings: ReadingsConfig::default(),
            observability: None,
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: local_hostname(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TROOPS_CONFIG_PATH environment variable
    /// 2. ./troops-config.yaml (working directory)
    /// 3. ~/.troops/config.yaml (user home)
    /// 4. /etc/troops/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TROOPS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./troops-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".troops").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/troops/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TROOPS_NODE_ID") {
            tracing::info!("Environment override: TROOPS_NODE_ID={}", id);
            self.spec.node.id = id;
        }
        if let Some(url) = lookup("TROOPS_DIRECTORY_URL") {
            tracing::info!("Environment override: TROOPS_DIRECTORY_URL={}", url);
            self.spec.directory.url = Some(url);
        }
        if let Some(endpoint) = lookup("TROOPS_ENDPOINT") {
            tracing::info!("Environment override: TROOPS_ENDPOINT={}", endpoint);
            self.spec.network.endpoint = Some(endpoint);
        }
        if let Some(val) = lookup("TROOPS_LIVENESS_MODE") {
            match val.parse::<LivenessMode>() {
                Ok(mode) => {
                    tracing::info!("Environment override: TROOPS_LIVENESS_MODE={}", val);
                    self.spec.liveness.mode = mode;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for TROOPS_LIVENESS_MODE: '{}'. Expected heartbeat/poll. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Endpoint advertised to the directory and superiors.
    pub fn advertised_endpoint(&self) -> String {
        if let Some(endpoint) = &self.spec.network.endpoint {
            return endpoint.clone();
        }
        let host = match self.spec.network.bind_address.as_str() {
            "0.0.0.0" | "::" => local_hostname(),
            other => other.to_string(),
        };
        format!("http://{}:{}/", host, self.spec.network.port)
    }

    pub fn display_name(&self) -> String {
        self.spec
            .node
            .name
            .clone()
            .unwrap_or_else(|| self.metadata.name.clone())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.id.is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        let liveness = &self.spec.liveness;
        if liveness.interval_seconds == 0 {
            anyhow::bail!("spec.liveness.interval_seconds must be greater than zero");
        }
        if liveness.deadline_seconds <= liveness.interval_seconds {
            anyhow::bail!(
                "spec.liveness.deadline_seconds ({}) must exceed interval_seconds ({})",
                liveness.deadline_seconds,
                liveness.interval_seconds
            );
        }

        if self.spec.retry.max_attempts == 0 {
            anyhow::bail!("spec.retry.max_attempts must be at least 1");
        }

        if self.spec.reports.cache_capacity == 0 {
            anyhow::bail!("spec.reports.cache_capacity must be greater than zero");
        }

        match self.spec.node.role {
            ServiceRole::Directory => {
                if self.spec.directory.roster_path.is_none() {
                    anyhow::bail!("directory role requires spec.directory.roster_path");
                }
            }
            ServiceRole::Relay | ServiceRole::Leaf => {
                if self.spec.directory.url.is_none() {
                    anyhow::bail!(
                        "{:?} role requires spec.directory.url to locate its superior",
                        self.spec.node.role
                    );
                }
            }
            ServiceRole::Root => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RELAY_YAML: &str = r#"
apiVersion: sensingtroops/v1
kind: NodeConfig
metadata:
  name: floor1-relay
spec:
  node:
    id: r1
    role: relay
  directory:
    url: http://directory:50000/
  network:
    port: 52000
  liveness:
    mode: poll
    interval_seconds: 10
    deadline_seconds: 60
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.node.role, ServiceRole::Root);
        assert_eq!(manifest.spec.liveness.deadline_seconds, 180);
        assert_eq!(manifest.spec.retry.max_attempts, 5);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_relay_config_with_defaults() {
        let manifest = NodeConfigManifest::from_yaml_str(RELAY_YAML).unwrap();
        assert_eq!(manifest.spec.node.id, "r1");
        assert_eq!(manifest.spec.node.role.node_role(), Some(NodeRole::Relay));
        assert_eq!(manifest.spec.liveness.mode, LivenessMode::Poll);
        assert!(manifest.spec.liveness.push_directives);
        assert_eq!(manifest.spec.network.bind_address, "0.0.0.0");
        assert_eq!(manifest.spec.reports.cache_capacity, 256);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RELAY_YAML.as_bytes()).unwrap();
        let manifest = NodeConfigManifest::load_or_default(Some(file.path().to_path_buf())).unwrap();

        let out = tempfile::NamedTempFile::new().unwrap();
        manifest.to_yaml_file(out.path()).unwrap();
        let reparsed = NodeConfigManifest::from_yaml_file(out.path()).unwrap();
        assert_eq!(reparsed.spec.network.port, 52000);
        assert_eq!(reparsed.spec.liveness.interval_seconds, 10);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = NodeConfigManifest::load_or_default(Some(PathBuf::from("/nonexistent/troops.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = NodeConfigManifest::from_yaml_str(RELAY_YAML).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("TROOPS_NODE_ID", "r7"),
            ("TROOPS_ENDPOINT", "http://10.0.0.7:52000/"),
            ("TROOPS_LIVENESS_MODE", "heartbeat"),
        ]);
        manifest.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(manifest.spec.node.id, "r7");
        assert_eq!(manifest.advertised_endpoint(), "http://10.0.0.7:52000/");
        assert_eq!(manifest.spec.liveness.mode, LivenessMode::Heartbeat);
        assert_eq!(
            manifest.spec.directory.url.as_deref(),
            Some("http://directory:50000/")
        );
    }

    #[test]
    fn test_invalid_liveness_override_ignored() {
        let mut manifest = NodeConfigManifest::from_yaml_str(RELAY_YAML).unwrap();
        manifest.apply_overrides_from(|key| (key == "TROOPS_LIVENESS_MODE").then(|| "gossip".to_string()));
        assert_eq!(manifest.spec.liveness.mode, LivenessMode::Poll);
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::from_yaml_str(RELAY_YAML).unwrap();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.spec.liveness.deadline_seconds = 10;
        assert!(manifest.validate().is_err());
        manifest.spec.liveness.deadline_seconds = 60;

        manifest.spec.liveness.interval_seconds = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.liveness.interval_seconds = 10;

        manifest.spec.directory.url = None;
        assert!(manifest.validate().is_err());

        manifest.spec.node.role = ServiceRole::Directory;
        assert!(manifest.validate().is_err());
        manifest.spec.directory.roster_path = Some(PathBuf::from("roster.yaml"));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_static_readings_section() {
        let yaml = r#"
apiVersion: sensingtroops/v1
kind: NodeConfig
metadata:
  name: leaf
spec:
  node:
    id: l1
    role: leaf
  directory:
    url: http://directory:50000/
  readings:
    static:
      temperature:
        value: 21.5
        unit: degC
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        let temp = &manifest.spec.readings.static_values["temperature"];
        assert_eq!(temp.value, serde_json::json!(21.5));
        assert_eq!(temp.unit.as_deref(), Some("degC"));
    }
}
