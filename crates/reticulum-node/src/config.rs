//! TOML-based configuration for Reticulum nodes.
//!
//! Values are checked when the file is loaded, so a node never starts with
//! an interface entry it would have to reject later.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use reticulum_core::InterfaceMode;
use reticulum_interfaces::auto::{DEFAULT_DATA_PORT, DEFAULT_DISCOVERY_PORT, DEFAULT_GROUP_ID};
use reticulum_interfaces::{AutoConfig, DiscoveryScope, InterfaceError};
use reticulum_protocol::LinkTimings;
use reticulum_transport::TransportConfig;

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub interfaces: InterfacesSection,
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let config: Self =
            toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        self.transport.to_transport_config()?;
        for entry in &self.interfaces.auto {
            entry.to_auto_config()?;
        }
        Ok(())
    }
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    #[serde(default = "default_node_name")]
    pub name: String,
}

fn default_node_name() -> String {
    "reticulum-node".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: default_node_name(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The `[transport]` section. Durations are in seconds.
#[derive(Debug, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_table_sweep_interval")]
    pub table_sweep_interval: u64,
    #[serde(default = "default_link_keepalive")]
    pub link_keepalive: u64,
    /// Link establishment allowance per hop.
    #[serde(default = "default_establishment_per_hop")]
    pub link_establishment_per_hop: u64,
}

fn default_table_sweep_interval() -> u64 {
    5
}

fn default_link_keepalive() -> u64 {
    360
}

fn default_establishment_per_hop() -> u64 {
    6
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            table_sweep_interval: default_table_sweep_interval(),
            link_keepalive: default_link_keepalive(),
            link_establishment_per_hop: default_establishment_per_hop(),
        }
    }
}

impl TransportSection {
    pub fn to_transport_config(&self) -> Result<TransportConfig, NodeError> {
        let positive = |key: &str, secs: u64| {
            if secs == 0 {
                Err(NodeError::Config(format!("transport.{key} must be positive")))
            } else {
                Ok(Duration::from_secs(secs))
            }
        };
        Ok(TransportConfig {
            table_sweep_interval: positive("table_sweep_interval", self.table_sweep_interval)?,
            link_timings: LinkTimings {
                keepalive: positive("link_keepalive", self.link_keepalive)?,
                establishment_per_hop: positive(
                    "link_establishment_per_hop",
                    self.link_establishment_per_hop,
                )?,
                ..LinkTimings::default()
            },
        })
    }
}

/// The `[interfaces]` section containing arrays of interface configs.
#[derive(Debug, Default, Deserialize)]
pub struct InterfacesSection {
    #[serde(default)]
    pub auto: Vec<AutoEntry>,
}

/// A `[[interfaces.auto]]` entry.
#[derive(Debug, Deserialize)]
pub struct AutoEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_scope_str")]
    pub discovery_scope: String,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_data_port")]
    pub data_port: u16,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub ignored_interfaces: Vec<String>,
    /// Base peering timeout in seconds.
    #[serde(default = "default_peering_timeout")]
    pub peering_timeout: f64,
    #[serde(default = "default_mode_str")]
    pub mode: String,
}

fn default_enabled() -> bool {
    true
}

fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

fn default_scope_str() -> String {
    "link".to_string()
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_data_port() -> u16 {
    DEFAULT_DATA_PORT
}

fn default_peering_timeout() -> f64 {
    22.0
}

fn default_mode_str() -> String {
    "full".to_string()
}

impl AutoEntry {
    pub fn to_auto_config(&self) -> Result<AutoConfig, NodeError> {
        let peering_timeout = Duration::try_from_secs_f64(self.peering_timeout)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                NodeError::Config(format!(
                    "{}: peering_timeout must be a positive number of seconds, got {}",
                    self.name, self.peering_timeout
                ))
            })?;

        let config = AutoConfig {
            name: self.name.clone(),
            group_id: self.group_id.clone(),
            discovery_scope: parse_scope(&self.discovery_scope)?,
            discovery_port: self.discovery_port,
            data_port: self.data_port,
            devices: self.devices.clone(),
            ignored_interfaces: self.ignored_interfaces.clone(),
            peering_timeout,
            mode: parse_mode(&self.mode)?,
        };
        config.validate().map_err(config_error)?;
        Ok(config)
    }
}

/// Parse a mode string to an `InterfaceMode`, ignoring case.
pub fn parse_mode(s: &str) -> Result<InterfaceMode, NodeError> {
    s.to_lowercase().parse().map_err(NodeError::Config)
}

/// Parse a discovery scope name, ignoring case.
pub fn parse_scope(s: &str) -> Result<DiscoveryScope, NodeError> {
    s.to_lowercase().parse().map_err(config_error)
}

fn config_error(e: InterfaceError) -> NodeError {
    match e {
        InterfaceError::Configuration(msg) => NodeError::Config(msg),
        other => NodeError::Config(other.to_string()),
    }
}
