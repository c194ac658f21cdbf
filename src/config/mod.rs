// ABOUTME: Switch descriptors, per-backend API configs, and inventory parsing.
// ABOUTME: Everything here is validated before a single byte goes on the wire.

use crate::backend::BackendType;
use crate::types::{SwitchName, SwitchNameError};
use nonempty::NonEmpty;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const INVENTORY_FILENAME: &str = "switches.yml";
pub const INVENTORY_FILENAME_ALT: &str = "switches.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    SwitchName(#[from] SwitchNameError),

    #[error("switch '{switch}': port number must not be 0")]
    ZeroPort { switch: String },

    #[error("switch '{switch}': interface name in port mapping cannot be empty")]
    EmptyInterfaceName { switch: String },

    #[error(
        "switch '{switch}': interfaces '{first}' and '{second}' both map to port {port}"
    )]
    DuplicatePortId {
        switch: String,
        port: u32,
        first: String,
        second: String,
    },

    #[error("switch '{switch}': {field} cannot be empty")]
    EmptyField {
        switch: String,
        field: &'static str,
    },

    #[error("inventory must declare at least one switch")]
    NoSwitches,
}

/// Connection parameters for switches exposing a Thrift-style RPC agent.
///
/// The agent listens on `thrift_port` and accepts length-prefixed command
/// documents; it is the one backend family with an atomic multi-op primitive.
#[derive(Debug, Clone, Deserialize)]
pub struct ThriftApiConfig {
    /// Port at which the switch's RPC agent listens.
    pub thrift_port: u16,

    /// Host the agent listens on. Switch agents are almost always local.
    #[serde(default = "default_host")]
    pub host: String,

    /// Mapping of network interface names to port IDs.
    #[serde(default)]
    pub interface_to_port: HashMap<String, u32>,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

/// Parameters for kernel-bypass switches driven through a control binary
/// (`nikss-ctl` style). The binary must be on the PATH or given explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct CliDriverApiConfig {
    /// Identifier of the pipeline the P4 program is loaded into.
    pub pipeline_id: u32,

    /// Control binary to invoke; overridable mainly for tests.
    #[serde(default = "default_cli_program")]
    pub program: String,

    /// Mapping of network interface names to port IDs.
    #[serde(default)]
    pub interface_to_port: HashMap<String, u32>,
}

/// Parameters for switches driven through the vendor's native runtime shell,
/// spawned as a long-lived child process and fed commands over stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct NativeRuntimeApiConfig {
    /// The runtime shell executable (wrapping the relay server script).
    pub program: String,

    /// Name of the P4 program loaded into the pipeline.
    pub pipeline_name: String,

    /// Runtime device the shell attaches to.
    #[serde(default)]
    pub device_id: u64,

    /// Mapping of network interface names to port IDs.
    #[serde(default)]
    pub interface_to_port: HashMap<String, u32>,

    /// Whether the shell confirms each command with a status line. Disabling
    /// this lets commands stream without waiting, at the cost of losing all
    /// per-command error reporting.
    #[serde(default = "default_true")]
    pub acknowledgments: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cli_program() -> String {
    "nikss-ctl".to_string()
}

fn default_true() -> bool {
    true
}

/// Defines how the control plane reaches one switch. The variant tag is the
/// dispatch key the factory uses to pick a backend session implementation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum SwitchApiConfig {
    Thrift(ThriftApiConfig),
    CliDriver(CliDriverApiConfig),
    NativeRuntime(NativeRuntimeApiConfig),
}

impl SwitchApiConfig {
    pub fn backend_type(&self) -> BackendType {
        match self {
            SwitchApiConfig::Thrift(_) => BackendType::Thrift,
            SwitchApiConfig::CliDriver(_) => BackendType::CliDriver,
            SwitchApiConfig::NativeRuntime(_) => BackendType::NativeRuntime,
        }
    }

    pub fn interface_to_port(&self) -> &HashMap<String, u32> {
        match self {
            SwitchApiConfig::Thrift(c) => &c.interface_to_port,
            SwitchApiConfig::CliDriver(c) => &c.interface_to_port,
            SwitchApiConfig::NativeRuntime(c) => &c.interface_to_port,
        }
    }

    fn validate(&self, switch: &str) -> Result<(), ConfigError> {
        match self {
            SwitchApiConfig::Thrift(c) => {
                if c.thrift_port == 0 {
                    return Err(ConfigError::ZeroPort {
                        switch: switch.to_string(),
                    });
                }
                if c.host.is_empty() {
                    return Err(ConfigError::EmptyField {
                        switch: switch.to_string(),
                        field: "host",
                    });
                }
            }
            SwitchApiConfig::CliDriver(c) => {
                if c.program.is_empty() {
                    return Err(ConfigError::EmptyField {
                        switch: switch.to_string(),
                        field: "program",
                    });
                }
            }
            SwitchApiConfig::NativeRuntime(c) => {
                if c.program.is_empty() {
                    return Err(ConfigError::EmptyField {
                        switch: switch.to_string(),
                        field: "program",
                    });
                }
                if c.pipeline_name.is_empty() {
                    return Err(ConfigError::EmptyField {
                        switch: switch.to_string(),
                        field: "pipeline_name",
                    });
                }
            }
        }
        validate_port_mapping(switch, self.interface_to_port())
    }
}

fn validate_port_mapping(
    switch: &str,
    mapping: &HashMap<String, u32>,
) -> Result<(), ConfigError> {
    let mut seen: HashMap<u32, &str> = HashMap::new();
    for (name, port) in mapping {
        if name.is_empty() {
            return Err(ConfigError::EmptyInterfaceName {
                switch: switch.to_string(),
            });
        }
        if let Some(first) = seen.insert(*port, name) {
            // HashMap iteration order is arbitrary; normalize so the error
            // message is deterministic.
            let (a, b) = if first < name.as_str() {
                (first, name.as_str())
            } else {
                (name.as_str(), first)
            };
            return Err(ConfigError::DuplicatePortId {
                switch: switch.to_string(),
                port: *port,
                first: a.to_string(),
                second: b.to_string(),
            });
        }
    }
    Ok(())
}

/// Identity plus connection parameters for one switch. Immutable; consumed by
/// the factory. Construction validates everything up front, so a descriptor
/// in hand is always safe to hand to [`crate::BridgeFactory::get`].
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchDescriptor {
    pub name: SwitchName,
    pub api: SwitchApiConfig,
}

impl SwitchDescriptor {
    pub fn new(name: &str, api: SwitchApiConfig) -> Result<Self, ConfigError> {
        let name = SwitchName::new(name)?;
        api.validate(name.as_str())?;
        Ok(Self { name, api })
    }

    /// Re-runs the construction-time checks. Used after serde deserialization,
    /// which builds descriptors without going through [`SwitchDescriptor::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate(self.name.as_str())
    }
}

/// A `switches.yml` file: every switch this control plane knows about.
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    #[serde(deserialize_with = "deserialize_switches")]
    pub switches: NonEmpty<SwitchDescriptor>,
}

impl Inventory {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let inventory: Inventory = serde_yaml::from_str(yaml)?;
        for switch in inventory.switches.iter() {
            switch.validate()?;
        }
        Ok(inventory)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Looks up one switch by name.
    pub fn switch(&self, name: &str) -> Option<&SwitchDescriptor> {
        self.switches.iter().find(|s| s.name.as_str() == name)
    }
}

fn deserialize_switches<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<SwitchDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let switches = Vec::<SwitchDescriptor>::deserialize(deserializer)?;
    NonEmpty::from_vec(switches)
        .ok_or_else(|| serde::de::Error::custom(ConfigError::NoSwitches))
}
