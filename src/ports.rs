// ABOUTME: Interface-name to port-ID translation, built once per switch.
// ABOUTME: Immutable for the bridge's lifetime; unknown names fail before any I/O.

use std::collections::HashMap;
use thiserror::Error;

/// An interface name was not present in the switch's port mapping.
#[derive(Debug, Clone, Error)]
#[error("unknown interface '{interface}': not present in the switch's port mapping")]
pub struct UnknownInterfaceError {
    pub interface: String,
}

/// Per-switch lookup from symbolic interface names (e.g. `s1-eth3`) to the
/// numeric port IDs used within P4 code (e.g. `3`).
///
/// Built from the descriptor's `interface_to_port` mapping at bridge creation
/// time and read-only thereafter. Config validation rejects duplicate target
/// port IDs, so the reverse lookup is exact.
#[derive(Debug, Clone, Default)]
pub struct PortMap {
    forward: HashMap<String, u32>,
    reverse: HashMap<u32, String>,
}

impl PortMap {
    pub fn new(interface_to_port: &HashMap<String, u32>) -> Self {
        let reverse = interface_to_port
            .iter()
            .map(|(name, port)| (*port, name.clone()))
            .collect();
        Self {
            forward: interface_to_port.clone(),
            reverse,
        }
    }

    /// Translates an interface name to its numeric port ID.
    pub fn resolve(&self, interface: &str) -> Result<u32, UnknownInterfaceError> {
        self.forward
            .get(interface)
            .copied()
            .ok_or_else(|| UnknownInterfaceError {
                interface: interface.to_string(),
            })
    }

    /// Translates a port ID back to its interface name.
    pub fn reverse(&self, port: u32) -> Option<&str> {
        self.reverse.get(&port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
