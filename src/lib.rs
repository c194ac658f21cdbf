// ABOUTME: Library root for p4bridge - a unified control-plane facade for P4 switches.
// ABOUTME: One bridge API over Thrift-RPC, CLI-driver, and native-runtime backends.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod factory;
pub mod ports;
pub mod types;

pub use backend::{BackendSession, BackendType, SessionError, TableError, TableOp};
pub use bridge::{ApiBridge, BatchGuard};
pub use config::{Inventory, SwitchApiConfig, SwitchDescriptor};
pub use error::{BridgeError, BridgeErrorKind, Result};
pub use factory::BridgeFactory;
pub use ports::{PortMap, UnknownInterfaceError};
pub use types::{SwitchName, Value};
