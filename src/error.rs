// ABOUTME: Unified bridge error with SNAFU pattern.
// ABOUTME: Wraps config, port, session, and table errors for programmatic handling.

use snafu::Snafu;

use crate::backend::{SessionError, TableError};
use crate::config::ConfigError;
use crate::ports::UnknownInterfaceError;

/// Unified error for every bridge and factory operation.
///
/// Leaf errors keep their own types; this enum preserves them as sources so
/// callers can either match on [`BridgeError::kind`] or walk the chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BridgeError {
    #[snafu(display("invalid switch configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("{source}"))]
    UnknownInterface { source: UnknownInterfaceError },

    #[snafu(display("name '{name}' must be fully qualified (e.g. MyIngress.my_table)"))]
    UnqualifiedName { name: String },

    #[snafu(display("session failure on switch '{switch}': {source}"))]
    Session { switch: String, source: SessionError },

    #[snafu(display("switch '{switch}' rejected operation: {source}"))]
    Table { switch: String, source: TableError },

    #[snafu(display("failed to close {} of {attempted} cached bridges", failures.len()))]
    CloseAll {
        attempted: usize,
        failures: Vec<(String, SessionError)>,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeErrorKind {
    /// Bad or incomplete configuration, caught before any network activity.
    Configuration,
    /// An interface name missed the port mapping; nothing was sent.
    UnknownInterface,
    /// Session establishment or teardown failed.
    Connection,
    /// The backend reported a missing table or entry.
    NotFound,
    /// The backend rejected a duplicate entry key.
    DuplicateEntry,
    /// The backend (or the name policy) rejected the operation's shape.
    Validation,
    /// Generic transport or protocol failure.
    Backend,
    /// One or more failures while closing all cached bridges.
    AggregateClose,
}

impl BridgeError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> BridgeErrorKind {
        match self {
            BridgeError::Config { .. } => BridgeErrorKind::Configuration,
            BridgeError::UnknownInterface { .. } => BridgeErrorKind::UnknownInterface,
            BridgeError::UnqualifiedName { .. } => BridgeErrorKind::Validation,
            BridgeError::Session { .. } => BridgeErrorKind::Connection,
            BridgeError::Table { source, .. } => match source {
                TableError::NotFound(_) => BridgeErrorKind::NotFound,
                TableError::DuplicateEntry(_) => BridgeErrorKind::DuplicateEntry,
                TableError::Validation(_) => BridgeErrorKind::Validation,
                TableError::Backend(_) => BridgeErrorKind::Backend,
            },
            BridgeError::CloseAll { .. } => BridgeErrorKind::AggregateClose,
        }
    }

    /// Per-bridge failures if this is a `close_all` aggregate.
    pub fn close_failures(&self) -> Option<&[(String, SessionError)]> {
        match self {
            BridgeError::CloseAll { failures, .. } => Some(failures),
            _ => None,
        }
    }
}

impl From<ConfigError> for BridgeError {
    fn from(source: ConfigError) -> Self {
        BridgeError::Config { source }
    }
}

impl From<UnknownInterfaceError> for BridgeError {
    fn from(source: UnknownInterfaceError) -> Self {
        BridgeError::UnknownInterface { source }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
