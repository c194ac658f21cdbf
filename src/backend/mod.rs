// ABOUTME: The backend session contract every switch API family implements.
// ABOUTME: Defines BackendType, TableOp, session/table errors, and dispatch.

mod cli;
mod native;
mod thrift;

pub use cli::CliDriverSession;
pub use native::NativeRuntimeSession;
pub use thrift::ThriftSession;

use crate::config::SwitchApiConfig;
use crate::types::SwitchName;
use async_trait::async_trait;

/// The switch control-plane API family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Thrift,
    CliDriver,
    NativeRuntime,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Thrift => write!(f, "thrift"),
            BackendType::CliDriver => write!(f, "cli-driver"),
            BackendType::NativeRuntime => write!(f, "native-runtime"),
        }
    }
}

/// One fully resolved table operation.
///
/// Names are fully qualified and every value has already been rendered to the
/// string form the backend expects, with interface names replaced by numeric
/// port IDs. This is the unit queued inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOp {
    Add {
        table: String,
        keys: Vec<String>,
        action: String,
        params: Vec<String>,
    },
    Modify {
        table: String,
        keys: Vec<String>,
        action: String,
        params: Vec<String>,
    },
    Delete {
        table: String,
        keys: Vec<String>,
    },
    SetDefault {
        table: String,
        action: String,
        params: Vec<String>,
    },
    Clear {
        table: String,
    },
}

impl TableOp {
    pub fn table(&self) -> &str {
        match self {
            TableOp::Add { table, .. }
            | TableOp::Modify { table, .. }
            | TableOp::Delete { table, .. }
            | TableOp::SetDefault { table, .. }
            | TableOp::Clear { table } => table,
        }
    }
}

/// Errors establishing or releasing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("session is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from table operations, as reported by the backend.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("invalid operation: {0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// One live control-plane session to one switch.
///
/// Implementations own the physical connection or process handle and
/// translate the abstract operations into backend-specific calls. Every
/// value reaching this layer is already resolved: port-typed arguments are
/// numeric, names are fully qualified.
#[async_trait]
pub trait BackendSession: Send + Sync {
    fn backend_type(&self) -> BackendType;

    /// Whether this backend can execute multiple operations as one atomic
    /// unit. When false, the bridge executes operations eagerly instead.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Establishes the session. Idempotent when already connected.
    async fn connect(&self) -> Result<(), SessionError>;

    async fn table_add(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError>;

    async fn table_modify(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError>;

    async fn table_delete(&self, table: &str, keys: &[String]) -> Result<(), TableError>;

    async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[String],
    ) -> Result<(), TableError>;

    /// Removes every entry from the table except the default action.
    async fn table_clear(&self, table: &str) -> Result<(), TableError>;

    /// Writes one cell of a register array.
    async fn register_set(&self, register: &str, index: u32, value: &str)
    -> Result<(), TableError>;

    /// Clears tables, registers, and counters in one sweep.
    async fn reset_state(&self) -> Result<(), TableError>;

    /// Called when a batch scope opens. Only invoked when
    /// [`BackendSession::supports_batch`] is true.
    async fn begin_batch(&self) -> Result<(), TableError> {
        Ok(())
    }

    /// Submits all queued operations as one atomic unit.
    async fn commit_batch(&self, ops: &[TableOp]) -> Result<(), TableError> {
        let _ = ops;
        Err(TableError::Backend(
            "backend does not support atomic batches".to_string(),
        ))
    }

    /// Called when a batch scope is abandoned without committing.
    async fn discard_batch(&self) -> Result<(), TableError> {
        Ok(())
    }

    /// Releases the connection or process handle. Idempotent.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Maps freeform backend diagnostics (CLI stderr, shell status lines) onto
/// the table error taxonomy.
pub(crate) fn classify_backend_message(message: &str) -> TableError {
    let message = message.trim().to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("not found")
        || lowered.contains("does not exist")
        || lowered.contains("no such")
    {
        TableError::NotFound(message)
    } else if lowered.contains("already exists") || lowered.contains("entry exists") {
        TableError::DuplicateEntry(message)
    } else if lowered.contains("invalid") || lowered.contains("wrong") {
        TableError::Validation(message)
    } else {
        TableError::Backend(message)
    }
}

/// Constructs the session implementation matching the config's variant tag.
/// The session is returned unconnected; the factory connects it.
pub(crate) fn open_session(
    switch: &SwitchName,
    config: &SwitchApiConfig,
) -> Box<dyn BackendSession> {
    match config {
        SwitchApiConfig::Thrift(c) => Box::new(ThriftSession::new(switch.clone(), c.clone())),
        SwitchApiConfig::CliDriver(c) => {
            Box::new(CliDriverSession::new(switch.clone(), c.clone()))
        }
        SwitchApiConfig::NativeRuntime(c) => {
            Box::new(NativeRuntimeSession::new(switch.clone(), c.clone()))
        }
    }
}
