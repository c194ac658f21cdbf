// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup plus a recording in-memory backend session.

use async_trait::async_trait;
use p4bridge::{
    ApiBridge, BackendSession, BackendType, PortMap, SessionError, SwitchName, TableError, TableOp,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("p4bridge=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Everything a mock session was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum MockCall {
    Connect,
    Op(TableOp),
    RegisterSet {
        register: String,
        index: u32,
        value: String,
    },
    ResetState,
    BeginBatch,
    CommitBatch(Vec<TableOp>),
    DiscardBatch,
    Close,
}

pub type CallLog = Arc<Mutex<Vec<MockCall>>>;

#[allow(dead_code)]
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// In-memory backend session recording every call into a shared log.
pub struct MockSession {
    calls: CallLog,
    supports_batch: bool,
    connect_failures: AtomicUsize,
    fail_close: bool,
    fail_commit: bool,
    reject_table: Option<String>,
}

#[allow(dead_code)]
impl MockSession {
    pub fn new(calls: CallLog) -> Self {
        Self {
            calls,
            supports_batch: false,
            connect_failures: AtomicUsize::new(0),
            fail_close: false,
            fail_commit: false,
            reject_table: None,
        }
    }

    /// A session claiming the atomic batch primitive.
    pub fn batching(calls: CallLog) -> Self {
        Self {
            supports_batch: true,
            ..Self::new(calls)
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.connect_failures = AtomicUsize::new(usize::MAX);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Every operation on `table` reports a duplicate entry.
    pub fn rejecting(mut self, table: &str) -> Self {
        self.reject_table = Some(table.to_string());
        self
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn table_result(&self, table: &str) -> Result<(), TableError> {
        match &self.reject_table {
            Some(rejected) if rejected == table => Err(TableError::DuplicateEntry(format!(
                "entry exists in {table}"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BackendSession for MockSession {
    fn backend_type(&self) -> BackendType {
        if self.supports_batch {
            BackendType::Thrift
        } else {
            BackendType::CliDriver
        }
    }

    fn supports_batch(&self) -> bool {
        self.supports_batch
    }

    async fn connect(&self) -> Result<(), SessionError> {
        self.record(MockCall::Connect);
        if self.connect_failures.load(Ordering::SeqCst) > 0 {
            self.connect_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SessionError::ConnectionFailed(
                "mock refused the connection".to_string(),
            ));
        }
        Ok(())
    }

    async fn table_add(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.record(MockCall::Op(TableOp::Add {
            table: table.to_string(),
            keys: keys.to_vec(),
            action: action.to_string(),
            params: params.to_vec(),
        }));
        self.table_result(table)
    }

    async fn table_modify(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.record(MockCall::Op(TableOp::Modify {
            table: table.to_string(),
            keys: keys.to_vec(),
            action: action.to_string(),
            params: params.to_vec(),
        }));
        self.table_result(table)
    }

    async fn table_delete(&self, table: &str, keys: &[String]) -> Result<(), TableError> {
        self.record(MockCall::Op(TableOp::Delete {
            table: table.to_string(),
            keys: keys.to_vec(),
        }));
        self.table_result(table)
    }

    async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.record(MockCall::Op(TableOp::SetDefault {
            table: table.to_string(),
            action: action.to_string(),
            params: params.to_vec(),
        }));
        self.table_result(table)
    }

    async fn table_clear(&self, table: &str) -> Result<(), TableError> {
        self.record(MockCall::Op(TableOp::Clear {
            table: table.to_string(),
        }));
        self.table_result(table)
    }

    async fn register_set(
        &self,
        register: &str,
        index: u32,
        value: &str,
    ) -> Result<(), TableError> {
        self.record(MockCall::RegisterSet {
            register: register.to_string(),
            index,
            value: value.to_string(),
        });
        self.table_result(register)
    }

    async fn reset_state(&self) -> Result<(), TableError> {
        self.record(MockCall::ResetState);
        Ok(())
    }

    async fn begin_batch(&self) -> Result<(), TableError> {
        self.record(MockCall::BeginBatch);
        Ok(())
    }

    async fn commit_batch(&self, ops: &[TableOp]) -> Result<(), TableError> {
        self.record(MockCall::CommitBatch(ops.to_vec()));
        if self.fail_commit {
            return Err(TableError::Backend("mock commit exploded".to_string()));
        }
        Ok(())
    }

    async fn discard_batch(&self) -> Result<(), TableError> {
        self.record(MockCall::DiscardBatch);
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.record(MockCall::Close);
        if self.fail_close {
            return Err(SessionError::ConnectionFailed(
                "mock close exploded".to_string(),
            ));
        }
        Ok(())
    }
}

#[allow(dead_code)]
pub fn switch_name(name: &str) -> SwitchName {
    SwitchName::new(name).unwrap()
}

#[allow(dead_code)]
pub fn port_map(entries: &[(&str, u32)]) -> PortMap {
    let mapping: HashMap<String, u32> = entries
        .iter()
        .map(|(name, port)| (name.to_string(), *port))
        .collect();
    PortMap::new(&mapping)
}

/// A bridge over a mock session, skipping the factory.
#[allow(dead_code)]
pub fn bridge_over(session: MockSession, entries: &[(&str, u32)]) -> ApiBridge {
    ApiBridge::new(switch_name("s1"), Box::new(session), port_map(entries))
}

/// Only the table operations, in submission order.
#[allow(dead_code)]
pub fn recorded_ops(calls: &CallLog) -> Vec<TableOp> {
    calls
        .lock()
        .iter()
        .filter_map(|call| match call {
            MockCall::Op(op) => Some(op.clone()),
            _ => None,
        })
        .collect()
}
