// ABOUTME: ApiBridge - the unified facade callers use to operate one switch.
// ABOUTME: Resolves names/ports, then delegates to exactly one backend session.

use crate::backend::{BackendSession, BackendType, TableOp};
use crate::error::{BridgeError, Result};
use crate::ports::PortMap;
use crate::types::{SwitchName, Value};
use parking_lot::Mutex;

/// The single entry point for controlling one switch, independent of which
/// backend session sits underneath.
///
/// Table and action names must be fully qualified (e.g. `MyIngress.my_table`).
/// [`Value::Interface`] arguments are resolved to numeric port IDs through the
/// switch's port mapping before anything is queued or sent; resolution
/// failures abort the operation with zero backend calls.
pub struct ApiBridge {
    name: SwitchName,
    ports: PortMap,
    session: Box<dyn BackendSession>,
    batch: Mutex<BatchState>,
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queue: Vec<TableOp>,
}

impl ApiBridge {
    pub fn new(name: SwitchName, session: Box<dyn BackendSession>, ports: PortMap) -> Self {
        tracing::debug!("{}: using {} backend", name, session.backend_type());
        Self {
            name,
            ports,
            session,
            batch: Mutex::new(BatchState::default()),
        }
    }

    pub fn name(&self) -> &SwitchName {
        &self.name
    }

    pub fn backend_type(&self) -> BackendType {
        self.session.backend_type()
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    /// Whether operations inside a batch scope are committed atomically.
    pub fn supports_batch(&self) -> bool {
        self.session.supports_batch()
    }

    fn qualified<'a>(&self, name: &'a str) -> Result<&'a str> {
        if name.contains('.') {
            Ok(name)
        } else {
            Err(BridgeError::UnqualifiedName {
                name: name.to_string(),
            })
        }
    }

    /// Renders one caller value into backend form, resolving interfaces.
    fn resolve_one(&self, value: &Value) -> Result<String> {
        match value {
            Value::Literal(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Interface(name) => {
                let port = self.ports.resolve(name)?;
                Ok(port.to_string())
            }
        }
    }

    fn resolve(&self, values: &[Value]) -> Result<Vec<String>> {
        values.iter().map(|value| self.resolve_one(value)).collect()
    }

    fn table_err(&self, source: crate::backend::TableError) -> BridgeError {
        BridgeError::Table {
            switch: self.name.to_string(),
            source,
        }
    }

    fn session_err(&self, source: crate::backend::SessionError) -> BridgeError {
        BridgeError::Session {
            switch: self.name.to_string(),
            source,
        }
    }

    /// Queues the operation when an atomic batch is open, otherwise executes
    /// it immediately.
    async fn submit(&self, op: TableOp) -> Result<()> {
        {
            let mut batch = self.batch.lock();
            if self.session.supports_batch() && batch.depth > 0 {
                tracing::debug!("{}: queueing {:?}", self.name, op);
                batch.queue.push(op);
                return Ok(());
            }
        }
        self.execute(op).await
    }

    async fn execute(&self, op: TableOp) -> Result<()> {
        let result = match &op {
            TableOp::Add {
                table,
                keys,
                action,
                params,
            } => self.session.table_add(table, keys, action, params).await,
            TableOp::Modify {
                table,
                keys,
                action,
                params,
            } => self.session.table_modify(table, keys, action, params).await,
            TableOp::Delete { table, keys } => self.session.table_delete(table, keys).await,
            TableOp::SetDefault {
                table,
                action,
                params,
            } => self.session.table_set_default(table, action, params).await,
            TableOp::Clear { table } => self.session.table_clear(table).await,
        };
        result.map_err(|e| self.table_err(e))
    }

    /// Adds a new table entry.
    pub async fn table_add(
        &self,
        table: &str,
        keys: &[Value],
        action: &str,
        params: &[Value],
    ) -> Result<()> {
        let table = self.qualified(table)?;
        let action = self.qualified(action)?;
        let keys = self.resolve(keys)?;
        let params = self.resolve(params)?;
        tracing::debug!(
            "{}: adding table entry: {} {:?} -> {} {:?}",
            self.name,
            table,
            keys,
            action,
            params
        );
        self.submit(TableOp::Add {
            table: table.to_string(),
            keys,
            action: action.to_string(),
            params,
        })
        .await
    }

    /// Modifies an existing table entry.
    pub async fn table_modify(
        &self,
        table: &str,
        keys: &[Value],
        action: &str,
        params: &[Value],
    ) -> Result<()> {
        let table = self.qualified(table)?;
        let action = self.qualified(action)?;
        let keys = self.resolve(keys)?;
        let params = self.resolve(params)?;
        tracing::debug!(
            "{}: modifying table entry: {} {:?} -> {} {:?}",
            self.name,
            table,
            keys,
            action,
            params
        );
        self.submit(TableOp::Modify {
            table: table.to_string(),
            keys,
            action: action.to_string(),
            params,
        })
        .await
    }

    /// Deletes one entry from a table.
    pub async fn table_delete(&self, table: &str, keys: &[Value]) -> Result<()> {
        let table = self.qualified(table)?;
        let keys = self.resolve(keys)?;
        tracing::debug!("{}: deleting table entry: {} {:?}", self.name, table, keys);
        self.submit(TableOp::Delete {
            table: table.to_string(),
            keys,
        })
        .await
    }

    /// Sets the table's default action.
    pub async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[Value],
    ) -> Result<()> {
        let table = self.qualified(table)?;
        let action = self.qualified(action)?;
        let params = self.resolve(params)?;
        tracing::debug!(
            "{}: setting default action: {} -> {} {:?}",
            self.name,
            table,
            action,
            params
        );
        self.submit(TableOp::SetDefault {
            table: table.to_string(),
            action: action.to_string(),
            params,
        })
        .await
    }

    /// Removes every entry from a table except the default action.
    pub async fn table_clear(&self, table: &str) -> Result<()> {
        let table = self.qualified(table)?;
        tracing::debug!("{}: clearing table: {}", self.name, table);
        self.submit(TableOp::Clear {
            table: table.to_string(),
        })
        .await
    }

    /// Writes one cell of a register array. The register name must be fully
    /// qualified; the value rides the same resolution path as table
    /// arguments, so an interface-typed value becomes its port ID. Executed
    /// immediately, never queued into a batch.
    pub async fn register_set(&self, register: &str, index: u32, value: Value) -> Result<()> {
        let register = self.qualified(register)?;
        let value = self.resolve_one(&value)?;
        tracing::debug!(
            "{}: setting register {}[{}] = {}",
            self.name,
            register,
            index,
            value
        );
        self.session
            .register_set(register, index, &value)
            .await
            .map_err(|e| self.table_err(e))
    }

    /// Clears tables, registers, and counters. Never batched.
    pub async fn reset_state(&self) -> Result<()> {
        tracing::debug!("{}: resetting state", self.name);
        self.session
            .reset_state()
            .await
            .map_err(|e| self.table_err(e))
    }

    /// Opens a batch scope.
    ///
    /// On a batching backend, operations issued while the guard lives are
    /// queued and sent as one atomic unit by [`BatchGuard::commit`]; dropping
    /// the guard (the error path) discards them unsent. On a backend without
    /// an atomic primitive, operations keep executing eagerly in submission
    /// order and the guard is inert - an error partway leaves earlier
    /// operations applied, which is the honest best-effort contract.
    ///
    /// Nested scopes join the outermost batch; only its commit flushes.
    /// Abandoning a nested scope drops the operations that scope queued and
    /// nothing else, so the outer scope stays intact and can still commit.
    pub async fn try_create_batch(&self) -> Result<BatchGuard<'_>> {
        if !self.session.supports_batch() {
            tracing::debug!(
                "{}: backend has no atomic batch primitive; operations run eagerly",
                self.name
            );
            return Ok(BatchGuard {
                bridge: self,
                active: false,
                finished: false,
                mark: 0,
            });
        }

        let (outermost, mark) = {
            let mut batch = self.batch.lock();
            batch.depth += 1;
            (batch.depth == 1, batch.queue.len())
        };
        if outermost {
            tracing::debug!("{}: starting batch", self.name);
            if let Err(e) = self.session.begin_batch().await {
                self.batch.lock().depth -= 1;
                return Err(self.table_err(e));
            }
        }
        Ok(BatchGuard {
            bridge: self,
            active: true,
            finished: false,
            mark,
        })
    }

    /// Releases the backend session. Idempotent; normally invoked through the
    /// factory rather than directly.
    pub async fn close(&self) -> Result<()> {
        tracing::debug!("{}: closing bridge", self.name);
        self.session.close().await.map_err(|e| self.session_err(e))
    }

    pub(crate) async fn close_session(&self) -> std::result::Result<(), crate::backend::SessionError> {
        self.session.close().await
    }
}

impl std::fmt::Debug for ApiBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBridge")
            .field("name", &self.name)
            .field("backend", &self.session.backend_type())
            .finish()
    }
}

/// A live batch scope. Commit to flush, drop to discard.
#[must_use = "a batch guard that is dropped without commit discards its operations"]
pub struct BatchGuard<'a> {
    bridge: &'a ApiBridge,
    active: bool,
    finished: bool,
    /// Queue length when this scope opened. Discarding rolls back to here,
    /// so a nested scope can only drop its own operations.
    mark: usize,
}

impl BatchGuard<'_> {
    /// Commits the batch. For the outermost scope on a batching backend this
    /// submits every queued operation as one atomic unit; for nested scopes
    /// and non-batching backends it is a no-op.
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        if !self.active {
            return Ok(());
        }

        let flush = {
            let mut batch = self.bridge.batch.lock();
            batch.depth -= 1;
            if batch.depth == 0 {
                Some(std::mem::take(&mut batch.queue))
            } else {
                None
            }
        };
        match flush {
            None => Ok(()),
            Some(ops) if ops.is_empty() => Ok(()),
            Some(ops) => {
                tracing::debug!(
                    "{}: committing batch of {} operation(s)",
                    self.bridge.name,
                    ops.len()
                );
                self.bridge
                    .session
                    .commit_batch(&ops)
                    .await
                    .map_err(|e| self.bridge.table_err(e))
            }
        }
    }

    /// Explicitly discards this scope, dropping the operations it queued
    /// unsent. For the outermost scope that is the whole batch, and the
    /// backend is notified; a nested discard leaves the outer scope's
    /// operations in place.
    pub async fn discard(mut self) -> Result<()> {
        self.finished = true;
        if !self.active {
            return Ok(());
        }

        let outermost = {
            let mut batch = self.bridge.batch.lock();
            batch.depth -= 1;
            let dropped = batch.queue.len().saturating_sub(self.mark);
            batch.queue.truncate(self.mark);
            if dropped > 0 {
                tracing::debug!(
                    "{}: discarding {} queued operation(s)",
                    self.bridge.name,
                    dropped
                );
            }
            batch.depth == 0
        };
        if outermost {
            self.bridge
                .session
                .discard_batch()
                .await
                .map_err(|e| self.bridge.table_err(e))?;
        }
        Ok(())
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.finished || !self.active {
            return;
        }
        // The error path: the scope was abandoned, so the operations it
        // queued must never reach the backend. Rolling back to the mark keeps
        // an enclosing scope's operations alive. Drop cannot await, but the
        // queue is local.
        let mut batch = self.bridge.batch.lock();
        batch.depth -= 1;
        let dropped = batch.queue.len().saturating_sub(self.mark);
        batch.queue.truncate(self.mark);
        if dropped > 0 {
            tracing::debug!(
                "{}: discarding {} queued operation(s)",
                self.bridge.name,
                dropped
            );
        }
    }
}
