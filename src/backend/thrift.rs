// ABOUTME: ThriftSession - framed TCP session to the switch's RPC agent.
// ABOUTME: Length-prefixed JSON commands with OK/ERR replies; atomic batches.

use super::{BackendSession, BackendType, SessionError, TableError, TableOp};
use crate::config::ThriftApiConfig;
use crate::types::SwitchName;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde_json::json;
use std::io::ErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Session over the Thrift-style RPC agent that SimpleSwitch-class targets
/// expose on `thrift_port`.
///
/// Wire format, both directions: a 4-byte big-endian length followed by a
/// UTF-8 payload. The client sends a JSON hello on connect, then one JSON
/// command document per request; the agent replies `OK` or
/// `ERR <CLASS>: message`. A whole batch travels as a single `batch`
/// document, which is the agent's atomic multi-op primitive.
pub struct ThriftSession {
    switch: SwitchName,
    config: ThriftApiConfig,
    stream: Mutex<Option<TcpStream>>,
}

impl ThriftSession {
    pub fn new(switch: SwitchName, config: ThriftApiConfig) -> Self {
        Self {
            switch,
            config,
            stream: Mutex::new(None),
        }
    }

    async fn send_frame(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(frame_len(payload.len())?);
        buf.put_slice(payload);
        stream.write_all(&buf).await
    }

    /// Reads one frame; `None` means the agent closed the connection.
    async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
        let mut len = [0u8; 4];
        match stream.read_exact(&mut len).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
        match stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        String::from_utf8(payload)
            .map(Some)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
    }

    async fn request(&self, command: &serde_json::Value) -> Result<(), TableError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TableError::Backend("session is not connected".to_string()))?;

        let payload = command.to_string();
        tracing::debug!("{}: sending command: {}", self.switch, payload);
        Self::send_frame(stream, payload.as_bytes())
            .await
            .map_err(|e| TableError::Backend(format!("failed to send command: {e}")))?;

        let reply = Self::read_frame(stream)
            .await
            .map_err(|e| TableError::Backend(format!("failed to read reply: {e}")))?;
        match reply {
            None => Err(TableError::Backend(
                "connection closed by the switch agent".to_string(),
            )),
            Some(reply) => classify_reply(&reply),
        }
    }
}

/// A payload must fit the 4-byte length prefix; anything larger cannot be
/// framed at all.
fn frame_len(len: usize) -> std::io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("payload of {len} bytes exceeds the frame length prefix"),
        )
    })
}

/// Maps an agent reply onto the table error taxonomy.
fn classify_reply(reply: &str) -> Result<(), TableError> {
    if reply == "OK" {
        return Ok(());
    }
    let Some(rest) = reply.strip_prefix("ERR ") else {
        return Err(TableError::Backend(format!("unexpected reply: {reply}")));
    };
    let (class, message) = match rest.split_once(": ") {
        Some((class, message)) => (class, message.to_string()),
        None => (rest, rest.to_string()),
    };
    Err(match class {
        "NOT_FOUND" => TableError::NotFound(message),
        "DUPLICATE" => TableError::DuplicateEntry(message),
        "INVALID" => TableError::Validation(message),
        _ => TableError::Backend(message),
    })
}

/// Renders one operation as the agent's command document.
fn command_doc(op: &TableOp) -> serde_json::Value {
    match op {
        TableOp::Add {
            table,
            keys,
            action,
            params,
        } => json!({
            "op": "table_add",
            "table": table,
            "keys": keys,
            "action": action,
            "params": params,
        }),
        TableOp::Modify {
            table,
            keys,
            action,
            params,
        } => json!({
            "op": "table_modify",
            "table": table,
            "keys": keys,
            "action": action,
            "params": params,
        }),
        TableOp::Delete { table, keys } => json!({
            "op": "table_delete",
            "table": table,
            "keys": keys,
        }),
        TableOp::SetDefault {
            table,
            action,
            params,
        } => json!({
            "op": "table_set_default",
            "table": table,
            "action": action,
            "params": params,
        }),
        TableOp::Clear { table } => json!({
            "op": "table_clear",
            "table": table,
        }),
    }
}

#[async_trait]
impl BackendSession for ThriftSession {
    fn backend_type(&self) -> BackendType {
        BackendType::Thrift
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<(), SessionError> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.host, self.config.thrift_port);
        tracing::debug!("{}: connecting to RPC agent at {}", self.switch, addr);
        let mut stream =
            tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| SessionError::Timeout(self.config.connect_timeout))?
                .map_err(|e| SessionError::ConnectionFailed(format!("{addr}: {e}")))?;

        let hello = json!({
            "switch": self.switch.as_str(),
            "acknowledgments": true,
        });
        Self::send_frame(&mut stream, hello.to_string().as_bytes()).await?;

        *guard = Some(stream);
        Ok(())
    }

    async fn table_add(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.request(&command_doc(&TableOp::Add {
            table: table.to_string(),
            keys: keys.to_vec(),
            action: action.to_string(),
            params: params.to_vec(),
        }))
        .await
    }

    async fn table_modify(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.request(&command_doc(&TableOp::Modify {
            table: table.to_string(),
            keys: keys.to_vec(),
            action: action.to_string(),
            params: params.to_vec(),
        }))
        .await
    }

    async fn table_delete(&self, table: &str, keys: &[String]) -> Result<(), TableError> {
        self.request(&command_doc(&TableOp::Delete {
            table: table.to_string(),
            keys: keys.to_vec(),
        }))
        .await
    }

    async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.request(&command_doc(&TableOp::SetDefault {
            table: table.to_string(),
            action: action.to_string(),
            params: params.to_vec(),
        }))
        .await
    }

    async fn table_clear(&self, table: &str) -> Result<(), TableError> {
        self.request(&command_doc(&TableOp::Clear {
            table: table.to_string(),
        }))
        .await
    }

    async fn register_set(
        &self,
        register: &str,
        index: u32,
        value: &str,
    ) -> Result<(), TableError> {
        self.request(&json!({
            "op": "register_set",
            "register": register,
            "index": index,
            "value": value,
        }))
        .await
    }

    async fn reset_state(&self) -> Result<(), TableError> {
        self.request(&json!({ "op": "reset_state" })).await
    }

    async fn commit_batch(&self, ops: &[TableOp]) -> Result<(), TableError> {
        let docs: Vec<serde_json::Value> = ops.iter().map(command_doc).collect();
        self.request(&json!({ "op": "batch", "ops": docs })).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            tracing::debug!("{}: closing RPC agent connection", self.switch);
            // The agent treats EOF as a clean goodbye; a failed shutdown on
            // an already-dead socket is not worth surfacing.
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}
