// ABOUTME: CliDriverSession - drives a nikss-ctl style control binary.
// ABOUTME: One subprocess per operation; stderr text mapped onto the error taxonomy.

use super::{classify_backend_message, BackendSession, BackendType, SessionError, TableError};
use crate::config::CliDriverApiConfig;
use crate::types::SwitchName;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

/// Session for kernel-bypass (eBPF) switches managed through a control
/// binary. There is no persistent connection: every operation is one
/// invocation of the configured program, addressed by pipeline ID.
///
/// The controller uses `_` instead of `.` in fully qualified names, so names
/// are rewritten before they reach the command line.
pub struct CliDriverSession {
    switch: SwitchName,
    config: CliDriverApiConfig,
    connected: AtomicBool,
}

impl CliDriverSession {
    pub fn new(switch: SwitchName, config: CliDriverApiConfig) -> Self {
        Self {
            switch,
            config,
            connected: AtomicBool::new(false),
        }
    }

    fn pipeline(&self) -> String {
        self.config.pipeline_id.to_string()
    }

    /// Runs one subcommand, failing when the program cannot be spawned or
    /// exits nonzero. Arguments travel as an argv vector, never through a
    /// shell.
    async fn run(&self, args: &[&str]) -> Result<String, TableError> {
        tracing::debug!("{}: executing: {} {}", self.switch, self.config.program, args.join(" "));
        let output = Command::new(&self.config.program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                TableError::Backend(format!("failed to run {}: {e}", self.config.program))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            tracing::debug!("{}: {} stderr: {}", self.switch, self.config.program, stderr.trim());
        }
        if !output.status.success() {
            return Err(classify_backend_message(&stderr));
        }
        Ok(stdout)
    }

    /// Number of live entries in a table, from the controller's JSON output.
    async fn entry_count(&self, table: &str) -> Result<usize, TableError> {
        let pipeline = self.pipeline();
        let out = self
            .run(&["table", "get", "pipe", pipeline.as_str(), table])
            .await?;
        let doc: serde_json::Value = serde_json::from_str(&out).map_err(|e| {
            TableError::Backend(format!("unparseable table listing for '{table}': {e}"))
        })?;
        Ok(doc[table]["entries"].as_array().map_or(0, Vec::len))
    }
}

/// Rewrites a fully qualified name into the controller's convention.
fn mangle(name: &str) -> String {
    name.replace('.', "_")
}

#[async_trait]
impl BackendSession for CliDriverSession {
    fn backend_type(&self) -> BackendType {
        BackendType::CliDriver
    }

    async fn connect(&self) -> Result<(), SessionError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        // Probe that the pipeline is actually loaded before claiming a
        // session exists.
        let pipeline = self.pipeline();
        match self.run(&["pipeline", "show", "id", pipeline.as_str()]).await {
            Ok(out) => {
                if let Ok(doc) = serde_json::from_str::<serde_json::Value>(&out) {
                    let ports = doc["pipeline"]["ports"].as_array().map_or(0, Vec::len);
                    tracing::debug!(
                        "{}: pipeline {} is live with {} ports",
                        self.switch,
                        pipeline,
                        ports
                    );
                }
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => Err(SessionError::ConnectionFailed(format!(
                "pipeline {pipeline} is not reachable: {e}"
            ))),
        }
    }

    async fn table_add(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        let pipeline = self.pipeline();
        let table = mangle(table);
        let action = mangle(action);
        let mut args = vec!["table", "add", "pipe", pipeline.as_str(), table.as_str(), "action", "name", action.as_str(), "key"];
        args.extend(keys.iter().map(String::as_str));
        if !params.is_empty() {
            args.push("data");
            args.extend(params.iter().map(String::as_str));
        }
        self.run(&args).await.map(|_| ())
    }

    async fn table_modify(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        let pipeline = self.pipeline();
        let table = mangle(table);
        let action = mangle(action);
        let mut args = vec!["table", "update", "pipe", pipeline.as_str(), table.as_str(), "action", "name", action.as_str(), "key"];
        args.extend(keys.iter().map(String::as_str));
        if !params.is_empty() {
            args.push("data");
            args.extend(params.iter().map(String::as_str));
        }
        self.run(&args).await.map(|_| ())
    }

    async fn table_delete(&self, table: &str, keys: &[String]) -> Result<(), TableError> {
        let pipeline = self.pipeline();
        let table = mangle(table);
        let mut args = vec!["table", "delete", "pipe", pipeline.as_str(), table.as_str(), "key"];
        args.extend(keys.iter().map(String::as_str));
        self.run(&args).await.map(|_| ())
    }

    async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        let pipeline = self.pipeline();
        let table = mangle(table);
        let action = mangle(action);
        let mut args = vec!["table", "default", "set", "pipe", pipeline.as_str(), table.as_str(), "action", "name", action.as_str()];
        if !params.is_empty() {
            args.push("data");
            args.extend(params.iter().map(String::as_str));
        }
        self.run(&args).await.map(|_| ())
    }

    async fn table_clear(&self, table: &str) -> Result<(), TableError> {
        // The controller's clear does not always remove every entry, so
        // delete repeatedly until the table reports empty or stops shrinking.
        let pipeline = self.pipeline();
        let table = mangle(table);
        let mut last_count: Option<usize> = None;
        loop {
            let count = self.entry_count(&table).await?;
            if count == 0 {
                return Ok(());
            }
            if last_count == Some(count) {
                return Err(TableError::Backend(format!(
                    "entry count of '{table}' did not decrease after a delete"
                )));
            }
            last_count = Some(count);
            self.run(&["table", "delete", "pipe", pipeline.as_str(), table.as_str()])
                .await?;
        }
    }

    async fn register_set(
        &self,
        register: &str,
        index: u32,
        value: &str,
    ) -> Result<(), TableError> {
        let pipeline = self.pipeline();
        let register = mangle(register);
        let index = index.to_string();
        self.run(&[
            "register",
            "set",
            "pipe",
            pipeline.as_str(),
            register.as_str(),
            "index",
            index.as_str(),
            "value",
            value,
        ])
        .await
        .map(|_| ())
    }

    async fn reset_state(&self) -> Result<(), TableError> {
        // The controller has no single reset primitive.
        tracing::warn!("{}: reset_state is a no-op for the CLI driver", self.switch);
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        // No persistent handle to release.
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}
