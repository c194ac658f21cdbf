// ABOUTME: NativeRuntimeSession - drives the vendor's runtime shell child process.
// ABOUTME: Newline-framed shell one-liners on stdin, per-command status lines back.

use super::{classify_backend_message, BackendSession, BackendType, SessionError, TableError};
use crate::config::NativeRuntimeApiConfig;
use crate::types::SwitchName;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Session for switches whose native runtime is only reachable through the
/// vendor's interactive shell. The shell runs a small relay server script and
/// stays alive for the whole session; commands are `p4.<table>...` one-liners
/// written to its stdin.
///
/// With acknowledgments enabled the shell prints one status line per command
/// (`OK` or an error message), which keeps the control plane from racing
/// ahead of the switch. Without them commands stream blind: faster, but a
/// failed command is invisible until something downstream notices.
pub struct NativeRuntimeSession {
    switch: SwitchName,
    config: NativeRuntimeApiConfig,
    shell: Mutex<Option<ShellHandle>>,
}

struct ShellHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl NativeRuntimeSession {
    pub fn new(switch: SwitchName, config: NativeRuntimeApiConfig) -> Self {
        Self {
            switch,
            config,
            shell: Mutex::new(None),
        }
    }

    async fn forward(&self, command: String) -> Result<(), TableError> {
        let mut guard = self.shell.lock().await;
        let shell = guard
            .as_mut()
            .ok_or_else(|| TableError::Backend("session is not connected".to_string()))?;

        tracing::debug!("{}: forwarding: {}", self.switch, command);
        shell
            .stdin
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| TableError::Backend(format!("failed to write to shell: {e}")))?;
        shell
            .stdin
            .flush()
            .await
            .map_err(|e| TableError::Backend(format!("failed to flush shell pipe: {e}")))?;

        if !self.config.acknowledgments {
            return Ok(());
        }

        let status = shell
            .stdout
            .next_line()
            .await
            .map_err(|e| TableError::Backend(format!("failed to read shell status: {e}")))?;
        match status {
            None => Err(TableError::Backend(
                "runtime shell exited unexpectedly".to_string(),
            )),
            Some(line) if line.trim() == "OK" => Ok(()),
            Some(line) => Err(classify_backend_message(&line)),
        }
    }
}

/// The shell addresses actions by their unqualified name.
fn short_action(action: &str) -> &str {
    action.rsplit('.').next().unwrap_or(action)
}

/// Renders values into the shell's argument list. Range match keys
/// (`lo..hi`) become two separate arguments, as the shell expects.
fn render_args(values: &[String]) -> String {
    let mut rendered = Vec::with_capacity(values.len());
    for value in values {
        match value.split_once("..") {
            Some((lo, hi))
                if !lo.is_empty()
                    && !hi.is_empty()
                    && lo.bytes().all(|b| b.is_ascii_digit())
                    && hi.bytes().all(|b| b.is_ascii_digit()) =>
            {
                rendered.push(format!("\"{lo}\""));
                rendered.push(format!("\"{hi}\""));
            }
            _ => rendered.push(format!("\"{value}\"")),
        }
    }
    rendered.join(", ")
}

#[async_trait]
impl BackendSession for NativeRuntimeSession {
    fn backend_type(&self) -> BackendType {
        BackendType::NativeRuntime
    }

    async fn connect(&self) -> Result<(), SessionError> {
        let mut guard = self.shell.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        tracing::debug!(
            "{}: starting runtime shell '{}' for program '{}' on device {}",
            self.switch,
            self.config.program,
            self.config.pipeline_name,
            self.config.device_id
        );
        let mut child = Command::new(&self.config.program)
            .arg("--program")
            .arg(&self.config.pipeline_name)
            .arg("--device-id")
            .arg(self.config.device_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SessionError::ConnectionFailed(format!(
                    "failed to start runtime shell '{}': {e}",
                    self.config.program
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SessionError::ConnectionFailed("runtime shell stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SessionError::ConnectionFailed("runtime shell stdout unavailable".to_string())
        })?;

        *guard = Some(ShellHandle {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });
        Ok(())
    }

    async fn table_add(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        let mut args: Vec<String> = keys.to_vec();
        args.extend_from_slice(params);
        self.forward(format!(
            "p4.{table}.add_with_{}({})",
            short_action(action),
            render_args(&args)
        ))
        .await
    }

    async fn table_modify(
        &self,
        table: &str,
        keys: &[String],
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        let mut args: Vec<String> = keys.to_vec();
        args.extend_from_slice(params);
        self.forward(format!(
            "p4.{table}.mod_with_{}({})",
            short_action(action),
            render_args(&args)
        ))
        .await
    }

    async fn table_delete(&self, table: &str, keys: &[String]) -> Result<(), TableError> {
        self.forward(format!("p4.{table}.delete({})", render_args(keys)))
            .await
    }

    async fn table_set_default(
        &self,
        table: &str,
        action: &str,
        params: &[String],
    ) -> Result<(), TableError> {
        self.forward(format!(
            "p4.{table}.set_default_with_{}({})",
            short_action(action),
            render_args(params)
        ))
        .await
    }

    async fn table_clear(&self, table: &str) -> Result<(), TableError> {
        self.forward(format!("p4.{table}.clear()")).await
    }

    async fn register_set(
        &self,
        register: &str,
        index: u32,
        value: &str,
    ) -> Result<(), TableError> {
        self.forward(format!("p4.{register}.mod({index}, {value})"))
            .await?;
        // The write lands in software state only; a sync pushes it to the
        // hardware copy.
        self.forward(format!("p4.{register}.operation_register_sync()"))
            .await
    }

    async fn reset_state(&self) -> Result<(), TableError> {
        // The shell offers no whole-pipeline reset entry point.
        tracing::warn!(
            "{}: reset_state is a no-op for the native runtime shell",
            self.switch
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut guard = self.shell.lock().await;
        if let Some(mut shell) = guard.take() {
            tracing::debug!("{}: stopping runtime shell", self.switch);
            drop(shell.stdin);
            let _ = shell.child.kill().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_lose_their_qualifier() {
        assert_eq!(short_action("MyIngress.forward"), "forward");
        assert_eq!(short_action("forward"), "forward");
    }

    #[test]
    fn args_are_quoted() {
        let args = vec!["10.1.1.2/24".to_string(), "1".to_string()];
        assert_eq!(render_args(&args), "\"10.1.1.2/24\", \"1\"");
    }

    #[test]
    fn range_keys_split_into_two_arguments() {
        let args = vec!["100..200".to_string()];
        assert_eq!(render_args(&args), "\"100\", \"200\"");
    }

    #[test]
    fn non_numeric_ranges_stay_whole() {
        let args = vec!["a..b".to_string()];
        assert_eq!(render_args(&args), "\"a..b\"");
    }
}
