//! Child-process channel: newline-delimited JSON over stdin/stdout.

use crate::connection::{TransportError, TransportResult};
use crate::jsonrpc::{self, RpcChannel};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// How long a child gets to exit after stdin closes before it is killed
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Channel to a spawned server process
pub struct StdioChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    open: bool,
}

impl StdioChannel {
    /// Spawn `command` with exactly `env` as its environment
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the process cannot be started
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> TransportResult<Self> {
        let spawn_err = |reason: String| TransportError::Spawn {
            command: command.to_string(),
            reason,
        };
        let mut child = Command::new(command)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_err(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("stdout not captured".to_string()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            open: true,
        })
    }

    async fn send(&mut self, message: &Value) -> TransportResult<()> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = message.to_string();
        line.push('\n');
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        written.map_err(|e| {
            self.open = false;
            TransportError::ConnectionFailed(format!("write to server stdin: {}", e))
        })
    }

    async fn receive(&mut self, id: u64) -> TransportResult<Value> {
        loop {
            let line = match self.stdout.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.open = false;
                    return Err(TransportError::Closed);
                }
                Err(e) => {
                    self.open = false;
                    return Err(TransportError::ConnectionFailed(format!(
                        "read from server stdout: {}",
                        e
                    )));
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(message) if jsonrpc::response_id(&message) == Some(id) => return Ok(message),
                Ok(_) => tracing::trace!("skipping unrelated server message"),
                Err(_) => tracing::debug!(line = %trimmed, "skipping non-JSON server output"),
            }
        }
    }
}

#[async_trait]
impl RpcChannel for StdioChannel {
    async fn request(&mut self, method: &str, params: Value) -> TransportResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&jsonrpc::request(id, method, params)).await?;
        self.receive(id).await
    }

    async fn notify(&mut self, method: &str, params: Value) -> TransportResult<()> {
        self.send(&jsonrpc::notification(method, params)).await
    }

    fn is_open(&mut self) -> bool {
        if self.open && !matches!(self.child.try_wait(), Ok(None)) {
            self.open = false;
        }
        self.open
    }

    async fn shutdown(&mut self) -> TransportResult<()> {
        self.open = false;
        drop(self.stdin.take());
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::ConnectionFailed(e.to_string())),
            Err(_) => self
                .child
                .kill()
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("kill server: {}", e))),
        }
    }
}
