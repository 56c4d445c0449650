//! Client for the external MCP mail tool server.
//!
//! Every call spawns a fresh tool process whose environment carries the IMAP
//! credentials for that call only, then speaks newline-delimited JSON-RPC 2.0
//! over its stdio: `initialize`, `notifications/initialized`, `tools/call`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument, warn};

use crate::config::MailToolConfig;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Variables of this process every tool child inherits. Anything else,
/// including our own secrets, is dropped unless configured as passthrough.
const BASE_CHILD_ENV: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TMPDIR", "SYSTEMROOT"];

/// Connection settings handed to exactly one tool invocation.
#[derive(Debug, Clone)]
pub struct ImapCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_ssl: bool,
}

impl ImapCredentials {
    /// Variables set on the tool child process, never on this process.
    fn child_env(&self) -> [(&'static str, String); 5] {
        [
            ("IMAP_HOST", self.host.clone()),
            ("IMAP_PORT", self.port.to_string()),
            ("IMAP_USERNAME", self.username.clone()),
            ("IMAP_PASSWORD", self.password.expose_secret().to_string()),
            ("IMAP_USE_SSL", self.use_ssl.to_string()),
        ]
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool server: {0}")]
    UnknownServer(String),
    #[error("failed to start tool server: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("tool server i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("tool server did not answer within {0:?}")]
    Timeout(Duration),
    #[error("tool server protocol error: {0}")]
    Protocol(String),
    #[error("tool server rejected request ({code}): {message}")]
    Rpc { code: i64, message: String },
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Whether the mail server (or the tool process) could not be reached,
    /// as opposed to the tool failing on a reachable server.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Spawn(_) | Self::Io(_) | Self::Timeout(_) => true,
            Self::Failed(msg) => {
                let msg = msg.to_lowercase();
                ["connect", "login", "authenticat", "timed out"]
                    .iter()
                    .any(|needle| msg.contains(needle))
            }
            Self::UnknownServer(_) | Self::Protocol(_) | Self::Rpc { .. } => false,
        }
    }
}

#[async_trait]
pub trait McpToolClient: Send + Sync {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        credentials: &ImapCredentials,
        arguments: Value,
    ) -> Result<Value, ToolError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolResult {
    #[serde(default)]
    content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ToolContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Clone)]
pub struct StdioMcpClient {
    config: MailToolConfig,
}

impl StdioMcpClient {
    pub fn new(config: MailToolConfig) -> Self {
        Self { config }
    }

    fn inherited_env(&self) -> Vec<(String, std::ffi::OsString)> {
        BASE_CHILD_ENV
            .iter()
            .copied()
            .chain(self.config.passthrough_env.iter().map(String::as_str))
            .filter_map(|name| std::env::var_os(name).map(|value| (name.to_string(), value)))
            .collect()
    }
}

#[async_trait]
impl McpToolClient for StdioMcpClient {
    #[instrument(skip(self, credentials, arguments), fields(host = %credentials.host))]
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        credentials: &ImapCredentials,
        arguments: Value,
    ) -> Result<Value, ToolError> {
        if server != self.config.server_name {
            return Err(ToolError::UnknownServer(server.to_string()));
        }

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env_clear()
            .envs(self.inherited_env())
            .envs(credentials.child_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ToolError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Protocol("tool server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Protocol("tool server stdout unavailable".into()))?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        let mut session = StdioSession {
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        };
        let outcome = tokio::time::timeout(limit, session.call(tool, arguments)).await;
        drop(session);
        if let Err(e) = child.kill().await {
            debug!(error = %e, "tool server already exited");
        }

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(tool, ?limit, "tool call timed out");
                Err(ToolError::Timeout(limit))
            }
        }
    }
}

struct StdioSession {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioSession {
    async fn call(&mut self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "mailmind", "version": env!("CARGO_PKG_VERSION") },
            }),
        )
        .await?;
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: "notifications/initialized",
            params: None,
        })
        .await?;

        let result = self
            .request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await?;
        parse_tool_result(result)
    }

    async fn send(&mut self, request: &JsonRpcRequest<'_>) -> Result<(), ToolError> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| ToolError::Protocol(format!("encode request: {}", e)))?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params: Some(params),
        })
        .await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| ToolError::Protocol("tool server closed stdout".into()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(line) else {
                debug!("skipping non JSON-RPC output line");
                continue;
            };
            // notifications and unrelated responses
            if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(err) = response.error {
                return Err(ToolError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            return response
                .result
                .ok_or_else(|| ToolError::Protocol(format!("{} response has no result", method)));
        }
    }
}

/// Unwraps the JSON document the tool server puts in its first text content.
fn parse_tool_result(result: Value) -> Result<Value, ToolError> {
    let result: ToolResult = serde_json::from_value(result)
        .map_err(|e| ToolError::Protocol(format!("malformed tool result: {}", e)))?;
    let text = result
        .content
        .into_iter()
        .find_map(|c| match c {
            ToolContent::Text { text } => Some(text),
            ToolContent::Other => None,
        })
        .ok_or_else(|| ToolError::Protocol("tool result has no text content".into()))?;

    if result.is_error {
        return Err(ToolError::Failed(text));
    }

    let payload: Value = serde_json::from_str(&text)
        .map_err(|_| ToolError::Protocol("tool returned non-JSON text".into()))?;
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("tool reported failure")
            .to_string();
        return Err(ToolError::Failed(message));
    }
    Ok(payload)
}
