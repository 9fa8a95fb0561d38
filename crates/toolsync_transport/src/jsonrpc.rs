//! JSON-RPC 2.0 framing for the tool-discovery protocol.
//!
//! Channels only move whole messages; `RpcConnection` layers the handshake,
//! paginated listing and single calls on top of any channel.

use crate::connection::{ToolConnection, TransportError, TransportResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

/// Protocol revision announced during the handshake
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Upper bound on `tools/list` pages followed for one listing
const MAX_PAGES: usize = 1000;

/// Build a request message
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

/// Build a notification message
#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}

/// Numeric id of a response, if any
#[must_use]
pub fn response_id(message: &Value) -> Option<u64> {
    message.get("id").and_then(Value::as_u64)
}

/// Extract `result` from a response, mapping an `error` member to a transport error
///
/// # Errors
///
/// Returns `Rpc` for an error response and `Protocol` when neither member exists
pub fn into_result(mut response: Value) -> TransportResult<Value> {
    if let Some(error) = response.get("error") {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(TransportError::Protocol(
            "response has neither result nor error".to_string(),
        )),
    }
}

/// Parameters of the `initialize` request
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {"name": "toolsync", "version": env!("CARGO_PKG_VERSION")}
    })
}

/// Split one `tools/list` result into its entries and continuation cursor
///
/// # Errors
///
/// Returns `Protocol` if `tools` is absent or not an array
pub fn parse_tools_page(result: Value) -> TransportResult<(Vec<Value>, Option<String>)> {
    let Value::Object(mut map) = result else {
        return Err(TransportError::Protocol(
            "tools/list result is not an object".to_string(),
        ));
    };
    let tools = match map.remove("tools") {
        Some(Value::Array(tools)) => tools,
        _ => {
            return Err(TransportError::Protocol(
                "tools/list result has no tools array".to_string(),
            ));
        }
    };
    let cursor = map
        .remove("nextCursor")
        .and_then(|c| c.as_str().map(str::to_string))
        .filter(|c| !c.is_empty());
    Ok((tools, cursor))
}

/// A bidirectional message channel
#[async_trait]
pub trait RpcChannel: Send {
    /// Send a request and wait for its response
    async fn request(&mut self, method: &str, params: Value) -> TransportResult<Value>;

    /// Send a notification
    async fn notify(&mut self, method: &str, params: Value) -> TransportResult<()>;

    /// Whether the underlying channel still looks usable
    fn is_open(&mut self) -> bool;

    /// Shut the channel down
    async fn shutdown(&mut self) -> TransportResult<()>;
}

/// A tool connection over any `RpcChannel`
pub struct RpcConnection<C> {
    channel: C,
}

impl<C: RpcChannel> RpcConnection<C> {
    /// Perform the `initialize` handshake on a fresh channel
    ///
    /// # Errors
    ///
    /// Returns error if the handshake is rejected or the channel fails
    pub async fn handshake(mut channel: C) -> TransportResult<Self> {
        let result = into_result(channel.request("initialize", initialize_params()).await?)?;
        tracing::debug!(
            protocol = %result.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "handshake complete"
        );
        channel
            .notify("notifications/initialized", json!({}))
            .await?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl<C: RpcChannel> ToolConnection for RpcConnection<C> {
    async fn list_tools(&mut self) -> TransportResult<Vec<Value>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        for _ in 0..MAX_PAGES {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = into_result(self.channel.request("tools/list", params).await?)?;
            let (page, next) = parse_tools_page(result)?;
            tools.extend(page);
            match next {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(TransportError::Protocol(format!(
                        "tools/list repeated cursor {}",
                        next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
        Err(TransportError::Protocol(format!(
            "tools/list exceeded {} pages",
            MAX_PAGES
        )))
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> TransportResult<Value> {
        let params = json!({"name": name, "arguments": arguments});
        into_result(self.channel.request("tools/call", params).await?)
    }

    fn is_open(&mut self) -> bool {
        self.channel.is_open()
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.channel.shutdown().await
    }
}
