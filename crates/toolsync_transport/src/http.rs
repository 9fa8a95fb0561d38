//! Streamable HTTP channel.
//!
//! Each message is a POST. Replies arrive either as a JSON body or as a
//! server-sent event stream; the session id handed out by the server is
//! echoed on every later request.

use crate::connection::{TransportError, TransportResult};
use crate::jsonrpc::{self, RpcChannel};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the server-assigned session
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_EXCERPT: usize = 512;

/// Channel to a remote endpoint
pub struct HttpChannel {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: Option<String>,
    next_id: u64,
    open: bool,
}

impl HttpChannel {
    /// Prepare a channel; nothing is sent until the first request
    ///
    /// # Errors
    ///
    /// Returns error if a header is invalid or the client cannot be built
    pub fn connect(url: &str, headers: &BTreeMap<String, String>) -> TransportResult<Self> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::ConnectionFailed(format!("invalid header {}", name)))?;
            let mut value = HeaderValue::from_str(value).map_err(|_| {
                TransportError::ConnectionFailed(format!("invalid value for header {}", name))
            })?;
            value.set_sensitive(true);
            map.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            headers: map,
            session_id: None,
            next_id: 1,
            open: true,
        })
    }

    async fn post(&mut self, message: &Value) -> TransportResult<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
            } else {
                TransportError::ConnectionFailed(e.to_string())
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 404 && self.session_id.is_some() {
                self.open = false;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: body.chars().take(ERROR_EXCERPT).collect(),
            });
        }
        Ok(response)
    }
}

/// Find the response with `id` among the `data:` payloads of an event stream
fn find_in_event_stream(body: &str, id: u64) -> Option<Value> {
    let mut data = String::new();
    for line in body.lines().chain(std::iter::once("")) {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        } else if line.trim().is_empty() && !data.is_empty() {
            if let Ok(message) = serde_json::from_str::<Value>(&data)
                && jsonrpc::response_id(&message) == Some(id)
            {
                return Some(message);
            }
            data.clear();
        }
    }
    None
}

#[async_trait]
impl RpcChannel for HttpChannel {
    async fn request(&mut self, method: &str, params: Value) -> TransportResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let response = self.post(&jsonrpc::request(id, method, params)).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if is_stream {
            find_in_event_stream(&body, id).ok_or_else(|| {
                TransportError::Protocol(format!("event stream ended without response {}", id))
            })
        } else {
            serde_json::from_str(&body)
                .map_err(|e| TransportError::Protocol(format!("invalid JSON response: {}", e)))
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> TransportResult<()> {
        self.post(&jsonrpc::notification(method, params)).await?;
        Ok(())
    }

    fn is_open(&mut self) -> bool {
        self.open
    }

    async fn shutdown(&mut self) -> TransportResult<()> {
        self.open = false;
        let Some(session) = self.session_id.take() else {
            return Ok(());
        };
        self.client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_stream_picks_matching_id() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\n";
        let message = find_in_event_stream(body, 7).unwrap();
        assert_eq!(message["result"], json!({"tools": []}));
        assert!(find_in_event_stream(body, 8).is_none());
    }

    #[test]
    fn test_event_stream_without_trailing_blank_line() {
        let body = "data: {\"id\":1,\"result\":{}}";
        assert!(find_in_event_stream(body, 1).is_some());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        assert!(HttpChannel::connect("https://api.test", &headers).is_err());
    }
}
