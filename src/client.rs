// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level JSON-RPC 2.0 client, one per server.
//!
//! [`WireClient`] speaks line-delimited JSON-RPC over a spawned child's
//! standard streams, or request/response JSON-RPC over streamable HTTP and
//! SSE endpoints. It implements the [`RpcClient`] seam the orchestration
//! layer is built around.
//!
//! The stdio channel is handed its streams by the connection manager, which
//! keeps the `Child` itself so it can watch for unexpected exits and drive
//! the registry state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::config::ReconnectPolicy;
use crate::error::ConnectionError;
use crate::rpc::{
    ContentItem, PromptDescriptor, ResourceDescriptor, RpcClient, ServerCapabilities,
    ToolDescriptor, ToolResponse,
};

/// Protocol version sent during the handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// The underlying byte channel. A closed set of transport variants rather
/// than duck-typed handles.
enum Channel {
    Stdio {
        stdin: ChildStdin,
        reader: BufReader<ChildStdout>,
    },
    Http {
        http: reqwest::Client,
        url: String,
        headers: HashMap<String, String>,
        reconnect: ReconnectPolicy,
    },
    Closed,
}

/// JSON-RPC client for a single MCP server.
pub struct WireClient {
    server: String,
    channel: Mutex<Channel>,
    negotiated: std::sync::Mutex<Option<ServerCapabilities>>,
    request_id: AtomicU64,
    request_timeout: Duration,
}

impl WireClient {
    /// Build a stdio client over an already-spawned child's streams.
    pub fn stdio(
        server: impl Into<String>,
        stdin: ChildStdin,
        stdout: ChildStdout,
        request_timeout: Duration,
    ) -> Self {
        Self {
            server: server.into(),
            channel: Mutex::new(Channel::Stdio {
                stdin,
                reader: BufReader::new(stdout),
            }),
            negotiated: std::sync::Mutex::new(None),
            request_id: AtomicU64::new(0),
            request_timeout,
        }
    }

    /// Build a streamable-HTTP client with custom headers and a
    /// reconnection policy for transient dial failures.
    pub fn http(
        server: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        reconnect: ReconnectPolicy,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let server = server.into();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConnectionError::failed(&server, e.to_string()))?;
        Ok(Self {
            server,
            channel: Mutex::new(Channel::Http {
                http,
                url: url.into(),
                headers,
                reconnect,
            }),
            negotiated: std::sync::Mutex::new(None),
            request_id: AtomicU64::new(0),
            request_timeout,
        })
    }

    /// Build an SSE client. Same shape as HTTP with a simpler construction:
    /// no custom headers, default reconnection policy.
    pub fn sse(
        server: impl Into<String>,
        url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        Self::http(
            server,
            url,
            HashMap::new(),
            ReconnectPolicy::default(),
            request_timeout,
        )
    }

    /// Server name this client belongs to.
    pub fn server(&self) -> &str {
        &self.server
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Issue one JSON-RPC request and await the matching response's
    /// `result`, bounded by the per-request timeout.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ConnectionError> {
        let id = self.next_request_id();
        let mut body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            body["params"] = params;
        }

        let timeout_ms = self.request_timeout.as_millis() as u64;
        let response = tokio::time::timeout(self.request_timeout, self.round_trip(body, id))
            .await
            .map_err(|_| ConnectionError::Timeout {
                server: self.server.clone(),
                timeout_ms,
            })??;

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(ConnectionError::protocol(&self.server, code, message));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| ConnectionError::invalid_response(&self.server, "missing result"))
    }

    /// Send a notification (no id, no response expected).
    async fn notify(&self, method: &str) -> Result<(), ConnectionError> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let mut channel = self.channel.lock().await;
        match &mut *channel {
            Channel::Stdio { stdin, .. } => {
                write_line(stdin, &body, &self.server).await?;
                Ok(())
            }
            // HTTP-style transports carry notifications as plain posts whose
            // responses are ignored.
            Channel::Http {
                http, url, headers, ..
            } => {
                let _ = post_json(http, url, headers, &body).await;
                Ok(())
            }
            Channel::Closed => Err(ConnectionError::NotConnected {
                server: self.server.clone(),
            }),
        }
    }

    async fn round_trip(&self, body: Value, id: u64) -> Result<Value, ConnectionError> {
        let mut channel = self.channel.lock().await;
        match &mut *channel {
            Channel::Stdio { stdin, reader } => {
                write_line(stdin, &body, &self.server).await?;
                // Skip server-initiated notifications until our id answers.
                loop {
                    let mut line = String::new();
                    let read = reader
                        .read_line(&mut line)
                        .await
                        .map_err(|e| ConnectionError::failed(&self.server, e.to_string()))?;
                    if read == 0 {
                        return Err(ConnectionError::failed(&self.server, "stream closed"));
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let parsed: Value = match serde_json::from_str(trimmed) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if parsed.get("id").and_then(Value::as_u64) == Some(id) {
                        return Ok(parsed);
                    }
                }
            }
            Channel::Http {
                http,
                url,
                headers,
                reconnect,
            } => {
                let text = post_with_reconnect(http, url, headers, reconnect, &body)
                    .await
                    .map_err(|e| ConnectionError::failed(&self.server, e.to_string()))?;
                let payload = extract_json_payload(&text);
                serde_json::from_str(payload)
                    .map_err(|e| ConnectionError::invalid_response(&self.server, e.to_string()))
            }
            Channel::Closed => Err(ConnectionError::NotConnected {
                server: self.server.clone(),
            }),
        }
    }
}

async fn write_line(
    stdin: &mut ChildStdin,
    body: &Value,
    server: &str,
) -> Result<(), ConnectionError> {
    let line = serde_json::to_string(body)
        .map_err(|e| ConnectionError::failed(server, e.to_string()))?;
    stdin
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| ConnectionError::failed(server, e.to_string()))?;
    stdin
        .flush()
        .await
        .map_err(|e| ConnectionError::failed(server, e.to_string()))
}

/// Post with dial-failure retries per the server's reconnection policy.
/// Only connect-level failures retry; HTTP errors and bad payloads
/// surface immediately.
async fn post_with_reconnect(
    http: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
    reconnect: &ReconnectPolicy,
    body: &Value,
) -> Result<String, reqwest::Error> {
    let mut pause = Duration::from_millis(reconnect.initial_delay_ms);
    let max_pause = Duration::from_millis(reconnect.max_delay_ms);
    let mut attempt = 0u32;

    loop {
        match post_json(http, url, headers, body).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_connect() && attempt < reconnect.max_retries => {
                attempt += 1;
                tracing::debug!(url, attempt, "reconnecting after dial failure");
                tokio::time::sleep(pause).await;
                pause = pause.mul_f64(reconnect.growth_factor).min(max_pause);
            }
            Err(err) => return Err(err),
        }
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
    body: &Value,
) -> Result<String, reqwest::Error> {
    let mut request = http
        .post(url)
        .header("Accept", "application/json, text/event-stream")
        .json(body);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let response = request.send().await?.error_for_status()?;
    response.text().await
}

/// Streamable-HTTP servers may answer with an SSE-framed body; take the
/// first `data:` line in that case, otherwise the body is the payload.
fn extract_json_payload(body: &str) -> &str {
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            return data.trim();
        }
    }
    body.trim()
}

/// Map the handshake's capability blocks (objects when present) onto the
/// negotiated capability set.
fn parse_capabilities(result: &Value) -> ServerCapabilities {
    let caps = result.get("capabilities").cloned().unwrap_or(json!({}));
    let mut parsed = ServerCapabilities {
        tools: caps.get("tools").is_some(),
        resources: caps.get("resources").is_some(),
        prompts: caps.get("prompts").is_some(),
        ..ServerCapabilities::default()
    };
    if let Some(map) = caps.as_object() {
        for (key, value) in map {
            if !matches!(key.as_str(), "tools" | "resources" | "prompts") {
                parsed.extra.insert(key.clone(), value.clone());
            }
        }
    }
    parsed
}

#[async_trait]
impl RpcClient for WireClient {
    async fn initialize(&self) -> Result<ServerCapabilities, ConnectionError> {
        let result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "clientInfo": {
                        "name": "mcp-hub",
                        "version": crate::VERSION,
                    }
                })),
            )
            .await?;

        let capabilities = parse_capabilities(&result);
        *self
            .negotiated
            .lock()
            .expect("capabilities lock poisoned") = Some(capabilities.clone());

        self.notify("notifications/initialized").await?;
        Ok(capabilities)
    }

    async fn capabilities(&self) -> Result<ServerCapabilities, ConnectionError> {
        // A liveness round-trip; the capability set itself was negotiated
        // during the handshake.
        self.request("ping", None).await?;
        Ok(self
            .negotiated
            .lock()
            .expect("capabilities lock poisoned")
            .clone()
            .unwrap_or_default())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        let result = self.request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or(json!([]));
        serde_json::from_value(tools)
            .map_err(|e| ConnectionError::invalid_response(&self.server, e.to_string()))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ConnectionError> {
        let result = self.request("resources/list", None).await?;
        let resources = result.get("resources").cloned().unwrap_or(json!([]));
        serde_json::from_value(resources)
            .map_err(|e| ConnectionError::invalid_response(&self.server, e.to_string()))
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>, ConnectionError> {
        let result = self.request("prompts/list", None).await?;
        let prompts = result.get("prompts").cloned().unwrap_or(json!([]));
        serde_json::from_value(prompts)
            .map_err(|e| ConnectionError::invalid_response(&self.server, e.to_string()))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResponse, ConnectionError> {
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;

        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let content = result
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| serde_json::from_value::<ContentItem>(item).ok())
            .collect();

        Ok(ToolResponse { content, is_error })
    }

    async fn close(&self) {
        let mut channel = self.channel.lock().await;
        *channel = Channel::Closed;
    }
}
