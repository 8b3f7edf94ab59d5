// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool execution with bounded retry.
//!
//! Resolution scans the registry for a usable server whose catalog
//! contains the tool; first match wins. The execution loop retries with
//! backoff, aborts early when the resolved server becomes unusable, and
//! treats a protocol-level error response like any other failure. A
//! successful raw result is cleaned through the safe codec before being
//! returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use crate::backoff::RetryContext;
use crate::codec;
use crate::config::Settings;
use crate::error::ToolError;
use crate::registry::ServerRegistry;
use crate::rpc::{ContentItem, ToolResponse};

/// Cooperative cancellation signal for an in-flight tool call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-call options. Unset fields fall back to [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,

    /// Maximum attempts (clamped to at least one).
    pub retries: Option<u32>,

    /// Return content as-is, skipping the JSON-likelihood cleanup.
    pub raw: bool,

    /// External cancellation signal.
    pub cancel: Option<CancelToken>,
}

/// Result of a successful tool execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Always true for a returned outcome; failures surface as errors.
    pub success: bool,

    /// Cleaned result data.
    pub data: Value,

    /// Server that served the call.
    pub server: String,

    /// Tool name.
    pub tool: String,

    /// When the call completed.
    pub executed_at: DateTime<Utc>,
}

/// Executes tools against whichever usable server advertises them.
pub struct ToolExecutor {
    registry: Arc<ServerRegistry>,
    settings: Settings,
}

impl ToolExecutor {
    /// Create an executor backed by the shared registry.
    pub fn new(registry: Arc<ServerRegistry>, settings: Settings) -> Self {
        Self { registry, settings }
    }

    /// Execute `tool_name` with `arguments`, retrying per the options.
    #[instrument(skip(self, arguments, options), fields(tool = tool_name))]
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Value,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ToolError> {
        let Some((server, _tool)) = self.registry.resolve_tool(tool_name).await else {
            return Err(ToolError::NotFound(tool_name.to_string()));
        };

        let timeout = options.timeout.unwrap_or(self.settings.request_timeout);
        let attempts = options.retries.unwrap_or(self.settings.tool_retries).max(1);
        let mut retry = RetryContext::new(
            self.settings.retry_base_delay,
            self.settings.retry_max_delay,
            self.settings.jitter_fraction,
        );
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 && !self.registry.is_usable(&server).await {
                // No point retrying against a dead server.
                return Err(ToolError::ServerLost {
                    tool: tool_name.to_string(),
                    server,
                });
            }

            let Some(client) = self.registry.client(&server).await else {
                return Err(ToolError::ServerLost {
                    tool: tool_name.to_string(),
                    server,
                });
            };

            let call = tokio::time::timeout(timeout, client.call_tool(tool_name, arguments.clone()));
            let result = match &options.cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(ToolError::Cancelled(tool_name.to_string()));
                        }
                        result = call => result,
                    }
                }
                None => call.await,
            };

            match result {
                Ok(Ok(response)) if !response.is_error => {
                    debug!(server = %server, attempt, "tool call succeeded");
                    return Ok(ExecutionOutcome {
                        success: true,
                        data: clean_response(
                            response,
                            options.raw,
                            self.settings.max_response_bytes,
                        ),
                        server,
                        tool: tool_name.to_string(),
                        executed_at: Utc::now(),
                    });
                }
                // A protocol-level error response retries like any other
                // failure.
                Ok(Ok(response)) => {
                    last_failure = error_text(&response);
                    warn!(server = %server, attempt, error = %last_failure, "tool returned error");
                }
                Ok(Err(err)) => {
                    last_failure = err.to_string();
                    warn!(server = %server, attempt, error = %last_failure, "tool call failed");
                }
                Err(_) => {
                    last_failure = format!("timed out after {}ms", timeout.as_millis());
                    warn!(server = %server, attempt, "tool call timed out");
                }
            }

            if attempt < attempts {
                let pause = retry.next_delay();
                match &options.cancel {
                    Some(cancel) => {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return Err(ToolError::Cancelled(tool_name.to_string()));
                            }
                            _ = tokio::time::sleep(pause) => {}
                        }
                    }
                    None => tokio::time::sleep(pause).await,
                }
            }
        }

        Err(ToolError::FailedWithRetries {
            tool: tool_name.to_string(),
            attempts,
            message: last_failure,
        })
    }
}

fn error_text(response: &ToolResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse a content list into result data.
///
/// Raw results pass through untouched. Otherwise each text item that looks
/// like JSON is decoded through the safe codec; anything else is returned
/// verbatim. A single item collapses to its value.
fn clean_response(response: ToolResponse, raw: bool, max_bytes: usize) -> Value {
    let mut values: Vec<Value> = response
        .content
        .into_iter()
        .map(|item| match item {
            ContentItem::Text { text } => {
                if !raw && codec::looks_like_json(&text) {
                    codec::decode(&text, max_bytes).into_value()
                } else {
                    Value::String(text)
                }
            }
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        })
        .collect();

    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}
