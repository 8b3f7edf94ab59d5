// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server configuration and runtime tunables.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "mcp_servers": {
//!     "filesystem": {
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"],
//!       "env": { "NODE_ENV": "production" }
//!     },
//!     "github": {
//!       "type": "http",
//!       "url": "https://mcp.github.com/v1",
//!       "headers": { "Authorization": "Bearer ${GITHUB_TOKEN}" }
//!     }
//!   }
//! }
//! ```
//!
//! `type` defaults to `"stdio"` when `command` is present, and to `"http"`
//! when only `url` is present.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Transport kind for an MCP server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawned local process over standard streams.
    Stdio,

    /// Long-lived streamable HTTP.
    Http,

    /// Server-sent-event streaming.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Reconnection policy passed through to the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum reconnect attempts.
    #[serde(default = "default_reconnect_retries")]
    pub max_retries: u32,

    /// Initial delay before the first reconnect, in milliseconds.
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied per attempt.
    #[serde(default = "default_reconnect_growth")]
    pub growth_factor: f64,

    /// Ceiling for the reconnect delay, in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,
}

fn default_reconnect_retries() -> u32 {
    5
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_growth() -> f64 {
    1.5
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_reconnect_retries(),
            initial_delay_ms: default_reconnect_initial_ms(),
            growth_factor: default_reconnect_growth(),
            max_delay_ms: default_reconnect_max_ms(),
        }
    }
}

/// Configuration for a single MCP server.
///
/// Captured at record creation and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport kind. Optional; inferred from `command`/`url` when absent.
    #[serde(rename = "type")]
    pub transport: Option<TransportKind>,

    /// Command for stdio transport.
    pub command: Option<String>,

    /// Arguments for stdio transport.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for stdio transport.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for stdio transport.
    pub cwd: Option<String>,

    /// URL for HTTP/SSE transport.
    pub url: Option<String>,

    /// Custom headers for HTTP/SSE transport (values support `${VAR}`).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Reconnection policy for the HTTP transport.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl ServerConfig {
    /// Create a stdio transport configuration.
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            transport: Some(TransportKind::Stdio),
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Create an HTTP transport configuration.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: Some(TransportKind::Http),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Create an SSE transport configuration.
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: Some(TransportKind::Sse),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set environment variables.
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Set working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set custom headers.
    pub fn with_headers(
        mut self,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Resolve the effective transport kind.
    ///
    /// `type` wins when present; otherwise `command` implies stdio and
    /// `url` implies HTTP.
    pub fn transport_kind(&self) -> Result<TransportKind, ConfigError> {
        if let Some(kind) = self.transport {
            return Ok(kind);
        }
        if self.command.is_some() {
            return Ok(TransportKind::Stdio);
        }
        if self.url.is_some() {
            return Ok(TransportKind::Http);
        }
        Err(ConfigError::malformed(
            "<unknown>",
            "config must specify either 'command' or 'url'",
        ))
    }

    /// Headers with `${VAR}` references expanded from the process
    /// environment. Unknown variables expand to the empty string.
    pub fn expanded_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_refs(v)))
            .collect()
    }
}

/// Expand `${VAR}` references in a string.
fn expand_env_refs(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        } else {
            break;
        }
    }
    result
}

/// Top-level configuration: map of server name to server config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Map of server name to server configuration.
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

impl HubConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a JSON document with an `mcp_servers` field.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            mcp_servers: HashMap<String, ServerConfig>,
        }

        let full: FullConfig = serde_json::from_str(json)
            .map_err(|e| ConfigError::malformed("<config>", e.to_string()))?;
        Ok(Self {
            servers: full.mcp_servers,
        })
    }

    /// Add a server configuration.
    pub fn add_server(&mut self, name: impl Into<String>, config: ServerConfig) {
        self.servers.insert(name.into(), config);
    }
}

/// Runtime tunables for backoff, readiness probing, tool execution, the
/// codec size ceiling, and registry cleanup. All have in-code defaults and
/// may be overridden via `MCP_HUB_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Per-request timeout for tool calls.
    pub request_timeout: Duration,

    /// Default tool-call retry count.
    pub tool_retries: u32,

    /// Base delay for tool-execution backoff.
    pub retry_base_delay: Duration,

    /// Ceiling for tool-execution backoff.
    pub retry_max_delay: Duration,

    /// Overall readiness-probe timeout.
    pub readiness_timeout: Duration,

    /// Maximum readiness-probe attempts.
    pub readiness_attempts: u32,

    /// Jitter fraction applied to backoff delays.
    pub jitter_fraction: f64,

    /// Size ceiling for codec decoding, in bytes.
    pub max_response_bytes: usize,

    /// Minimum interval between registry cleanup sweeps.
    pub sweep_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            tool_retries: 3,
            retry_base_delay: Duration::from_millis(1_000),
            retry_max_delay: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(10),
            readiness_attempts: 5,
            jitter_fraction: 0.25,
            max_response_bytes: 10 * 1024 * 1024,
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: env_duration_ms("MCP_HUB_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            tool_retries: env_parse("MCP_HUB_TOOL_RETRIES", defaults.tool_retries),
            retry_base_delay: env_duration_ms("MCP_HUB_RETRY_BASE_MS", defaults.retry_base_delay),
            retry_max_delay: env_duration_ms("MCP_HUB_RETRY_MAX_MS", defaults.retry_max_delay),
            readiness_timeout: env_duration_ms(
                "MCP_HUB_READINESS_TIMEOUT_MS",
                defaults.readiness_timeout,
            ),
            readiness_attempts: env_parse("MCP_HUB_READINESS_ATTEMPTS", defaults.readiness_attempts),
            jitter_fraction: env_parse("MCP_HUB_JITTER_FRACTION", defaults.jitter_fraction),
            max_response_bytes: env_parse("MCP_HUB_MAX_RESPONSE_BYTES", defaults.max_response_bytes),
            sweep_interval: env_duration_ms("MCP_HUB_SWEEP_INTERVAL_MS", defaults.sweep_interval),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
