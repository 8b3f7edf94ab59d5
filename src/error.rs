// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for MCP server orchestration.
//!
//! Three error families with different propagation policies:
//!
//! - [`ConfigError`] - security/validation failures. Fatal: the caller
//!   orchestrating multi-server setup aborts remaining connection attempts.
//! - [`ConnectionError`] - transport/handshake failures. Logged, that one
//!   server's setup is skipped, others continue.
//! - [`ToolError`] - execution-time failures returned to the caller. These
//!   never crash the host process.
//!
//! The codec never raises at all; it degrades to returning original input.

use thiserror::Error;

/// Security and validation failures detected before a process is spawned
/// or a URL is dialed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Server name was empty or whitespace.
    #[error("Server name must be a non-empty string")]
    EmptyName,

    /// Configuration record is structurally unusable.
    #[error("Invalid configuration for server '{server}': {message}")]
    MalformedConfig { server: String, message: String },

    /// Command is not on the fixed allow-list.
    #[error("Command '{command}' is not allowed. Allowed commands: {}", allowed.join(", "))]
    CommandNotAllowed {
        command: String,
        allowed: Vec<String>,
    },

    /// An argument contained a shell metacharacter.
    #[error("Argument '{argument}' contains dangerous character '{character}'")]
    DangerousArgument { argument: String, character: char },

    /// An environment entry is not a usable string-to-string pair.
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnv { key: String, message: String },

    /// URL failed to parse or uses a disallowed scheme.
    #[error("URL scheme '{scheme}' is not allowed for '{url}' (only http/https)")]
    SchemeNotAllowed { url: String, scheme: String },

    /// URL was not parseable at all.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl ConfigError {
    /// Create a malformed-config error.
    pub fn malformed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedConfig {
            server: server.into(),
            message: message.into(),
        }
    }
}

/// Transport and handshake failures for a single server.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to spawn or dial the server.
    #[error("Failed to connect to MCP server '{server}': {message}")]
    Failed { server: String, message: String },

    /// Handshake or request timed out.
    #[error("MCP server '{server}' timed out after {timeout_ms}ms")]
    Timeout { server: String, timeout_ms: u64 },

    /// Handshake completed but the server rejected the client.
    #[error("Authentication failed for MCP server '{server}': {message}")]
    AuthFailed { server: String, message: String },

    /// The remote endpoint exists but its upstream is unavailable.
    #[error("MCP server '{server}' upstream unavailable: {message}")]
    UpstreamUnavailable { server: String, message: String },

    /// JSON-RPC error response from the server.
    #[error("Protocol error from '{server}': code={code}, message={message}")]
    Protocol {
        server: String,
        code: i64,
        message: String,
    },

    /// Response arrived but was not in the expected shape.
    #[error("Invalid response from MCP server '{server}': {message}")]
    InvalidResponse { server: String, message: String },

    /// The client handle was already closed.
    #[error("MCP server '{server}' is not connected")]
    NotConnected { server: String },
}

impl ConnectionError {
    /// Create a connection-failed error.
    pub fn failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(server: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            server: server.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Whether this failure looks like expected start-up noise rather than
    /// a hard fault. Used by the readiness probe, which does not count
    /// these toward its failure threshold.
    pub fn is_startup_noise(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("connection refused")
            || text.contains("connection reset")
            || text.contains("not ready")
            || text.contains("broken pipe")
    }

    /// Whether this failure indicates the underlying connection is gone,
    /// as opposed to a request-level problem.
    pub fn is_connection_related(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Timeout { .. } | Self::NotConnected { .. }
        )
    }
}

/// Execution-time failures surfaced by the tool executor.
#[derive(Error, Debug)]
pub enum ToolError {
    /// No usable server advertises the requested tool.
    #[error("Tool not found on any connected server: {0}")]
    NotFound(String),

    /// The resolved server became unusable between attempts.
    #[error("Server '{server}' was lost while executing tool '{tool}'")]
    ServerLost { tool: String, server: String },

    /// All attempts were exhausted.
    #[error("Tool '{tool}' failed after {attempts} attempts: {message}")]
    FailedWithRetries {
        tool: String,
        attempts: u32,
        message: String,
    },

    /// The call was aborted by an external cancellation signal.
    #[error("Tool call '{0}' was cancelled")]
    Cancelled(String),
}

/// Outcome of a single connect operation, distinguishing fatal security
/// failures from ordinary connection failures.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ConnectError {
    /// Security failures abort the whole multi-server setup sequence;
    /// everything else is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_not_allowed_lists_allowed() {
        let err = ConfigError::CommandNotAllowed {
            command: "rm".to_string(),
            allowed: vec!["node".to_string(), "npx".to_string()],
        };
        let display = err.to_string();
        assert!(display.contains("rm"));
        assert!(display.contains("node, npx"));
    }

    #[test]
    fn test_dangerous_argument_names_character() {
        let err = ConfigError::DangerousArgument {
            argument: "foo;bar".to_string(),
            character: ';',
        };
        assert!(err.to_string().contains(';'));
        assert!(err.to_string().contains("foo;bar"));
    }

    #[test]
    fn test_startup_noise_classification() {
        let noise = ConnectionError::failed("s", "connection refused (os error 111)");
        assert!(noise.is_startup_noise());

        let noise = ConnectionError::failed("s", "server not ready");
        assert!(noise.is_startup_noise());

        let hard = ConnectionError::protocol("s", -32601, "method not found");
        assert!(!hard.is_startup_noise());
    }

    #[test]
    fn test_connection_related_classification() {
        assert!(ConnectionError::Timeout {
            server: "s".to_string(),
            timeout_ms: 100
        }
        .is_connection_related());
        assert!(ConnectionError::NotConnected {
            server: "s".to_string()
        }
        .is_connection_related());
        assert!(!ConnectionError::protocol("s", -1, "boom").is_connection_related());
    }

    #[test]
    fn test_connect_error_fatality() {
        let fatal: ConnectError = ConfigError::EmptyName.into();
        assert!(fatal.is_fatal());

        let skip: ConnectError = ConnectionError::failed("s", "refused").into();
        assert!(!skip.is_fatal());
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::FailedWithRetries {
            tool: "search".to_string(),
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));

        let err = ToolError::Cancelled("search".to_string());
        assert!(err.to_string().contains("cancelled"));
    }
}
