// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! mcp-hub - client-side orchestration for MCP servers.
//!
//! Connects to many independently running MCP servers over stdio, HTTP, or
//! SSE transports, negotiates capabilities, enumerates what each server
//! offers, routes tool calls to the right server with bounded retry, and
//! protects the host process from malicious or malformed server
//! configuration and responses.
//!
//! # Architecture
//!
//! ```text
//! SecurityValidator ──> ConnectionManager ──> ServerRegistry ──> CatalogFetcher
//!                            │                     ^
//!                      ReadinessProbe              │
//!                                             ToolExecutor
//! ```
//!
//! - [`security`] - pre-connection policy gate (command allow-list,
//!   argument sanitation, URL scheme check)
//! - [`codec`] - hardened JSON encode/decode for untrusted payloads
//! - [`backoff`] - retry delay shared by probing and execution
//! - [`registry`] - the authoritative server map and its state machine
//! - [`connection`] - per-transport connect routines and the operation
//!   surface
//! - [`probe`] - post-handshake readiness checking
//! - [`catalog`] - tool/resource/prompt enumeration
//! - [`executor`] - tool resolution and bounded-retry execution
//! - [`client`] - the wire-level JSON-RPC client behind the
//!   [`rpc::RpcClient`] seam
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_hub::{ConnectionManager, ExecuteOptions, HubConfig, Settings, ToolExecutor};
//!
//! let settings = Settings::from_env();
//! let manager = ConnectionManager::new(settings.clone());
//!
//! let config = HubConfig::from_json(&std::fs::read_to_string(".mcp.json")?)?;
//! let summary = manager.connect_all(&config).await?;
//!
//! let executor = ToolExecutor::new(manager.registry(), settings);
//! let outcome = executor
//!     .execute("read_file", serde_json::json!({"path": "README.md"}), ExecuteOptions::default())
//!     .await?;
//! ```

pub mod backoff;
pub mod catalog;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod probe;
pub mod registry;
pub mod rpc;
pub mod security;

// Re-export commonly used types at crate root
pub use config::{HubConfig, ReconnectPolicy, ServerConfig, Settings, TransportKind};
pub use connection::{ConnectSummary, ConnectionManager};
pub use error::{ConfigError, ConnectError, ConnectionError, ToolError};
pub use executor::{CancelToken, ExecuteOptions, ExecutionOutcome, ToolExecutor};
pub use registry::{
    Catalog, RegistryEvent, ServerRegistry, ServerStatus, ServerView, StatusUpdate,
};
pub use rpc::{
    ContentItem, PromptDescriptor, ResourceDescriptor, RpcClient, ServerCapabilities,
    ToolDescriptor, ToolResponse,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
