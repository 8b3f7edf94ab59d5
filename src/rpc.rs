// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Transport + RPC-client collaborator seam.
//!
//! The orchestration layer is built around [`RpcClient`], one per server.
//! [`crate::client::WireClient`] is the production implementation; tests
//! substitute a mock (the trait is `automock`-ed under `cfg(test)`).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectionError;

/// A tool advertised by a server. Names are unique within a server, not
/// globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,

    /// Tool description.
    pub description: Option<String>,

    /// JSON Schema for tool input.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// A resource advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,

    /// Human-readable name.
    pub name: Option<String>,

    /// Optional MIME type.
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// A prompt advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Prompt name.
    pub name: String,

    /// Prompt description.
    pub description: Option<String>,
}

/// Opaque negotiated capability set from the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Whether the server advertises tools.
    #[serde(default)]
    pub tools: bool,

    /// Whether the server advertises resources.
    #[serde(default)]
    pub resources: bool,

    /// Whether the server advertises prompts.
    #[serde(default)]
    pub prompts: bool,

    /// Additional capability blocks, passed through untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// One content item in a tool response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },

    /// Base64 image content.
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Embedded resource reference.
    Resource {
        /// The resource body.
        resource: Value,
    },
}

/// Raw result of a tool call, before cleanup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResponse {
    /// Content items returned by the server.
    pub content: Vec<ContentItem>,

    /// Whether the server flagged the result as an error.
    pub is_error: bool,
}

impl ToolResponse {
    /// Build a plain text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }
}

/// Protocol client for a single server connection.
///
/// Implementations own the underlying transport; dropping the handle (after
/// [`RpcClient::close`]) releases it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Perform the protocol handshake and return negotiated capabilities.
    async fn initialize(&self) -> Result<ServerCapabilities, ConnectionError>;

    /// Fetch the capability set post-handshake (readiness probe call).
    async fn capabilities(&self) -> Result<ServerCapabilities, ConnectionError>;

    /// List tools advertised by the server.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError>;

    /// List resources advertised by the server.
    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ConnectionError>;

    /// List prompts advertised by the server.
    async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>, ConnectionError>;

    /// Call a tool with the given arguments.
    async fn call_tool(&self, name: &str, arguments: Value)
        -> Result<ToolResponse, ConnectionError>;

    /// Tear the connection down. Idempotent.
    async fn close(&self);
}
