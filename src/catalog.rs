// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Catalog enumeration for connected servers.
//!
//! Tools, resources, and prompts are listed independently. Resource and
//! prompt listings are optional protocol features, so their failures yield
//! empty lists; a tools failure is logged and, when it looks
//! connection-related, downgrades the server to `PartiallyConnected`.
//! Results land in the registry as one atomic replacement.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::{Catalog, ServerRegistry, ServerStatus, StatusUpdate};

/// Fetches and stores what each server advertises.
pub struct CatalogFetcher {
    registry: Arc<ServerRegistry>,
}

impl CatalogFetcher {
    /// Create a fetcher backed by the shared registry.
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    /// Refresh the catalog for one server. Returns whether the tool
    /// listing succeeded.
    pub async fn refresh(&self, name: &str) -> bool {
        let Some(client) = self.registry.client(name).await else {
            warn!(server = name, "catalog refresh skipped, no client handle");
            return false;
        };

        let (tools_result, resources_result, prompts_result) = tokio::join!(
            client.list_tools(),
            client.list_resources(),
            client.list_prompts()
        );

        let mut tools_ok = true;
        let tools = match tools_result {
            Ok(tools) => tools,
            Err(err) => {
                tools_ok = false;
                warn!(server = name, error = %err, "failed to list tools");
                if err.is_connection_related()
                    && self.registry.status(name).await == Some(ServerStatus::Connected)
                {
                    self.registry
                        .set_status(name, ServerStatus::PartiallyConnected, StatusUpdate::default())
                        .await;
                }
                Vec::new()
            }
        };

        // Optional protocol features: absence is not an error.
        let resources = resources_result.unwrap_or_else(|err| {
            debug!(server = name, error = %err, "server does not list resources");
            Vec::new()
        });
        let prompts = prompts_result.unwrap_or_else(|err| {
            debug!(server = name, error = %err, "server does not list prompts");
            Vec::new()
        });

        debug!(
            server = name,
            tools = tools.len(),
            resources = resources.len(),
            prompts = prompts.len(),
            "catalog refreshed"
        );

        self.registry
            .replace_catalog(
                name,
                Catalog {
                    tools,
                    resources,
                    prompts,
                },
            )
            .await;

        if tools_ok && self.registry.status(name).await == Some(ServerStatus::PartiallyConnected) {
            self.registry
                .set_status(name, ServerStatus::Connected, StatusUpdate::default())
                .await;
        }

        tools_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::config::TransportKind;
    use crate::error::ConnectionError;
    use crate::rpc::{MockRpcClient, PromptDescriptor, ToolDescriptor};
    use std::time::Duration;

    async fn registry_with_client(client: MockRpcClient) -> Arc<ServerRegistry> {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        registry
            .insert_connecting(
                "srv",
                TransportKind::Stdio,
                ServerConfig::stdio("node"),
                Arc::new(client),
            )
            .await;
        registry
            .set_status("srv", ServerStatus::Connected, StatusUpdate::default())
            .await;
        registry
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_full_catalog_stored_atomically() {
        let mut client = MockRpcClient::new();
        client
            .expect_list_tools()
            .returning(|| Ok(vec![tool("read_file"), tool("write_file")]));
        client.expect_list_resources().returning(|| Ok(vec![]));
        client.expect_list_prompts().returning(|| {
            Ok(vec![PromptDescriptor {
                name: "review".to_string(),
                description: None,
            }])
        });

        let registry = registry_with_client(client).await;
        let fetcher = CatalogFetcher::new(registry.clone());
        assert!(fetcher.refresh("srv").await);

        let catalog = registry.catalog("srv").await;
        assert_eq!(catalog.tools.len(), 2);
        assert_eq!(catalog.tools[0].name, "read_file");
        assert!(catalog.resources.is_empty());
        assert_eq!(catalog.prompts.len(), 1);
        assert_eq!(registry.status("srv").await, Some(ServerStatus::Connected));
    }

    #[tokio::test]
    async fn test_optional_listings_tolerated() {
        let mut client = MockRpcClient::new();
        client
            .expect_list_tools()
            .returning(|| Ok(vec![tool("search")]));
        client
            .expect_list_resources()
            .returning(|| Err(ConnectionError::protocol("srv", -32601, "method not found")));
        client
            .expect_list_prompts()
            .returning(|| Err(ConnectionError::protocol("srv", -32601, "method not found")));

        let registry = registry_with_client(client).await;
        let fetcher = CatalogFetcher::new(registry.clone());
        assert!(fetcher.refresh("srv").await);

        let catalog = registry.catalog("srv").await;
        assert_eq!(catalog.tools.len(), 1);
        assert!(catalog.resources.is_empty());
        assert!(catalog.prompts.is_empty());
        // Optional listings failing never degrades the status.
        assert_eq!(registry.status("srv").await, Some(ServerStatus::Connected));
    }

    #[tokio::test]
    async fn test_connection_related_tools_failure_downgrades() {
        let mut client = MockRpcClient::new();
        client
            .expect_list_tools()
            .returning(|| Err(ConnectionError::failed("srv", "stream closed")));
        client.expect_list_resources().returning(|| Ok(vec![]));
        client.expect_list_prompts().returning(|| Ok(vec![]));

        let registry = registry_with_client(client).await;
        let fetcher = CatalogFetcher::new(registry.clone());
        assert!(!fetcher.refresh("srv").await);

        assert_eq!(
            registry.status("srv").await,
            Some(ServerStatus::PartiallyConnected)
        );
        // Catalog was still replaced with empty lists, never left stale.
        assert!(registry.catalog("srv").await.tools.is_empty());
    }

    #[tokio::test]
    async fn test_protocol_tools_failure_keeps_status() {
        let mut client = MockRpcClient::new();
        client
            .expect_list_tools()
            .returning(|| Err(ConnectionError::protocol("srv", -32603, "internal error")));
        client.expect_list_resources().returning(|| Ok(vec![]));
        client.expect_list_prompts().returning(|| Ok(vec![]));

        let registry = registry_with_client(client).await;
        let fetcher = CatalogFetcher::new(registry.clone());
        assert!(!fetcher.refresh("srv").await);
        assert_eq!(registry.status("srv").await, Some(ServerStatus::Connected));
    }

    #[tokio::test]
    async fn test_successful_refresh_restores_partially_connected() {
        let mut client = MockRpcClient::new();
        client
            .expect_list_tools()
            .returning(|| Ok(vec![tool("search")]));
        client.expect_list_resources().returning(|| Ok(vec![]));
        client.expect_list_prompts().returning(|| Ok(vec![]));

        let registry = registry_with_client(client).await;
        registry
            .set_status("srv", ServerStatus::PartiallyConnected, StatusUpdate::default())
            .await;

        let fetcher = CatalogFetcher::new(registry.clone());
        assert!(fetcher.refresh("srv").await);
        assert_eq!(registry.status("srv").await, Some(ServerStatus::Connected));
    }
}
