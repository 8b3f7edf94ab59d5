// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The authoritative map of server name to connection record.
//!
//! All status mutations go through one state-setter ([`ServerRegistry::set_status`])
//! that enforces the transition table, stamps the change time, and fires
//! notifications; the catalog is replaced atomically. No caller patches a
//! record field directly.
//!
//! # State machine
//!
//! ```text
//! Connecting ──────────> Connected ──────────> Disconnected (terminal)
//!      │                  │      ^                  ^
//!      │                  v      │                  │
//!      │            PartiallyConnected ─────────────┤
//!      │                  │                         │
//!      └──────> Error <───┴─────────────────────────┘
//! ```
//!
//! `Disconnected` and `Error` are terminal until the server is re-added
//! under the same name, which starts a fresh `Connecting` record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{ServerConfig, TransportKind};
use crate::rpc::{
    PromptDescriptor, ResourceDescriptor, RpcClient, ServerCapabilities, ToolDescriptor,
};

/// Connection status for a registered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Connection attempt in flight.
    Connecting,

    /// Handshake completed, fully usable.
    Connected,

    /// Connection alive but the tool listing failed.
    PartiallyConnected,

    /// Cleanly torn down. Terminal until re-added.
    Disconnected,

    /// Failed. Terminal until re-added.
    Error,
}

impl ServerStatus {
    /// Whether the server can serve tool calls in this status.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Connected | Self::PartiallyConnected)
    }

    fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Connecting => matches!(next, Self::Connected | Self::Error),
            Self::Connected => matches!(
                next,
                Self::PartiallyConnected | Self::Disconnected | Self::Error
            ),
            Self::PartiallyConnected => {
                matches!(next, Self::Connected | Self::Disconnected | Self::Error)
            }
            Self::Disconnected | Self::Error => false,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::PartiallyConnected => write!(f, "partially_connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What a server currently advertises. Fields default to empty lists,
/// never null, so callers may always iterate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Tools, in server order.
    pub tools: Vec<ToolDescriptor>,

    /// Resources, in server order.
    pub resources: Vec<ResourceDescriptor>,

    /// Prompts, in server order.
    pub prompts: Vec<PromptDescriptor>,
}

/// Notifications emitted to registry subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// Status changed (only fired when new and old differ).
    StatusChanged {
        name: String,
        status: ServerStatus,
        previous: ServerStatus,
    },

    /// A server surfaced an error.
    ServerError { name: String, error: String },

    /// A server was cleanly disconnected.
    ServerDisconnected { name: String },
}

/// Auxiliary fields applied together with a status transition.
#[derive(Debug, Default)]
pub struct StatusUpdate {
    /// Negotiated capability set (stored on handshake success).
    pub capabilities: Option<ServerCapabilities>,

    /// Error message to surface via [`RegistryEvent::ServerError`].
    pub error: Option<String>,
}

/// One registered server. Internal to the registry; callers observe
/// through [`ServerView`] snapshots.
struct ServerRecord {
    transport: TransportKind,
    #[allow(dead_code)] // captured at creation per the data model; read via views in diagnostics
    config: ServerConfig,
    status: ServerStatus,
    usable: bool,
    capabilities: Option<ServerCapabilities>,
    catalog: Catalog,
    client: Option<Arc<dyn RpcClient>>,
    last_status_change: DateTime<Utc>,
    last_error: Option<String>,
}

/// Read-only snapshot of a server record.
#[derive(Debug, Clone)]
pub struct ServerView {
    /// Server name.
    pub name: String,

    /// Transport kind.
    pub transport: TransportKind,

    /// Current status.
    pub status: ServerStatus,

    /// Whether tool calls may be routed here.
    pub usable: bool,

    /// Negotiated capabilities, if the handshake completed.
    pub capabilities: Option<ServerCapabilities>,

    /// Advertised catalog.
    pub catalog: Catalog,

    /// When the status last changed.
    pub last_status_change: DateTime<Utc>,

    /// Most recent error message, if any.
    pub last_error: Option<String>,
}

/// Outcome of inserting a server record.
pub enum InsertOutcome {
    /// A fresh `Connecting` record was created.
    Inserted,

    /// An active record already exists; its handle is returned and no
    /// second connection attempt is made.
    AlreadyActive(Arc<dyn RpcClient>),
}

impl std::fmt::Debug for InsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inserted => f.write_str("Inserted"),
            Self::AlreadyActive(_) => f.debug_tuple("AlreadyActive").finish(),
        }
    }
}

/// The registry. Shared across the connection manager, catalog fetcher,
/// and tool executor as `Arc<ServerRegistry>`.
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerRecord>>,
    events: broadcast::Sender<RegistryEvent>,
    last_sweep: Mutex<Option<Instant>>,
    sweep_interval: std::time::Duration,
}

impl ServerRegistry {
    /// Create a registry with the given minimum interval between cleanup
    /// sweeps.
    pub fn new(sweep_interval: std::time::Duration) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            events,
            last_sweep: Mutex::new(None),
            sweep_interval,
        })
    }

    /// Subscribe to registry notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Insert a fresh `Connecting` record, or return the existing handle
    /// when the name already has an active connection. This is the only
    /// built-in mutual-exclusion guarantee: concurrent adds of the same
    /// name yield exactly one record and one connection attempt.
    pub async fn insert_connecting(
        &self,
        name: &str,
        transport: TransportKind,
        config: ServerConfig,
        client: Arc<dyn RpcClient>,
    ) -> InsertOutcome {
        let mut servers = self.servers.write().await;
        if let Some(existing) = servers.get(name) {
            let terminal = matches!(
                existing.status,
                ServerStatus::Disconnected | ServerStatus::Error
            );
            if !terminal {
                if let Some(handle) = &existing.client {
                    debug!(server = name, "already registered, returning existing handle");
                    return InsertOutcome::AlreadyActive(handle.clone());
                }
            }
            // Terminal record: re-adding starts a fresh Connecting.
        }

        servers.insert(
            name.to_string(),
            ServerRecord {
                transport,
                config,
                status: ServerStatus::Connecting,
                usable: false,
                capabilities: None,
                catalog: Catalog::default(),
                client: Some(client),
                last_status_change: Utc::now(),
                last_error: None,
            },
        );
        InsertOutcome::Inserted
    }

    /// Reserve a name with a fresh `Connecting` record before any transport
    /// work happens. Returns `false` when an active record already exists,
    /// in which case the caller must not start a connection attempt.
    ///
    /// Used by transports whose construction has side effects (spawning a
    /// process): the reservation must win before the side effect runs, so
    /// concurrent adds of the same name cause exactly one attempt.
    pub async fn reserve_connecting(
        &self,
        name: &str,
        transport: TransportKind,
        config: ServerConfig,
    ) -> bool {
        let mut servers = self.servers.write().await;
        if let Some(existing) = servers.get(name) {
            let terminal = matches!(
                existing.status,
                ServerStatus::Disconnected | ServerStatus::Error
            );
            if !terminal {
                debug!(server = name, "already registered, reservation refused");
                return false;
            }
        }

        servers.insert(
            name.to_string(),
            ServerRecord {
                transport,
                config,
                status: ServerStatus::Connecting,
                usable: false,
                capabilities: None,
                catalog: Catalog::default(),
                client: None,
                last_status_change: Utc::now(),
                last_error: None,
            },
        );
        true
    }

    /// Attach the client handle to a previously reserved record.
    pub async fn attach_client(&self, name: &str, client: Arc<dyn RpcClient>) -> bool {
        let mut servers = self.servers.write().await;
        match servers.get_mut(name) {
            Some(record) => {
                record.client = Some(client);
                true
            }
            None => false,
        }
    }

    /// The single state-setter. Validates the transition against the state
    /// table, records the previous state, updates the usable flag, stamps
    /// the change time, applies auxiliary fields, and fires a
    /// status-changed notification only when new and old differ.
    ///
    /// Returns `false` for unknown servers and illegal transitions.
    pub async fn set_status(
        self: &Arc<Self>,
        name: &str,
        status: ServerStatus,
        update: StatusUpdate,
    ) -> bool {
        let previous = {
            let mut servers = self.servers.write().await;
            let Some(record) = servers.get_mut(name) else {
                warn!(server = name, "status change for unknown server ignored");
                return false;
            };

            let previous = record.status;
            if !previous.can_transition_to(status) {
                warn!(
                    server = name,
                    from = %previous,
                    to = %status,
                    "illegal status transition ignored"
                );
                return false;
            }

            record.status = status;
            record.usable = status.is_usable();
            record.last_status_change = Utc::now();
            if let Some(capabilities) = update.capabilities {
                record.capabilities = Some(capabilities);
            }
            if let Some(error) = &update.error {
                record.last_error = Some(error.clone());
            }
            previous
        };

        if let Some(error) = update.error {
            let _ = self.events.send(RegistryEvent::ServerError {
                name: name.to_string(),
                error,
            });
        }

        if previous != status {
            debug!(server = name, from = %previous, to = %status, "status changed");
            let _ = self.events.send(RegistryEvent::StatusChanged {
                name: name.to_string(),
                status,
                previous,
            });

            if status == ServerStatus::Disconnected {
                let _ = self.events.send(RegistryEvent::ServerDisconnected {
                    name: name.to_string(),
                });
                // Deferred, never synchronous: the transition must not
                // recursively mutate the registry while this notification
                // is still being dispatched.
                let registry = self.clone();
                tokio::spawn(async move {
                    registry.sweep().await;
                });
            }
        }

        true
    }

    /// Drop the client handle for a server, making its record sweepable
    /// once the status is terminal.
    pub async fn release_client(&self, name: &str) -> Option<Arc<dyn RpcClient>> {
        let mut servers = self.servers.write().await;
        servers.get_mut(name).and_then(|record| record.client.take())
    }

    /// Replace a server's catalog in one write, so readers never observe a
    /// half-updated catalog.
    pub async fn replace_catalog(&self, name: &str, catalog: Catalog) -> bool {
        let mut servers = self.servers.write().await;
        match servers.get_mut(name) {
            Some(record) => {
                record.catalog = catalog;
                true
            }
            None => false,
        }
    }

    /// Remove records that are terminal and whose client handle has been
    /// released. A `Connecting` reservation is never swept, even before its
    /// client is attached. Bursts of disconnects coalesce into one pass:
    /// the sweep is skipped unless the configured minimum interval has
    /// elapsed since the previous one.
    pub async fn sweep(&self) {
        {
            let mut last_sweep = self.last_sweep.lock().await;
            if let Some(previous) = *last_sweep {
                if previous.elapsed() < self.sweep_interval {
                    debug!("cleanup sweep coalesced");
                    return;
                }
            }
            *last_sweep = Some(Instant::now());
        }

        let mut servers = self.servers.write().await;
        let before = servers.len();
        servers.retain(|_, record| {
            record.client.is_some()
                || !matches!(
                    record.status,
                    ServerStatus::Disconnected | ServerStatus::Error
                )
        });
        let removed = before - servers.len();
        if removed > 0 {
            debug!(removed, "cleanup sweep removed stale records");
        }
    }

    /// Client handle for a server, if it is still held.
    pub async fn client(&self, name: &str) -> Option<Arc<dyn RpcClient>> {
        let servers = self.servers.read().await;
        servers.get(name).and_then(|record| record.client.clone())
    }

    /// Current status of a server.
    pub async fn status(&self, name: &str) -> Option<ServerStatus> {
        let servers = self.servers.read().await;
        servers.get(name).map(|record| record.status)
    }

    /// Whether a server may serve tool calls right now.
    pub async fn is_usable(&self, name: &str) -> bool {
        let servers = self.servers.read().await;
        servers.get(name).is_some_and(|record| record.usable)
    }

    /// Whether a name is registered at all.
    pub async fn contains(&self, name: &str) -> bool {
        let servers = self.servers.read().await;
        servers.contains_key(name)
    }

    /// Snapshot of one server.
    pub async fn view(&self, name: &str) -> Option<ServerView> {
        let servers = self.servers.read().await;
        servers.get(name).map(|record| make_view(name, record))
    }

    /// Snapshot of every registered server.
    pub async fn views(&self) -> Vec<ServerView> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .map(|(name, record)| make_view(name, record))
            .collect()
    }

    /// A server's catalog. Empty when the name is unknown, so callers may
    /// always iterate.
    pub async fn catalog(&self, name: &str) -> Catalog {
        let servers = self.servers.read().await;
        servers
            .get(name)
            .map(|record| record.catalog.clone())
            .unwrap_or_default()
    }

    /// Negotiated capabilities for a server.
    pub async fn capabilities(&self, name: &str) -> Option<ServerCapabilities> {
        let servers = self.servers.read().await;
        servers.get(name).and_then(|record| record.capabilities.clone())
    }

    /// Find a usable server whose catalog contains `tool_name`.
    ///
    /// First match wins; tool names are not globally unique and the scan
    /// order follows map iteration, so resolution between servers exposing
    /// the same name is unspecified.
    pub async fn resolve_tool(&self, tool_name: &str) -> Option<(String, ToolDescriptor)> {
        let servers = self.servers.read().await;
        for (name, record) in servers.iter() {
            if !record.usable {
                continue;
            }
            if let Some(tool) = record.catalog.tools.iter().find(|t| t.name == tool_name) {
                return Some((name.clone(), tool.clone()));
            }
        }
        None
    }

    /// Number of usable servers.
    pub async fn usable_count(&self) -> usize {
        let servers = self.servers.read().await;
        servers.values().filter(|record| record.usable).count()
    }
}

fn make_view(name: &str, record: &ServerRecord) -> ServerView {
    ServerView {
        name: name.to_string(),
        transport: record.transport,
        status: record.status,
        usable: record.usable,
        capabilities: record.capabilities.clone(),
        catalog: record.catalog.clone(),
        last_status_change: record.last_status_change,
        last_error: record.last_error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockRpcClient;
    use std::time::Duration;

    fn mock_client() -> Arc<dyn RpcClient> {
        Arc::new(MockRpcClient::new())
    }

    async fn registry_with(name: &str) -> Arc<ServerRegistry> {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        registry
            .insert_connecting(
                name,
                TransportKind::Stdio,
                ServerConfig::stdio("node"),
                mock_client(),
            )
            .await;
        registry
    }

    #[test]
    fn test_usable_flag() {
        assert!(ServerStatus::Connected.is_usable());
        assert!(ServerStatus::PartiallyConnected.is_usable());
        assert!(!ServerStatus::Connecting.is_usable());
        assert!(!ServerStatus::Disconnected.is_usable());
        assert!(!ServerStatus::Error.is_usable());
    }

    #[test]
    fn test_transition_table() {
        use ServerStatus::*;
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Error));
        assert!(!Connecting.can_transition_to(Disconnected));

        assert!(Connected.can_transition_to(PartiallyConnected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Error));
        assert!(!Connected.can_transition_to(Connecting));

        assert!(PartiallyConnected.can_transition_to(Connected));
        assert!(PartiallyConnected.can_transition_to(Disconnected));

        // Terminal states only allow self-transitions.
        assert!(!Disconnected.can_transition_to(Connecting));
        assert!(!Error.can_transition_to(Connected));
        assert!(Error.can_transition_to(Error));
    }

    #[tokio::test]
    async fn test_insert_and_status_flow() {
        let registry = registry_with("fs").await;
        assert_eq!(registry.status("fs").await, Some(ServerStatus::Connecting));
        assert!(!registry.is_usable("fs").await);

        assert!(
            registry
                .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
                .await
        );
        assert!(registry.is_usable("fs").await);
        assert_eq!(registry.usable_count().await, 1);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let registry = registry_with("fs").await;
        assert!(
            !registry
                .set_status("fs", ServerStatus::Disconnected, StatusUpdate::default())
                .await
        );
        assert_eq!(registry.status("fs").await, Some(ServerStatus::Connecting));
    }

    #[tokio::test]
    async fn test_unknown_server_rejected() {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        assert!(
            !registry
                .set_status("ghost", ServerStatus::Connected, StatusUpdate::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_duplicate_insert_returns_existing_handle() {
        let registry = registry_with("fs").await;
        let outcome = registry
            .insert_connecting(
                "fs",
                TransportKind::Stdio,
                ServerConfig::stdio("node"),
                mock_client(),
            )
            .await;
        assert!(matches!(outcome, InsertOutcome::AlreadyActive(_)));
    }

    #[tokio::test]
    async fn test_reservation_refused_while_active() {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        assert!(
            registry
                .reserve_connecting("fs", TransportKind::Stdio, ServerConfig::stdio("node"))
                .await
        );
        // Second reservation loses, even before a client is attached.
        assert!(
            !registry
                .reserve_connecting("fs", TransportKind::Stdio, ServerConfig::stdio("node"))
                .await
        );

        assert!(registry.attach_client("fs", mock_client()).await);
        assert!(
            !registry
                .reserve_connecting("fs", TransportKind::Stdio, ServerConfig::stdio("node"))
                .await
        );

        // A terminal record frees the name again.
        registry
            .set_status("fs", ServerStatus::Error, StatusUpdate::default())
            .await;
        registry.release_client("fs").await;
        assert!(
            registry
                .reserve_connecting("fs", TransportKind::Stdio, ServerConfig::stdio("node"))
                .await
        );
    }

    #[tokio::test]
    async fn test_sweep_keeps_unattached_reservation() {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        registry
            .reserve_connecting("fs", TransportKind::Stdio, ServerConfig::stdio("node"))
            .await;

        // Connecting with no client yet: must survive a sweep.
        registry.sweep().await;
        assert!(registry.contains("fs").await);
    }

    #[tokio::test]
    async fn test_terminal_record_can_be_readded() {
        let registry = registry_with("fs").await;
        registry
            .set_status("fs", ServerStatus::Error, StatusUpdate::default())
            .await;

        let outcome = registry
            .insert_connecting(
                "fs",
                TransportKind::Stdio,
                ServerConfig::stdio("node"),
                mock_client(),
            )
            .await;
        assert!(matches!(outcome, InsertOutcome::Inserted));
        assert_eq!(registry.status("fs").await, Some(ServerStatus::Connecting));
    }

    #[tokio::test]
    async fn test_status_change_notification() {
        let registry = registry_with("fs").await;
        let mut events = registry.subscribe();

        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            RegistryEvent::StatusChanged {
                name: "fs".to_string(),
                status: ServerStatus::Connected,
                previous: ServerStatus::Connecting,
            }
        );
    }

    #[tokio::test]
    async fn test_same_state_fires_no_notification() {
        let registry = registry_with("fs").await;
        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;

        let mut events = registry.subscribe();
        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_error_update_emits_server_error() {
        let registry = registry_with("fs").await;
        let mut events = registry.subscribe();

        registry
            .set_status(
                "fs",
                ServerStatus::Error,
                StatusUpdate {
                    error: Some("handshake failed".to_string()),
                    ..StatusUpdate::default()
                },
            )
            .await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            RegistryEvent::ServerError {
                name: "fs".to_string(),
                error: "handshake failed".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_schedules_sweep_of_released_records() {
        let registry = registry_with("fs").await;
        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;

        registry.release_client("fs").await;
        registry
            .set_status("fs", ServerStatus::Disconnected, StatusUpdate::default())
            .await;

        // The sweep runs as a deferred task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!registry.contains("fs").await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_records_with_live_handles() {
        let registry = registry_with("fs").await;
        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;
        registry
            .set_status("fs", ServerStatus::Disconnected, StatusUpdate::default())
            .await;

        // Handle never released: record must survive the sweep.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.contains("fs").await);
    }

    #[tokio::test]
    async fn test_sweep_coalesces_within_interval() {
        let registry = ServerRegistry::new(Duration::from_secs(3600));
        registry
            .insert_connecting(
                "a",
                TransportKind::Stdio,
                ServerConfig::stdio("node"),
                mock_client(),
            )
            .await;

        // First sweep records the timestamp.
        registry.sweep().await;

        registry
            .set_status("a", ServerStatus::Error, StatusUpdate::default())
            .await;
        registry.release_client("a").await;

        // Second sweep within the interval is a no-op.
        registry.sweep().await;
        assert!(registry.contains("a").await);
    }

    #[tokio::test]
    async fn test_catalog_atomic_replacement() {
        let registry = registry_with("fs").await;
        let catalog = Catalog {
            tools: vec![ToolDescriptor {
                name: "read_file".to_string(),
                description: None,
                input_schema: serde_json::json!({}),
            }],
            ..Catalog::default()
        };

        assert!(registry.replace_catalog("fs", catalog).await);
        let stored = registry.catalog("fs").await;
        assert_eq!(stored.tools.len(), 1);
        assert!(stored.resources.is_empty());
        assert!(stored.prompts.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_for_unknown_server_is_empty() {
        let registry = ServerRegistry::new(Duration::from_millis(10));
        let catalog = registry.catalog("ghost").await;
        assert!(catalog.tools.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_tool_skips_unusable_servers() {
        let registry = registry_with("fs").await;
        registry
            .replace_catalog(
                "fs",
                Catalog {
                    tools: vec![ToolDescriptor {
                        name: "read_file".to_string(),
                        description: None,
                        input_schema: serde_json::json!({}),
                    }],
                    ..Catalog::default()
                },
            )
            .await;

        // Still Connecting: not usable, not resolvable.
        assert!(registry.resolve_tool("read_file").await.is_none());

        registry
            .set_status("fs", ServerStatus::Connected, StatusUpdate::default())
            .await;
        let (server, tool) = registry.resolve_tool("read_file").await.unwrap();
        assert_eq!(server, "fs");
        assert_eq!(tool.name, "read_file");
    }
}
