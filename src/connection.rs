// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Connection lifecycle management across transport kinds.
//!
//! One connect routine per transport (spawned process, streamable HTTP,
//! SSE); each assembles a server record, wires failure callbacks into the
//! registry state machine, performs the handshake, and then runs the
//! post-handshake tail (readiness probe, catalog fetch) that is shared by
//! all three.
//!
//! Security validation runs before any process is spawned or URL dialed.
//! A [`ConfigError`] aborts the whole multi-server setup sequence; a
//! [`ConnectionError`] only skips that one server.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::catalog::CatalogFetcher;
use crate::client::WireClient;
use crate::config::{HubConfig, ServerConfig, Settings, TransportKind};
use crate::error::{ConfigError, ConnectError, ConnectionError};
use crate::probe::ReadinessProbe;
use crate::registry::{
    InsertOutcome, RegistryEvent, ServerRegistry, ServerStatus, ServerView, StatusUpdate,
};
use crate::rpc::{
    PromptDescriptor, ResourceDescriptor, RpcClient, ServerCapabilities, ToolDescriptor,
};
use crate::security;

/// Per-server outcome of a multi-server setup pass.
#[derive(Debug, Default)]
pub struct ConnectSummary {
    /// Servers that completed the handshake.
    pub connected: Vec<String>,

    /// Servers skipped after an ordinary connection failure.
    pub failed: Vec<(String, String)>,
}

/// Manages server connections and owns the operation surface exposed to
/// the rest of the application.
pub struct ConnectionManager {
    registry: Arc<ServerRegistry>,
    settings: Settings,
    probe: ReadinessProbe,
    fetcher: CatalogFetcher,
    // Shared with the per-child watcher tasks, which remove their own
    // entry when the process exits.
    watchers: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

impl ConnectionManager {
    /// Create a manager with its own registry.
    pub fn new(settings: Settings) -> Self {
        let registry = ServerRegistry::new(settings.sweep_interval);
        Self {
            probe: ReadinessProbe::from_settings(&settings),
            fetcher: CatalogFetcher::new(registry.clone()),
            watchers: Arc::new(Mutex::new(HashMap::new())),
            registry,
            settings,
        }
    }

    /// The shared registry, for composing with [`crate::executor::ToolExecutor`].
    pub fn registry(&self) -> Arc<ServerRegistry> {
        self.registry.clone()
    }

    /// Subscribe to status-change, error, and disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.subscribe()
    }

    /// Connect one server. Validation failures are fatal; connection
    /// failures are specific to this server.
    ///
    /// Connecting a name that already has an active record is a no-op.
    #[instrument(skip(self, config), fields(server = name))]
    pub async fn connect(&self, name: &str, config: ServerConfig) -> Result<(), ConnectError> {
        security::validate(name, &config)?;
        let kind = config.transport_kind().map_err(ConfigError::from)?;

        if let Some(status) = self.registry.status(name).await {
            if !matches!(status, ServerStatus::Disconnected | ServerStatus::Error) {
                debug!(server = name, "already registered, skipping connect");
                return Ok(());
            }
        }

        match kind {
            TransportKind::Stdio => self.connect_stdio(name, config).await?,
            TransportKind::Http => self.connect_http(name, config).await?,
            TransportKind::Sse => self.connect_sse(name, config).await?,
        }
        Ok(())
    }

    /// Connect every server in the configuration. Security failures abort
    /// the remaining attempts; ordinary connection failures are logged and
    /// skipped so the other servers still come up.
    pub async fn connect_all(&self, config: &HubConfig) -> Result<ConnectSummary, ConfigError> {
        let mut summary = ConnectSummary::default();

        let mut names: Vec<_> = config.servers.keys().cloned().collect();
        names.sort();

        for name in names {
            let server_config = config.servers[&name].clone();
            match self.connect(&name, server_config).await {
                Ok(()) => summary.connected.push(name),
                Err(ConnectError::Config(err)) => {
                    warn!(server = %name, error = %err, "security validation failed, aborting setup");
                    return Err(err);
                }
                Err(ConnectError::Connection(err)) => {
                    warn!(server = %name, error = %err, "connection failed, skipping server");
                    summary.failed.push((name, err.to_string()));
                }
            }
        }

        Ok(summary)
    }

    /// Spawned-process routine.
    ///
    /// The name is reserved in the registry before the process is spawned,
    /// so concurrent connects for the same server launch exactly one child.
    async fn connect_stdio(&self, name: &str, config: ServerConfig) -> Result<(), ConnectionError> {
        let command = config
            .command
            .clone()
            .ok_or_else(|| ConnectionError::failed(name, "stdio transport requires 'command'"))?;

        if !self
            .registry
            .reserve_connecting(name, TransportKind::Stdio, config.clone())
            .await
        {
            debug!(server = name, "connect already in flight, skipping spawn");
            return Ok(());
        }

        let mut cmd = Command::new(&command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = ConnectionError::failed(name, e.to_string());
                self.abandon_reservation(name, &err).await;
                return Err(err);
            }
        };
        let Some(stdin) = child.stdin.take() else {
            let err = ConnectionError::failed(name, "failed to capture stdin");
            self.abandon_reservation(name, &err).await;
            return Err(err);
        };
        let Some(stdout) = child.stdout.take() else {
            let err = ConnectionError::failed(name, "failed to capture stdout");
            self.abandon_reservation(name, &err).await;
            return Err(err);
        };

        let client: Arc<dyn RpcClient> = Arc::new(WireClient::stdio(
            name,
            stdin,
            stdout,
            self.settings.request_timeout,
        ));
        self.registry.attach_client(name, client.clone()).await;

        // Close callback: an unexpected process exit drives the state
        // machine; a deliberate disconnect kills the child instead.
        let (kill_tx, mut kill_rx) = oneshot::channel();
        self.watchers.lock().await.insert(name.to_string(), kill_tx);
        let registry = self.registry.clone();
        let watchers = self.watchers.clone();
        let watched = name.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = &mut kill_rx => {
                    let _ = child.kill().await;
                }
                status = child.wait() => {
                    watchers.lock().await.remove(&watched);
                    let detail = match status {
                        Ok(code) => format!("process exited: {code}"),
                        Err(err) => format!("process wait failed: {err}"),
                    };
                    warn!(server = %watched, %detail, "server process ended unexpectedly");
                    registry
                        .set_status(
                            &watched,
                            ServerStatus::Error,
                            StatusUpdate {
                                error: Some(detail),
                                ..StatusUpdate::default()
                            },
                        )
                        .await;
                }
            }
        });

        let result = self.handshake_and_finish(name, client).await;
        if result.is_err() {
            // The handshake failed; kill the child instead of leaving it
            // running against a dead record.
            if let Some(kill) = self.watchers.lock().await.remove(name) {
                let _ = kill.send(());
            }
        }
        result
    }

    /// Mark a reserved record failed before any client was attached.
    async fn abandon_reservation(&self, name: &str, err: &ConnectionError) {
        self.registry
            .set_status(
                name,
                ServerStatus::Error,
                StatusUpdate {
                    error: Some(err.to_string()),
                    ..StatusUpdate::default()
                },
            )
            .await;
    }

    /// HTTP-stream routine: custom headers and the reconnection policy are
    /// passed through to the transport.
    async fn connect_http(&self, name: &str, config: ServerConfig) -> Result<(), ConnectionError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ConnectionError::failed(name, "http transport requires 'url'"))?;

        let client: Arc<dyn RpcClient> = Arc::new(WireClient::http(
            name,
            url,
            config.expanded_headers(),
            config.reconnect.clone(),
            self.settings.request_timeout,
        )?);

        let outcome = self
            .registry
            .insert_connecting(name, TransportKind::Http, config, client.clone())
            .await;
        if matches!(outcome, InsertOutcome::AlreadyActive(_)) {
            return Ok(());
        }

        self.handshake_and_finish(name, client).await
    }

    /// SSE-stream routine: same shape as HTTP with a simpler transport
    /// construction.
    async fn connect_sse(&self, name: &str, config: ServerConfig) -> Result<(), ConnectionError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ConnectionError::failed(name, "sse transport requires 'url'"))?;

        let client: Arc<dyn RpcClient> = Arc::new(WireClient::sse(
            name,
            url,
            self.settings.request_timeout,
        )?);

        let outcome = self
            .registry
            .insert_connecting(name, TransportKind::Sse, config, client.clone())
            .await;
        if matches!(outcome, InsertOutcome::AlreadyActive(_)) {
            return Ok(());
        }

        self.handshake_and_finish(name, client).await
    }

    /// Handshake plus the post-handshake tail shared by every transport:
    /// status transition, readiness probe, catalog fetch.
    async fn handshake_and_finish(
        &self,
        name: &str,
        client: Arc<dyn RpcClient>,
    ) -> Result<(), ConnectionError> {
        match client.initialize().await {
            Ok(capabilities) => {
                self.registry
                    .set_status(
                        name,
                        ServerStatus::Connected,
                        StatusUpdate {
                            capabilities: Some(capabilities),
                            ..StatusUpdate::default()
                        },
                    )
                    .await;
            }
            Err(err) => {
                let enriched = classify_handshake_failure(name, err);
                self.registry
                    .set_status(
                        name,
                        ServerStatus::Error,
                        StatusUpdate {
                            error: Some(enriched.to_string()),
                            ..StatusUpdate::default()
                        },
                    )
                    .await;
                self.registry.release_client(name).await;
                return Err(enriched);
            }
        }

        if !self.probe.await_ready(client.as_ref(), name).await {
            // Optimistic continuation; the probe already logged a warning.
        }
        self.fetcher.refresh(name).await;
        info!(server = name, "server connected");
        Ok(())
    }

    /// Disconnect one server: close the client, release the handle, and
    /// let the deferred sweep remove the record.
    #[instrument(skip(self), fields(server = name))]
    pub async fn disconnect(&self, name: &str) {
        if let Some(kill) = self.watchers.lock().await.remove(name) {
            let _ = kill.send(());
        }
        if let Some(client) = self.registry.client(name).await {
            client.close().await;
        }
        self.registry.release_client(name).await;
        self.registry
            .set_status(name, ServerStatus::Disconnected, StatusUpdate::default())
            .await;
    }

    /// Disconnect every registered server.
    pub async fn disconnect_all(&self) {
        let names: Vec<String> = self
            .registry
            .views()
            .await
            .into_iter()
            .map(|view| view.name)
            .collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }

    /// Refresh the catalog for one server.
    pub async fn refresh_catalog(&self, name: &str) -> bool {
        self.fetcher.refresh(name).await
    }

    /// Tools advertised by a server. Empty for unknown names.
    pub async fn list_tools(&self, name: &str) -> Vec<ToolDescriptor> {
        self.registry.catalog(name).await.tools
    }

    /// Resources advertised by a server. Empty for unknown names.
    pub async fn list_resources(&self, name: &str) -> Vec<ResourceDescriptor> {
        self.registry.catalog(name).await.resources
    }

    /// Prompts advertised by a server. Empty for unknown names.
    pub async fn list_prompts(&self, name: &str) -> Vec<PromptDescriptor> {
        self.registry.catalog(name).await.prompts
    }

    /// Snapshot of every server's status.
    pub async fn get_status(&self) -> Vec<ServerView> {
        self.registry.views().await
    }

    /// Negotiated capabilities for one server.
    pub async fn server_capabilities(&self, name: &str) -> Option<ServerCapabilities> {
        self.registry.capabilities(name).await
    }

    /// Negotiated capabilities for every server that completed a handshake.
    pub async fn all_capabilities(&self) -> HashMap<String, ServerCapabilities> {
        self.registry
            .views()
            .await
            .into_iter()
            .filter_map(|view| view.capabilities.map(|caps| (view.name, caps)))
            .collect()
    }
}

/// Inspect a handshake failure for known signatures, purely to enrich the
/// diagnostic surfaced to the operator. Retry behavior never changes
/// based on these.
fn classify_handshake_failure(name: &str, err: ConnectionError) -> ConnectionError {
    if matches!(err, ConnectionError::Timeout { .. }) {
        return err;
    }

    let text = err.to_string().to_lowercase();
    if text.contains("401") || text.contains("unauthorized") || text.contains("forbidden") {
        return ConnectionError::AuthFailed {
            server: name.to_string(),
            message: err.to_string(),
        };
    }
    if text.contains("502")
        || text.contains("503")
        || text.contains("bad gateway")
        || text.contains("unavailable")
    {
        return ConnectionError::UpstreamUnavailable {
            server: name.to_string(),
            message: err.to_string(),
        };
    }
    err
}
