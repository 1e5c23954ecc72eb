//! Shared application state.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::session::{PersonaCatalog, SessionStore};
use crate::handlers::voice::{DefaultProviderFactory, ProviderFactory};

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a WebSocket connection was refused before upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// State shared by every route: configuration, the session table, the
/// provider factory and connection accounting.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionStore>,
    pub providers: Arc<dyn ProviderFactory>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, usize>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Build state with the real upstream providers.
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self::with_providers(config, Arc::new(DefaultProviderFactory::new(client))).await
    }

    /// Build state with a custom provider factory.
    pub async fn with_providers(
        config: ServerConfig,
        providers: Arc<dyn ProviderFactory>,
    ) -> Arc<Self> {
        let personas = config.persona_catalog().unwrap_or_else(|e| {
            warn!("Invalid persona configuration, using built-in persona: {}", e);
            PersonaCatalog::default()
        });
        let sessions = Arc::new(SessionStore::new(
            config.history_max_messages,
            Arc::new(personas),
        ));

        let shutdown = CancellationToken::new();
        let sweeper = config.session_idle_ttl().and_then(|ttl| {
            info!(ttl_secs = ttl.as_secs(), "Session expiry enabled");
            sessions.spawn_sweeper(ttl, config.session_sweep_interval(), shutdown.clone())
        });

        Arc::new(Self {
            config,
            sessions,
            providers,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
            shutdown,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Reserve a WebSocket slot for `ip`, honoring the per-IP and global limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let per_ip_limit = self.config.max_connections_per_ip as usize;
        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);

        let result = if *per_ip >= per_ip_limit {
            Err(ConnectionLimitError::PerIpLimitReached)
        } else {
            match self.config.max_websocket_connections {
                Some(max) => self
                    .ws_connections
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map(|_| ())
                    .map_err(|_| ConnectionLimitError::GlobalLimitReached),
                None => {
                    self.ws_connections.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        };

        match result {
            Ok(()) => *per_ip += 1,
            Err(_) if *per_ip == 0 => {
                drop(per_ip);
                self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            }
            Err(_) => {}
        }
        result
    }

    /// Return a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Some(mut count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, count| *count == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }

    /// Stop background tasks owned by the state.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions.len())
            .field("ws_connections", &self.ws_connection_count())
            .finish()
    }
}
