//! Per-connection session state and the process-wide session table.
//!
//! A [`SessionStore`] is built once at startup and shared by handle. Each
//! [`Session`] guards its mutable parts with one `parking_lot::RwLock`; the
//! table itself is a `DashMap`, so first-time insertion for a session id is
//! atomic even when two connections race.
//!
//! Only one connection drives a session at a time. A connection must
//! [`Session::claim`] the session before starting its coordinator; a newer
//! claim asks the current holder to step down and waits for it to do so.

pub mod persona;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::llm::{ChatMessage, Role};
use crate::core::turn::TurnState;

pub use persona::{DEFAULT_PERSONA, Persona, PersonaCatalog};

pub const DEFAULT_HISTORY_MAX_MESSAGES: usize = 6;
const MAX_SESSION_ID_LEN: usize = 128;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Invalid persona: {0}")]
    InvalidPersona(String),

    #[error("Session is busy: {0}")]
    Busy(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Accepts ids made of ASCII alphanumerics, `-`, `_` and `.`.
pub fn validate_session_id(id: &str) -> SessionResult<()> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
        return Err(SessionError::InvalidSessionId(format!(
            "length must be 1-{MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(SessionError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

// =============================================================================
// Credentials
// =============================================================================

/// Upstream capability a credential unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Stt,
    Llm,
    Tts,
    News,
    Weather,
}

impl Capability {
    /// Provider name used in user-facing messages.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Capability::Stt => "AssemblyAI",
            Capability::Llm => "Gemini",
            Capability::Tts => "Murf",
            Capability::News => "NewsAPI",
            Capability::Weather => "WeatherAPI",
        }
    }

    /// Environment variable holding the process default key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Capability::Stt => "ASSEMBLYAI_API_KEY",
            Capability::Llm => "GEMINI_API_KEY",
            Capability::Tts => "MURF_API_KEY",
            Capability::News => "NEWSAPI_KEY",
            Capability::Weather => "WEATHER_API_KEY",
        }
    }
}

/// Per-session API key overrides. Wiped from memory on drop and on close.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SessionCredentials {
    pub assemblyai: Option<String>,
    pub gemini: Option<String>,
    pub murf: Option<String>,
    pub news: Option<String>,
    pub weather: Option<String>,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("present", &self.names())
            .finish()
    }
}

impl SessionCredentials {
    pub fn get(&self, capability: Capability) -> Option<&str> {
        let value = match capability {
            Capability::Stt => &self.assemblyai,
            Capability::Llm => &self.gemini,
            Capability::Tts => &self.murf,
            Capability::News => &self.news,
            Capability::Weather => &self.weather,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Names of the overrides that are set, never their values.
    pub fn names(&self) -> Vec<&'static str> {
        [
            ("assemblyai", Capability::Stt),
            ("gemini", Capability::Llm),
            ("murf", Capability::Tts),
            ("news", Capability::News),
            ("weather", Capability::Weather),
        ]
        .into_iter()
        .filter(|(_, cap)| self.get(*cap).is_some())
        .map(|(name, _)| name)
        .collect()
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no connection attached yet
    Open,
    /// A connection is driving the session
    Active,
    /// Last connection went away
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    /// RFC 3339, UTC
    pub timestamp: String,
}

#[derive(Debug)]
struct SessionInner {
    persona: Persona,
    history: VecDeque<HistoryEntry>,
    credentials: SessionCredentials,
    turn_state: TurnState,
    status: SessionStatus,
    connections: usize,
    last_active: Instant,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    max_history: usize,
    inner: RwLock<SessionInner>,
    driver: Arc<AsyncMutex<()>>,
    /// Cancelled when a newer connection claims the session
    driver_token: parking_lot::Mutex<CancellationToken>,
    resets: watch::Sender<u64>,
}

/// Exclusive right to drive a session, held for the life of a connection.
#[derive(Debug)]
pub struct SessionLease {
    superseded: CancellationToken,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    /// Resolves once another connection has claimed the session.
    pub async fn superseded(&self) {
        self.superseded.cancelled().await
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.is_cancelled()
    }
}

/// Read-only view for inspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub persona: Persona,
    pub history: Vec<HistoryEntry>,
    pub credentials: Vec<&'static str>,
    pub turn_state: TurnState,
    pub status: SessionStatus,
    pub idle_secs: u64,
}

impl Session {
    fn new(id: String, persona: Persona, max_history: usize) -> Self {
        Self {
            id,
            max_history,
            inner: RwLock::new(SessionInner {
                persona,
                history: VecDeque::with_capacity(max_history),
                credentials: SessionCredentials::default(),
                turn_state: TurnState::Idle,
                status: SessionStatus::Open,
                connections: 0,
                last_active: Instant::now(),
            }),
            driver: Arc::new(AsyncMutex::new(())),
            driver_token: parking_lot::Mutex::new(CancellationToken::new()),
            resets: watch::Sender::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append to the rolling history, evicting the oldest entries past the
    /// window.
    pub fn append_history(&self, role: Role, text: impl Into<String>) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut inner = self.inner.write();
        inner.history.push_back(HistoryEntry {
            role,
            text: text.into(),
            timestamp,
        });
        while inner.history.len() > self.max_history {
            inner.history.pop_front();
        }
        inner.last_active = Instant::now();
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner
            .read()
            .history
            .iter()
            .map(|entry| ChatMessage {
                role: entry.role,
                text: entry.text.clone(),
            })
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn persona(&self) -> Persona {
        self.inner.read().persona.clone()
    }

    pub fn set_persona(&self, persona: Persona) {
        self.inner.write().persona = persona;
    }

    pub fn credentials(&self) -> SessionCredentials {
        self.inner.read().credentials.clone()
    }

    /// Replace the overrides. The previous values are wiped.
    pub fn set_credentials(&self, credentials: SessionCredentials) {
        let mut inner = self.inner.write();
        inner.credentials.zeroize();
        inner.credentials = credentials;
    }

    pub fn turn_state(&self) -> TurnState {
        self.inner.read().turn_state
    }

    pub fn set_turn_state(&self, state: TurnState) {
        let mut inner = self.inner.write();
        inner.turn_state = state;
        inner.last_active = Instant::now();
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().status
    }

    pub fn touch(&self) {
        self.inner.write().last_active = Instant::now();
    }

    /// Clear history and turn state; persona and credentials survive. The
    /// driving coordinator is notified and abandons its current turn.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.write();
            inner.history.clear();
            inner.turn_state = TurnState::Idle;
            inner.last_active = Instant::now();
        }
        self.resets.send_modify(|epoch| *epoch += 1);
    }

    /// Number of resets so far.
    pub fn reset_epoch(&self) -> u64 {
        *self.resets.borrow()
    }

    pub fn subscribe_resets(&self) -> watch::Receiver<u64> {
        self.resets.subscribe()
    }

    /// Take over as the driving connection. The current holder, if any, is
    /// told to step down; returns [`SessionError::Busy`] if it has not
    /// released the session within `wait`.
    pub async fn claim(&self, wait: Duration) -> SessionResult<SessionLease> {
        let superseded = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.driver_token.lock(), superseded.clone());
        previous.cancel();

        match tokio::time::timeout(wait, self.driver.clone().lock_owned()).await {
            Ok(guard) => Ok(SessionLease {
                superseded,
                _guard: guard,
            }),
            Err(_) => {
                debug!(session_id = %self.id, "Previous driver did not release the session");
                Err(SessionError::Busy(self.id.clone()))
            }
        }
    }

    /// Register a connection driving this session.
    pub fn attach(&self) {
        let mut inner = self.inner.write();
        inner.connections += 1;
        inner.status = SessionStatus::Active;
        inner.last_active = Instant::now();
    }

    /// Drop a connection. When the last one leaves the session is closed and
    /// its credentials are wiped.
    pub fn detach(&self) {
        let mut inner = self.inner.write();
        inner.connections = inner.connections.saturating_sub(1);
        if inner.connections == 0 {
            inner.status = SessionStatus::Closed;
            inner.turn_state = TurnState::Idle;
            inner.credentials.zeroize();
            inner.credentials = SessionCredentials::default();
        }
        inner.last_active = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.inner.read().last_active.elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            session_id: self.id.clone(),
            persona: inner.persona.clone(),
            history: inner.history.iter().cloned().collect(),
            credentials: inner.credentials.names(),
            turn_state: inner.turn_state,
            status: inner.status,
            idle_secs: inner.last_active.elapsed().as_secs(),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    max_history: usize,
    personas: Arc<PersonaCatalog>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX_MESSAGES, Arc::new(PersonaCatalog::default()))
    }
}

impl SessionStore {
    pub fn new(max_history: usize, personas: Arc<PersonaCatalog>) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history: max_history.max(1),
            personas,
        }
    }

    pub fn personas(&self) -> &PersonaCatalog {
        &self.personas
    }

    /// Look up `id`, creating it with the default persona on first use.
    pub fn get_or_create(&self, id: &str) -> SessionResult<Arc<Session>> {
        validate_session_id(id)?;
        let session = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %id, "Creating session");
                Arc::new(Session::new(
                    id.to_string(),
                    self.personas.default_persona(),
                    self.max_history,
                ))
            })
            .clone();
        Ok(session)
    }

    pub fn get(&self, id: &str) -> SessionResult<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn append_history(&self, id: &str, role: Role, text: impl Into<String>) -> SessionResult<()> {
        self.get(id)?.append_history(role, text);
        Ok(())
    }

    pub fn reset(&self, id: &str) -> SessionResult<()> {
        self.get(id)?.reset();
        info!(session_id = %id, "Session reset");
        Ok(())
    }

    pub fn debug_snapshot(&self, id: &str) -> SessionResult<SessionSnapshot> {
        Ok(self.get(id)?.snapshot())
    }

    /// Select a catalog persona for the session.
    pub fn set_persona(&self, id: &str, name: &str) -> SessionResult<()> {
        let persona = self
            .personas
            .get(name)
            .ok_or_else(|| SessionError::UnknownPersona(name.to_string()))?;
        self.get(id)?.set_persona(persona);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions with no attached connection that have been idle
    /// longer than `ttl`. Returns how many were removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, session| {
            let keep = session.status() == SessionStatus::Active || session.idle_for() < ttl;
            if !keep {
                debug!(session_id = %id, "Evicting idle session");
            }
            keep
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Periodically evict idle sessions until `shutdown` fires. A zero `ttl`
    /// disables eviction and returns `None`.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        ttl: Duration,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if ttl.is_zero() {
            info!("Session expiry disabled");
            return None;
        }
        let store = Arc::clone(self);
        let interval = interval.max(Duration::from_secs(1));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = store.evict_idle(ttl);
                        if evicted > 0 {
                            info!(evicted, remaining = store.len(), "Evicted idle sessions");
                        }
                    }
                }
            }
        }))
    }
}
