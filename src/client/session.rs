//! In-memory session state kept in step with the [`SessionStore`].
//!
//! Every mutation goes through one async mutex, so the durable store and the
//! exposed [`AuthState`] are never more than one operation apart.

use tokio::sync::{Mutex, broadcast, watch};

use super::error::StoreError;
use super::store::{Session, SessionStore};
use crate::models::UserProfile;

/// Whether a user is signed in, once initialization has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated(UserProfile),
    Anonymous,
}

/// Lifecycle of the exposed authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Stored session not yet read.
    Initializing,
    Ready(SessionStatus),
}

impl AuthState {
    pub fn is_ready(&self) -> bool {
        matches!(self, AuthState::Ready(_))
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            AuthState::Ready(SessionStatus::Authenticated(user)) => Some(user),
            _ => None,
        }
    }
}

/// Session changes consumers may react to, e.g. by navigating to a login
/// screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(UserProfile),
    /// Explicit logout.
    LoggedOut,
    /// The server rejected the session token.
    Invalidated,
}

const EVENT_CAPACITY: usize = 16;

/// Marks the start of a session-changing operation. Only the most recent
/// ticket may establish a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

struct Inner {
    session: Option<Session>,
    generation: u64,
}

pub struct SessionManager {
    store: SessionStore,
    inner: Mutex<Inner>,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: SessionStore) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            inner: Mutex::new(Inner {
                session: None,
                generation: 0,
            }),
            state,
            events,
        }
    }

    /// Load the stored session and leave `Initializing`. Never fails: an
    /// unreadable store means anonymous.
    pub async fn restore(&self) -> AuthState {
        let mut inner = self.inner.lock().await;
        if self.state.borrow().is_ready() {
            return self.state.borrow().clone();
        }

        inner.session = self
            .with_store(|store| Ok(store.restore()))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read stored session");
                None
            });
        let state = AuthState::Ready(match &inner.session {
            Some(session) => {
                tracing::debug!(user = %session.user.id, "Restored stored session");
                SessionStatus::Authenticated(session.user.clone())
            }
            None => SessionStatus::Anonymous,
        });
        self.state.send_replace(state.clone());
        state
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.token.clone())
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Start a session-changing operation. Any operation begun earlier can
    /// no longer establish its result.
    pub async fn begin(&self) -> Ticket {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        Ticket(inner.generation)
    }

    /// Persist and expose a freshly issued session.
    ///
    /// Returns `Ok(false)` without touching anything when `ticket` has been
    /// superseded.
    pub async fn establish(&self, session: Session, ticket: Ticket) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.generation != ticket.0 {
            tracing::debug!("Discarding superseded session result");
            return Ok(false);
        }

        let stored = session.clone();
        self.with_store(move |store| store.persist(&stored)).await?;

        let user = session.user.clone();
        inner.session = Some(session);
        self.state
            .send_replace(AuthState::Ready(SessionStatus::Authenticated(user.clone())));
        tracing::info!(user = %user.id, "Session established");
        let _ = self.events.send(SessionEvent::LoggedIn(user));
        Ok(true)
    }

    /// Clear the session on explicit logout. Also supersedes any login in
    /// flight.
    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        let had_session = inner.session.take().is_some();
        self.clear_store().await;
        self.state
            .send_replace(AuthState::Ready(SessionStatus::Anonymous));
        if had_session {
            tracing::info!("Logged out");
        }
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Drop the session after the server rejected `token`.
    ///
    /// Only acts when `token` is still the current one, so a burst of
    /// rejections for the same session invalidates it once. A login already
    /// in flight is left to complete. Returns whether the session was
    /// invalidated.
    pub async fn invalidate(&self, token: Option<&str>) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(token) = token else {
            return false;
        };
        if inner.session.as_ref().map(|s| s.token.as_str()) != Some(token) {
            return false;
        }

        inner.session = None;
        self.clear_store().await;
        self.state
            .send_replace(AuthState::Ready(SessionStatus::Anonymous));
        tracing::warn!("Session rejected by server, signed out");
        let _ = self.events.send(SessionEvent::Invalidated);
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Run a store operation on the blocking pool. File-backed stores do
    /// synchronous I/O.
    async fn with_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SessionStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn clear_store(&self) {
        if let Err(e) = self.with_store(|store| store.clear()).await {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
    }
}
