//! Session state for application code.
//!
//! An [`AuthProvider`] owns the client for the lifetime of a UI tree or
//! task. Code running inside [`AuthProvider::scope`] reaches it with
//! [`use_auth`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::api::AuthClient;
use super::error::{ClientError, ContextError};
use super::session::{AuthState, SessionEvent};
use super::store::Session;
use crate::models::{RegisterRequest, UserProfile};

tokio::task_local! {
    static CURRENT_AUTH: AuthContext;
}

/// Handle to the provider's session state and operations.
#[derive(Clone)]
pub struct AuthContext {
    client: AuthClient,
    active: Arc<AtomicBool>,
}

impl AuthContext {
    fn ensure_active(&self) -> Result<(), ClientError> {
        if self.active.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::ProviderGone)
        }
    }

    pub fn state(&self) -> AuthState {
        self.client.session().state()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state().user().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.client.session().subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.session().subscribe_events()
    }

    /// Wait until [`AuthProvider::init`] has read the stored session, for at
    /// most `timeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<AuthState, ClientError> {
        self.ensure_active()?;
        let mut rx = self.subscribe();
        let state = tokio::time::timeout(timeout, rx.wait_for(AuthState::is_ready))
            .await
            .map_err(|_| ClientError::NotReady)?
            .map_err(|_| ClientError::ProviderGone)?;
        Ok(state.clone())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        self.ensure_active()?;
        self.client.login(email, password).await
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Session, ClientError> {
        self.ensure_active()?;
        self.client.register(request).await
    }

    /// Always clears the session, even after teardown.
    pub async fn logout(&self) {
        self.client.logout().await;
    }
}

pub struct AuthProvider {
    context: AuthContext,
}

impl AuthProvider {
    /// State stays [`AuthState::Initializing`] until [`init`](Self::init).
    pub fn new(client: AuthClient) -> Self {
        Self {
            context: AuthContext {
                client,
                active: Arc::new(AtomicBool::new(true)),
            },
        }
    }

    /// Restore the stored session and become ready.
    pub async fn init(&self) -> AuthState {
        self.context.client.session().restore().await
    }

    pub fn context(&self) -> AuthContext {
        self.context.clone()
    }

    /// Run `fut` with this provider reachable through [`use_auth`].
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT_AUTH.scope(self.context.clone(), fut).await
    }

    /// End the provider. Contexts handed out earlier report
    /// [`ClientError::ProviderGone`] from login and registration from then
    /// on.
    pub fn teardown(self) {
        self.context.active.store(false, Ordering::Release);
        tracing::debug!("Auth provider torn down");
    }
}

/// The context of the enclosing [`AuthProvider::scope`].
pub fn use_auth() -> Result<AuthContext, ContextError> {
    CURRENT_AUTH
        .try_with(|context| context.clone())
        .map_err(|_| ContextError::OutsideProvider)
}
