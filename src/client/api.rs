//! HTTP client for the auth endpoints.
//!
//! Every request other than login and registration carries the current
//! session token. A 401 on any of them clears the session through
//! [`SessionManager::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::error::ClientError;
use super::session::SessionManager;
use super::store::{Session, SessionStore};
use crate::models::{AuthResponse, ErrorBody, LoginRequest, RegisterRequest, UserProfile};

/// Bound on every request, including connection setup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<Inner>,
}

impl AuthClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, store: SessionStore) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, store, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        store: SessionStore,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::transport)?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                session: Arc::new(SessionManager::new(store)),
            }),
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Exchange credentials for a session.
    ///
    /// The exchange runs on its own task, so dropping the returned future
    /// does not lose a session the server already issued. A later login or
    /// logout supersedes it.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.spawn_exchange("api/auth/login", body, ClientError::Authentication, LOGIN_FAILED)
            .await
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Session, ClientError> {
        self.spawn_exchange(
            "api/auth/register",
            request,
            ClientError::Registration,
            REGISTRATION_FAILED,
        )
        .await
    }

    /// Always succeeds. The stored session is gone afterwards.
    pub async fn logout(&self) {
        self.inner.session.logout().await;
    }

    /// Identity of the current session as the server sees it.
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.get("api/auth/me").await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(Method::GET, path, None::<&()>).await?;
        decode(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        decode(response).await
    }

    /// Send an authenticated request. Non-success statuses other than 401
    /// come back as [`ClientError::Status`].
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let token = self.inner.session.token().await;

        let mut request = self.inner.http.request(method, url);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::transport)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.inner.session.invalidate(token.as_deref()).await;
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let message = error_message(response)
                .await
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn spawn_exchange<B>(
        &self,
        path: &'static str,
        body: B,
        rejected: fn(String) -> ClientError,
        fallback: &'static str,
    ) -> Result<Session, ClientError>
    where
        B: Serialize + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move { client.exchange(path, body, rejected, fallback).await })
            .await
            .map_err(|e| ClientError::Task(e.to_string()))?
    }

    async fn exchange<B: Serialize>(
        &self,
        path: &str,
        body: B,
        rejected: fn(String) -> ClientError,
        fallback: &str,
    ) -> Result<Session, ClientError> {
        let ticket = self.inner.session.begin().await;

        let response = self
            .inner
            .http
            .post(self.url(path)?)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), path, "Credential exchange rejected");
            let message = error_message(response)
                .await
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| fallback.to_string());
            return Err(rejected(message));
        }

        let AuthResponse { token, user } = decode(response).await?;
        let session = Session { token, user };

        if !self.inner.session.establish(session.clone(), ticket).await? {
            return Err(ClientError::Superseded);
        }

        Ok(session)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await.map_err(ClientError::transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

async fn error_message(response: Response) -> Option<String> {
    let bytes = response.bytes().await.ok()?;
    serde_json::from_slice::<ErrorBody>(&bytes)
        .ok()
        .map(|body| body.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = AuthClient::new("http://localhost:3000/irrigo", SessionStore::in_memory())
            .unwrap();
        assert_eq!(
            client.url("api/auth/login").unwrap().as_str(),
            "http://localhost:3000/irrigo/api/auth/login"
        );
        assert_eq!(
            client.url("/api/auth/me").unwrap().as_str(),
            "http://localhost:3000/irrigo/api/auth/me"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            AuthClient::new("not a url", SessionStore::in_memory()),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            AuthClient::new(&format!("http://{}", addr), SessionStore::in_memory()).unwrap();
        let err = client.login("a@b.com", "password1").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }
}
