//! Client error taxonomy.

use thiserror::Error;

/// Errors surfaced to code using [`AuthClient`](super::AuthClient).
/// Transport errors are normalized into these before they leave the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Login rejected. Carries the server's message or a generic one.
    #[error("{0}")]
    Authentication(String),
    /// Registration rejected. Carries the server's message or a generic one.
    #[error("{0}")]
    Registration(String),
    /// The server could not be reached or did not answer in time.
    #[error("network error: {0}")]
    Network(String),
    /// An authenticated call came back 401. The session has been cleared.
    #[error("authentication failed")]
    Unauthorized,
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("session storage error: {0}")]
    Store(#[from] StoreError),
    /// A later login, registration or logout replaced this operation.
    #[error("operation was superseded by a later session change")]
    Superseded,
    #[error("auth provider has been torn down")]
    ProviderGone,
    /// The stored session was not read in time. `AuthProvider::init` may
    /// never have been called.
    #[error("auth state did not become ready in time")]
    NotReady,
    #[error("background task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Only transport failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    pub(super) fn transport(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else if e.is_timeout() {
            ClientError::Network(format!("request timed out: {}", e))
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

/// Errors from the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("use_auth must be called within an AuthProvider scope")]
    OutsideProvider,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(ClientError::Network("timed out".into()).is_retryable());
        assert!(!ClientError::Authentication("Login failed".into()).is_retryable());
        assert!(!ClientError::Unauthorized.is_retryable());
        assert!(!ClientError::Superseded.is_retryable());
    }

    #[test]
    fn test_authentication_message_is_shown_verbatim() {
        let error = ClientError::Authentication("Invalid email or password".into());
        assert_eq!(error.to_string(), "Invalid email or password");
    }
}
