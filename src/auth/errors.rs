//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::ErrorBody;

/// Why a request was rejected. Distinguishable in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NoToken,
    InvalidToken,
    ExpiredToken,
    InsufficientRole,
}

/// API authentication error. Every token failure collapses to the same
/// 401 body; only role failures are reported differently.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NoToken | AuthErrorKind::InvalidToken | AuthErrorKind::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NoToken | AuthErrorKind::InvalidToken | AuthErrorKind::ExpiredToken => {
                "Authentication failed"
            }
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorBody {
                message: self.message().to_string(),
            }),
        )
            .into_response()
    }
}
