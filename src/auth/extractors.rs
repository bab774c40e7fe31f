//! Authentication middleware and axum extractors.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::bearer::extract_bearer_token;
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::RequestContext;
use crate::db::UserRole;
use crate::jwt::{JwtConfig, JwtError};

/// Core authentication logic shared by the middleware and the extractors.
pub fn authenticate(headers: &HeaderMap, jwt: &JwtConfig) -> Result<RequestContext, AuthErrorKind> {
    let token = extract_bearer_token(headers).ok_or(AuthErrorKind::NoToken)?;

    let claims = jwt.validate_session_token(token).map_err(|e| match e {
        JwtError::Expired => AuthErrorKind::ExpiredToken,
        _ => AuthErrorKind::InvalidToken,
    })?;

    Ok(RequestContext { claims })
}

/// Middleware guarding protected routes.
///
/// On success the decoded [`RequestContext`] is inserted into the request
/// extensions. On failure the request never reaches the handler.
pub async fn require_auth(
    State(jwt): State<Arc<JwtConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &jwt) {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(kind) => {
            tracing::debug!(
                reason = ?kind,
                path = %request.uri().path(),
                "Rejected unauthenticated request"
            );
            ApiAuthError::new(kind).into_response()
        }
    }
}

// =============================================================================
// Role constraints
// =============================================================================

/// Authorization rule checked after authentication succeeds.
pub trait RoleConstraint {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Administrators only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// Extractor for handlers that require an authenticated user with a role
/// satisfying `R`.
///
/// Uses the context stored by [`require_auth`] when the route is behind it,
/// otherwise validates the bearer token itself.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub context: RequestContext,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = match parts.extensions.get::<RequestContext>() {
            Some(context) => context.clone(),
            None => authenticate(&parts.headers, state.jwt()).inspect_err(|kind| {
                tracing::debug!(reason = ?kind, "Rejected unauthenticated request");
            })?,
        };

        if !R::allows(context.role()) {
            tracing::debug!(
                user = %context.user_id(),
                role = context.role().as_str(),
                "Rejected request with insufficient role"
            );
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth {
            context,
            _role: PhantomData,
        })
    }
}
