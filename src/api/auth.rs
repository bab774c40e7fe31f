//! Login, registration and identity endpoints.
//!
//! Login and registration are public and rate limited. `/me` sits behind
//! [`require_auth`].

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::{Arc, OnceLock};

use super::error::{ApiError, ResultExt};
use crate::auth::{AnyRole, Auth, require_auth};
use crate::db::{Database, NewUser, UserRole};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, UserProfile};
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only looks at the first 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub bcrypt_cost: u32,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let protected_router = Router::new()
        .route("/me", get(me))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            require_auth,
        ));

    Router::new()
        .merge(login_router)
        .merge(register_router)
        .merge(protected_router)
}

/// Hash compared against when the email is unknown, so both failure paths
/// spend the same time in bcrypt.
fn dummy_hash(cost: u32) -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| bcrypt::hash("irrigo-dummy-password", cost).ok())
        .as_deref()
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .internal_err("Password verification task failed")?
        .internal_err("Password verification failed")
}

async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Password hashing failed")
}

fn issue(state: &AuthState, user: UserProfile) -> Result<AuthResponse, ApiError> {
    let token = state
        .jwt
        .generate_session_token(&user)
        .internal_err("Failed to generate session token")?;

    Ok(AuthResponse {
        token: token.token,
        user,
    })
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();

    let user = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user else {
        if let Some(hash) = dummy_hash(state.bcrypt_cost) {
            let _ = verify_password(payload.password, hash.to_string()).await;
        }
        tracing::warn!("Login failed: unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        tracing::warn!(user = %user.uuid, "Login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let response = issue(&state, UserProfile::from(&user))?;
    tracing::info!(user = %user.uuid, "User logged in");

    Ok(Json(response))
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), ApiError> {
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Email cannot be longer than {} characters",
            MAX_EMAIL_LENGTH
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ApiError::bad_request("Email address is invalid")),
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Name cannot be longer than {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if payload.password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::bad_request(format!(
            "Password cannot be longer than {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }

    Ok(())
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&payload)?;

    let email = payload.email.trim();
    let name = payload.name.trim();

    let available = state
        .db
        .users()
        .is_email_available(email)
        .await
        .db_err("Failed to check email availability")?;

    if !available {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = hash_password(payload.password, state.bcrypt_cost).await?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let created = state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            name,
            role: UserRole::Viewer,
            password_hash: &password_hash,
        })
        .await;

    if let Err(e) = created {
        // Lost a race against a concurrent registration for the same email.
        if e
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation())
        {
            return Err(ApiError::conflict("Email is already registered"));
        }
        return Err(ApiError::db_error("Failed to create user", e));
    }

    let response = issue(
        &state,
        UserProfile {
            id: uuid.clone(),
            email: email.to_string(),
            name: name.to_string(),
            role: UserRole::Viewer,
        },
    )?;
    tracing::info!(user = %uuid, "User registered");

    Ok((StatusCode::CREATED, Json(response)))
}

/// Identity of the caller, straight from the validated token.
async fn me(auth: Auth<AnyRole>) -> Json<UserProfile> {
    Json(auth.context.profile())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration(&request("a@b.com", "password1", "Alice")).is_ok());
    }

    #[test]
    fn test_registration_rejects_bad_email() {
        assert!(validate_registration(&request("", "password1", "Alice")).is_err());
        assert!(validate_registration(&request("alice", "password1", "Alice")).is_err());
        assert!(validate_registration(&request("@b.com", "password1", "Alice")).is_err());
        assert!(validate_registration(&request("a@", "password1", "Alice")).is_err());
    }

    #[test]
    fn test_registration_rejects_bad_password() {
        assert!(validate_registration(&request("a@b.com", "short", "Alice")).is_err());
        let long = "x".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(validate_registration(&request("a@b.com", &long, "Alice")).is_err());
    }

    #[test]
    fn test_registration_rejects_blank_name() {
        assert!(validate_registration(&request("a@b.com", "password1", "   ")).is_err());
        let long = "n".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_registration(&request("a@b.com", "password1", &long)).is_err());
    }
}
