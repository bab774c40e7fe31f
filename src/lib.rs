pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod models;
pub mod rate_limit;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::{JwtConfig, JwtError, SigningAlgorithm};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing session tokens
    pub jwt_secret: Vec<u8>,
    /// HMAC algorithm for session tokens
    pub jwt_algorithm: SigningAlgorithm,
    /// Session token lifetime in seconds
    pub token_ttl_secs: u64,
    /// bcrypt work factor for new password hashes
    pub bcrypt_cost: u32,
    /// Per-IP limits for login and registration
    pub rate_limit: RateLimitConfig,
}

/// Errors that prevent the server from starting.
#[derive(Debug)]
pub enum ServerError {
    Jwt(JwtError),
    Io(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Jwt(e) => write!(f, "Invalid token configuration: {}", e),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<JwtError> for ServerError {
    fn from(e: JwtError) -> Self {
        ServerError::Jwt(e)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Create the application router with the given configuration.
/// Fails if the signing secret is missing.
pub fn create_app(config: &ServerConfig) -> Result<Router, ServerError> {
    let jwt = Arc::new(
        JwtConfig::with_algorithm(&config.jwt_secret, config.jwt_algorithm)?
            .with_token_duration(config.token_ttl_secs),
    );

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.bcrypt_cost,
        Arc::new(config.rate_limit.clone()),
    );

    Ok(Router::new().nest("/api", api_router))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), ServerError> {
    let app = create_app(&config)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), ServerError> {
    let app = create_app(&config)?;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, make_service).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
