#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
};
use irrigo::{
    ServerConfig, create_app,
    db::{Database, NewUser, UserRole},
    jwt::SigningAlgorithm,
    rate_limit::RateLimitConfig,
};
use std::net::SocketAddr;

/// bcrypt's minimum cost (the crate keeps its `MIN_COST` private).
pub const BCRYPT_MIN_COST: u32 = 4;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";

/// Quotas high enough that no test trips them by accident.
pub fn relaxed_rate_limits() -> RateLimitConfig {
    RateLimitConfig::with_quotas(1000, 1000, 1000)
}

pub async fn test_db() -> Database {
    Database::open(":memory:")
        .await
        .expect("Failed to open test database")
}

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: JWT_SECRET.to_vec(),
        jwt_algorithm: SigningAlgorithm::Hs256,
        token_ttl_secs: irrigo::jwt::SESSION_TOKEN_DURATION_SECS,
        bcrypt_cost: BCRYPT_MIN_COST,
        rate_limit: relaxed_rate_limits(),
    }
}

pub async fn create_test_app() -> (axum::Router, Database) {
    let db = test_db().await;
    let app = create_app(&test_config(db.clone())).expect("Failed to build app");
    (app, db)
}

/// Insert a user directly, bypassing registration.
pub async fn seed_user(db: &Database, email: &str, password: &str, role: UserRole) -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let password_hash = bcrypt::hash(password, BCRYPT_MIN_COST).expect("Failed to hash");
    db.users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            name: "Test User",
            role,
            password_hash: &password_hash,
        })
        .await
        .expect("Failed to create user");
    uuid
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", authorization)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Running server on a random port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub db: Database,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let db = test_db().await;
        let (handle, addr) = irrigo::start_server(test_config(db.clone()), 0)
            .await
            .expect("Failed to start server");
        Self { addr, db, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
