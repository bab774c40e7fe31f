//! Client IP extraction.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, extract::Request};

/// Peer address of the connection, if the server was started with connect info.
pub fn client_ip<B>(request: &Request<B>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
