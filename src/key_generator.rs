//! Client identification for rate limiting.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};

/// Strategy for identifying a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum KeyStrategy {
    /// Use client IP address
    #[default]
    #[value(name = "ip")]
    IpAddress,
    /// Use the API key or bearer token, falling back to the IP address
    ApiToken,
}

/// Derives limiter keys from inbound requests
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    strategy: KeyStrategy,
}

impl KeyGenerator {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Limiter key for `request`.
    pub fn client_key<B>(&self, request: &Request<B>) -> String {
        if self.strategy == KeyStrategy::ApiToken {
            if let Some(token) = api_token(request.headers()) {
                return format!("token:{}", token);
            }
        }
        format!("ip:{}", client_ip(request))
    }
}

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn client_ip<B>(request: &Request<B>) -> String {
    let headers = request.headers();

    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.trim().to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn api_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let key = key.trim();
        if !key.is_empty() {
            return Some(key);
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
