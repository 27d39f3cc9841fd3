/// Token authentication and owner resolution

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use super::AppState;
use crate::utils::ANONYMOUS_OWNER;

/// Owner identity attached to authenticated requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

/// Static token -> owner table
#[derive(Debug, Clone, Default)]
pub struct OwnerResolver {
    tokens: HashMap<String, String>,
}

impl OwnerResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Owner for a known token
    pub fn lookup(&self, token: Option<&str>) -> Option<&str> {
        token.and_then(|t| self.tokens.get(t)).map(String::as_str)
    }

    /// Owner for a token, falling back to the anonymous owner
    pub fn resolve(&self, token: Option<&str>) -> &str {
        self.lookup(token).unwrap_or(ANONYMOUS_OWNER)
    }

    pub fn is_open(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Token from `Authorization`, accepting both "Bearer TOKEN" and bare "TOKEN"
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Require a configured token; with no tokens configured every request passes
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    if state.owners.is_open() {
        warn!("no API tokens configured, authentication disabled");
        request.extensions_mut().insert(Owner(ANONYMOUS_OWNER.to_string()));
        return Ok(next.run(request).await);
    }

    let token = bearer_token(&headers);
    match state.owners.lookup(token.as_deref()) {
        Some(owner) => {
            request.extensions_mut().insert(Owner(owner.to_string()));
            Ok(next.run(request).await)
        }
        None => Err(unauthorized_response()),
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "error": "Unauthorized - invalid or missing authentication token"
        })),
    )
        .into_response()
}

/// Generate a random secure token
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
