//! Admin authorization middleware
//!
//! With an admin token configured, admin routes require
//! `Authorization: Bearer <token>`. Without one the check is disabled. Either
//! way the middleware attaches a [`Principal`] to the request extensions for
//! handlers to log against.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Caller identity attached by [`auth_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub is_admin: bool,
}

impl Principal {
    /// Principal used when admin auth is disabled
    pub fn anonymous_admin() -> Self {
        Self {
            subject: "anonymous".to_string(),
            is_admin: true,
        }
    }

    pub fn token_admin() -> Self {
        Self {
            subject: "admin".to_string(),
            is_admin: true,
        }
    }
}

/// Authentication middleware for admin routes
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = match state.admin_token.as_deref() {
        None => Principal::anonymous_admin(),
        Some(expected) => {
            let provided = bearer_token(request.headers().get(header::AUTHORIZATION))
                .ok_or(AuthError::MissingToken)?;
            if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                warn!(
                    path = %request.uri().path(),
                    "Rejected admin request with invalid token"
                );
                return Err(AuthError::InvalidToken);
            }
            Principal::token_admin()
        }
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    let value = value?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing bearer token",
            AuthError::InvalidToken => "Invalid bearer token",
        };

        let body = Json(json!({
            "success": false,
            "kind": "UNAUTHORIZED",
            "message": message,
        }));

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            body,
        )
            .into_response()
    }
}
