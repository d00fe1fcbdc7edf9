//! Bearer-token principal extraction.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::principal::Principal;
use crate::auth::session;
use crate::AppState;

/// Authenticated principal extracted from `Authorization: Bearer <token>`.
/// Rejects with 401 when the token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Principal);

/// Like [`AuthPrincipal`], but never rejects: anonymous or invalid-token
/// requests extract as `None`. Channel authorization decides what an
/// unauthenticated caller may do.
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Principal>);

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

async fn principal_from_parts(
    parts: &Parts,
    state: &AppState,
) -> Result<Option<Principal>, AuthError> {
    let Some(header) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };

    let token = header.strip_prefix("Bearer ").ok_or(AuthError {
        message: "Invalid Authorization header format",
    })?;

    session::lookup_session(state.kv.as_ref(), token)
        .await
        .map_err(|_| AuthError {
            message: "Session lookup failed",
        })
}

impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts, state).await? {
            Some(principal) => Ok(AuthPrincipal(principal)),
            None => Err(AuthError {
                message: "Missing or invalid session token",
            }),
        }
    }
}

impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Malformed headers and dead tokens degrade to anonymous.
        Ok(MaybePrincipal(
            principal_from_parts(parts, state).await.unwrap_or(None),
        ))
    }
}
