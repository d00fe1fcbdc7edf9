//! Channel authorization and socket-association endpoints.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use beacon_common::id::{prefix, prefixed_ulid};

use crate::auth::middleware::{AuthPrincipal, MaybePrincipal};
use crate::auth::session;
use crate::broadcast::broadcaster::{AuthDecision, AuthRequest};
use crate::broadcast::channel::Channel;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/broadcasting/auth", post(authenticate))
        .route("/broadcasting/socket", post(remember_socket))
}

// ---------------------------------------------------------------------------
// POST /broadcasting/auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Wire channel name, e.g. `presence-room.7`.
    pub channel_name: String,
    #[serde(default)]
    pub socket_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeResponse {
    pub granted: bool,
    pub channel: String,
    /// Presence member info when a presence channel was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub member: Option<Value>,
}

#[utoipa::path(
    post,
    path = "/broadcasting/auth",
    tag = "Broadcasting",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Subscription authorized", body = AuthorizeResponse),
        (status = 403, description = "Subscription denied", body = ApiErrorBody),
    ),
)]
pub async fn authenticate(
    MaybePrincipal(principal): MaybePrincipal,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    if body.channel_name.is_empty() {
        return Err(ApiError::validation(vec![FieldError {
            field: "channel_name".to_string(),
            message: "Channel name is required".to_string(),
        }]));
    }

    let channel = Channel::from_wire(&body.channel_name);

    // Guarded channels always require an authenticated principal, regardless
    // of which backend is active.
    if channel.requires_auth() && principal.is_none() {
        return Err(ApiError::forbidden("Channel authorization denied"));
    }

    let broadcaster = state.manager.connection(None)?;
    let socket_id = body.socket_id.or_else(|| state.manager.socket_id(&headers));

    let request = AuthRequest {
        channel,
        principal,
        socket_id,
    };

    match broadcaster.authorize(&request).await {
        AuthDecision::Allow { member } => Ok(Json(AuthorizeResponse {
            granted: true,
            channel: body.channel_name,
            member,
        })),
        AuthDecision::Deny => Err(ApiError::forbidden("Channel authorization denied")),
    }
}

// ---------------------------------------------------------------------------
// POST /broadcasting/socket
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RememberSocketRequest {
    /// Caller-supplied socket id; one is minted when absent.
    #[serde(default)]
    pub socket_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RememberSocketResponse {
    pub socket_id: String,
}

/// Associate the caller's live connection id with their session so later
/// broadcasts can exclude the sender.
pub async fn remember_socket(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Json(body): Json<RememberSocketRequest>,
) -> Result<(StatusCode, Json<RememberSocketResponse>), ApiError> {
    let socket_id = match body.socket_id {
        Some(id) if !id.is_empty() => id,
        _ => prefixed_ulid(prefix::SOCKET),
    };

    session::store_socket(state.kv.as_ref(), &principal.id, &socket_id).await?;

    Ok((
        StatusCode::OK,
        Json(RememberSocketResponse { socket_id }),
    ))
}
