//! Poll endpoint: pull-based delivery for clients without a live connection.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::middleware::MaybePrincipal;
use crate::broadcast::broadcaster::{AuthDecision, AuthRequest};
use crate::broadcast::channel::Channel;
use crate::broadcast::presence::PresenceMember;
use crate::broadcast::store::PersistedBroadcastRecord;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/broadcasting/poll", post(poll))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PollRequest {
    /// Wire channel names to poll. Entries must be strings.
    #[schema(value_type = Vec<String>)]
    pub channels: Vec<Value>,
    /// Cursor from the previous poll; `None` fetches everything retained.
    #[serde(default)]
    pub last_event_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PollResponse {
    pub events: Vec<PersistedBroadcastRecord>,
    /// Cursor to present on the next poll.
    pub last_event_id: String,
    /// Member lists for authorized presence channels, keyed by wire name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<HashMap<String, Vec<PresenceMember>>>,
}

#[utoipa::path(
    post,
    path = "/broadcasting/poll",
    tag = "Broadcasting",
    request_body = PollRequest,
    responses(
        (status = 200, description = "Events since the cursor", body = PollResponse),
        (status = 400, description = "Malformed poll request", body = ApiErrorBody),
        (status = 404, description = "Active broadcaster is not poll-capable", body = ApiErrorBody),
    ),
)]
pub async fn poll(
    MaybePrincipal(principal): MaybePrincipal,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PollRequest>,
) -> Result<Json<PollResponse>, ApiError> {
    let broadcaster = state.manager.connection(None)?;
    let Some(pollable) = broadcaster.as_pollable() else {
        return Err(ApiError::not_found(
            "Polling is not supported by the active broadcast connection",
        ));
    };

    // Validate before any auth or poll work.
    let mut channels = Vec::with_capacity(body.channels.len());
    for entry in &body.channels {
        match entry.as_str() {
            Some(name) if !name.is_empty() => channels.push(name.to_string()),
            _ => {
                return Err(ApiError::validation(vec![FieldError {
                    field: "channels".to_string(),
                    message: "Channel names must be non-empty strings".to_string(),
                }]));
            }
        }
    }

    let after = match &body.last_event_id {
        None => None,
        Some(cursor) => Some(cursor.parse::<i64>().map_err(|_| {
            ApiError::validation(vec![FieldError {
                field: "last_event_id".to_string(),
                message: "Cursor must be a previously returned event id".to_string(),
            }])
        })?),
    };

    let caller_socket = state.manager.socket_id(&headers);

    // Per-channel authorization. Denied channels are dropped silently: the
    // caller receives whatever subset they are allowed to see.
    let mut authorized = Vec::new();
    for wire in channels {
        let channel = Channel::from_wire(&wire);
        let request = AuthRequest {
            channel: channel.clone(),
            principal: principal.clone(),
            socket_id: caller_socket.clone(),
        };
        match broadcaster.authorize(&request).await {
            AuthDecision::Allow { member } => authorized.push((wire, channel, member)),
            AuthDecision::Deny => {
                tracing::debug!(channel = %wire, "poll channel denied");
            }
        }
    }

    let wire_names: Vec<String> = authorized.iter().map(|(wire, _, _)| wire.clone()).collect();
    let batch = pollable.events_since(&wire_names, after).await?;

    // Don't echo the caller's own broadcasts back at them.
    let events: Vec<PersistedBroadcastRecord> = batch
        .events
        .into_iter()
        .filter(|record| match (&record.socket, &caller_socket) {
            (Some(sender), Some(caller)) => sender != caller,
            _ => true,
        })
        .collect();

    // Touch presence membership for every authorized presence channel.
    let mut presence = HashMap::new();
    if let Some(principal) = &principal {
        for (wire, channel, member) in &authorized {
            if !channel.is_presence() {
                continue;
            }
            let member = PresenceMember {
                id: principal.id.clone(),
                info: member.clone().unwrap_or_else(|| principal.member_info()),
            };
            let members = pollable.touch_presence(wire, member).await;
            presence.insert(wire.clone(), members);
        }
    }

    Ok(Json(PollResponse {
        events,
        last_event_id: batch.last_event_id.to_string(),
        presence: (!presence.is_empty()).then_some(presence),
    }))
}
