pub mod auth;
pub mod health;
pub mod poll;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(poll::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::authenticate,
        poll::poll,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Broadcast types
            crate::broadcast::store::PersistedBroadcastRecord,
            crate::broadcast::presence::PresenceMember,
            // Route request/response types
            auth::AuthorizeRequest,
            auth::AuthorizeResponse,
            auth::RememberSocketRequest,
            auth::RememberSocketResponse,
            poll::PollRequest,
            poll::PollResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Broadcasting", description = "Channel authorization and polling"),
    )
)]
pub struct ApiDoc;
