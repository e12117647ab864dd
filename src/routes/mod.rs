use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{events, health_check, messages, registrations, users};
use crate::state::AppState;

fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(events::list_events).post(events::create_event))
        .route("/categories", get(events::get_categories))
        .route("/user/events", get(events::get_user_events))
        .route(
            "/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
}

fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/verify-ticket", post(registrations::verify_ticket))
        .route("/user/my-events", get(registrations::get_user_registrations))
        .route(
            "/:event_id",
            post(registrations::register_for_event).delete(registrations::cancel_registration),
        )
        .route("/:event_id/attendees", get(registrations::get_event_attendees))
        .route("/:event_id/status", get(registrations::get_registration_status))
        .route("/:event_id/stats", get(registrations::get_registration_stats))
}

fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(messages::create_message).get(messages::list_messages))
        .route("/:id", get(messages::get_message))
        .route("/:id/status", patch(messages::update_message_status))
}

fn user_routes() -> Router<AppState> {
    Router::new().route(
        "/profile",
        get(users::get_profile).patch(users::update_profile),
    )
}

pub fn create_routes(state: AppState) -> Router {
    let cors = create_cors_layer(state.config.cors_allowed_origins.as_deref());
    let security = create_security_headers_layer(state.config.production);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            user_id = Empty,
        )
    });

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/events", event_routes())
        .nest("/api/registrations", registration_routes())
        .nest("/api/messages", message_routes())
        .nest("/api/user", user_routes())
        .layer(trace)
        .layer(security)
        .layer(cors)
        .with_state(state)
}
