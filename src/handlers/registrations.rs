use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::auth::{AuthUser, VerifiedUser};
use crate::handlers::{json_body, path_id};
use crate::models::registration::{CancelRegistrationRequest, RegistrationState, VerifyTicketRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, data, success};

pub async fn register_for_event(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let registration = state
        .registrations
        .register(path_id(event_id)?, user.id)
        .await?;
    Ok(created(registration, "Successfully registered for event").into_response())
}

/// The body is optional; a missing reason falls back to the default one.
pub async fn cancel_registration(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    event_id: Result<Path<Uuid>, PathRejection>,
    payload: Option<Json<CancelRegistrationRequest>>,
) -> Result<Response, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let registration = state
        .registrations
        .cancel(path_id(event_id)?, user.id, reason)
        .await?;
    Ok(success(registration, "Registration cancelled successfully").into_response())
}

pub async fn get_user_registrations(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
) -> Result<Response, AppError> {
    let registrations = state.registrations.user_registrations(user.id).await?;
    Ok(data(registrations).into_response())
}

pub async fn get_event_attendees(
    State(state): State<AppState>,
    user: AuthUser,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let attendees = state
        .registrations
        .event_registrations(path_id(event_id)?, user.id)
        .await?;
    Ok(data(attendees).into_response())
}

pub async fn get_registration_status(
    State(state): State<AppState>,
    user: AuthUser,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let is_registered = state
        .registrations
        .is_registered(path_id(event_id)?, user.id)
        .await?;
    Ok(data(RegistrationState { is_registered }).into_response())
}

pub async fn get_registration_stats(
    State(state): State<AppState>,
    user: AuthUser,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let stats = state
        .registrations
        .stats(path_id(event_id)?, user.id)
        .await?;
    Ok(data(stats).into_response())
}

/// Scanning staff only need to be signed in. Rejected tickets are still a
/// successful request; the outcome is in `valid`.
pub async fn verify_ticket(
    State(state): State<AppState>,
    _user: AuthUser,
    payload: Result<Json<VerifyTicketRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    if request.ticket_code.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Ticket code is required".to_string(),
        ));
    }

    let outcome = state.registrations.verify_ticket(&request.ticket_code).await?;
    Ok(data(outcome).into_response())
}
