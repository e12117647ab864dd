use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::auth::VerifiedUser;
use crate::handlers::{json_body, path_id};
use crate::models::event::{CreateEventRequest, EventListQuery, UpdateEventRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, data, empty_success, success};

pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<EventListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let page = state.events.list(query).await?;
    Ok(data(page).into_response())
}

pub async fn get_categories(State(state): State<AppState>) -> Response {
    data(state.events.categories()).into_response()
}

pub async fn get_event(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let event = state.events.get(path_id(id)?).await?;
    Ok(data(event).into_response())
}

pub async fn create_event(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let event = state.events.create(user.id, json_body(payload)?).await?;
    Ok(created(event, "Event created successfully").into_response())
}

pub async fn update_event(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let event = state
        .events
        .update(path_id(id)?, user.id, json_body(payload)?)
        .await?;
    Ok(success(event, "Event updated successfully").into_response())
}

pub async fn delete_event(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    state.events.delete(path_id(id)?, user.id).await?;
    Ok(empty_success("Event deleted successfully").into_response())
}

pub async fn get_user_events(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
) -> Result<Response, AppError> {
    let events = state.events.organizer_events(user.id).await?;
    Ok(data(events).into_response())
}
