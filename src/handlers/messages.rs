use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::handlers::{json_body, path_id};
use crate::models::message::{CreateMessageRequest, UpdateMessageStatusRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, data, success};

pub async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let message = state.messages.create(json_body(payload)?).await?;
    Ok(created(message, "Message sent successfully").into_response())
}

pub async fn list_messages(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Response, AppError> {
    Ok(data(state.messages.list().await?).into_response())
}

pub async fn get_message(
    State(state): State<AppState>,
    _admin: AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    Ok(data(state.messages.get(path_id(id)?).await?).into_response())
}

pub async fn update_message_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateMessageStatusRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let message = state
        .messages
        .update_status(path_id(id)?, request.status)
        .await?;
    Ok(success(message, "Message status updated").into_response())
}
