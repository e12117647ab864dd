use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::AuthUser;
use crate::handlers::json_body;
use crate::models::user::UpdateProfileRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{data, success};

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let profile = state.users.profile(user.id).await?;
    Ok(data(profile).into_response())
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let profile = state
        .users
        .update_profile(user.id, json_body(payload)?)
        .await?;
    Ok(success(profile, "Profile updated successfully").into_response())
}
