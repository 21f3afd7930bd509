//! User profile API handlers

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::UserResponse;
use crate::state::AppState;

/// Get the calling user's profile, including their effective tier
pub async fn get_me(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<UserResponse>> {
    let profile = app_state.auth_service.load_user(user.user_id).await?;

    Ok(Json(profile.into()))
}
