//! Tool request board API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::board::{
    CreateRequestDto, ListRequestsQuery, SetStatusRequest, ToolRequest, UpvoteToggleResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::state::AppState;

/// Post a request for a tool nobody lists yet
pub async fn create_request(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(dto): Json<CreateRequestDto>,
) -> ApiResult<Json<ToolRequest>> {
    let request = app_state
        .board_service
        .create_request(user.user_id, dto)
        .await?;

    Ok(Json(request))
}

/// Get a single tool request
pub async fn get_request(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ToolRequest>> {
    let request = app_state
        .board_service
        .get_request(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool request {} not found", id)))?;

    Ok(Json(request))
}

/// List tool requests, most upvoted first
pub async fn list_requests(
    State(app_state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<Vec<ToolRequest>>> {
    let requests = app_state.board_service.list_requests(query).await?;
    Ok(Json(requests))
}

/// Toggle the caller's upvote on a request
pub async fn toggle_upvote(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UpvoteToggleResponse>> {
    let response = app_state
        .board_service
        .toggle_upvote(id, user.user_id)
        .await?;

    Ok(Json(response))
}

/// Close or fulfil a request (admin only)
pub async fn set_request_status(
    State(app_state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> ApiResult<Json<ToolRequest>> {
    let updated = app_state
        .board_service
        .set_status(id, request.status)
        .await?;

    Ok(Json(updated))
}
