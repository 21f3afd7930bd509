//! Tool listing API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::Tool;
use crate::state::AppState;
use crate::tools::{CreateToolRequest, ListToolsQuery, UpdateToolRequest};

/// List a new tool
pub async fn create_tool(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateToolRequest>,
) -> ApiResult<Json<Tool>> {
    if !user.email_verified {
        return Err(ApiError::Forbidden(
            "Verify your email address before listing tools".to_string(),
        ));
    }

    let tool = app_state
        .tool_service
        .create_tool(user.user_id, request)
        .await?;

    Ok(Json(tool))
}

/// Get a single tool listing
pub async fn get_tool(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tool>> {
    let tool = app_state
        .tool_service
        .get_tool(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool {} not found", id)))?;

    Ok(Json(tool))
}

/// List tools with filtering and pagination
pub async fn list_tools(
    State(app_state): State<AppState>,
    Query(query): Query<ListToolsQuery>,
) -> ApiResult<Json<Vec<Tool>>> {
    let tools = app_state.tool_service.list_tools(query).await?;
    Ok(Json(tools))
}

/// Update a tool listing (owner only)
pub async fn update_tool(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateToolRequest>,
) -> ApiResult<Json<Tool>> {
    let tool = app_state
        .tool_service
        .update_tool(user.user_id, id, request)
        .await?;

    Ok(Json(tool))
}

/// Soft-delete a tool listing (owner only)
pub async fn delete_tool(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    app_state.tool_service.delete_tool(user.user_id, id).await?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}
