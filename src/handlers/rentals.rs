//! Rental lifecycle API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::rental::{
    CreateRentalRequest, CreateRentalResponse, FileClaimRequest, ListRentalsQuery,
    RejectRentalRequest, Rental, ResolveClaimRequest,
};
use crate::state::AppState;

/// Create a rental request and return the checkout URL
pub async fn create_rental(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateRentalRequest>,
) -> ApiResult<Json<CreateRentalResponse>> {
    if !user.email_verified {
        return Err(ApiError::Forbidden(
            "Verify your email address before renting".to_string(),
        ));
    }

    let response = app_state
        .rental_service
        .create_rental(user.user_id, request)
        .await?;

    Ok(Json(response))
}

/// Get a single rental; only participants and admins may see it
pub async fn get_rental(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state
        .rental_service
        .get_rental(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Rental {} not found", id)))?;

    if rental.renter_id != user.user_id && rental.owner_id != user.user_id && !user.is_admin {
        return Err(ApiError::Forbidden(
            "You are not a participant in this rental".to_string(),
        ));
    }

    Ok(Json(rental))
}

/// List rentals. Non-admin callers only ever see rentals they take part
/// in, as renter by default or as owner when they filter on themselves.
pub async fn list_rentals(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(mut query): Query<ListRentalsQuery>,
) -> ApiResult<Json<Vec<Rental>>> {
    if !user.is_admin {
        if query.owner_id == Some(user.user_id) {
            query.renter_id = None;
        } else {
            query.owner_id = None;
            query.renter_id = Some(user.user_id);
        }
    }

    let rentals = app_state.rental_service.list_rentals(query).await?;

    Ok(Json(rentals))
}

/// Accept a rental request (tool owner only)
pub async fn accept_rental(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state.rental_service.accept(user.user_id, id).await?;
    Ok(Json(rental))
}

/// Reject a rental request (tool owner only); refunds before committing
pub async fn reject_rental(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRentalRequest>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state
        .rental_service
        .reject(user.user_id, id, request.reason)
        .await?;
    Ok(Json(rental))
}

/// Confirm the tool came back and open the deposit claim window
pub async fn mark_returned(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state
        .rental_service
        .mark_returned(user.user_id, id)
        .await?;
    Ok(Json(rental))
}

/// File a deposit claim (tool owner only, inside the claim window)
pub async fn file_claim(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<FileClaimRequest>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state
        .rental_service
        .file_claim(user.user_id, id, request.reason)
        .await?;
    Ok(Json(rental))
}

/// Resolve a deposit claim (admin only)
pub async fn resolve_claim(
    State(app_state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveClaimRequest>,
) -> ApiResult<Json<Rental>> {
    let rental = app_state
        .rental_service
        .resolve_claim(id, request.resolution, request.notes)
        .await?;
    Ok(Json(rental))
}
