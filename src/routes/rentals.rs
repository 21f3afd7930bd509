//! Rental route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn rental_routes() -> Router<AppState> {
    Router::new()
        .route("/api/rentals", post(create_rental).get(list_rentals))
        .route("/api/rentals/:id", get(get_rental))
        .route("/api/rentals/:id/accept", post(accept_rental))
        .route("/api/rentals/:id/reject", post(reject_rental))
        .route("/api/rentals/:id/return", post(mark_returned))
        .route("/api/rentals/:id/claim", post(file_claim))
        .route("/api/rentals/:id/claim/resolve", post(resolve_claim))
}
