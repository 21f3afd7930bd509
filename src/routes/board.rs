//! Tool request board route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn board_routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/:id", get(get_request))
        .route("/api/requests/:id/upvote", post(toggle_upvote))
        .route("/api/requests/:id/status", post(set_request_status))
}
