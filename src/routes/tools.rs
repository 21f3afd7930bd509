//! Tool listing route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn tool_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tools", post(create_tool).get(list_tools))
        .route(
            "/api/tools/:id",
            get(get_tool).put(update_tool).delete(delete_tool),
        )
}
