//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::AuthService;
use crate::board::BoardService;
use crate::payments::PaymentProvider;
use crate::rental::RentalService;
use crate::tier::TierService;
use crate::tools::ToolService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub rental_service: Arc<RentalService>,
    pub tool_service: Arc<ToolService>,
    pub board_service: Arc<BoardService>,
    pub tier_service: Arc<TierService>,
    pub auth_service: Arc<AuthService>,
    pub payments: Arc<dyn PaymentProvider>,
    /// Webhook signing secret shared with the payment provider
    pub webhook_secret: Option<String>,
    /// Tolerated webhook timestamp skew in seconds
    pub webhook_tolerance_seconds: i64,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<RentalService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.rental_service.clone()
    }
}

impl FromRef<AppState> for Arc<ToolService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.tool_service.clone()
    }
}

impl FromRef<AppState> for Arc<BoardService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.board_service.clone()
    }
}

impl FromRef<AppState> for Arc<TierService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.tier_service.clone()
    }
}
