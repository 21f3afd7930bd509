//! ToolShare Backend Server
//!
//! Main entry point for the ToolShare API: wires configuration, the
//! database pool, the payment and email collaborators, the domain
//! services, the HTTP router, and the background sweeps.

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::cors::{Any, CorsLayer};

use toolshare_server::auth::AuthService;
use toolshare_server::board::BoardService;
use toolshare_server::config::Config;
use toolshare_server::db;
use toolshare_server::middleware::{self, RateLimiter};
use toolshare_server::notify::EmailClient;
use toolshare_server::payments::StripeClient;
use toolshare_server::rental::{run_deposit_sweep, RentalService};
use toolshare_server::routes;
use toolshare_server::state::AppState;
use toolshare_server::tier::TierService;
use toolshare_server::tools::ToolService;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting ToolShare backend"
    );

    // Database
    let db_pool = db::create_pool(&config)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Collaborators
    let payments = Arc::new(StripeClient::new(
        config.payment_api_url.clone(),
        config.payment_secret_key.clone(),
    ));
    let notifier = Arc::new(EmailClient::new(
        config.email_api_url.clone(),
        config.email_api_key.clone(),
        config.email_from_address.clone(),
    ));

    // Domain services
    let tier_service = TierService::new(db_pool.clone());
    let rental_service = Arc::new(RentalService::new(
        db_pool.clone(),
        payments.clone(),
        notifier.clone(),
        tier_service.clone(),
        config.deposit_pence,
        config.claim_window_days,
    ));
    let tool_service = Arc::new(ToolService::new(db_pool.clone(), tier_service.clone()));
    let board_service = Arc::new(BoardService::new(db_pool.clone()));
    let auth_service = Arc::new(AuthService::new(
        db_pool.clone(),
        config.jwt_secret.clone(),
        config.session_token_ttl_seconds,
    ));

    let app_state = AppState {
        db_pool: db_pool.clone(),
        rental_service: rental_service.clone(),
        tool_service,
        board_service,
        tier_service: Arc::new(tier_service),
        auth_service,
        payments,
        webhook_secret: config.payment_webhook_secret.clone(),
        webhook_tolerance_seconds: config.webhook_tolerance_seconds,
    };

    // Rate limiter shared by the middleware and the cleanup job
    let rate_limiter = RateLimiter::new(config.rate_limit_rps);

    // Background jobs: deposit release sweep and rate-limiter cleanup
    let scheduler = JobScheduler::new()
        .await
        .expect("Failed to create job scheduler");

    let sweep_service = rental_service.clone();
    scheduler
        .add(
            Job::new_repeated_async(
                Duration::from_secs(config.deposit_sweep_interval_seconds),
                move |_id, _lock| {
                    let service = sweep_service.clone();
                    Box::pin(async move {
                        run_deposit_sweep(service).await;
                    })
                },
            )
            .expect("Failed to create deposit sweep job"),
        )
        .await
        .expect("Failed to schedule deposit sweep");

    let cleanup_limiter = rate_limiter.clone();
    scheduler
        .add(
            Job::new_repeated_async(Duration::from_secs(300), move |_id, _lock| {
                let limiter = cleanup_limiter.clone();
                Box::pin(async move {
                    limiter.cleanup(Duration::from_secs(600)).await;
                })
            })
            .expect("Failed to create rate limiter cleanup job"),
        )
        .await
        .expect("Failed to schedule rate limiter cleanup");

    scheduler.start().await.expect("Failed to start scheduler");

    // Clone for the health check closure
    let health_db_pool = db_pool.clone();

    // Router with the middleware stack
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health_check(health_db_pool.clone())))
        .merge(routes::rental_routes())
        .merge(routes::tool_routes())
        .merge(routes::board_routes())
        .merge(routes::user_routes())
        .merge(routes::webhook_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "ToolShare API Server"
}

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(pool: sqlx::PgPool) -> axum::Json<HealthResponse> {
    let db_status = match db::check_health(&pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if db_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    axum::Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(config: &Config) -> CorsLayer {
    let allowed_origins_str = config.cors_allowed_origins.clone().unwrap_or_default();

    if allowed_origins_str.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
