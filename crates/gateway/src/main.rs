//! ResearchEase Gateway
//!
//! The HTTP entry point for the upload and analysis service.
//! Handles:
//! - Sign-in, sign-up and sign-out
//! - File intake and the upload workflow
//! - Analysis pages
//! - Background reconciliation
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;

pub use state::AppState;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use researchease_common::{
    auth::AuthEvent,
    config::{AppConfig, ObservabilityConfig},
    errors::Result,
    metrics,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast::error::RecvError, watch};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.observability);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    info!("Starting ResearchEase Gateway v{}", researchease_common::VERSION);

    init_metrics(config.observability.metrics_port)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let reconciler_enabled = config.reconciler.enabled;
    let intake_idle = config.intake_idle_timeout();

    let state = AppState::from_config(config).await?;
    spawn_auth_event_log(&state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(
        state
            .intakes
            .clone()
            .run_sweeper(intake_idle, shutdown_rx.clone()),
    );
    let reconciler = if reconciler_enabled {
        let reconciler = state.reconciler();
        Some(tokio::spawn(async move { reconciler.run(shutdown_rx).await }))
    } else {
        info!("Reconciler disabled");
        None
    };

    let app = create_router(state)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Intake sweeper ended abnormally");
    }
    if let Some(task) = reconciler {
        if let Err(e) = task.await {
            warn!(error = %e, "Reconciler task ended abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Install the Prometheus exporter and describe every metric
fn init_metrics(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("upload_duration_seconds".to_string()),
            metrics::WORKFLOW_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("analysis_duration_seconds".to_string()),
            metrics::WORKFLOW_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Log auth state changes
fn spawn_auth_event_log(state: &AppState) {
    let mut events = state.sessions.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedIn { user }) => info!(user_id = %user.id, "Auth: signed in"),
                Ok(AuthEvent::SignedUp { user }) => info!(user_id = %user.id, "Auth: signed up"),
                Ok(AuthEvent::SignedOut { user_id }) => info!(user_id = %user_id, "Auth: signed out"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Auth event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Auth event log stopped");
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Multipart framing on top of the largest accepted file
    let body_limit = state.config.max_upload_bytes() * 2 + 64 * 1024;

    let mut intake_routes = Router::new()
        .route(
            "/v1/intake",
            get(handlers::intake::status)
                .post(handlers::intake::select_file)
                .delete(handlers::intake::reset),
        )
        .route("/v1/intake/upload", post(handlers::intake::upload))
        .layer(DefaultBodyLimit::max(body_limit));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::UploadRateLimiter::new(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        )?;
        intake_routes = intake_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Session endpoints
        .route("/v1/auth/sign-in", post(handlers::auth::sign_in))
        .route("/v1/auth/sign-up", post(handlers::auth::sign_up))
        .route("/v1/auth/sign-out", post(handlers::auth::sign_out))
        // Drop zone highlight
        .route("/v1/intake/drag", put(handlers::intake::drag))
        // Paper endpoints
        .route("/v1/papers", get(handlers::papers::list_papers))
        .route(
            "/v1/papers/{id}/analysis",
            get(handlers::papers::get_analysis).post(handlers::papers::regenerate),
        )
        // Analysis page
        .route("/analysis/{id}", get(handlers::papers::analysis_page))
        .merge(intake_routes);

    let timeout = state.config.request_timeout();

    // Compose the app
    Ok(api_routes
        .route_layer(axum::middleware::from_fn(
            middleware::metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(request_timeout(timeout))
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state))
}

/// Requests running past `timeout` are answered with 408
fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
