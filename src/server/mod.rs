//! HTTP server for the admin diagnostics endpoint.
//!
//! Routes:
//! - `POST /api/admin/diagnostics` runs one whitelisted diagnostic
//! - `GET /health` liveness probe
//! - `GET /metrics` Prometheus text, when enabled

pub mod auth;
pub mod error;
mod handler;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics;
use crate::tools::{CommandRegistry, CommandValidator, DiagnosticExecutor};
use auth::{AdminAuthenticator, BearerTokenAuthenticator};

pub use error::DiagnosticError;

/// Route of the diagnostics endpoint
pub const DIAGNOSTICS_PATH: &str = "/api/admin/diagnostics";

/// Shared, read-only state for all handlers
pub struct AppState {
    pub validator: CommandValidator,
    pub executor: DiagnosticExecutor,
    pub auth: Arc<dyn AdminAuthenticator>,
    pub expose_stderr: bool,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(
        validator: CommandValidator,
        executor: DiagnosticExecutor,
        auth: Arc<dyn AdminAuthenticator>,
    ) -> Self {
        Self {
            validator,
            executor,
            auth,
            expose_stderr: false,
            metrics_enabled: false,
        }
    }

    /// State for the built-in registry with bearer-token auth
    pub fn from_config(config: &Config) -> Self {
        Self {
            validator: CommandValidator::new(CommandRegistry::builtin()),
            executor: DiagnosticExecutor::with_config(config.executor.executor_config()),
            auth: Arc::new(BearerTokenAuthenticator::new(config.auth.admin_token.clone())),
            expose_stderr: config.executor.expose_stderr,
            metrics_enabled: config.metrics.enabled,
        }
    }

    pub fn with_expose_stderr(mut self, expose: bool) -> Self {
        self.expose_stderr = expose;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let diagnostics = post(handler::diagnostics_handler)
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), handler::admin_gate));

    let mut app = Router::new()
        .route(DIAGNOSTICS_PATH, diagnostics)
        .route("/health", get(health_handler));

    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

/// Start the diagnostics HTTP server
///
/// Serves until `shutdown` resolves.
///
/// # Errors
///
/// Fails if no admin token is configured, or if binding fails.
pub async fn serve<F>(config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if config.auth.admin_token.is_empty() {
        anyhow::bail!(
            "Refusing to start without an admin token (set auth.admin_token or ADMIN_DIAG_ADMIN_TOKEN)"
        );
    }

    metrics::init().context("Failed to initialize metrics")?;

    let addr = config.listen_addr()?;
    let app = router(Arc::new(AppState::from_config(config)));

    info!("Starting diagnostics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind diagnostics server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Diagnostics server error")?;

    info!("Diagnostics server stopped");
    Ok(())
}

fn handle_panic(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    error!("Diagnostics handler panicked");
    metrics::record_outcome("internal_error");
    error::internal_error_response()
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
