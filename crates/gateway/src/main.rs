//! litgraph API Gateway
//!
//! The HTTP surface over the recommendation pipeline.
//! Handles:
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use litgraph_common::{
    bibliography::OpenAlexClient,
    cache::{Cache, CacheConfig},
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    llm::create_generator,
    metrics,
};
use litgraph_recommender::{Orchestrator, RecommendationCache};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::rate_limit::{rate_limit_middleware, RateLimit};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::Notify};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
    /// Recommendation store, pinged by the readiness probe
    pub cache: Arc<dyn RecommendationCache>,
    pub generative_model: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().json().init();
            error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    let config = Arc::new(config);

    init_tracing(&config.observability);
    info!("Starting litgraph API Gateway v{}", litgraph_common::VERSION);

    init_metrics(&config.observability)?;

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        info!("Applying migrations...");
        db.migrate().await?;
    }
    let repository = Arc::new(Repository::new(db));

    // Bibliographic lookups are cached when Redis is available
    let lookup_cache = if config.redis.enabled {
        match Cache::new(CacheConfig::from(&config.redis)).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, bibliographic lookups will not be cached");
                None
            }
        }
    } else {
        None
    };

    let index = Arc::new(OpenAlexClient::new(&config.bibliography, lookup_cache)?);
    let generator = create_generator(&config.generative)?;
    let generative_model = generator.model_name().to_string();

    let orchestrator = Orchestrator::new(
        repository.clone(),
        generator,
        index,
        repository.clone(),
        &config,
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        orchestrator: Arc::new(orchestrator),
        cache: repository,
        generative_model,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown = Arc::new(Notify::new());
    let signalled = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.notify_one();
        })
        .into_future();

    match with_drain_deadline(server, shutdown, config.shutdown_timeout()).await {
        Some(result) => {
            result?;
            info!("Server shutdown complete");
        }
        None => warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Shutdown timeout elapsed, dropping open connections"
        ),
    }

    Ok(())
}

/// JSON or human logs, filtered by `RUST_LOG` or the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .install()?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Suggestion endpoints
        .route("/nodes/{id}/suggestions", post(handlers::suggestions::suggest))
        .route("/nodes/{id}/suggestions/from-base", post(handlers::suggestions::suggest_from_base))
        .route("/nodes/{id}/suggestions/latest", get(handlers::suggestions::latest))

        // Graph endpoints
        .route("/nodes/{id}/subgraph", get(handlers::graph::subgraph));

    if let Some(limit) = RateLimit::from_config(&state.config.rate_limit) {
        api_routes = api_routes.layer(from_fn_with_state(limit, rate_limit_middleware));
    }

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
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
            Ok(mut stream) => {
                stream.recv().await;
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

/// Run the server until it drains, or until `deadline` has passed since shutdown was signalled
async fn with_drain_deadline<F: Future>(
    server: F,
    shutdown: Arc<Notify>,
    deadline: Duration,
) -> Option<F::Output> {
    let expired = async {
        shutdown.notified().await;
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        output = server => Some(output),
        _ = expired => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_deadline_cuts_off_stuck_connections() {
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();

        let outcome = with_drain_deadline(
            std::future::pending::<()>(),
            shutdown,
            Duration::from_millis(20),
        )
        .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_drained_server_returns_its_result() {
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();

        let outcome = with_drain_deadline(
            async { 42 },
            shutdown,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome, Some(42));
    }

    #[tokio::test]
    async fn test_deadline_only_runs_after_shutdown_signal() {
        let server = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "done"
        };

        let outcome = with_drain_deadline(server, Arc::new(Notify::new()), Duration::from_millis(1)).await;
        assert_eq!(outcome, Some("done"));
    }
}
