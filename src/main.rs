mod claim_store;
mod classifier;
mod config;
mod coordinator;
mod db;
mod errors;
mod fingerprint;
mod handlers;
mod models;
mod reaper;
mod run_ledger;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::claim_store::PgClaimStore;
use crate::classifier::{LeadClassifier, OpenAiClassifier};
use crate::config::Config;
use crate::coordinator::RequestCoordinator;
use crate::db::Database;
use crate::run_ledger::PgRunLedger;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and schema bootstrap.
/// - Settled-result cache.
/// - The classification gateway client.
/// - The claim reaper background task.
/// - HTTP routes and middleware (body limit, rate limiting, CORS).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_leadops_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and ensure the runs/claims tables
    // exist (idempotent, mirrors a fresh deployment)
    let db = Database::new(&config.database_url).await?;
    db.init_schema().await?;
    tracing::info!("Database connection pool established");

    // Settled-result cache in front of the ledger's success lookup.
    // Successful enrichments are immutable, so entries can only ever save a
    // round trip. 1 hour TTL, 100k max entries.
    let settled_cache = Cache::builder()
        .time_to_live(Duration::from_secs(3600))
        .max_capacity(100_000)
        .build();
    tracing::info!("Settled-result cache initialized");

    // Initialize the classification gateway client
    let classifier: Arc<dyn LeadClassifier> = match OpenAiClassifier::from_config(&config) {
        Ok(client) => {
            tracing::info!(
                "Classifier client initialized: {} ({})",
                config.openai_base_url,
                config.openai_model
            );
            Arc::new(client)
        }
        Err(e) => anyhow::bail!("Failed to initialize classifier client: {}", e),
    };

    let ledger = PgRunLedger::new(db.pool.clone());
    let claims = PgClaimStore::new(db.pool.clone());

    let coordinator = RequestCoordinator::new(
        Arc::new(claims),
        Arc::new(ledger.clone()),
        classifier.clone(),
        settled_cache,
        config.retry_after_secs,
    );

    // Reconcile claims orphaned by a crash between the claim and its
    // terminal ledger write
    reaper::spawn_claim_reaper(
        db.pool.clone(),
        Duration::from_secs(config.reaper_interval_secs),
        Duration::from_secs(config.claim_grace_secs),
    );
    tracing::info!(
        "Claim reaper started (interval: {}s, grace: {}s)",
        config.reaper_interval_secs,
        config.claim_grace_secs
    );

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        coordinator,
        ledger,
        classifier,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/enrich-lead", post(handlers::enrich_lead))
        .route("/runs", get(handlers::list_runs).post(handlers::create_run))
        .route(
            "/runs/:id",
            get(handlers::get_run)
                .put(handlers::update_run)
                .delete(handlers::delete_run),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
