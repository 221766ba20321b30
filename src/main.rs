//! Chef Agent - meal planning chat assistant
//!
//! An HTTP service running a planner/tool loop over per-thread conversation
//! state, with recipe search and a shopping list as tools.

mod api;
mod catalog;
mod config;
mod db;
mod planner;
mod rate_limit;
mod runtime;
mod shopping;
mod state_machine;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use planner::OpenAiPlanner;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chef_agent=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Initialize database
    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    // Initialize planner
    if config.llm_api_key.is_none() {
        tracing::warn!("No planner API key configured. Set LLM_API_KEY or GROQ_API_KEY.");
    }
    let planner = OpenAiPlanner::new(
        config.llm_api_key.clone(),
        config.model.clone(),
        &config.llm_base_url,
        config.limits.planner_timeout,
    )?;
    tracing::info!(
        model = %config.model,
        max_iterations = config.limits.max_iterations,
        turn_timeout_secs = config.limits.turn_timeout.as_secs(),
        rate_limit = config.rate_limit_per_minute,
        "Planner initialized"
    );

    // Create application state
    let state = AppState::init(db, Arc::new(planner), &config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Chef Agent server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.teardown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
