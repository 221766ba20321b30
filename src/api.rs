//! HTTP API for the meal planning assistant

mod handlers;
mod middleware;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::Config;
use crate::db::Database;
use crate::planner::{LoggingPlanner, Planner};
use crate::rate_limit::RateLimiter;
use crate::runtime::{DatabaseStorage, Orchestrator, ProductionOrchestrator};
use crate::system_prompt::Language;
use crate::tools::ToolGateway;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Process-scoped state shared across handlers.
///
/// Created once by [`AppState::init`] on startup and released by
/// [`AppState::teardown`] on shutdown.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProductionOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub default_language: Language,
    shutdown: CancellationToken,
}

impl AppState {
    /// Wire storage, planner and tools, and start background tasks
    pub fn init(db: Database, planner: Arc<dyn Planner>, config: &Config) -> Self {
        let storage = DatabaseStorage::new(db, config.store_retry_attempts);
        let tools = Arc::new(ToolGateway::new(storage.clone()));
        let planner = Arc::new(LoggingPlanner::new(planner));
        let orchestrator = Orchestrator::new(storage, planner, tools, config.limits.clone());

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        let shutdown = CancellationToken::new();
        rate_limiter.spawn_sweeper(shutdown.child_token());

        Self {
            orchestrator: Arc::new(orchestrator),
            rate_limiter,
            default_language: config.default_language,
            shutdown,
        }
    }

    /// Stop background tasks
    pub fn teardown(&self) {
        tracing::info!("Shutting down application state");
        self.shutdown.cancel();
    }
}
