//! Runtime for executing turns
//!
//! Wires the pure state machine to storage, the planner and the tools.

mod executor;
mod thread_lock;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Orchestrator, TurnLimits, TurnOutcome, TurnRequest};
pub use thread_lock::{ThreadGuard, ThreadLocks};
pub use traits::*;

use crate::planner::LoggingPlanner;
use crate::tools::ToolGateway;
use std::sync::Arc;

/// Type alias for the production orchestrator with concrete implementations
pub type ProductionOrchestrator =
    Orchestrator<DatabaseStorage, Arc<LoggingPlanner>, Arc<ToolGateway<DatabaseStorage>>>;
