//! Events that can occur during a turn

use crate::planner::{PlannerDecision, PlannerError};
use crate::tools::{ToolError, ToolOutput};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Planner events
    PlanReady {
        decision: PlannerDecision,
    },
    PlanFailed {
        error: PlannerError,
    },

    // Tool events
    ToolFinished {
        call_id: String,
        result: Result<ToolOutput, ToolError>,
    },

    // Store events
    Persisted,
    PersistFailed {
        message: String,
    },

    /// The turn's wall-clock budget ran out
    DeadlineElapsed,
}
