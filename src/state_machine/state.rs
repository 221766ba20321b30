//! Turn state types

use crate::planner::PlannerErrorKind;
use crate::tools::ToolCall;
use std::fmt;

/// Static context for one turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub thread_id: String,
    /// Maximum tool calls per turn
    pub max_iterations: u32,
}

impl TurnContext {
    pub fn new(thread_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_iterations,
        }
    }
}

/// Phase of a turn.
///
/// `iteration` counts tool calls made so far this turn. `attempt` is 1 for a
/// first try and 2 for the single permitted retry.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    Planning {
        iteration: u32,
        attempt: u32,
    },
    ToolExecuting {
        iteration: u32,
        call: ToolCall,
        attempt: u32,
    },
    Responding {
        answer: String,
    },
    Done {
        answer: String,
    },
    Failed {
        failure: TurnFailure,
    },
}

impl TurnPhase {
    /// Phase a turn starts in
    pub fn start() -> Self {
        TurnPhase::Planning {
            iteration: 0,
            attempt: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Done { .. } | TurnPhase::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TurnPhase::Planning { .. } => "planning",
            TurnPhase::ToolExecuting { .. } => "tool_executing",
            TurnPhase::Responding { .. } => "responding",
            TurnPhase::Done { .. } => "done",
            TurnPhase::Failed { .. } => "failed",
        }
    }

    /// Tool calls made so far, where the phase still tracks it
    pub fn iteration(&self) -> Option<u32> {
        match self {
            TurnPhase::Planning { iteration, .. } | TurnPhase::ToolExecuting { iteration, .. } => {
                Some(*iteration)
            }
            _ => None,
        }
    }
}

/// Why a turn ended in `Failed`.
///
/// Carries the internal detail for logs; callers only ever see
/// [`TurnFailure::degraded_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnFailure {
    Timeout,
    IterationLimit { max: u32 },
    Planner { kind: PlannerErrorKind, message: String },
    Tool { message: String },
    Store { message: String },
    /// The runtime fed the state machine an event it cannot accept
    Internal { message: String },
}

impl TurnFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            TurnFailure::Timeout => "orchestration_timeout",
            TurnFailure::IterationLimit { .. } => "iteration_limit_exceeded",
            TurnFailure::Planner { .. } => "planner_error",
            TurnFailure::Tool { .. } => "tool_error",
            TurnFailure::Store { .. } => "store_error",
            TurnFailure::Internal { .. } => "internal_error",
        }
    }

    /// Safe fallback answer for the user
    pub fn degraded_message(&self) -> &'static str {
        match self {
            TurnFailure::Timeout
            | TurnFailure::Planner {
                kind: PlannerErrorKind::Timeout,
                ..
            } => "Sorry, that took too long. Please try again in a moment.",
            TurnFailure::IterationLimit { .. } => {
                "Sorry, I couldn't finish that request. Could you try asking in a simpler way?"
            }
            TurnFailure::Planner { .. } => {
                "Sorry, the assistant is unavailable right now. Please try again later."
            }
            TurnFailure::Tool { .. } | TurnFailure::Store { .. } | TurnFailure::Internal { .. } => {
                "Sorry, something went wrong while handling your request. Please try again."
            }
        }
    }
}

impl fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnFailure::Timeout => write!(f, "turn exceeded its time budget"),
            TurnFailure::IterationLimit { max } => {
                write!(f, "turn exceeded {max} tool calls")
            }
            TurnFailure::Planner { kind, message } => {
                write!(f, "planner {}: {message}", kind.as_str())
            }
            TurnFailure::Tool { message } => write!(f, "tool failed: {message}"),
            TurnFailure::Store { message } => write!(f, "store failed: {message}"),
            TurnFailure::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}
