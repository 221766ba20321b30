//! Effects produced by state transitions

use crate::db::ToolCallRecord;
use crate::tools::ToolCall;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the planner for the next step
    RequestPlan { corrective: bool },

    /// Record the number of tool calls made this turn
    SetIterationCount { count: u32 },

    /// Execute a tool call
    ExecuteTool { call: ToolCall },

    /// Add a finished call to the turn's tool calls and to the history
    RecordToolCall { record: ToolCallRecord },

    /// Append the final answer to the history
    AppendAnswer { answer: String },

    /// Persist the turn's state delta
    PersistTurn,
}

impl Effect {
    pub fn request_plan() -> Self {
        Effect::RequestPlan { corrective: false }
    }

    pub fn request_corrected_plan() -> Self {
        Effect::RequestPlan { corrective: true }
    }

    pub fn execute_tool(call: ToolCall) -> Self {
        Effect::ExecuteTool { call }
    }
}
