//! Common types for planner interactions

use super::PlannerError;
use crate::db::{Message, ToolCallRecord};
use crate::system_prompt::Language;
use crate::tools::{ToolCall, ToolName};
use serde_json::Value;

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Planner request
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub language: Language,
    /// Most recent history, oldest first
    pub messages: Vec<Message>,
    /// Tool calls already made this turn
    pub pending_tool_calls: Vec<ToolCallRecord>,
    pub tools: Vec<ToolDefinition>,
    /// Set when retrying after a schema-invalid response
    pub corrective: Option<String>,
}

/// What the planner decided to do next
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    ToolCall(ToolCall),
    FinalAnswer(String),
}

/// Unvalidated model output
#[derive(Debug, Clone, Default)]
pub struct RawPlannerOutput {
    pub text: Option<String>,
    pub tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Clone)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub name: String,
    /// JSON-encoded arguments as sent by the model
    pub arguments: String,
}

impl RawPlannerOutput {
    /// Validate against the decision schema.
    ///
    /// Exactly one known tool with a JSON object of arguments, or a
    /// non-empty answer with no tool call. A tool call takes precedence over
    /// accompanying text.
    pub fn into_decision(self) -> Result<PlannerDecision, PlannerError> {
        let mut calls = self.tool_calls;
        if calls.len() > 1 {
            return Err(PlannerError::schema_invalid(format!(
                "expected at most one tool call, got {}",
                calls.len()
            )));
        }

        if let Some(raw) = calls.pop() {
            let tool = ToolName::parse(&raw.name).ok_or_else(|| {
                PlannerError::schema_invalid(format!("unknown tool '{}'", raw.name))
            })?;

            let arguments = if raw.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str::<Value>(&raw.arguments).map_err(|e| {
                    PlannerError::schema_invalid(format!("arguments for {tool} are not JSON: {e}"))
                })?
            };
            if !arguments.is_object() {
                return Err(PlannerError::schema_invalid(format!(
                    "arguments for {tool} must be a JSON object"
                )));
            }

            let id = raw
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            return Ok(PlannerDecision::ToolCall(ToolCall::new(id, tool, arguments)));
        }

        match self.text.map(|t| t.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(PlannerDecision::FinalAnswer(text)),
            _ => Err(PlannerError::schema_invalid(
                "response contained neither an answer nor a tool call",
            )),
        }
    }
}
