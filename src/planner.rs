//! Planner abstraction
//!
//! The planner is the language-model step of a turn: given the recent
//! history and this turn's tool results it either requests one tool call or
//! produces the final answer.

mod error;
mod openai;
mod types;

pub use error::{PlannerError, PlannerErrorKind};
pub use openai::OpenAiPlanner;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for planners
#[async_trait]
pub trait Planner: Send + Sync {
    /// Decide the next step of the turn
    async fn decide(&self, request: &PlanRequest) -> Result<PlannerDecision, PlannerError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: Planner + ?Sized> Planner for Arc<T> {
    async fn decide(&self, request: &PlanRequest) -> Result<PlannerDecision, PlannerError> {
        (**self).decide(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for planners
pub struct LoggingPlanner {
    inner: Arc<dyn Planner>,
    model_id: String,
}

impl LoggingPlanner {
    pub fn new(inner: Arc<dyn Planner>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl Planner for LoggingPlanner {
    async fn decide(&self, request: &PlanRequest) -> Result<PlannerDecision, PlannerError> {
        let start = std::time::Instant::now();
        let result = self.inner.decide(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(decision) => {
                let decision = match decision {
                    PlannerDecision::ToolCall(call) => call.tool.as_str(),
                    PlannerDecision::FinalAnswer(_) => "final_answer",
                };
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    history = request.messages.len(),
                    tool_results = request.pending_tool_calls.len(),
                    corrective = request.corrective.is_some(),
                    decision,
                    "Planner request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Planner request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
