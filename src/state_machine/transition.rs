//! Pure state transition function

use super::{Effect, Event, TurnContext, TurnFailure, TurnPhase};
use crate::db::{ToolCallOutcome, ToolCallRecord};
use crate::planner::{PlannerDecision, PlannerErrorKind};
use crate::tools::{ToolCall, ToolErrorKind};
use thiserror::Error;

const MAX_ATTEMPTS: u32 = 2;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: TurnPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: TurnPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn failed(failure: TurnFailure) -> Self {
        Self::new(TurnPhase::Failed { failure })
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Turn already finished ({0})")]
    Terminal(&'static str),
    #[error("Tool result for {got} does not match running call {expected}")]
    UnexpectedToolResult { expected: String, got: String },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    phase: &TurnPhase,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if phase.is_terminal() {
        return Err(TransitionError::Terminal(phase.name()));
    }

    match (phase, event) {
        // The deadline preempts whatever is in flight
        (_, Event::DeadlineElapsed) => Ok(TransitionResult::failed(TurnFailure::Timeout)),

        // ============================================================
        // Planning
        // ============================================================
        (
            TurnPhase::Planning { .. },
            Event::PlanReady {
                decision: PlannerDecision::FinalAnswer(answer),
            },
        ) => Ok(TransitionResult::new(TurnPhase::Responding {
            answer: answer.clone(),
        })
        .with_effect(Effect::AppendAnswer { answer })
        .with_effect(Effect::PersistTurn)),

        (
            TurnPhase::Planning { iteration, .. },
            Event::PlanReady {
                decision: PlannerDecision::ToolCall(call),
            },
        ) => {
            let next = iteration + 1;
            if next > context.max_iterations {
                return Ok(TransitionResult::failed(TurnFailure::IterationLimit {
                    max: context.max_iterations,
                }));
            }
            Ok(TransitionResult::new(TurnPhase::ToolExecuting {
                iteration: next,
                call: call.clone(),
                attempt: 1,
            })
            .with_effect(Effect::SetIterationCount { count: next })
            .with_effect(Effect::execute_tool(call)))
        }

        (TurnPhase::Planning { iteration, attempt }, Event::PlanFailed { error }) => {
            if error.kind == PlannerErrorKind::SchemaInvalid && *attempt < MAX_ATTEMPTS {
                return Ok(TransitionResult::new(TurnPhase::Planning {
                    iteration: *iteration,
                    attempt: attempt + 1,
                })
                .with_effect(Effect::request_corrected_plan()));
            }
            Ok(TransitionResult::failed(TurnFailure::Planner {
                kind: error.kind,
                message: error.message,
            }))
        }

        // ============================================================
        // Tool execution
        // ============================================================
        (
            TurnPhase::ToolExecuting {
                iteration,
                call,
                attempt,
            },
            Event::ToolFinished { call_id, result },
        ) => {
            if call_id != call.id {
                return Err(TransitionError::UnexpectedToolResult {
                    expected: call.id.clone(),
                    got: call_id,
                });
            }

            let error = match result {
                Ok(output) => {
                    return Ok(back_to_planning(
                        *iteration,
                        record(call, ToolCallOutcome::Result { result: output }),
                    ));
                }
                Err(error) => error,
            };

            match error.kind {
                // Fed back so the planner can correct itself or explain
                ToolErrorKind::InvalidArguments => Ok(back_to_planning(
                    *iteration,
                    record(call, ToolCallOutcome::Error { error }),
                )),
                ToolErrorKind::Recoverable if *attempt < MAX_ATTEMPTS => {
                    // Same call id, so a mutation that did land is not applied twice
                    Ok(TransitionResult::new(TurnPhase::ToolExecuting {
                        iteration: *iteration,
                        call: call.clone(),
                        attempt: attempt + 1,
                    })
                    .with_effect(Effect::execute_tool(call.clone())))
                }
                ToolErrorKind::Recoverable | ToolErrorKind::Fatal => {
                    Ok(TransitionResult::failed(TurnFailure::Tool {
                        message: format!("{}: {}", call.tool, error.message),
                    }))
                }
            }
        }

        // ============================================================
        // Responding
        // ============================================================
        (TurnPhase::Responding { answer }, Event::Persisted) => {
            Ok(TransitionResult::new(TurnPhase::Done {
                answer: answer.clone(),
            }))
        }

        (TurnPhase::Responding { .. }, Event::PersistFailed { message }) => {
            Ok(TransitionResult::failed(TurnFailure::Store { message }))
        }

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in {}",
            phase.name()
        ))),
    }
}

fn record(call: &ToolCall, outcome: ToolCallOutcome) -> ToolCallRecord {
    ToolCallRecord {
        id: call.id.clone(),
        tool_name: call.tool,
        arguments: call.arguments.clone(),
        outcome,
    }
}

fn back_to_planning(iteration: u32, record: ToolCallRecord) -> TransitionResult {
    TransitionResult::new(TurnPhase::Planning {
        iteration,
        attempt: 1,
    })
    .with_effect(Effect::RecordToolCall { record })
    .with_effect(Effect::request_plan())
}
