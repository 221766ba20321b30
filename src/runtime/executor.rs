//! Turn orchestrator
//!
//! Drives the pure state machine for one turn: runs each effect, turns its
//! outcome into an event and feeds it back until the turn reaches a terminal
//! phase. Every await is raced against the turn deadline.

use super::traits::{StateStore, ToolExecutor};
use crate::db::{ConversationState, Message, Role};
use crate::planner::{PlanRequest, Planner, PlannerError};
use crate::state_machine::{transition, Effect, Event, TurnContext, TurnFailure, TurnPhase};
use crate::system_prompt::{Language, CORRECTIVE_INSTRUCTION};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Bounds applied to every turn
#[derive(Debug, Clone)]
pub struct TurnLimits {
    /// Maximum tool calls per turn
    pub max_iterations: u32,
    /// Wall-clock budget for the whole turn, waiting for the thread included
    pub turn_timeout: Duration,
    /// Budget for a single planner call
    pub planner_timeout: Duration,
    /// Most recent messages sent to the planner
    pub history_limit: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            turn_timeout: Duration::from_secs(60),
            planner_timeout: Duration::from_secs(30),
            history_limit: 50,
        }
    }
}

/// One inbound user message for a thread
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub message: String,
    pub language: Language,
}

/// Result of a turn as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { answer: String },
    Failed { failure: TurnFailure },
}

impl TurnOutcome {
    /// Text for the user; failures only ever expose the degraded message
    pub fn answer(&self) -> &str {
        match self {
            TurnOutcome::Completed { answer } => answer,
            TurnOutcome::Failed { failure } => failure.degraded_message(),
        }
    }
}

/// Generic orchestrator that can work with any store, planner and tool implementations
pub struct Orchestrator<S, P, T> {
    store: S,
    planner: P,
    tools: T,
    limits: TurnLimits,
}

impl<S, P, T> Orchestrator<S, P, T>
where
    S: StateStore,
    P: Planner,
    T: ToolExecutor,
{
    pub fn new(store: S, planner: P, tools: T, limits: TurnLimits) -> Self {
        Self {
            store,
            planner,
            tools,
            limits,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Run one turn to completion.
    ///
    /// Never returns a raw error: every failure becomes
    /// `TurnOutcome::Failed`, logged with its internal detail.
    pub async fn run_turn(&self, request: TurnRequest) -> TurnOutcome {
        let span = tracing::info_span!("turn", thread_id = %request.thread_id);
        async {
            let deadline = Instant::now() + self.limits.turn_timeout;
            let cancel = CancellationToken::new();
            let outcome = self.drive(&request, deadline, &cancel).await;
            cancel.cancel();

            match &outcome {
                TurnOutcome::Completed { .. } => tracing::info!("Turn completed"),
                TurnOutcome::Failed { failure } => tracing::error!(
                    kind = failure.kind(),
                    detail = %failure,
                    "Turn failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &TurnRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        // Held until the turn ends; later turns on this thread queue here
        let Some(_guard) =
            bounded(deadline, cancel, self.store.lock_thread(&request.thread_id)).await
        else {
            return TurnOutcome::Failed {
                failure: TurnFailure::Timeout,
            };
        };

        let mut state = match bounded(deadline, cancel, self.store.load(&request.thread_id)).await {
            None => {
                return TurnOutcome::Failed {
                    failure: TurnFailure::Timeout,
                }
            }
            Some(Err(e)) => {
                return TurnOutcome::Failed {
                    failure: TurnFailure::Store {
                        message: e.to_string(),
                    },
                }
            }
            Some(Ok(state)) => state,
        };
        state.begin_turn(&request.message);

        let context = TurnContext::new(&request.thread_id, self.limits.max_iterations);
        let mut phase = TurnPhase::start();
        let mut effects: VecDeque<Effect> = VecDeque::from([Effect::request_plan()]);

        loop {
            let Some(effect) = effects.pop_front() else {
                return TurnOutcome::Failed {
                    failure: TurnFailure::Internal {
                        message: format!("no pending work in {}", phase.name()),
                    },
                };
            };

            let event = match effect {
                Effect::SetIterationCount { count } => {
                    state.iteration_count = count;
                    continue;
                }
                Effect::RecordToolCall { record } => {
                    state
                        .messages
                        .push(Message::tool(record.call_ref(), record.result_text()));
                    state.pending_tool_calls.push(record);
                    continue;
                }
                Effect::AppendAnswer { answer } => {
                    state.messages.push(Message::assistant(answer));
                    continue;
                }
                Effect::RequestPlan { corrective } => {
                    self.plan(&state, request.language, corrective, deadline, cancel)
                        .await
                }
                Effect::ExecuteTool { call } => {
                    let execution =
                        self.tools
                            .execute(&request.thread_id, &call, cancel.child_token());
                    match bounded(deadline, cancel, execution).await {
                        None => Event::DeadlineElapsed,
                        Some(result) => Event::ToolFinished {
                            call_id: call.id,
                            result,
                        },
                    }
                }
                Effect::PersistTurn => {
                    match bounded(deadline, cancel, self.store.save(&state)).await {
                        None => Event::DeadlineElapsed,
                        Some(Ok(())) => Event::Persisted,
                        Some(Err(e)) => Event::PersistFailed {
                            message: e.to_string(),
                        },
                    }
                }
            };

            match transition(&phase, &context, event) {
                Ok(result) => {
                    tracing::debug!(
                        from = phase.name(),
                        to = result.new_phase.name(),
                        iteration = state.iteration_count,
                        "Turn transition"
                    );
                    phase = result.new_phase;
                    effects.extend(result.effects);
                }
                Err(e) => {
                    return TurnOutcome::Failed {
                        failure: TurnFailure::Internal {
                            message: e.to_string(),
                        },
                    };
                }
            }

            match phase {
                TurnPhase::Done { answer } => return TurnOutcome::Completed { answer },
                TurnPhase::Failed { failure } => {
                    tracing::debug!(
                        iteration = state.iteration_count,
                        tool_calls = state.pending_tool_calls.len(),
                        "Discarding turn state"
                    );
                    return TurnOutcome::Failed { failure };
                }
                _ => {}
            }
        }
    }

    async fn plan(
        &self,
        state: &ConversationState,
        language: Language,
        corrective: bool,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Event {
        // The window never starts after this turn's user message
        let turn_start = state
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(0);
        let skip = state
            .messages
            .len()
            .saturating_sub(self.limits.history_limit)
            .min(turn_start);
        let request = PlanRequest {
            language,
            messages: state.messages[skip..].to_vec(),
            pending_tool_calls: state.pending_tool_calls.clone(),
            tools: self.tools.definitions(),
            corrective: corrective.then(|| CORRECTIVE_INSTRUCTION.to_string()),
        };

        let call = tokio::time::timeout(self.limits.planner_timeout, self.planner.decide(&request));
        match bounded(deadline, cancel, call).await {
            None => Event::DeadlineElapsed,
            Some(Err(_elapsed)) => Event::PlanFailed {
                error: PlannerError::timeout(format!(
                    "no decision within {}s",
                    self.limits.planner_timeout.as_secs()
                )),
            },
            Some(Ok(Ok(decision))) => Event::PlanReady { decision },
            Some(Ok(Err(error))) => Event::PlanFailed { error },
        }
    }
}

/// Race a future against the turn deadline, cancelling the turn if it loses
async fn bounded<F: Future>(
    deadline: Instant,
    cancel: &CancellationToken,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        output = future => Some(output),
        () = tokio::time::sleep_until(deadline) => {
            cancel.cancel();
            None
        }
    }
}
