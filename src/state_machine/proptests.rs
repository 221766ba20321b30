//! Property-based tests for the state machine
//!
//! A driver plays scripted planner and tool behaviour against the pure
//! transition function, feeding back the event each effect would produce.

use super::*;
use crate::planner::{PlannerDecision, PlannerError};
use crate::shopping::ShoppingList;
use crate::tools::{ToolCall, ToolError, ToolName, ToolOutput};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone, Copy)]
enum PlanBehavior {
    Answer,
    CallTool,
    SchemaInvalid,
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
enum ToolBehavior {
    Ok,
    InvalidArguments,
    Recoverable,
    Fatal,
}

fn arb_plan() -> impl Strategy<Value = PlanBehavior> {
    prop_oneof![
        1 => Just(PlanBehavior::Answer),
        6 => Just(PlanBehavior::CallTool),
        2 => Just(PlanBehavior::SchemaInvalid),
        1 => Just(PlanBehavior::Unavailable),
    ]
}

fn arb_tool() -> impl Strategy<Value = ToolBehavior> {
    prop_oneof![
        5 => Just(ToolBehavior::Ok),
        2 => Just(ToolBehavior::InvalidArguments),
        2 => Just(ToolBehavior::Recoverable),
        1 => Just(ToolBehavior::Fatal),
    ]
}

struct Outcome {
    phase: TurnPhase,
    steps: usize,
    tool_executions: usize,
    recorded_calls: usize,
}

/// Run a turn to completion. Behaviour lists are cycled, so a planner can
/// call tools forever. `deadline_at` injects `DeadlineElapsed` at that step.
fn drive(
    max_iterations: u32,
    plans: &[PlanBehavior],
    tools: &[ToolBehavior],
    deadline_at: Option<usize>,
) -> Outcome {
    let context = TurnContext::new("prop-thread", max_iterations);
    let mut phase = TurnPhase::start();
    let mut pending = vec![Effect::request_plan()];
    let mut plan_index = 0;
    let mut tool_index = 0;
    let mut steps = 0;
    let mut tool_executions = 0;
    let mut recorded_calls = 0;

    while !phase.is_terminal() {
        assert!(steps < 1_000, "turn did not terminate");

        let event = if deadline_at == Some(steps) {
            Event::DeadlineElapsed
        } else {
            let effect = pending
                .iter()
                .find(|e| {
                    matches!(
                        e,
                        Effect::RequestPlan { .. }
                            | Effect::ExecuteTool { .. }
                            | Effect::PersistTurn
                    )
                })
                .cloned()
                .expect("active phase must schedule work");
            match effect {
                Effect::RequestPlan { .. } => {
                    let behavior = plans[plan_index % plans.len()];
                    plan_index += 1;
                    match behavior {
                        PlanBehavior::Answer => Event::PlanReady {
                            decision: PlannerDecision::FinalAnswer("done".to_string()),
                        },
                        PlanBehavior::CallTool => Event::PlanReady {
                            decision: PlannerDecision::ToolCall(ToolCall::new(
                                format!("call-{plan_index}"),
                                ToolName::SearchRecipes,
                                json!({}),
                            )),
                        },
                        PlanBehavior::SchemaInvalid => Event::PlanFailed {
                            error: PlannerError::schema_invalid("bad"),
                        },
                        PlanBehavior::Unavailable => Event::PlanFailed {
                            error: PlannerError::unavailable("down"),
                        },
                    }
                }
                Effect::ExecuteTool { call } => {
                    tool_executions += 1;
                    let behavior = tools[tool_index % tools.len()];
                    tool_index += 1;
                    let result = match behavior {
                        ToolBehavior::Ok => Ok(ToolOutput::ShoppingList {
                            list: ShoppingList::new("prop-thread"),
                        }),
                        ToolBehavior::InvalidArguments => Err(ToolError::invalid_arguments("no")),
                        ToolBehavior::Recoverable => Err(ToolError::recoverable("busy")),
                        ToolBehavior::Fatal => Err(ToolError::fatal("broken")),
                    };
                    Event::ToolFinished {
                        call_id: call.id,
                        result,
                    }
                }
                _ => Event::Persisted,
            }
        };

        let result = transition(&phase, &context, event).expect("driver only sends valid events");
        recorded_calls += result
            .effects
            .iter()
            .filter(|e| matches!(e, Effect::RecordToolCall { .. }))
            .count();
        phase = result.new_phase;
        pending = result.effects;
        steps += 1;
    }

    Outcome {
        phase,
        steps,
        tool_executions,
        recorded_calls,
    }
}

proptest! {
    #[test]
    fn prop_turn_terminates_within_iteration_bound(
        max_iterations in 1u32..8,
        plans in proptest::collection::vec(arb_plan(), 1..10),
        tools in proptest::collection::vec(arb_tool(), 1..10),
    ) {
        let outcome = drive(max_iterations, &plans, &tools, None);
        prop_assert!(outcome.phase.is_terminal());
        let max = max_iterations as usize;
        prop_assert!(outcome.recorded_calls <= max);
        // Each call may be executed twice (one recoverable retry)
        prop_assert!(outcome.tool_executions <= 2 * max);
        // Each iteration costs at most two plan attempts and two tool attempts
        prop_assert!(outcome.steps <= 4 * max + 3);
    }

    #[test]
    fn prop_endless_tool_calls_hit_iteration_limit(max_iterations in 1u32..8) {
        let outcome = drive(max_iterations, &[PlanBehavior::CallTool], &[ToolBehavior::Ok], None);
        prop_assert_eq!(
            outcome.phase,
            TurnPhase::Failed { failure: TurnFailure::IterationLimit { max: max_iterations } }
        );
        prop_assert_eq!(outcome.recorded_calls, max_iterations as usize);
    }

    #[test]
    fn prop_deadline_always_fails_with_timeout(
        deadline_at in 0usize..6,
        plans in proptest::collection::vec(arb_plan(), 1..6),
    ) {
        let outcome = drive(10, &plans, &[ToolBehavior::Ok], Some(deadline_at));
        // The turn may legitimately finish before the deadline fires
        if outcome.steps > deadline_at {
            prop_assert_eq!(outcome.phase, TurnPhase::Failed { failure: TurnFailure::Timeout });
        } else {
            prop_assert!(outcome.phase.is_terminal());
        }
    }

    #[test]
    fn prop_terminal_phases_absorb_nothing(answer in "[a-z]{0,10}") {
        let context = TurnContext::new("t", 3);
        let terminals = [
            TurnPhase::Done { answer },
            TurnPhase::Failed { failure: TurnFailure::Timeout },
        ];
        for phase in terminals {
            prop_assert!(transition(&phase, &context, Event::DeadlineElapsed).is_err());
            prop_assert!(transition(&phase, &context, Event::Persisted).is_err());
        }
    }
}
