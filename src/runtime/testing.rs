//! Mock implementations for testing
//!
//! These mocks enable orchestrator tests without a real model. Storage is a
//! real in-memory SQLite database.

use super::traits::*;
use crate::planner::{PlanRequest, Planner, PlannerDecision, PlannerError, ToolDefinition};
use crate::db::Role;
use crate::tools::{self, ToolCall, ToolError, ToolName, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Planner
// ============================================================================

/// What a [`MockPlanner`] does once its queue is empty
#[derive(Debug, Clone, Default)]
pub enum WhenEmpty {
    #[default]
    Fail,
    /// Answer with `echo: <latest user message>`
    Echo,
    /// Call the tool again with a fresh id, forever
    CallTool(ToolName, Value),
}

/// Mock planner that returns queued decisions
#[derive(Default)]
pub struct MockPlanner {
    responses: Mutex<VecDeque<Result<PlannerDecision, PlannerError>>>,
    when_empty: WhenEmpty,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<PlanRequest>>,
}

#[allow(dead_code)]
impl MockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when_empty(mut self, behavior: WhenEmpty) -> Self {
        self.when_empty = behavior;
        self
    }

    /// Sleep before every decision
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_answer(&self, answer: impl Into<String>) {
        self.queue(Ok(PlannerDecision::FinalAnswer(answer.into())));
    }

    pub fn queue_tool_call(&self, id: &str, tool: ToolName, arguments: Value) {
        self.queue(Ok(PlannerDecision::ToolCall(ToolCall::new(id, tool, arguments))));
    }

    pub fn queue_error(&self, error: PlannerError) {
        self.queue(Err(error));
    }

    fn queue(&self, response: Result<PlannerDecision, PlannerError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn decide(&self, request: &PlanRequest) -> Result<PlannerDecision, PlannerError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| match &self.when_empty {
            WhenEmpty::Fail => Err(PlannerError::unavailable("No mock response queued")),
            WhenEmpty::Echo => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map_or("", |m| m.content.as_str());
                Ok(PlannerDecision::FinalAnswer(format!("echo: {last_user}")))
            }
            WhenEmpty::CallTool(tool, arguments) => Ok(PlannerDecision::ToolCall(ToolCall::new(
                uuid::Uuid::new_v4().to_string(),
                *tool,
                arguments.clone(),
            ))),
        })
    }

    fn model_id(&self) -> &str {
        "mock-planner"
    }
}

// ============================================================================
// Mock Tool Executors
// ============================================================================

/// Mock tool executor with queued results
#[derive(Default)]
pub struct MockToolExecutor {
    results: Mutex<VecDeque<Result<ToolOutput, ToolError>>>,
    /// Record of tool executions as (thread id, call)
    pub executions: Mutex<Vec<(String, ToolCall)>>,
}

#[allow(dead_code)]
impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_result(&self, result: Result<ToolOutput, ToolError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn recorded_executions(&self) -> Vec<(String, ToolCall)> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(
        &self,
        thread_id: &str,
        call: &ToolCall,
        _cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        self.executions
            .lock()
            .unwrap()
            .push((thread_id.to_string(), call.clone()));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ToolError::fatal("No mock result queued")))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        tools::definitions()
    }
}

/// Runs the real call, then reports a recoverable failure for the first
/// `failures` calls, as if the acknowledgement were lost
pub struct LostAckExecutor<T> {
    inner: T,
    failures: Mutex<u32>,
    /// Ids of every call received
    pub call_ids: Mutex<Vec<String>>,
}

impl<T: ToolExecutor> LostAckExecutor<T> {
    pub fn new(inner: T, failures: u32) -> Self {
        Self {
            inner,
            failures: Mutex::new(failures),
            call_ids: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<T: ToolExecutor> ToolExecutor for LostAckExecutor<T> {
    async fn execute(
        &self,
        thread_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        self.call_ids.lock().unwrap().push(call.id.clone());
        let result = self.inner.execute(thread_id, call, cancel).await;

        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ToolError::recoverable("acknowledgement lost"));
        }
        result
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.inner.definitions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ToolCallOutcome};
    use crate::planner::PlannerErrorKind;
    use crate::runtime::{Orchestrator, TurnLimits, TurnOutcome, TurnRequest};
    use crate::state_machine::TurnFailure;
    use crate::system_prompt::Language;
    use crate::tools::ToolGateway;
    use serde_json::json;
    use std::sync::Arc;

    fn storage() -> DatabaseStorage {
        DatabaseStorage::new(Database::open_in_memory().unwrap(), 3)
    }

    fn limits() -> TurnLimits {
        TurnLimits {
            max_iterations: 3,
            turn_timeout: Duration::from_secs(5),
            planner_timeout: Duration::from_secs(5),
            history_limit: 50,
        }
    }

    fn turn(thread_id: &str, message: &str) -> TurnRequest {
        TurnRequest {
            thread_id: thread_id.to_string(),
            message: message.to_string(),
            language: Language::En,
        }
    }

    fn gateway(store: &DatabaseStorage) -> Arc<ToolGateway<DatabaseStorage>> {
        Arc::new(ToolGateway::new(store.clone()))
    }

    fn milk() -> Value {
        json!({"name": "milk", "quantity": 1, "unit": "l"})
    }

    #[tokio::test]
    async fn test_mock_planner_queue_then_fallback() {
        let planner = MockPlanner::new();
        planner.queue_answer("hi");
        let request = PlanRequest {
            language: Language::En,
            messages: vec![],
            pending_tool_calls: vec![],
            tools: vec![],
            corrective: None,
        };
        assert!(planner.decide(&request).await.is_ok());
        assert!(planner.decide(&request).await.is_err());
        assert_eq!(planner.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_simple_answer_is_persisted() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new().when_empty(WhenEmpty::Echo));
        let orchestrator =
            Orchestrator::new(store.clone(), planner, Arc::new(MockToolExecutor::new()), limits());

        let outcome = orchestrator.run_turn(turn("t1", "hello")).await;
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                answer: "echo: hello".to_string()
            }
        );

        let state = store.load("t1").await.unwrap();
        let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(state.iteration_count, 0);
    }

    #[tokio::test]
    async fn test_tool_cycle_updates_list_and_history() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_tool_call("call-1", ToolName::AddShoppingItem, milk());
        planner.queue_answer("Added milk.");
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::clone(&planner), gateway(&store), limits());

        let outcome = orchestrator.run_turn(turn("t1", "add milk")).await;
        assert_eq!(outcome.answer(), "Added milk.");

        let list = store.shopping_list("t1").await.unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].name, "milk");

        let state = store.load("t1").await.unwrap();
        let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);
        assert_eq!(state.pending_tool_calls.len(), 1);
        assert_eq!(state.iteration_count, 1);

        // The second plan saw the tool result
        let requests = planner.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].pending_tool_calls.len(), 1);
        assert_eq!(requests[1].messages.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_history_window_keeps_current_user_message() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_answer("Hello.");
        planner.queue_tool_call("call-1", ToolName::AddShoppingItem, milk());
        planner.queue_tool_call("call-2", ToolName::AddShoppingItem, milk());
        planner.queue_answer("Added milk twice.");
        let limits = TurnLimits {
            history_limit: 1,
            ..limits()
        };
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::clone(&planner), gateway(&store), limits);

        orchestrator.run_turn(turn("t1", "hi")).await;
        let outcome = orchestrator.run_turn(turn("t1", "add milk twice")).await;
        assert_eq!(outcome.answer(), "Added milk twice.");

        let requests = planner.recorded_requests();
        assert_eq!(requests.len(), 4);
        for request in &requests[1..] {
            assert_eq!(request.messages[0].role, Role::User);
            assert_eq!(request.messages[0].content, "add milk twice");
        }
        let roles: Vec<Role> = requests[3].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Tool]);
    }

    #[tokio::test]
    async fn test_next_turn_resets_turn_fields() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new().when_empty(WhenEmpty::Echo));
        planner.queue_tool_call("call-1", ToolName::AddShoppingItem, milk());
        let orchestrator = Orchestrator::new(store.clone(), planner, gateway(&store), limits());

        orchestrator.run_turn(turn("t1", "add milk")).await;
        orchestrator.run_turn(turn("t1", "thanks")).await;

        let state = store.load("t1").await.unwrap();
        assert_eq!(state.messages.len(), 5);
        assert!(state.pending_tool_calls.is_empty());
        assert_eq!(state.iteration_count, 0);
    }

    #[tokio::test]
    async fn test_endless_tool_calls_hit_iteration_limit() {
        let store = storage();
        let planner = Arc::new(
            MockPlanner::new().when_empty(WhenEmpty::CallTool(ToolName::SearchRecipes, json!({}))),
        );
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::clone(&planner), gateway(&store), limits());

        let outcome = orchestrator.run_turn(turn("t1", "loop")).await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                failure: TurnFailure::IterationLimit { max: 3 }
            }
        );
        assert_eq!(planner.recorded_requests().len(), 4);
        // A failed turn persists nothing
        assert!(store.history("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_invalid_retried_with_correction() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_error(PlannerError::schema_invalid("two tool calls"));
        planner.queue_answer("Here you go.");
        let orchestrator = Orchestrator::new(
            store,
            Arc::clone(&planner),
            Arc::new(MockToolExecutor::new()),
            limits(),
        );

        let outcome = orchestrator.run_turn(turn("t1", "hi")).await;
        assert_eq!(outcome.answer(), "Here you go.");
        let requests = planner.recorded_requests();
        assert!(requests[0].corrective.is_none());
        assert!(requests[1].corrective.is_some());
    }

    #[tokio::test]
    async fn test_second_schema_failure_fails_turn() {
        let planner = Arc::new(MockPlanner::new());
        planner.queue_error(PlannerError::schema_invalid("garbage"));
        planner.queue_error(PlannerError::schema_invalid("garbage"));
        let orchestrator =
            Orchestrator::new(storage(), planner, Arc::new(MockToolExecutor::new()), limits());

        let outcome = orchestrator.run_turn(turn("t1", "hi")).await;
        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                failure: TurnFailure::Planner {
                    kind: PlannerErrorKind::SchemaInvalid,
                    ..
                }
            }
        ));
        // Raw planner detail never reaches the answer
        assert!(!outcome.answer().contains("garbage"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_fed_back_to_planner() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_tool_call("c1", ToolName::CheckOffItem, json!({"name": "saffron"}));
        planner.queue_answer("Saffron is not on your list.");
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::clone(&planner), gateway(&store), limits());

        let outcome = orchestrator.run_turn(turn("t1", "check off saffron")).await;
        assert_eq!(outcome.answer(), "Saffron is not on your list.");

        let requests = planner.recorded_requests();
        let record = &requests[1].pending_tool_calls[0];
        assert!(matches!(record.outcome, ToolCallOutcome::Error { .. }));
        assert!(requests[1].messages[1].content.contains("invalid_arguments"));
    }

    #[tokio::test]
    async fn test_recoverable_retry_reuses_call_id() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_tool_call("call-1", ToolName::AddShoppingItem, milk());
        planner.queue_answer("Added.");
        let tools = Arc::new(LostAckExecutor::new(gateway(&store), 1));
        let orchestrator = Orchestrator::new(store.clone(), planner, Arc::clone(&tools), limits());

        let outcome = orchestrator.run_turn(turn("t1", "add milk")).await;
        assert_eq!(outcome.answer(), "Added.");
        assert_eq!(*tools.call_ids.lock().unwrap(), vec!["call-1", "call-1"]);

        // The first attempt landed; the retry must not add a second litre
        let list = store.shopping_list("t1").await.unwrap();
        assert!((list.items[0].quantity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_repeated_recoverable_failure_is_fatal() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new());
        planner.queue_tool_call("call-1", ToolName::AddShoppingItem, milk());
        let tools = Arc::new(LostAckExecutor::new(gateway(&store), 2));
        let orchestrator = Orchestrator::new(store.clone(), planner, tools, limits());

        let outcome = orchestrator.run_turn(turn("t1", "add milk")).await;
        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                failure: TurnFailure::Tool { .. }
            }
        ));
        assert!(store.history("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_tool_error_fails_turn() {
        let tools = Arc::new(MockToolExecutor::new());
        tools.queue_result(Err(ToolError::fatal("catalog offline")));
        let planner = Arc::new(MockPlanner::new());
        planner.queue_tool_call("c1", ToolName::SearchRecipes, json!({}));
        let orchestrator = Orchestrator::new(storage(), planner, Arc::clone(&tools), limits());

        let outcome = orchestrator.run_turn(turn("t1", "find dinner")).await;
        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
        assert!(!outcome.answer().contains("catalog offline"));
        assert_eq!(tools.recorded_executions().len(), 1);
        assert_eq!(tools.recorded_executions()[0].0, "t1");
    }

    #[tokio::test]
    async fn test_turn_timeout_cancels_slow_planner() {
        let store = storage();
        let planner = Arc::new(MockPlanner::new().with_delay(Duration::from_secs(30)));
        let limits = TurnLimits {
            turn_timeout: Duration::from_millis(100),
            ..limits()
        };
        let orchestrator =
            Orchestrator::new(store.clone(), planner, Arc::new(MockToolExecutor::new()), limits);

        let started = std::time::Instant::now();
        let outcome = orchestrator.run_turn(turn("t1", "hi")).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                failure: TurnFailure::Timeout
            }
        );
        assert!(store.history("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_planner_timeout_is_planner_failure() {
        let planner = Arc::new(MockPlanner::new().with_delay(Duration::from_secs(30)));
        let limits = TurnLimits {
            planner_timeout: Duration::from_millis(50),
            ..limits()
        };
        let orchestrator =
            Orchestrator::new(storage(), planner, Arc::new(MockToolExecutor::new()), limits);

        let outcome = orchestrator.run_turn(turn("t1", "hi")).await;
        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                failure: TurnFailure::Planner {
                    kind: PlannerErrorKind::Timeout,
                    ..
                }
            }
        ));
    }

    #[tokio::test]
    async fn test_waiting_for_thread_counts_toward_budget() {
        let store = storage();
        let limits = TurnLimits {
            turn_timeout: Duration::from_millis(100),
            ..limits()
        };
        let planner = Arc::new(MockPlanner::new().when_empty(WhenEmpty::Echo));
        let orchestrator =
            Orchestrator::new(store.clone(), planner, Arc::new(MockToolExecutor::new()), limits);

        let _held = store.lock_thread("busy").await;
        let blocked = orchestrator.run_turn(turn("busy", "hi")).await;
        assert_eq!(
            blocked,
            TurnOutcome::Failed {
                failure: TurnFailure::Timeout
            }
        );

        // Other threads are unaffected
        let free = orchestrator.run_turn(turn("free", "hi")).await;
        assert_eq!(free.answer(), "echo: hi");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_on_one_thread_are_serial() {
        let store = storage();
        let planner = Arc::new(
            MockPlanner::new()
                .when_empty(WhenEmpty::Echo)
                .with_delay(Duration::from_millis(5)),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            planner,
            Arc::new(MockToolExecutor::new()),
            limits(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator
                        .run_turn(turn("shared", &format!("msg {i}")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), TurnOutcome::Completed { .. }));
        }

        let history = store.history("shared").await.unwrap();
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].message.role, Role::User);
            assert_eq!(pair[1].message.role, Role::Assistant);
            assert_eq!(pair[1].message.content, format!("echo: {}", pair[0].message.content));
        }
        for (i, stored) in history.iter().enumerate() {
            assert_eq!(stored.sequence_id, i64::try_from(i).unwrap());
        }
    }
}
