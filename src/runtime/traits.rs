//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use super::thread_lock::{ThreadGuard, ThreadLocks};
use crate::catalog::Recipe;
use crate::db::{ConversationState, Database, DbError, DbResult, StoredMessage};
use crate::planner::ToolDefinition;
use crate::shopping::{ShoppingList, ShoppingListError, ShoppingMutation};
use crate::tools::{ToolCall, ToolError, ToolOutput};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Store failures as seen by the orchestrator and tools
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Lock conflict that outlasted the bounded retries
    #[error("store contention: {0}")]
    Contention(String),
    #[error(transparent)]
    Validation(ShoppingListError),
    #[error("store failure: {0}")]
    Fatal(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Contention(e) => StoreError::Contention(e.to_string()),
            DbError::Validation(e) => StoreError::Validation(e),
            other => StoreError::Fatal(other.to_string()),
        }
    }
}

/// Storage for per-thread conversation state and shopping lists
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Exclusive access to a thread for the duration of a turn
    async fn lock_thread(&self, thread_id: &str) -> ThreadGuard;

    /// Load state, creating an empty thread if none exists
    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError>;

    /// Persist the full state; all or nothing
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;

    /// Apply one mutation atomically and return the resulting list
    async fn mutate_shopping_list(
        &self,
        thread_id: &str,
        mutation: &ShoppingMutation,
    ) -> Result<ShoppingList, StoreError>;

    async fn shopping_list(&self, thread_id: &str) -> Result<ShoppingList, StoreError>;

    async fn history(&self, thread_id: &str) -> Result<Vec<StoredMessage>, StoreError>;
}

/// Read access to the recipe catalog
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError>;

    async fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        Ok(self.list_recipes().await?.into_iter().find(|r| r.id == id))
    }
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool call on behalf of a thread with cancellation support
    async fn execute(
        &self,
        thread_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError>;

    /// Get tool definitions for the planner
    fn definitions(&self) -> Vec<ToolDefinition>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn lock_thread(&self, thread_id: &str) -> ThreadGuard {
        (**self).lock_thread(thread_id).await
    }

    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError> {
        (**self).load(thread_id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        (**self).save(state).await
    }

    async fn mutate_shopping_list(
        &self,
        thread_id: &str,
        mutation: &ShoppingMutation,
    ) -> Result<ShoppingList, StoreError> {
        (**self).mutate_shopping_list(thread_id, mutation).await
    }

    async fn shopping_list(&self, thread_id: &str) -> Result<ShoppingList, StoreError> {
        (**self).shopping_list(thread_id).await
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        (**self).history(thread_id).await
    }
}

#[async_trait]
impl<T: RecipeCatalog + ?Sized> RecipeCatalog for Arc<T> {
    async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        (**self).list_recipes().await
    }

    async fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        (**self).recipe(id).await
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(
        &self,
        thread_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        (**self).execute(thread_id, call, cancel).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

const BACKOFF_BASE_MS: u64 = 25;
const BACKOFF_JITTER_MS: u64 = 25;

/// Adapter to use Database as `StateStore` and `RecipeCatalog`.
///
/// Every operation runs on the blocking pool inside one SQLite transaction.
/// Dropping the returned future (turn timeout) does not interrupt it, so
/// each operation either commits completely or not at all.
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
    locks: ThreadLocks,
    retry_attempts: u32,
}

impl DatabaseStorage {
    pub fn new(db: Database, retry_attempts: u32) -> Self {
        Self {
            db,
            locks: ThreadLocks::new(),
            retry_attempts,
        }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }

    /// Run a database operation, retrying contention with jittered backoff
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&Database) -> DbResult<T> + Clone + Send + 'static,
    {
        let mut attempt = 0;
        loop {
            let db = self.db.clone();
            let f = op.clone();
            let result = tokio::task::spawn_blocking(move || f(&db))
                .await
                .map_err(|e| StoreError::Fatal(format!("store task failed: {e}")))?;

            match result {
                Err(e) if e.is_contention() => {
                    if attempt >= self.retry_attempts {
                        return Err(StoreError::Contention(format!(
                            "{e} (after {attempt} retries)"
                        )));
                    }
                    attempt += 1;
                    let delay = backoff(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Store contention, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other.map_err(StoreError::from),
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    Duration::from_millis(exponential + jitter)
}

#[async_trait]
impl StateStore for DatabaseStorage {
    async fn lock_thread(&self, thread_id: &str) -> ThreadGuard {
        self.locks.acquire(thread_id).await
    }

    async fn load(&self, thread_id: &str) -> Result<ConversationState, StoreError> {
        let thread_id = thread_id.to_string();
        self.run(move |db| db.load_thread(&thread_id)).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let state = Arc::new(state.clone());
        self.run(move |db| db.save_thread(&state)).await
    }

    async fn mutate_shopping_list(
        &self,
        thread_id: &str,
        mutation: &ShoppingMutation,
    ) -> Result<ShoppingList, StoreError> {
        let thread_id = thread_id.to_string();
        let mutation = mutation.clone();
        self.run(move |db| db.mutate_shopping_list(&thread_id, &mutation))
            .await
    }

    async fn shopping_list(&self, thread_id: &str) -> Result<ShoppingList, StoreError> {
        let thread_id = thread_id.to_string();
        self.run(move |db| db.get_shopping_list(&thread_id)).await
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let thread_id = thread_id.to_string();
        self.run(move |db| db.get_messages(&thread_id)).await
    }
}

#[async_trait]
impl RecipeCatalog for DatabaseStorage {
    async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        self.run(Database::list_recipes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopping::ShoppingOp;

    #[test]
    fn test_db_errors_map_to_store_errors() {
        let validation: StoreError = DbError::Validation(ShoppingListError::EmptyName).into();
        assert!(matches!(
            validation,
            StoreError::Validation(ShoppingListError::EmptyName)
        ));
        let poisoned: StoreError = DbError::Poisoned.into();
        assert!(matches!(poisoned, StoreError::Fatal(_)));
    }

    #[test]
    fn test_backoff_grows_and_is_bounded() {
        let first = backoff(1);
        let third = backoff(3);
        assert!(first >= Duration::from_millis(50));
        assert!(third >= Duration::from_millis(200));
        let ceiling = Duration::from_millis(BACKOFF_BASE_MS * 64 + BACKOFF_JITTER_MS);
        assert!(backoff(40) <= ceiling);
    }

    fn milk(op_id: &str) -> ShoppingMutation {
        ShoppingMutation {
            op_id: op_id.to_string(),
            op: ShoppingOp::Add {
                name: "milk".to_string(),
                quantity: 1.0,
                unit: "l".to_string(),
            },
        }
    }

    /// Open a second connection to `path` holding an exclusive lock
    fn lock_exclusively(path: &std::path::Path) -> rusqlite::Connection {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch("BEGIN EXCLUSIVE").unwrap();
        conn
    }

    #[tokio::test]
    async fn test_contention_exhausts_retries_then_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chef.db");
        let storage = DatabaseStorage::new(Database::open(&path).unwrap(), 2);
        let holder = lock_exclusively(&path);

        let err = storage
            .mutate_shopping_list("t", &milk("call-1"))
            .await
            .unwrap_err();
        match &err {
            StoreError::Contention(message) => assert!(message.contains("after 2 retries")),
            other => panic!("expected contention, got {other:?}"),
        }
        assert_eq!(ToolError::from(err).kind, crate::tools::ToolErrorKind::Recoverable);

        // Nothing was written while the lock was held
        holder.execute_batch("ROLLBACK").unwrap();
        drop(holder);
        assert!(storage.shopping_list("t").await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_contention_through_gateway_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chef.db");
        let storage = DatabaseStorage::new(Database::open(&path).unwrap(), 1);
        let gateway = crate::tools::ToolGateway::new(storage);
        let _holder = lock_exclusively(&path);

        let call = ToolCall::new(
            "call-1",
            crate::tools::ToolName::AddShoppingItem,
            serde_json::json!({"name": "milk"}),
        );
        let err = gateway
            .execute("t", &call, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::tools::ToolErrorKind::Recoverable);
    }

    #[tokio::test]
    async fn test_contention_released_mid_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chef.db");
        let storage = DatabaseStorage::new(Database::open(&path).unwrap(), 3);
        let holder = lock_exclusively(&path);

        // First attempt waits out the busy timeout; the lock is gone before the retry ends
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            holder.execute_batch("COMMIT").unwrap();
        });

        let list = storage
            .mutate_shopping_list("t", &milk("call-1"))
            .await
            .unwrap();
        releaser.join().unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(storage.shopping_list("t").await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_read_after_write_same_thread() {
        let storage = DatabaseStorage::new(Database::open_in_memory().unwrap(), 3);
        let mut state = storage.load("t").await.unwrap();
        state.begin_turn("hello");
        storage.save(&state).await.unwrap();
        assert_eq!(storage.load("t").await.unwrap(), state);

        let mutation = milk("1");
        let returned = storage.mutate_shopping_list("t", &mutation).await.unwrap();
        assert_eq!(storage.shopping_list("t").await.unwrap(), returned);
    }
}
