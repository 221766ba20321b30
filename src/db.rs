//! Database module for the chef agent
//!
//! Provides persistence for the recipe catalog, per-thread conversation
//! state and shopping lists.

mod schema;

pub use schema::*;

use crate::catalog::{DietType, Ingredient, Recipe};
use crate::shopping::{
    AppliedOp, ShoppingItem, ShoppingList, ShoppingListError, ShoppingMutation,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Database busy: {0}")]
    Contention(rusqlite::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("History for thread {0} cannot be shortened")]
    HistoryRewrite(String),
    #[error("Database connection poisoned")]
    Poisoned,
    #[error(transparent)]
    Validation(#[from] ShoppingListError),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => DbError::Contention(err),
            _ => DbError::Sqlite(err),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Corrupt(err.to_string())
    }
}

impl DbError {
    /// Transient lock conflicts that may succeed on retry
    pub fn is_contention(&self) -> bool {
        matches!(self, DbError::Contention(_))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        let rewritten = conn.execute(MIGRATION_DIET_TYPE_HYPHENS, [])?;
        if rewritten > 0 {
            tracing::info!(rows = rewritten, "Rewrote legacy diet_type values");
        }
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Thread Operations ====================

    /// Load conversation state, creating an empty thread if none exists
    pub fn load_thread(&self, thread_id: &str) -> DbResult<ConversationState> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT OR IGNORE INTO threads (thread_id, pending_tool_calls, iteration_count, created_at, updated_at)
             VALUES (?1, '[]', 0, ?2, ?2)",
            params![thread_id, now],
        )?;

        let (pending_json, iteration_count): (String, u32) = tx.query_row(
            "SELECT pending_tool_calls, iteration_count FROM threads WHERE thread_id = ?1",
            params![thread_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let pending_tool_calls: Vec<ToolCallRecord> = serde_json::from_str(&pending_json)?;
        let messages = read_messages(&tx, thread_id)?
            .into_iter()
            .map(|m| m.message)
            .collect();

        tx.commit()?;

        Ok(ConversationState {
            thread_id: thread_id.to_string(),
            messages,
            pending_tool_calls,
            iteration_count,
        })
    }

    /// Persist the full conversation state in one transaction.
    ///
    /// Messages are append-only: rows already stored are kept and only the
    /// tail beyond them is inserted.
    pub fn save_thread(&self, state: &ConversationState) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();
        let pending_json = serde_json::to_string(&state.pending_tool_calls)?;

        tx.execute(
            "INSERT INTO threads (thread_id, pending_tool_calls, iteration_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
                pending_tool_calls = excluded.pending_tool_calls,
                iteration_count = excluded.iteration_count,
                updated_at = excluded.updated_at",
            params![state.thread_id, pending_json, state.iteration_count, now],
        )?;

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM thread_messages WHERE thread_id = ?1",
            params![state.thread_id],
            |row| row.get(0),
        )?;
        let stored = usize::try_from(stored).map_err(|e| DbError::Corrupt(e.to_string()))?;
        if state.messages.len() < stored {
            return Err(DbError::HistoryRewrite(state.thread_id.clone()));
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO thread_messages (thread_id, sequence_id, role, content, tool_call, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (index, message) in state.messages.iter().enumerate().skip(stored) {
                let sequence_id =
                    i64::try_from(index).map_err(|e| DbError::Corrupt(e.to_string()))?;
                let tool_call = message
                    .tool_call
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    state.thread_id,
                    sequence_id,
                    message.role.as_str(),
                    message.content,
                    tool_call,
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Stored history for a thread, oldest first
    pub fn get_messages(&self, thread_id: &str) -> DbResult<Vec<StoredMessage>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let messages = read_messages(&tx, thread_id)?;
        tx.commit()?;
        Ok(messages)
    }

    // ==================== Shopping List Operations ====================

    /// Current shopping list; empty if the thread has none yet
    pub fn get_shopping_list(&self, thread_id: &str) -> DbResult<ShoppingList> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let list = read_shopping_list(&tx, thread_id)?;
        tx.commit()?;
        Ok(list.unwrap_or_else(|| ShoppingList::new(thread_id)))
    }

    /// Apply a mutation and write the list back, or change nothing.
    pub fn mutate_shopping_list(
        &self,
        thread_id: &str,
        mutation: &ShoppingMutation,
    ) -> DbResult<ShoppingList> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = read_shopping_list(&tx, thread_id)?;
        let is_new = existing.is_none();
        let mut list = existing.unwrap_or_else(|| ShoppingList::new(thread_id));

        if list.has_applied(mutation) {
            tracing::debug!(
                thread_id,
                op_id = %mutation.op_id,
                "Shopping mutation already applied"
            );
            tx.commit()?;
            return Ok(list);
        }

        // Dropping the transaction on error rolls it back
        list.apply(mutation)?;

        let now = Utc::now().to_rfc3339();
        let items_json = serde_json::to_string(&list.items)?;
        let ops_json = serde_json::to_string(&list.applied_ops)?;
        if is_new {
            tx.execute(
                "INSERT INTO shopping_lists (thread_id, items, applied_ops, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![thread_id, items_json, ops_json, now],
            )?;
        } else {
            tx.execute(
                "UPDATE shopping_lists SET items = ?1, applied_ops = ?2, updated_at = ?3
                 WHERE thread_id = ?4",
                params![items_json, ops_json, now, thread_id],
            )?;
        }

        tx.commit()?;
        Ok(list)
    }

    // ==================== Catalog Operations ====================

    /// All catalog recipes with tags and ingredients, diet types canonicalized
    pub fn list_recipes(&self) -> DbResult<Vec<Recipe>> {
        let conn = self.conn()?;

        let mut tags: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT rt.recipe_id, t.name FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (recipe_id, name) = row?;
                tags.entry(recipe_id).or_default().insert(name.to_lowercase());
            }
        }

        let mut stmt = conn.prepare(
            "SELECT r.id, r.title, r.description, r.instructions, r.prep_time_minutes,
                    r.cook_time_minutes, r.servings, r.difficulty, r.diet_type, ri.ingredients
             FROM recipes r
             LEFT JOIN recipe_ingredients ri ON ri.recipe_id = r.id
             ORDER BY r.id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RecipeRow {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                instructions: row.get(3)?,
                prep_time_minutes: row.get(4)?,
                cook_time_minutes: row.get(5)?,
                servings: row.get(6)?,
                difficulty: row.get(7)?,
                diet_type: row.get(8)?,
                ingredients: row.get(9)?,
            })
        })?;

        let mut recipes = Vec::new();
        for row in rows {
            let row = row?;
            let recipe_tags = tags.remove(&row.id).unwrap_or_default();
            recipes.push(row.into_recipe(recipe_tags));
        }
        Ok(recipes)
    }

    /// Insert a catalog entry with raw `diet_type` text (test fixture)
    #[cfg(test)]
    pub fn insert_recipe_raw(
        &self,
        title: &str,
        prep_time_minutes: Option<u32>,
        diet_type: Option<&str>,
        tag_names: &[&str],
        ingredients: &[Ingredient],
    ) -> DbResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO recipes (title, description, instructions, prep_time_minutes, cook_time_minutes, servings, difficulty, diet_type)
             VALUES (?1, NULL, 'Cook it.', ?2, 10, 2, 'easy', ?3)",
            params![title, prep_time_minutes, diet_type],
        )?;
        let recipe_id = conn.last_insert_rowid();
        for name in tag_names {
            conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
            conn.execute(
                "INSERT INTO recipe_tags (recipe_id, tag_id) SELECT ?1, id FROM tags WHERE name = ?2",
                params![recipe_id, name],
            )?;
        }
        conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, ingredients) VALUES (?1, ?2)",
            params![recipe_id, serde_json::to_string(ingredients)?],
        )?;
        Ok(recipe_id)
    }

    /// Overwrite a stored diet type, bypassing migrations (test fixture)
    #[cfg(test)]
    pub fn set_raw_diet_type(&self, recipe_id: i64, diet_type: &str) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE recipes SET diet_type = ?1 WHERE id = ?2",
            params![diet_type, recipe_id],
        )?;
        Ok(())
    }
}

struct RecipeRow {
    id: i64,
    title: String,
    description: Option<String>,
    instructions: String,
    prep_time_minutes: Option<u32>,
    cook_time_minutes: Option<u32>,
    servings: Option<u32>,
    difficulty: Option<String>,
    diet_type: Option<String>,
    ingredients: Option<String>,
}

impl RecipeRow {
    fn into_recipe(self, tags: BTreeSet<String>) -> Recipe {
        let diet_type = self.diet_type.as_deref().and_then(|raw| {
            let parsed = DietType::canonicalize(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                tracing::warn!(
                    recipe_id = self.id,
                    diet_type = raw,
                    "Unrecognized diet_type in catalog"
                );
            }
            parsed
        });

        let ingredients = self
            .ingredients
            .as_deref()
            .map(|json| {
                serde_json::from_str::<Vec<Ingredient>>(json).unwrap_or_else(|e| {
                    tracing::warn!(
                        recipe_id = self.id,
                        error = %e,
                        "Unreadable ingredients, using none"
                    );
                    Vec::new()
                })
            })
            .unwrap_or_default();

        Recipe {
            id: self.id,
            title: self.title,
            description: self.description,
            instructions: self.instructions,
            prep_time_minutes: self.prep_time_minutes,
            cook_time_minutes: self.cook_time_minutes,
            servings: self.servings,
            difficulty: self.difficulty,
            diet_type,
            tags,
            ingredients,
        }
    }
}

fn read_messages(tx: &Transaction<'_>, thread_id: &str) -> DbResult<Vec<StoredMessage>> {
    let mut stmt = tx.prepare(
        "SELECT sequence_id, role, content, tool_call, created_at
         FROM thread_messages WHERE thread_id = ?1 ORDER BY sequence_id ASC",
    )?;
    let rows = stmt.query_map(params![thread_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (sequence_id, role, content, tool_call, created_at) = row?;
        let role: Role = role.parse().map_err(DbError::Corrupt)?;
        let tool_call = tool_call
            .as_deref()
            .map(serde_json::from_str::<ToolCallRef>)
            .transpose()?;
        messages.push(StoredMessage {
            sequence_id,
            message: Message {
                role,
                content,
                tool_call,
            },
            created_at: parse_datetime(&created_at),
        });
    }
    Ok(messages)
}

fn read_shopping_list(tx: &Transaction<'_>, thread_id: &str) -> DbResult<Option<ShoppingList>> {
    let row: Option<(String, String)> = tx
        .query_row(
            "SELECT items, applied_ops FROM shopping_lists WHERE thread_id = ?1",
            params![thread_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(items_json, ops_json)| {
        let items: Vec<ShoppingItem> = serde_json::from_str(&items_json)?;
        let applied_ops: VecDeque<AppliedOp> = serde_json::from_str(&ops_json)?;
        Ok(ShoppingList {
            thread_id: thread_id.to_string(),
            items,
            applied_ops,
        })
    })
    .transpose()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
