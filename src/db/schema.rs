//! Database schema and record types

use crate::tools::{ToolError, ToolName, ToolOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS recipes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    instructions TEXT NOT NULL DEFAULT '',
    prep_time_minutes INTEGER,
    cook_time_minutes INTEGER,
    servings INTEGER,
    difficulty TEXT,
    diet_type TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS recipe_tags (
    recipe_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (recipe_id, tag_id),
    FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS recipe_ingredients (
    recipe_id INTEGER PRIMARY KEY,
    ingredients TEXT NOT NULL DEFAULT '[]',
    FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS shopping_lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL UNIQUE,
    items TEXT NOT NULL DEFAULT '[]',
    applied_ops TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS threads (
    thread_id TEXT PRIMARY KEY,
    pending_tool_calls TEXT NOT NULL DEFAULT '[]',
    iteration_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS thread_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    tool_call TEXT,
    created_at TEXT NOT NULL,

    UNIQUE (thread_id, sequence_id),
    FOREIGN KEY (thread_id) REFERENCES threads(thread_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_recipes_diet_type ON recipes(diet_type);
CREATE INDEX IF NOT EXISTS idx_thread_messages_thread ON thread_messages(thread_id, sequence_id);
";

/// Rewrite legacy underscore-separated diet types to the hyphenated form.
///
/// Idempotent. Stored values are still canonicalized on read.
pub const MIGRATION_DIET_TYPE_HYPHENS: &str = r"
UPDATE recipes
SET diet_type = REPLACE(LOWER(TRIM(diet_type)), '_', '-'),
    updated_at = CURRENT_TIMESTAMP
WHERE diet_type IS NOT NULL AND INSTR(diet_type, '_') > 0;
";

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Reference from a tool-result message to the call that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub tool_name: ToolName,
    pub arguments: Value,
}

/// A conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present on `Role::Tool` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRef>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn tool(call: ToolCallRef, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: Some(call),
        }
    }
}

/// Outcome of one executed tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallOutcome {
    Result { result: ToolOutput },
    Error { error: ToolError },
}

/// A tool call made during the current turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: ToolName,
    pub arguments: Value,
    #[serde(flatten)]
    pub outcome: ToolCallOutcome,
}

impl ToolCallRecord {
    pub fn call_ref(&self) -> ToolCallRef {
        ToolCallRef {
            id: self.id.clone(),
            tool_name: self.tool_name,
            arguments: self.arguments.clone(),
        }
    }

    /// Text handed to the planner as the tool result
    pub fn result_text(&self) -> String {
        match &self.outcome {
            ToolCallOutcome::Result { result } => {
                serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string())
            }
            ToolCallOutcome::Error { error } => serde_json::json!({
                "error_kind": error.kind,
                "message": error.message,
            })
            .to_string(),
        }
    }
}

/// Per-thread conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    /// Append-only history
    pub messages: Vec<Message>,
    /// Tool calls of the most recent turn
    pub pending_tool_calls: Vec<ToolCallRecord>,
    pub iteration_count: u32,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            pending_tool_calls: Vec::new(),
            iteration_count: 0,
        }
    }

    /// Reset per-turn fields and append the user's message
    pub fn begin_turn(&mut self, user_message: &str) {
        self.pending_tool_calls.clear();
        self.iteration_count = 0;
        self.messages.push(Message::user(user_message));
    }
}

/// Stored message with persistence metadata
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub sequence_id: i64,
    #[serde(flatten)]
    pub message: Message,
    pub created_at: DateTime<Utc>,
}
