//! API request and response types

use crate::db::StoredMessage;
use crate::shopping::{ShoppingItem, ShoppingList};
use crate::system_prompt::Language;
use crate::tools::SearchRecipesArgs;
use serde::{Deserialize, Serialize};

/// Request to run one chat turn
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatMessageRequest {
    pub thread_id: String,
    pub message: String,
    #[serde(default)]
    pub language: Option<Language>,
}

/// Response for a completed turn
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub answer: String,
    pub thread_id: String,
}

/// Body of a failed turn; only the safe fallback text is exposed
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnFailedResponse {
    pub error: String,
    pub answer: String,
    pub thread_id: String,
}

/// Query string of the recipe search endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeSearchQuery {
    pub query: Option<String>,
    pub diet_type: Option<String>,
    /// Comma-separated tags
    pub tags: Option<String>,
    pub max_prep_time: Option<u32>,
    pub max_cook_time: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub limit: Option<usize>,
}

impl From<RecipeSearchQuery> for SearchRecipesArgs {
    fn from(query: RecipeSearchQuery) -> Self {
        Self {
            query: query.query,
            diet_type: query.diet_type,
            tags: query
                .tags
                .map(|tags| tags.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            max_prep_time: query.max_prep_time,
            max_cook_time: query.max_cook_time,
            servings: query.servings,
            difficulty: query.difficulty,
            limit: query.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub thread_id: String,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Serialize)]
pub struct ShoppingListResponse {
    pub thread_id: String,
    pub items: Vec<ShoppingItem>,
}

impl From<ShoppingList> for ShoppingListResponse {
    fn from(list: ShoppingList) -> Self {
        Self {
            thread_id: list.thread_id,
            items: list.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
