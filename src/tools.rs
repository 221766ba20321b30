//! Tool implementations for the chef agent
//!
//! Tools form a closed set. The planner names one with [`ToolName`], the
//! gateway validates its arguments into a typed [`ToolInput`] and dispatches
//! by exhaustive match.

mod search_recipes;
mod shopping_list;

pub use search_recipes::SearchRecipesArgs;
pub use shopping_list::{AddShoppingItemArgs, CheckOffItemArgs, RemoveShoppingItemArgs};

use crate::catalog::{self, Recipe, SearchFilters};
use crate::planner::ToolDefinition;
use crate::runtime::{RecipeCatalog, StateStore, StoreError, ToolExecutor};
use crate::shopping::{ShoppingList, ShoppingMutation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Names of the tools the planner may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchRecipes,
    AddShoppingItem,
    RemoveShoppingItem,
    CheckOffItem,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::SearchRecipes,
        ToolName::AddShoppingItem,
        ToolName::RemoveShoppingItem,
        ToolName::CheckOffItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::SearchRecipes => "search_recipes",
            ToolName::AddShoppingItem => "add_shopping_item",
            ToolName::RemoveShoppingItem => "remove_shopping_item",
            ToolName::CheckOffItem => "check_off_item",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether the tool mutates the thread's shopping list
    pub fn is_mutation(self) -> bool {
        !matches!(self, ToolName::SearchRecipes)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call requested by the planner, arguments not yet validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Idempotency key for the call; replays with the same id are no-ops
    pub id: String,
    pub tool: ToolName,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool: ToolName, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool,
            arguments,
        }
    }
}

/// Validated, typed tool input
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    SearchRecipes(SearchFilters),
    AddShoppingItem(ShoppingMutation),
    RemoveShoppingItem(ShoppingMutation),
    CheckOffItem(ShoppingMutation),
}

impl ToolInput {
    /// Validate raw arguments against the tool's schema.
    ///
    /// Unknown fields, missing required fields and out-of-range values are
    /// all `InvalidArguments`.
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        match call.tool {
            ToolName::SearchRecipes => {
                let args: SearchRecipesArgs = decode(call)?;
                Ok(ToolInput::SearchRecipes(args.into_filters()?))
            }
            ToolName::AddShoppingItem => {
                let args: AddShoppingItemArgs = decode(call)?;
                Ok(ToolInput::AddShoppingItem(args.into_mutation(&call.id)?))
            }
            ToolName::RemoveShoppingItem => {
                let args: RemoveShoppingItemArgs = decode(call)?;
                Ok(ToolInput::RemoveShoppingItem(args.into_mutation(&call.id)?))
            }
            ToolName::CheckOffItem => {
                let args: CheckOffItemArgs = decode(call)?;
                Ok(ToolInput::CheckOffItem(args.into_mutation(&call.id)?))
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T, ToolError> {
    // Models sometimes send `null` for a tool without required arguments
    let arguments = if call.arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        call.arguments.clone()
    };
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::invalid_arguments(format!("{}: {e}", call.tool)))
}

/// Typed result of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Recipes {
        recipes: Vec<Recipe>,
        total_found: usize,
    },
    ShoppingList {
        list: ShoppingList,
    },
}

/// Classification of tool failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Arguments failed validation; never retried
    InvalidArguments,
    /// Transient failure; retried once with the same arguments
    Recoverable,
    /// Aborts the turn
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::InvalidArguments,
            message: message.into(),
        }
    }

    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Recoverable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Fatal,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => ToolError::invalid_arguments(e.to_string()),
            StoreError::Contention(_) => ToolError::recoverable(err.to_string()),
            StoreError::Fatal(_) => ToolError::fatal(err.to_string()),
        }
    }
}

/// Executes tool calls against the recipe catalog and the thread's store
pub struct ToolGateway<S> {
    store: S,
}

impl<S> ToolGateway<S>
where
    S: StateStore + RecipeCatalog,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn search(&self, filters: &SearchFilters) -> Result<ToolOutput, ToolError> {
        let recipes = self.store.list_recipes().await?;
        let result = catalog::search(recipes, filters);
        tracing::debug!(
            returned = result.recipes.len(),
            total_found = result.total_found,
            "Recipe search complete"
        );
        Ok(ToolOutput::Recipes {
            recipes: result.recipes,
            total_found: result.total_found,
        })
    }

    async fn mutate(
        &self,
        thread_id: &str,
        mutation: &ShoppingMutation,
    ) -> Result<ToolOutput, ToolError> {
        let list = self.store.mutate_shopping_list(thread_id, mutation).await?;
        Ok(ToolOutput::ShoppingList { list })
    }
}

#[async_trait]
impl<S> ToolExecutor for ToolGateway<S>
where
    S: StateStore + RecipeCatalog,
{
    async fn execute(
        &self,
        thread_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::fatal("cancelled"));
        }

        match ToolInput::parse(call)? {
            ToolInput::SearchRecipes(filters) => self.search(&filters).await,
            ToolInput::AddShoppingItem(mutation)
            | ToolInput::RemoveShoppingItem(mutation)
            | ToolInput::CheckOffItem(mutation) => self.mutate(thread_id, &mutation).await,
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        definitions()
    }
}

/// Definitions of every tool, in a stable order
pub fn definitions() -> Vec<ToolDefinition> {
    ToolName::ALL
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool.as_str().to_string(),
            description: description(tool).to_string(),
            input_schema: input_schema(tool),
        })
        .collect()
}

fn description(tool: ToolName) -> &'static str {
    match tool {
        ToolName::SearchRecipes => search_recipes::DESCRIPTION,
        ToolName::AddShoppingItem => shopping_list::ADD_DESCRIPTION,
        ToolName::RemoveShoppingItem => shopping_list::REMOVE_DESCRIPTION,
        ToolName::CheckOffItem => shopping_list::CHECK_OFF_DESCRIPTION,
    }
}

fn input_schema(tool: ToolName) -> Value {
    match tool {
        ToolName::SearchRecipes => search_recipes::input_schema(),
        ToolName::AddShoppingItem => shopping_list::add_schema(),
        ToolName::RemoveShoppingItem => shopping_list::remove_schema(),
        ToolName::CheckOffItem => shopping_list::check_off_schema(),
    }
}
