//! HTTP request handlers

use super::middleware::{rate_limit, LIMIT_HEADER, REMAINING_HEADER};
use super::types::{
    ChatMessageRequest, ChatMessageResponse, ErrorResponse, HealthResponse, HistoryResponse,
    RecipeSearchQuery, ShoppingListResponse, TurnFailedResponse,
};
use super::AppState;
use crate::catalog::{self, DietType, Recipe, SearchResult, DIFFICULTY_LEVELS};
use crate::planner::{Planner, PlannerErrorKind};
use crate::runtime::{RecipeCatalog, StateStore, TurnOutcome, TurnRequest};
use crate::state_machine::TurnFailure;
use crate::tools::SearchRecipesArgs;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use regex::Regex;
use std::sync::LazyLock;

const MAX_MESSAGE_CHARS: usize = 4000;

static THREAD_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,64}$").ok());

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let chat = Router::new()
        .route("/api/v1/chat/message", post(send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(chat)
        .route("/api/v1/chat/threads/:thread_id/history", get(get_history))
        .route("/api/v1/shopping/:thread_id", get(get_shopping_list))
        .route("/api/v1/recipes", get(search_recipes))
        .route("/api/v1/recipes/diet-types", get(diet_types))
        .route("/api/v1/recipes/difficulties", get(difficulties))
        .route("/api/v1/recipes/:recipe_id", get(get_recipe))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================
// Chat
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatMessageRequest>, JsonRejection>,
) -> Result<Json<ChatMessageResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_thread_id(&request.thread_id)?;

    let message = request.message.trim();
    let chars = message.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message must be 1 to {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let turn = TurnRequest {
        thread_id: request.thread_id.clone(),
        message: message.to_string(),
        language: request.language.unwrap_or(state.default_language),
    };

    match state.orchestrator.run_turn(turn).await {
        TurnOutcome::Completed { answer } => Ok(Json(ChatMessageResponse {
            answer,
            thread_id: request.thread_id,
        })),
        TurnOutcome::Failed { failure } => Err(ApiError::TurnFailed {
            failure,
            thread_id: request.thread_id,
        }),
    }
}

// ============================================================
// Thread state
// ============================================================

async fn get_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    validate_thread_id(&thread_id)?;
    let messages = state
        .orchestrator
        .store()
        .history(&thread_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(HistoryResponse {
        thread_id,
        messages,
    }))
}

async fn get_shopping_list(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ShoppingListResponse>, ApiError> {
    validate_thread_id(&thread_id)?;
    let list = state
        .orchestrator
        .store()
        .shopping_list(&thread_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(list.into()))
}

// ============================================================
// Recipes
// ============================================================

async fn search_recipes(
    State(state): State<AppState>,
    query: Result<Query<RecipeSearchQuery>, QueryRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filters = SearchRecipesArgs::from(query)
        .into_filters()
        .map_err(|e| ApiError::BadRequest(e.message))?;
    let recipes = state
        .orchestrator
        .store()
        .list_recipes()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(catalog::search(recipes, &filters)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    let id: i64 = recipe_id
        .parse()
        .map_err(|_| ApiError::BadRequest("recipe id must be an integer".to_string()))?;
    state
        .orchestrator
        .store()
        .recipe(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("recipe {id} not found")))
}

async fn diet_types() -> Json<Vec<&'static str>> {
    Json(DietType::ALL.into_iter().map(DietType::as_str).collect())
}

async fn difficulties() -> Json<[&'static str; 3]> {
    Json(DIFFICULTY_LEVELS)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.orchestrator.planner().model_id().to_string(),
    })
}

fn validate_thread_id(thread_id: &str) -> Result<(), ApiError> {
    if THREAD_ID.as_ref().is_some_and(|re| re.is_match(thread_id)) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "thread_id must be 3 to 64 characters of letters, digits, '_' or '-'".to_string(),
        ))
    }
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub(super) enum ApiError {
    BadRequest(String),
    NotFound(String),
    RateLimited { retry_after_secs: u64, limit: u32 },
    TurnFailed { failure: TurnFailure, thread_id: String },
    Internal(String),
}

fn failure_status(failure: &TurnFailure) -> StatusCode {
    match failure {
        TurnFailure::Timeout
        | TurnFailure::Planner {
            kind: PlannerErrorKind::Timeout,
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
        TurnFailure::Planner { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(msg))).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(msg))).into_response()
            }
            ApiError::RateLimited {
                retry_after_secs,
                limit,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse::new("rate limit exceeded")),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
                headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
                response
            }
            ApiError::TurnFailed { failure, thread_id } => {
                let body = TurnFailedResponse {
                    error: failure.kind().to_string(),
                    answer: failure.degraded_message().to_string(),
                    thread_id,
                };
                (failure_status(&failure), Json(body)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("internal error")),
                )
                    .into_response()
            }
        }
    }
}
