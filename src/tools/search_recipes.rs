//! Recipe search tool

use super::ToolError;
use crate::catalog::{DietType, SearchFilters, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) const DESCRIPTION: &str = "Search the recipe catalog. All filters are optional and combine with AND. Results are ranked: recipes carrying every requested tag first, then by shortest preparation time. Returns the matching recipes with their ingredients and the total number of matches.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRecipesArgs {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub diet_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_prep_time: Option<u32>,
    #[serde(default)]
    pub max_cook_time: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchRecipesArgs {
    pub fn into_filters(self) -> Result<SearchFilters, ToolError> {
        let diet_type = match self.diet_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(DietType::canonicalize(raw).ok_or_else(|| {
                ToolError::invalid_arguments(format!(
                    "unknown diet_type '{raw}', expected one of: {}",
                    DietType::allowed_values()
                ))
            })?),
        };

        let limit = self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(ToolError::invalid_arguments(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {limit}"
            )));
        }

        let tags = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(SearchFilters {
            query: self.query.filter(|q| !q.trim().is_empty()),
            diet_type,
            tags,
            max_prep_time: self.max_prep_time,
            max_cook_time: self.max_cook_time,
            servings: self.servings,
            difficulty: self.difficulty.filter(|d| !d.trim().is_empty()),
            limit,
        })
    }
}

pub(super) fn input_schema() -> Value {
    let diets: Vec<&str> = DietType::ALL.iter().map(|d| d.as_str()).collect();
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "query": {
                "type": "string",
                "description": "Free text matched against recipe titles and descriptions"
            },
            "diet_type": {
                "type": "string",
                "enum": diets,
                "description": "Restrict to one diet"
            },
            "tags": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Recipe tags such as 'quick' or 'dinner'"
            },
            "max_prep_time": {
                "type": "integer",
                "minimum": 0,
                "description": "Maximum preparation time in minutes"
            },
            "max_cook_time": {
                "type": "integer",
                "minimum": 0,
                "description": "Maximum cooking time in minutes"
            },
            "servings": {
                "type": "integer",
                "minimum": 1,
                "description": "Minimum number of servings"
            },
            "difficulty": {
                "type": "string",
                "description": "easy, medium or hard"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_SEARCH_LIMIT,
                "description": "Maximum number of recipes to return (default 10)"
            }
        }
    })
}
