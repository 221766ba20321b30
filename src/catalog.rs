//! Recipe catalog domain types
//!
//! The catalog is read-only to the assistant. Stored `diet_type` text is never
//! trusted: every value read from storage or received as a search argument
//! goes through [`DietType::canonicalize`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Default number of recipes returned by a search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Hard cap on recipes returned by a search
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Difficulty levels used by the catalog
pub const DIFFICULTY_LEVELS: [&str; 3] = ["easy", "medium", "hard"];

/// Diet types supported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DietType {
    LowCarb,
    Vegetarian,
    Vegan,
    HighProtein,
    Keto,
    Mediterranean,
    GlutenFree,
    Paleo,
}

impl DietType {
    pub const ALL: [DietType; 8] = [
        DietType::LowCarb,
        DietType::Vegetarian,
        DietType::Vegan,
        DietType::HighProtein,
        DietType::Keto,
        DietType::Mediterranean,
        DietType::GlutenFree,
        DietType::Paleo,
    ];

    /// Canonical (hyphenated) wire form
    pub fn as_str(self) -> &'static str {
        match self {
            DietType::LowCarb => "low-carb",
            DietType::Vegetarian => "vegetarian",
            DietType::Vegan => "vegan",
            DietType::HighProtein => "high-protein",
            DietType::Keto => "keto",
            DietType::Mediterranean => "mediterranean",
            DietType::GlutenFree => "gluten-free",
            DietType::Paleo => "paleo",
        }
    }

    /// Normalize a raw value to its canonical variant.
    ///
    /// Accepts legacy encodings: underscore or space separators and any
    /// letter case (`LOW_CARB`, `gluten free`). Returns `None` for values that
    /// are not one of the enumerated diet types.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        Self::ALL
            .into_iter()
            .find(|diet| diet.as_str() == normalized)
    }

    /// Comma-separated list of the canonical values, for error messages
    pub fn allowed_values() -> String {
        Self::ALL
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DietType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingredient line of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
}

/// A catalog recipe with its tags and ingredients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub prep_time_minutes: Option<u32>,
    pub cook_time_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub diet_type: Option<DietType>,
    pub tags: BTreeSet<String>,
    pub ingredients: Vec<Ingredient>,
}

/// Filters accepted by recipe search.
///
/// All filters are conjunctive. Tags are lowercased before matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub diet_type: Option<DietType>,
    pub tags: BTreeSet<String>,
    pub max_prep_time: Option<u32>,
    pub max_cook_time: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<String>,
    pub limit: usize,
}

/// Ranked, bounded search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub recipes: Vec<Recipe>,
    pub total_found: usize,
}

impl SearchFilters {
    /// Whether a recipe satisfies every filter.
    ///
    /// A bounded field that is unknown on the recipe never satisfies its bound.
    pub fn matches(&self, recipe: &Recipe) -> bool {
        if let Some(diet) = self.diet_type {
            if recipe.diet_type != Some(diet) {
                return false;
            }
        }

        if let Some(max) = self.max_prep_time {
            if !recipe.prep_time_minutes.is_some_and(|t| t <= max) {
                return false;
            }
        }

        if let Some(max) = self.max_cook_time {
            if !recipe.cook_time_minutes.is_some_and(|t| t <= max) {
                return false;
            }
        }

        if let Some(min) = self.servings {
            if !recipe.servings.is_some_and(|s| s >= min) {
                return false;
            }
        }

        if let Some(difficulty) = &self.difficulty {
            let matches = recipe
                .difficulty
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(difficulty));
            if !matches {
                return false;
            }
        }

        if !self.tags.is_empty() && self.tag_overlap(recipe) == 0 {
            return false;
        }

        if let Some(query) = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
        {
            let needle = query.to_lowercase();
            let in_title = recipe.title.to_lowercase().contains(&needle);
            let in_description = recipe
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }

        true
    }

    fn tag_overlap(&self, recipe: &Recipe) -> usize {
        let recipe_tags: BTreeSet<String> =
            recipe.tags.iter().map(|t| t.to_lowercase()).collect();
        self.tags.iter().filter(|t| recipe_tags.contains(*t)).count()
    }

    fn is_exact_tag_match(&self, recipe: &Recipe) -> bool {
        !self.tags.is_empty() && self.tag_overlap(recipe) == self.tags.len()
    }

    /// Ordering used for ranking.
    ///
    /// Exact tag-set matches first, then ascending prep time (unknown last),
    /// then ascending id. Total over distinct ids, so results are deterministic.
    fn rank(&self, a: &Recipe, b: &Recipe) -> Ordering {
        let exact_a = self.is_exact_tag_match(a);
        let exact_b = self.is_exact_tag_match(b);

        exact_b
            .cmp(&exact_a)
            .then_with(|| match (a.prep_time_minutes, b.prep_time_minutes) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Filter and rank catalog entries.
pub fn search(recipes: Vec<Recipe>, filters: &SearchFilters) -> SearchResult {
    let mut matched: Vec<Recipe> = recipes
        .into_iter()
        .filter(|r| filters.matches(r))
        .collect();
    matched.sort_by(|a, b| filters.rank(a, b));

    let total_found = matched.len();
    let limit = filters.limit.clamp(1, MAX_SEARCH_LIMIT);
    matched.truncate(limit);

    SearchResult {
        recipes: matched,
        total_found,
    }
}
