//! System prompt construction for the planner
//!
//! The prompt describes the assistant's job and its tools, and pins the
//! answer language for the turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the assistant answers in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
    Fr,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::De, Language::Fr];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
            Language::Fr => "fr",
        }
    }

    fn english_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::De => "German",
            Language::Fr => "French",
        }
    }

    /// Parse a language code such as `de` or `FR`
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Base system prompt establishing the agent's role
const BASE_PROMPT: &str = r"You are Chef, a friendly cooking assistant. You help people plan meals, find recipes from the catalog and keep their shopping list up to date.

Tools:
- search_recipes: find recipes by free text, diet type, tags, preparation and cooking time, servings or difficulty. Only recommend recipes the tool returned; never invent recipes.
- add_shopping_item: put an ingredient on the shopping list. Use the unit the item is already listed in.
- remove_shopping_item: take an ingredient off the list.
- check_off_item: mark an item as bought.

Call at most one tool at a time and wait for its result. When a tool reports an error, explain the problem to the user or correct the arguments and try again. When you have what you need, answer the user directly and concisely without calling a tool.";

/// Instruction appended when the previous planner response was unusable
pub const CORRECTIVE_INSTRUCTION: &str = "Your previous response could not be used. Reply either with plain text for the user, or with exactly one call to one of the listed tools whose arguments are a JSON object matching that tool's schema.";

/// Build the system prompt for a turn in the given language
pub fn build_system_prompt(language: Language) -> String {
    format!(
        "{BASE_PROMPT}\n\nAlways answer in {} ({}), whatever language recipe data or tool results are in.",
        language.english_name(),
        language.code()
    )
}
