//! Process configuration from environment variables

use crate::runtime::TurnLimits;
use crate::system_prompt::Language;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Malformed { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("{var}: unsupported language {value:?}")]
    UnsupportedLanguage { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub rate_limit_per_minute: u32,
    pub default_language: Language,
    pub limits: TurnLimits,
    pub store_retry_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and empty values take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let text = |var: &str, default: &str| get(var).unwrap_or_else(|| default.to_string());

        let default_language = match get("DEFAULT_LANGUAGE") {
            None => Language::default(),
            Some(value) => {
                Language::parse(&value).ok_or(ConfigError::UnsupportedLanguage {
                    var: "DEFAULT_LANGUAGE",
                    value,
                })?
            }
        };

        let limits = TurnLimits {
            max_iterations: positive(&get, "MAX_ITERATIONS", 6)?,
            turn_timeout: Duration::from_secs(positive(&get, "TURN_TIMEOUT_SECS", 60)?),
            planner_timeout: Duration::from_secs(positive(&get, "PLANNER_TIMEOUT_SECS", 30)?),
            history_limit: positive(&get, "HISTORY_LIMIT", 50)?,
        };

        Ok(Self {
            db_path: text("CHEF_DB_PATH", "chef_agent.db"),
            host: text("API_HOST", "0.0.0.0"),
            port: parse(&get, "API_PORT", 8000)?,
            model: text("MODEL_NAME", "llama-3.1-8b-instant"),
            llm_base_url: text("LLM_BASE_URL", "https://api.groq.com/openai/v1"),
            llm_api_key: get("LLM_API_KEY").or_else(|| get("GROQ_API_KEY")),
            rate_limit_per_minute: positive(&get, "RATE_LIMIT_PER_MINUTE", 10)?,
            default_language,
            limits,
            store_retry_attempts: parse(&get, "STORE_RETRY_ATTEMPTS", 3)?,
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Malformed { var, value }),
    }
}

fn positive<T: FromStr + Default + PartialEq>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let value = parse(get, var, default)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}
