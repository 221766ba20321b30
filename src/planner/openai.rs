//! `OpenAI`-compatible chat-completions planner (Groq by default)

use super::types::{PlanRequest, PlannerDecision, RawPlannerOutput, RawToolCall};
use super::{Planner, PlannerError};
use crate::db::{Message, Role};
use crate::system_prompt::build_system_prompt;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.3;

/// OpenAI-compatible planner implementation
pub struct OpenAiPlanner {
    client: Client,
    api_key: Option<String>,
    model: String,
    url: String,
    timeout: Duration,
}

impl OpenAiPlanner {
    /// Create a planner. Without an API key every request is `Unavailable`.
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    fn translate_request(&self, request: &PlanRequest) -> OpenAIRequest {
        let mut messages = vec![OpenAIMessage::text(
            "system",
            build_system_prompt(request.language),
        )];

        for msg in &request.messages {
            messages.extend(Self::translate_message(msg));
        }

        if let Some(corrective) = &request.corrective {
            messages.push(OpenAIMessage::text("system", corrective.clone()));
        }

        let tools = request
            .tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function".to_string(),
                function: OpenAIFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            tool_choice: "auto".to_string(),
            parallel_tool_calls: false,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream: false,
        }
    }

    /// Translate a stored message.
    ///
    /// A tool result becomes the assistant tool call followed by the `tool`
    /// message answering it, so every result is linked to its call even when
    /// the history window cuts between them.
    fn translate_message(msg: &Message) -> Vec<OpenAIMessage> {
        match (msg.role, &msg.tool_call) {
            (Role::Tool, Some(call)) => vec![
                OpenAIMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: call.tool_name.as_str().to_string(),
                            arguments: call.arguments.to_string(),
                        },
                    }]),
                    tool_call_id: None,
                },
                OpenAIMessage {
                    role: "tool".to_string(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                },
            ],
            // A tool message without its call cannot be linked; pass it as context
            (Role::Tool, None) => vec![OpenAIMessage::text(
                "user",
                format!("Tool result: {}", msg.content),
            )],
            (Role::User, _) => vec![OpenAIMessage::text("user", msg.content.clone())],
            (Role::Assistant, _) => vec![OpenAIMessage::text("assistant", msg.content.clone())],
        }
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<RawPlannerOutput, PlannerError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PlannerError::schema_invalid("No choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| RawToolCall {
                id: Some(tc.id),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(RawPlannerOutput {
            text: choice.message.content,
            tool_calls,
        })
    }

    fn classify_status(status: StatusCode, body: &str) -> PlannerError {
        let error = serde_json::from_str::<OpenAIErrorResponse>(body).ok().map(|r| r.error);
        let message = error
            .as_ref()
            .map_or_else(|| format!("HTTP {status}"), |e| format!("HTTP {status}: {}", e.message));

        // Groq reports a malformed tool call generated by the model as a 400
        let model_output_rejected = error
            .as_ref()
            .and_then(|e| e.code.as_deref())
            .is_some_and(|code| code == "tool_use_failed");

        if status == StatusCode::BAD_REQUEST && model_output_rejected {
            PlannerError::schema_invalid(message)
        } else {
            PlannerError::unavailable(message)
        }
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn decide(&self, request: &PlanRequest) -> Result<PlannerDecision, PlannerError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PlannerError::unavailable("No planner API key configured"))?;

        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlannerError::timeout(format!(
                        "Request exceeded {}s: {e}",
                        self.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    PlannerError::unavailable(format!("Connection failed: {e}"))
                } else {
                    PlannerError::unavailable(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                PlannerError::timeout(format!("Reading response timed out: {e}"))
            } else {
                PlannerError::unavailable(format!("Failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| PlannerError::schema_invalid(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(openai_response)?.into_decision()
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    tools: Vec<OpenAITool>,
    tool_choice: String,
    parallel_tool_calls: bool,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
