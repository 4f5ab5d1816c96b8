use crate::agent::tools::ToolSpec;
use crate::error::{Result, RoamingError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: String, // JSON string
}

/// Message in OpenAI chat format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<FunctionCall>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::text("assistant", content)
    }

    pub fn assistant_tool_call(call: FunctionCall) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: vec![call],
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(call_id: &str, name: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
        }
    }

    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// What the model produced for one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    ToolCalls(Vec<FunctionCall>),
    Content(String),
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RoamingError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Call the chat-completions endpoint with tool calling enabled.
    pub async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatReply> {
        let api_messages: Vec<serde_json::Value> = messages.iter().map(message_to_json).collect();

        let api_tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "tools": api_tools,
            "tool_choice": "auto",
            "temperature": 0,
        });

        // Gemini's compatibility layer does not accept this field.
        if !self.model.starts_with("gemini") {
            body["parallel_tool_calls"] = serde_json::json!(false);
        }

        let response = self
            .http
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RoamingError::Llm(format!("LLM API call failed: {}", e)))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RoamingError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RoamingError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        parse_chat_reply(&response_json)
    }
}

fn message_to_json(m: &ChatMessage) -> serde_json::Value {
    let mut msg = serde_json::json!({
        "role": m.role,
    });

    if let Some(ref content) = m.content {
        msg["content"] = serde_json::json!(content);
    }

    if !m.tool_calls.is_empty() {
        msg["tool_calls"] = m
            .tool_calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "arguments": c.arguments,
                    }
                })
            })
            .collect();
    }

    if let Some(ref id) = m.tool_call_id {
        msg["tool_call_id"] = serde_json::json!(id);
    }

    if let Some(ref name) = m.name {
        msg["name"] = serde_json::json!(name);
    }

    msg
}

pub fn parse_chat_reply(response_json: &serde_json::Value) -> Result<ChatReply> {
    // Check for error
    if let Some(error) = response_json.get("error") {
        return Err(RoamingError::Llm(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| RoamingError::Llm("No choices array in LLM response".to_string()))?;

    let choice = choices
        .first()
        .ok_or_else(|| RoamingError::Llm("Empty choices array in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(RoamingError::Llm("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    let message = &choice["message"];

    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        let mut parsed = Vec::with_capacity(calls.len());
        for (idx, call) in calls.iter().enumerate() {
            let function = &call["function"];
            let name = function["name"]
                .as_str()
                .ok_or_else(|| RoamingError::Llm("No function name in tool call".to_string()))?
                .to_string();
            let arguments = match &function["arguments"] {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            let id = call["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", idx));
            parsed.push(FunctionCall { id, name, arguments });
        }
        if !parsed.is_empty() {
            debug!("LLM requested {} tool call(s)", parsed.len());
            return Ok(ChatReply::ToolCalls(parsed));
        }
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("");
    Ok(ChatReply::Content(content.to_string()))
}
