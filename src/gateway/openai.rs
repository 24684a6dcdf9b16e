//! `OpenAI` chat completion gateway with function tools

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ModelGateway, ModelTurn, ToolInvocation, ToolSchema};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI`-compatible chat completion gateway
pub struct OpenAiGateway {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiGateway {
    /// Create a new gateway for the given model
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (`OpenAI`-compatible providers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(
        &self,
        system_prompt: &str,
        transcript: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatCompletionRequest> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: Some(system_prompt.to_string()),
            tool_call_id: None,
            tool_calls: None,
        });

        for msg in transcript {
            messages.push(wire_message(msg)?);
        }

        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn> {
        let request = self.build_request(system_prompt, transcript, tools)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!("API error: {status} - {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("failed to parse response: {e}")))?;

        turn_from_response(result)
    }
}

fn wire_message(msg: &ChatMessage) -> Result<WireMessage> {
    let tool_calls = if msg.invocations.is_empty() {
        None
    } else {
        let mut calls = Vec::with_capacity(msg.invocations.len());
        for inv in &msg.invocations {
            calls.push(WireToolCall {
                id: inv.id.clone(),
                kind: "function",
                function: WireFunctionCall {
                    name: inv.name.clone(),
                    arguments: serde_json::to_string(&inv.arguments)?,
                },
            });
        }
        Some(calls)
    };

    Ok(WireMessage {
        role: msg.role.as_str(),
        content: msg.content.clone(),
        tool_call_id: msg.tool_call_id.clone(),
        tool_calls,
    })
}

fn turn_from_response(response: ChatCompletionResponse) -> Result<ModelTurn> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Gateway("response contained no choices".to_string()))?;

    let invocations = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| ToolInvocation {
            id: tc.id,
            name: tc.function.name,
            // Malformed arguments surface as an invalid-arguments capability
            // result rather than failing the whole turn
            arguments: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::Null),
        })
        .collect();

    Ok(ModelTurn {
        text: choice.message.content,
        invocations,
    })
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}
