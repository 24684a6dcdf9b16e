//! Model gateway abstraction
//!
//! The orchestration loop talks to the language model only through
//! [`ModelGateway`], so providers can be swapped and tests can substitute
//! scripted doubles.

pub mod openai;

use async_trait::async_trait;

use crate::Result;

pub use openai::OpenAiGateway;

/// Chat role on the working transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One capability invocation requested by the model
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Provider-assigned invocation id, echoed back on the result turn
    pub id: String,
    pub name: String,
    /// Structured arguments as parsed from the model output
    pub arguments: serde_json::Value,
}

/// A message on the working transcript
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Invocation id this message answers (tool results only)
    pub tool_call_id: Option<String>,
    /// Capability name for tool results
    pub tool_name: Option<String>,
    /// Invocations requested by an assistant message
    pub invocations: Vec<ToolInvocation>,
}

impl ChatMessage {
    /// A user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(text.into()),
            tool_call_id: None,
            tool_name: None,
            invocations: Vec::new(),
        }
    }

    /// A plain assistant message
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(text.into()),
            tool_call_id: None,
            tool_name: None,
            invocations: Vec::new(),
        }
    }

    /// An assistant message that requested capability invocations
    #[must_use]
    pub fn assistant_with_invocations(
        text: Option<String>,
        invocations: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: text,
            tool_call_id: None,
            tool_name: None,
            invocations,
        }
    }

    /// A tool result answering a prior invocation
    #[must_use]
    pub fn tool(
        invocation_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_call_id: Some(invocation_id.into()),
            tool_name: Some(name.into()),
            invocations: Vec::new(),
        }
    }
}

/// Capability advertisement published to the model
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: serde_json::Value,
}

/// One model response: either a final text, requested invocations, or both
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub invocations: Vec<ToolInvocation>,
}

impl ModelTurn {
    /// Whether this turn ends the loop (no further invocations requested)
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Interface to a chat completion provider with function tools
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Run one completion over the working transcript
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn>;
}
