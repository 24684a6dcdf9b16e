//! Capability registry and handlers
//!
//! Capabilities are registered once at startup and immutable afterwards. The
//! registry publishes tool schemas to the model gateway and dispatches
//! invocations; a failed or unknown invocation becomes an error result
//! object, never an `Err` to the orchestration loop.

pub mod calendar;
pub mod email;
pub mod facts;
pub mod summarize;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::ToolSchema;
use crate::Result;

pub use calendar::calendar_capabilities;
pub use email::email_capabilities;
pub use facts::fact_capabilities;
pub use summarize::summarize;

/// Hard ceiling on a single capability invocation
const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A named capability the model may invoke
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name as advertised to the model
    fn name(&self) -> &'static str;

    /// Tool schema published to the model gateway
    fn schema(&self) -> ToolSchema;

    /// Execute with structured arguments
    ///
    /// # Errors
    ///
    /// Returns error if arguments are malformed or the underlying call fails
    async fn invoke(&self, user_id: &str, args: &serde_json::Value)
        -> Result<serde_json::Value>;
}

/// The error result shape capabilities surface to the model
#[must_use]
pub fn error_result(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "message": message.into(),
    })
}

/// Whether a result value is the capability error shape
#[must_use]
pub fn is_error_result(value: &serde_json::Value) -> bool {
    value.get("status").and_then(serde_json::Value::as_str) == Some("error")
}

/// Immutable name-to-handler registry
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability; a duplicate name replaces the earlier handler
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        if let Some(existing) = self
            .handlers
            .iter_mut()
            .find(|h| h.name() == capability.name())
        {
            tracing::warn!(name = capability.name(), "replacing registered capability");
            *existing = capability;
        } else {
            self.handlers.push(capability);
        }
    }

    /// Register a batch of capabilities
    pub fn register_all(&mut self, capabilities: Vec<Arc<dyn Capability>>) {
        for capability in capabilities {
            self.register(capability);
        }
    }

    /// Tool schemas in registration order
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.handlers.iter().map(|h| h.schema()).collect()
    }

    /// Whether a capability with this name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.name() == name)
    }

    /// Number of registered capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch one invocation
    ///
    /// Always yields a result value: unknown names, handler failures, and
    /// timeouts come back as the error result shape.
    pub async fn invoke(
        &self,
        user_id: &str,
        name: &str,
        args: &serde_json::Value,
    ) -> serde_json::Value {
        let Some(handler) = self.handlers.iter().find(|h| h.name() == name) else {
            tracing::warn!(capability = name, "unknown capability requested");
            return error_result(format!("unknown capability: {name}"));
        };

        match tokio::time::timeout(INVOKE_TIMEOUT, handler.invoke(user_id, args)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(capability = name, error = %e, "capability failed");
                error_result(e.to_string())
            }
            Err(_) => {
                tracing::warn!(capability = name, "capability timed out");
                error_result(format!("capability timed out: {name}"))
            }
        }
    }
}
