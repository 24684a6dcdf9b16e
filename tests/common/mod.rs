//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use concierge_gateway::agent::Orchestrator;
use concierge_gateway::capabilities::{Capability, CapabilityRegistry};
use concierge_gateway::channels::ReplyDelivery;
use concierge_gateway::db::{self, HistoryPolicy, HistoryRepo, ProfileRepo};
use concierge_gateway::gateway::{
    ChatMessage, ModelGateway, ModelTurn, ToolInvocation, ToolSchema,
};
use concierge_gateway::{DbPool, Error, Result};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Build a model turn that ends the loop with the given reply
#[must_use]
pub fn final_text(text: &str) -> ModelTurn {
    ModelTurn {
        text: Some(text.to_string()),
        invocations: vec![],
    }
}

/// Build a model turn requesting a single capability invocation
#[must_use]
pub fn invoke_one(id: &str, name: &str, arguments: Value) -> ModelTurn {
    invoke_many(vec![(id, name, arguments)])
}

/// Build a model turn requesting several invocations at once
#[must_use]
pub fn invoke_many(invocations: Vec<(&str, &str, Value)>) -> ModelTurn {
    ModelTurn {
        text: None,
        invocations: invocations
            .into_iter()
            .map(|(id, name, arguments)| ToolInvocation {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
            .collect(),
    }
}

/// Gateway double that replays a scripted sequence of model turns
///
/// Once the script runs out it keeps answering with the fallback turn, which
/// lets tests drive both bounded scripts and never-finishing loops. Every
/// call records the transcript it was handed.
pub struct StubGateway {
    responses: Mutex<VecDeque<ModelTurn>>,
    fallback: ModelTurn,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl StubGateway {
    #[must_use]
    pub fn scripted(turns: Vec<ModelTurn>) -> Self {
        Self {
            responses: Mutex::new(turns.into()),
            fallback: final_text("ok"),
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// A gateway that answers every call with the same turn
    #[must_use]
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: turn,
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcript snapshot handed to the nth call (zero-based)
    pub async fn transcript(&self, call: usize) -> Vec<ChatMessage> {
        self.transcripts.lock().await[call].clone()
    }
}

#[async_trait]
impl ModelGateway for StubGateway {
    async fn complete(
        &self,
        _system_prompt: &str,
        transcript: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts.lock().await.push(transcript.to_vec());
        let next = self.responses.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Delivery double that records every reply instead of sending it
#[derive(Default)]
pub struct CaptureDelivery {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ReplyDelivery for CaptureDelivery {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn send(&self, user_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Capability double returning a fixed payload
pub struct StaticCapability {
    name: &'static str,
    result: Value,
}

impl StaticCapability {
    #[must_use]
    pub fn new(name: &'static str, result: Value) -> Self {
        Self { name, result }
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: format!("{} double", self.name),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _user_id: &str, _args: &Value) -> Result<Value> {
        Ok(self.result.clone())
    }
}

/// Capability double that always fails
pub struct FailingCapability {
    name: &'static str,
    message: &'static str,
}

impl FailingCapability {
    #[must_use]
    pub fn new(name: &'static str, message: &'static str) -> Self {
        Self { name, message }
    }
}

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: format!("{} failing double", self.name),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _user_id: &str, _args: &Value) -> Result<Value> {
        Err(Error::Capability(self.message.to_string()))
    }
}

/// Capability double that echoes its arguments back
///
/// A `delay_ms` argument makes the invocation sleep first, so tests can force
/// completion order to differ from request order.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &'static str {
        "lookup"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "lookup".to_string(),
            description: "echoes its arguments".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "delay_ms": { "type": "integer" }
                }
            }),
        }
    }

    async fn invoke(&self, _user_id: &str, args: &Value) -> Result<Value> {
        if let Some(ms) = args.get("delay_ms").and_then(Value::as_u64) {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        Ok(serde_json::json!({ "echo": args }))
    }
}

/// Orchestrator plus repository handles over one shared in-memory database
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub history: HistoryRepo,
    pub profiles: ProfileRepo,
}

/// Wire an orchestrator around the given gateway and registry
#[must_use]
pub fn harness(
    gateway: Arc<StubGateway>,
    registry: CapabilityRegistry,
    turn_budget: usize,
    window: usize,
) -> TestHarness {
    let pool = setup_test_db();
    let history = HistoryRepo::new(pool.clone(), HistoryPolicy { window, ttl: None });
    let profiles = ProfileRepo::new(pool);

    let orchestrator = Orchestrator::new(
        gateway,
        Arc::new(registry),
        history.clone(),
        profiles.clone(),
        turn_budget,
    );

    TestHarness {
        orchestrator,
        history,
        profiles,
    }
}
