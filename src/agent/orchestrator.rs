//! Stateful tool-calling orchestration loop
//!
//! One inbound message becomes at most `turn_budget` model calls, each of
//! which may fan out into concurrent capability invocations, and exactly one
//! outbound reply. The loop never raises to its caller: every failure path
//! collapses into a fixed, human-friendly reply.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capabilities::{summarize, CapabilityRegistry};
use crate::db::{HistoryRepo, ProfileRepo, TurnRole};
use crate::gateway::{ChatMessage, ModelGateway};
use crate::prompt::build_system_prompt;

/// Reply used when the gateway or store fails mid-turn
pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error processing your message.";

/// Reply used when the turn budget runs out before a final answer
pub const TOO_COMPLEX_TEXT: &str =
    "That request took more steps than I can handle in one go. Could you try breaking it into smaller pieces?";

/// Phases of one message turn
///
/// `ModelCall` and `ToolExecution` alternate while the model keeps requesting
/// invocations; the other variants are entry, exit, and failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    LoadingContext,
    ModelCall,
    ToolExecution,
    Finalizing,
    Done,
    /// Turn budget exhausted before the model produced a final answer
    Aborted,
    /// Gateway or store failure made the turn unrecoverable
    Errored,
}

/// The orchestration loop and its collaborators
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<CapabilityRegistry>,
    history: HistoryRepo,
    profiles: ProfileRepo,
    turn_budget: usize,
    /// Per-user guards serializing whole turns; concurrent messages from the
    /// same sender queue instead of interleaving store writes
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<CapabilityRegistry>,
        history: HistoryRepo,
        profiles: ProfileRepo,
        turn_budget: usize,
    ) -> Self {
        Self {
            gateway,
            registry,
            history,
            profiles,
            turn_budget: turn_budget.max(1),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound message and produce the reply text
    ///
    /// Never fails and never panics: gateway errors, capability errors, and
    /// store errors all collapse into fixed reply texts. Messages from the
    /// same user are processed one at a time; distinct users run concurrently.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> String {
        let turn_guard = self.user_lock(user_id).await.lock_owned().await;

        let (reply, phase) = self.run_turn(user_id, text).await;
        tracing::info!(user_id = %user_id, phase = ?phase, "turn complete");

        drop(turn_guard);
        self.release_user_lock(user_id).await;

        reply
    }

    #[allow(clippy::too_many_lines)]
    async fn run_turn(&self, user_id: &str, text: &str) -> (String, TurnPhase) {
        let mut phase = TurnPhase::Start;
        enter_phase(&mut phase, TurnPhase::LoadingContext, user_id);

        let history = match self.history.load_recent(user_id) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "history load failed");
                return (APOLOGY_TEXT.to_string(), TurnPhase::Errored);
            }
        };
        let profile = match self.profiles.get(user_id) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "profile load failed");
                return (APOLOGY_TEXT.to_string(), TurnPhase::Errored);
            }
        };

        let system_prompt = build_system_prompt(profile.as_ref(), chrono::Utc::now());

        // Working transcript: recent persisted turns plus the new message.
        // Everything the loop adds below lives only for this turn; durable
        // history gets the trimmed exchange at the end.
        let mut transcript: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);
        for turn in &history {
            match turn.role {
                TurnRole::User => transcript.push(ChatMessage::user(&turn.content)),
                TurnRole::Assistant => transcript.push(ChatMessage::assistant(&turn.content)),
                // Durable history never holds tool turns
                TurnRole::Tool => {}
            }
        }
        transcript.push(ChatMessage::user(text));

        let schemas = self.registry.schemas();

        for round in 0..self.turn_budget {
            enter_phase(&mut phase, TurnPhase::ModelCall, user_id);
            let turn = match self
                .gateway
                .complete(&system_prompt, &transcript, &schemas)
                .await
            {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!(user_id = %user_id, round, error = %e, "gateway call failed");
                    return (APOLOGY_TEXT.to_string(), TurnPhase::Errored);
                }
            };

            if turn.is_final() {
                enter_phase(&mut phase, TurnPhase::Finalizing, user_id);
                match turn.text {
                    Some(reply) if !reply.trim().is_empty() => {
                        self.persist_exchange(user_id, text, &reply);
                        tracing::debug!(user_id = %user_id, rounds = round + 1, "final reply ready");
                        return (reply, TurnPhase::Done);
                    }
                    _ => {
                        tracing::error!(user_id = %user_id, round, "gateway returned empty final text");
                        return (APOLOGY_TEXT.to_string(), TurnPhase::Errored);
                    }
                }
            }

            enter_phase(&mut phase, TurnPhase::ToolExecution, user_id);
            let invocations = turn.invocations.clone();
            tracing::debug!(
                user_id = %user_id,
                round,
                invocations = invocations.len(),
                "executing capability invocations"
            );

            transcript.push(ChatMessage::assistant_with_invocations(
                turn.text,
                turn.invocations,
            ));

            // All invocations of this response run concurrently; results are
            // appended in request order regardless of completion order
            let results = futures::future::join_all(invocations.iter().map(|inv| {
                let registry = Arc::clone(&self.registry);
                async move {
                    let raw = registry.invoke(user_id, &inv.name, &inv.arguments).await;
                    summarize(&inv.name, &raw)
                }
            }))
            .await;

            for (inv, result) in invocations.iter().zip(results) {
                transcript.push(ChatMessage::tool(&inv.id, &inv.name, result.to_string()));
            }
        }

        tracing::warn!(
            user_id = %user_id,
            budget = self.turn_budget,
            phase = ?phase,
            "turn budget exhausted"
        );
        (TOO_COMPLEX_TEXT.to_string(), TurnPhase::Aborted)
    }

    /// Persist the completed exchange; failures are logged, never surfaced
    fn persist_exchange(&self, user_id: &str, user_text: &str, reply: &str) {
        if let Err(e) = self.history.append_exchange(user_id, user_text, reply) {
            tracing::warn!(user_id = %user_id, error = %e, "failed to persist exchange");
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Drop the lock entry once nobody is waiting on it
    async fn release_user_lock(&self, user_id: &str) {
        let mut locks = self.turn_locks.lock().await;
        if let Some(entry) = locks.get(user_id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(user_id);
            }
        }
    }
}

fn enter_phase(phase: &mut TurnPhase, next: TurnPhase, user_id: &str) {
    tracing::trace!(user_id = %user_id, from = ?*phase, to = ?next, "phase transition");
    *phase = next;
}
