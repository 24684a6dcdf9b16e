//! Turn orchestration
//!
//! Drives the model-call / tool-execution loop for one inbound message and
//! owns the fixed fallback replies used when a turn cannot complete.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, TurnPhase, APOLOGY_TEXT, TOO_COMPLEX_TEXT};
