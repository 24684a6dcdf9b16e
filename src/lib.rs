//! Concierge Gateway - `WhatsApp` assistant with tool-calling capabilities
//!
//! This library provides the core functionality for the concierge gateway:
//! - Stateful orchestration loop (model calls interleaved with tool execution)
//! - Capability registry: calendar, email, and user-memory tools
//! - Windowed conversation store backed by `SQLite`
//! - `WhatsApp` Cloud API webhook intake and reply delivery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                WhatsApp Cloud API                    │
//! │     webhook intake        │     reply delivery       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Orchestration Loop                     │
//! │   history window │ profile │ model ⇄ capabilities   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   OpenAI chat  │  Google Calendar  │  Gmail         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod capabilities;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod providers;
pub mod server;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
