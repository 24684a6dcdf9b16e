//! Messaging transport adapters
//!
//! The orchestration loop produces reply text and nothing else; a delivery
//! adapter implements `ReplyDelivery` to push that text back over the wire.
//! Inbound traffic arrives through the HTTP webhook and is deduplicated
//! before dispatch.

mod dedup;
mod whatsapp;

use async_trait::async_trait;

pub use dedup::MessageDedup;
pub use whatsapp::{InboundMessage, WhatsAppChannel, WhatsAppWebhook};

use crate::Result;

/// Trait for outbound reply delivery
#[async_trait]
pub trait ReplyDelivery: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Deliver one reply to the given user
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects the message
    async fn send(&self, user_id: &str, text: &str) -> Result<()>;
}
