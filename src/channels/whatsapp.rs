//! `WhatsApp` channel adapter
//!
//! Sends replies through the `WhatsApp` Business Cloud API. Inbound messages
//! arrive via the Webhooks API; `WhatsAppWebhook` models the payload and
//! extracts the text messages the assistant can act on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::ReplyDelivery;
use crate::{Error, Result};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v18.0";

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// `WhatsApp` Business API access token
    access_token: String,
    /// Phone number ID for sending messages
    phone_number_id: String,
    client: Client,
    base_url: String,
}

impl WhatsAppChannel {
    /// Create a new `WhatsApp` channel adapter
    ///
    /// # Arguments
    ///
    /// * `access_token` - `WhatsApp` Business API access token
    /// * `phone_number_id` - Phone number ID registered with `WhatsApp` Business
    #[must_use]
    pub fn new(access_token: String, phone_number_id: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            access_token,
            phone_number_id,
            client,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Override the Graph API base URL (for tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a text message to a `WhatsApp` number
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);

        // Link previews distract from code-heavy replies
        let has_code = text.contains("```");

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {
                "body": text,
                "preview_url": !has_code
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("WhatsApp API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!(
                "WhatsApp API error: {status} - {body}"
            )));
        }

        tracing::debug!(to, "WhatsApp message sent");
        Ok(())
    }
}

#[async_trait]
impl ReplyDelivery for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, user_id: &str, text: &str) -> Result<()> {
        self.send_text(user_id, text).await
    }
}

/// A text message lifted out of a webhook payload
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Provider-assigned message id, used for deduplication
    pub id: String,
    /// Sender phone number; doubles as the conversation key
    pub from: String,
    /// Message body
    pub text: String,
}

/// `WhatsApp` webhook payload from Cloud API
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhook {
    /// Webhook entries
    #[serde(default)]
    pub entry: Vec<WhatsAppWebhookEntry>,
}

impl WhatsAppWebhook {
    /// Extract the text messages from this payload
    ///
    /// Status updates, media messages, and anything else without a text body
    /// are skipped. Delivery receipt payloads yield an empty list.
    #[must_use]
    pub fn text_messages(&self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                let Some(ref incoming) = change.value.messages else {
                    continue;
                };
                for msg in incoming {
                    if let Some(ref text) = msg.text {
                        messages.push(InboundMessage {
                            id: msg.id.clone(),
                            from: msg.from.clone(),
                            text: text.body.clone(),
                        });
                    }
                }
            }
        }
        messages
    }
}

/// `WhatsApp` webhook entry
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookEntry {
    /// Changes in this entry
    #[serde(default)]
    pub changes: Vec<WhatsAppWebhookChange>,
}

/// `WhatsApp` webhook change
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookChange {
    /// The change value
    pub value: WhatsAppWebhookValue,
}

/// `WhatsApp` webhook value containing messages
#[derive(Debug, Deserialize)]
pub struct WhatsAppWebhookValue {
    /// Incoming messages (if any)
    pub messages: Option<Vec<WhatsAppMessage>>,
}

/// `WhatsApp` message
#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: String,
    /// Message timestamp
    pub timestamp: Option<String>,
    /// Message type
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    /// Text content (for text messages)
    pub text: Option<WhatsAppTextContent>,
}

/// `WhatsApp` text message content
#[derive(Debug, Deserialize)]
pub struct WhatsAppTextContent {
    /// Message body
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_extracted() {
        let payload: WhatsAppWebhook = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "100000000000000",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.abc123",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": "what's on my calendar today?" }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let messages = payload.text_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "wamid.abc123");
        assert_eq!(messages[0].from, "15551234567");
        assert_eq!(messages[0].text, "what's on my calendar today?");
    }

    #[test]
    fn test_media_message_skipped() {
        let payload: WhatsAppWebhook = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.img1",
                            "type": "image"
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert!(payload.text_messages().is_empty());
    }

    #[test]
    fn test_status_payload_yields_nothing() {
        // Delivery receipts carry statuses instead of messages
        let payload: WhatsAppWebhook = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.abc123", "status": "delivered" }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert!(payload.text_messages().is_empty());
    }

    #[test]
    fn test_empty_payload_parses() {
        let payload: WhatsAppWebhook = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(payload.text_messages().is_empty());
    }
}
