//! Gmail capabilities (search, read, send, drafts, status changes)

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};

use super::Capability;
use crate::gateway::ToolSchema;
use crate::providers::GoogleAuth;
use crate::{Error, Result};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

const DEFAULT_SEARCH_RESULTS: u32 = 10;
const MAX_SEARCH_RESULTS: u32 = 25;

/// Shared plumbing for Gmail API calls
struct GmailApi {
    client: Client,
    auth: Arc<GoogleAuth>,
}

impl GmailApi {
    fn new(auth: Arc<GoogleAuth>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, auth }
    }

    async fn request(
        &self,
        method: Method,
        url: String,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Capability(format!("gmail request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Capability(format!(
                "gmail API error: {status} - {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Capability(format!("malformed gmail response: {e}")))
    }
}

/// Build the email capability set over one auth context
#[must_use]
pub fn email_capabilities(auth: Arc<GoogleAuth>) -> Vec<Arc<dyn Capability>> {
    let api = Arc::new(GmailApi::new(auth));
    vec![
        Arc::new(SearchEmails {
            api: Arc::clone(&api),
        }),
        Arc::new(GetEmailDetails {
            api: Arc::clone(&api),
        }),
        Arc::new(SendEmail {
            api: Arc::clone(&api),
        }),
        Arc::new(CreateDraft {
            api: Arc::clone(&api),
        }),
        Arc::new(ModifyEmailStatus { api }),
    ]
}

/// Search the mailbox with Gmail query syntax
pub struct SearchEmails {
    api: Arc<GmailApi>,
}

#[async_trait]
impl Capability for SearchEmails {
    fn name(&self) -> &'static str {
        "search_emails"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_emails".to_string(),
            description:
                "Search emails with Gmail query syntax (e.g. 'from:ana is:unread', \
                 'subject:invoice newer_than:7d')."
                    .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Gmail search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Max messages to return (default 10)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct SearchArgs {
            query: String,
            #[serde(default)]
            max_results: Option<u32>,
        }

        let args: SearchArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::Capability(format!("search_emails: invalid arguments: {e}")))?;

        let limit = args
            .max_results
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .min(MAX_SEARCH_RESULTS);
        let url = format!(
            "{GMAIL_BASE_URL}/users/me/messages?maxResults={limit}&q={}",
            urlencoding::encode(&args.query),
        );

        let listing = self.api.request(Method::GET, url, None).await?;

        let ids: Vec<String> = listing["messages"]
            .as_array()
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        // Headers and snippets come from per-message metadata fetches;
        // a failed fetch degrades that entry to its bare id
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let url = format!(
                "{GMAIL_BASE_URL}/users/me/messages/{id}?format=metadata&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
            );
            match self.api.request(Method::GET, url, None).await {
                Ok(meta) => messages.push(meta),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "metadata fetch failed");
                    messages.push(serde_json::json!({ "id": id }));
                }
            }
        }

        Ok(serde_json::json!({ "messages": messages }))
    }
}

/// Fetch one message in full
pub struct GetEmailDetails {
    api: Arc<GmailApi>,
}

#[async_trait]
impl Capability for GetEmailDetails {
    fn name(&self) -> &'static str {
        "get_email_details"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_email_details".to_string(),
            description: "Fetch the full content of one email by message id (from search_emails)."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "Gmail message id"
                    }
                },
                "required": ["message_id"]
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct DetailsArgs {
            message_id: String,
        }

        let args: DetailsArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::Capability(format!("get_email_details: invalid arguments: {e}")))?;

        let url = format!(
            "{GMAIL_BASE_URL}/users/me/messages/{}?format=full",
            urlencoding::encode(&args.message_id),
        );
        self.api.request(Method::GET, url, None).await
    }
}

/// Send a plain-text email from the connected account
pub struct SendEmail {
    api: Arc<GmailApi>,
}

#[async_trait]
impl Capability for SendEmail {
    fn name(&self) -> &'static str {
        "send_email"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_email".to_string(),
            description: "Send a plain-text email. Confirm recipient and content with the user \
                          before sending."
                .to_string(),
            parameters: send_parameters(),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args = parse_send_args("send_email", args)?;
        let body = serde_json::json!({ "raw": encode_raw_message(&args.to, &args.subject, &args.body) });

        let url = format!("{GMAIL_BASE_URL}/users/me/messages/send");
        self.api.request(Method::POST, url, Some(&body)).await
    }
}

/// Save a draft without sending
pub struct CreateDraft {
    api: Arc<GmailApi>,
}

#[async_trait]
impl Capability for CreateDraft {
    fn name(&self) -> &'static str {
        "create_draft"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_draft".to_string(),
            description: "Save an email as a draft without sending it.".to_string(),
            parameters: send_parameters(),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args = parse_send_args("create_draft", args)?;
        let body = serde_json::json!({
            "message": { "raw": encode_raw_message(&args.to, &args.subject, &args.body) }
        });

        let url = format!("{GMAIL_BASE_URL}/users/me/drafts");
        self.api.request(Method::POST, url, Some(&body)).await
    }
}

/// Archive, trash, or flip the read state of a message
pub struct ModifyEmailStatus {
    api: Arc<GmailApi>,
}

#[async_trait]
impl Capability for ModifyEmailStatus {
    fn name(&self) -> &'static str {
        "modify_email_status"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "modify_email_status".to_string(),
            description: "Change the status of an email: archive, trash, mark_as_read, or \
                          mark_as_unread."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "Gmail message id"
                    },
                    "action": {
                        "type": "string",
                        "enum": ["archive", "trash", "mark_as_read", "mark_as_unread"],
                        "description": "Status change to apply"
                    }
                },
                "required": ["message_id", "action"]
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct ModifyArgs {
            message_id: String,
            action: String,
        }

        let args: ModifyArgs = serde_json::from_value(args.clone()).map_err(|e| {
            Error::Capability(format!("modify_email_status: invalid arguments: {e}"))
        })?;

        let action = StatusAction::from_str(&args.action).ok_or_else(|| {
            Error::Capability(format!(
                "modify_email_status: unknown action: {}",
                args.action
            ))
        })?;

        let id = urlencoding::encode(&args.message_id).into_owned();

        if action == StatusAction::Trash {
            let url = format!("{GMAIL_BASE_URL}/users/me/messages/{id}/trash");
            self.api.request(Method::POST, url, None).await
        } else {
            let (add, remove) = action.label_changes();
            let body = serde_json::json!({
                "addLabelIds": add,
                "removeLabelIds": remove,
            });
            let url = format!("{GMAIL_BASE_URL}/users/me/messages/{id}/modify");
            self.api.request(Method::POST, url, Some(&body)).await
        }
    }
}

/// Status changes supported by `modify_email_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Archive,
    Trash,
    MarkAsRead,
    MarkAsUnread,
}

impl StatusAction {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "archive" => Some(Self::Archive),
            "trash" => Some(Self::Trash),
            "mark_as_read" => Some(Self::MarkAsRead),
            "mark_as_unread" => Some(Self::MarkAsUnread),
            _ => None,
        }
    }

    /// Label ids to add and remove for non-trash actions
    const fn label_changes(self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Self::Archive => (&[], &["INBOX"]),
            Self::MarkAsRead => (&[], &["UNREAD"]),
            Self::MarkAsUnread => (&["UNREAD"], &[]),
            Self::Trash => (&[], &[]),
        }
    }
}

struct SendArgs {
    to: String,
    subject: String,
    body: String,
}

fn send_parameters() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "to": {
                "type": "string",
                "description": "Recipient email address"
            },
            "subject": {
                "type": "string",
                "description": "Subject line"
            },
            "body": {
                "type": "string",
                "description": "Plain-text message body"
            }
        },
        "required": ["to", "subject", "body"]
    })
}

fn parse_send_args(capability: &str, args: &serde_json::Value) -> Result<SendArgs> {
    #[derive(serde::Deserialize)]
    struct Raw {
        to: String,
        subject: String,
        body: String,
    }

    let raw: Raw = serde_json::from_value(args.clone())
        .map_err(|e| Error::Capability(format!("{capability}: invalid arguments: {e}")))?;

    if raw.to.trim().is_empty() {
        return Err(Error::Capability(format!(
            "{capability}: recipient must not be empty"
        )));
    }

    Ok(SendArgs {
        to: raw.to,
        subject: raw.subject,
        body: raw.body,
    })
}

/// Encode an RFC 822 message as the URL-safe base64 Gmail expects
fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
    let raw = format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}\r\n");
    base64::engine::general_purpose::STANDARD
        .encode(raw.as_bytes())
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_is_url_safe() {
        let encoded = encode_raw_message("ana@example.com", "Hello?", "Body with ~ and spaces");
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_raw_message_round_trips() {
        let encoded = encode_raw_message("ana@example.com", "Lunch", "See you at noon");
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(
            text,
            "To: ana@example.com\r\nSubject: Lunch\r\n\r\nSee you at noon\r\n"
        );
    }

    #[test]
    fn test_status_action_parsing() {
        assert_eq!(StatusAction::from_str("archive"), Some(StatusAction::Archive));
        assert_eq!(StatusAction::from_str("trash"), Some(StatusAction::Trash));
        assert_eq!(
            StatusAction::from_str("mark_as_read"),
            Some(StatusAction::MarkAsRead)
        );
        assert_eq!(
            StatusAction::from_str("mark_as_unread"),
            Some(StatusAction::MarkAsUnread)
        );
        assert_eq!(StatusAction::from_str("snooze"), None);
    }

    #[test]
    fn test_label_changes() {
        assert_eq!(StatusAction::Archive.label_changes(), (&[][..], &["INBOX"][..]));
        assert_eq!(
            StatusAction::MarkAsRead.label_changes(),
            (&[][..], &["UNREAD"][..])
        );
        assert_eq!(
            StatusAction::MarkAsUnread.label_changes(),
            (&["UNREAD"][..], &[][..])
        );
    }

    #[test]
    fn test_empty_recipient_rejected() {
        let args = serde_json::json!({"to": "  ", "subject": "s", "body": "b"});
        assert!(parse_send_args("send_email", &args).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let args = serde_json::json!({"to": "a@b.c", "subject": "s"});
        assert!(parse_send_args("send_email", &args).is_err());
    }
}
