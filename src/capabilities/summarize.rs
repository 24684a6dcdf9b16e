//! Capability result summarizer
//!
//! Raw API payloads are condensed into compact projections before they are
//! appended to the working transcript. Projections are deterministic and
//! idempotent: summarizing an already-summarized value yields the same
//! value, and ids needed by follow-up invocations are always preserved.

use serde_json::Value;

use base64::Engine;

use super::is_error_result;

/// Longest email body carried into the transcript, in characters
const MAX_BODY_CHARS: usize = 2000;

/// Condense one raw capability result for the transcript
#[must_use]
pub fn summarize(capability: &str, result: &Value) -> Value {
    // Error results are already the shape the model needs
    if is_error_result(result) {
        return result.clone();
    }

    match capability {
        "get_calendar_events" => summarize_event_list(result),
        "create_calendar_event" | "update_calendar_event" => project_event(result),
        "search_emails" => summarize_email_list(result),
        "get_email_details" => summarize_email_details(result),
        _ => result.clone(),
    }
}

fn summarize_event_list(result: &Value) -> Value {
    let events: Vec<Value> = result
        .get("items")
        .or_else(|| result.get("events"))
        .and_then(Value::as_array)
        .map(|items| items.iter().map(project_event).collect())
        .unwrap_or_default();

    serde_json::json!({
        "count": events.len(),
        "events": events,
    })
}

fn project_event(event: &Value) -> Value {
    serde_json::json!({
        "id": field(event, "id"),
        "title": event
            .get("summary")
            .filter(|v| !v.is_null())
            .or_else(|| event.get("title"))
            .cloned()
            .unwrap_or(Value::Null),
        "start": event_time(event.get("start")),
        "end": event_time(event.get("end")),
    })
}

/// Flatten Google's `{dateTime}`/`{date}` objects; leave plain strings as-is
fn event_time(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(Value::Object(map)) => map
            .get("dateTime")
            .or_else(|| map.get("date"))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn summarize_email_list(result: &Value) -> Value {
    let messages: Vec<Value> = result
        .get("messages")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(project_email).collect())
        .unwrap_or_default();

    serde_json::json!({
        "count": messages.len(),
        "messages": messages,
    })
}

fn project_email(item: &Value) -> Value {
    serde_json::json!({
        "id": field(item, "id"),
        "from": field_or_header(item, "from", "From"),
        "subject": field_or_header(item, "subject", "Subject"),
        "date": field_or_header(item, "date", "Date"),
        "snippet": field(item, "snippet"),
    })
}

fn summarize_email_details(result: &Value) -> Value {
    let body = result
        .get("body")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| extract_body(result))
        .or_else(|| result.get("snippet").and_then(Value::as_str).map(String::from));

    serde_json::json!({
        "id": field(result, "id"),
        "from": field_or_header(result, "from", "From"),
        "to": field_or_header(result, "to", "To"),
        "subject": field_or_header(result, "subject", "Subject"),
        "date": field_or_header(result, "date", "Date"),
        "body": body
            .map(|b| Value::String(truncate_chars(&b, MAX_BODY_CHARS)))
            .unwrap_or(Value::Null),
    })
}

fn field(value: &Value, name: &str) -> Value {
    value.get(name).cloned().unwrap_or(Value::Null)
}

/// Prefer an already-projected field, falling back to the RFC 822 header
fn field_or_header(item: &Value, name: &str, header_name: &str) -> Value {
    item.get(name)
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| header(item, header_name).map(Value::String))
        .unwrap_or(Value::Null)
}

fn header(message: &Value, name: &str) -> Option<String> {
    message
        .pointer("/payload/headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value").and_then(Value::as_str).map(String::from))
}

/// Pull a readable body out of a full Gmail message payload
fn extract_body(message: &Value) -> Option<String> {
    let payload = message.get("payload")?;

    if let Some(data) = payload.pointer("/body/data").and_then(Value::as_str) {
        return Some(decode_part(data));
    }

    find_part(payload, "text/plain").or_else(|| find_part(payload, "text/html"))
}

fn find_part(payload: &Value, mime: &str) -> Option<String> {
    let parts = payload.get("parts")?.as_array()?;

    for part in parts {
        if part.get("mimeType").and_then(Value::as_str) == Some(mime) {
            if let Some(data) = part.pointer("/body/data").and_then(Value::as_str) {
                return Some(decode_part(data));
            }
        }
        // multipart/alternative nests another level down
        if let Some(text) = find_part(part, mime) {
            return Some(text);
        }
    }

    None
}

fn decode_part(data: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_or_else(
            |_| String::new(),
            |bytes| String::from_utf8_lossy(&bytes).into_owned(),
        )
}

/// Bound a string to `max` characters, ellipsis included
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
