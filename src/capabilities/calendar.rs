//! Google Calendar capabilities (primary calendar)

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};

use super::Capability;
use crate::gateway::ToolSchema;
use crate::providers::GoogleAuth;
use crate::{Error, Result};

const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Listing window applied when only one time bound is given
const DEFAULT_RANGE_DAYS: i64 = 7;

const MAX_RESULTS: u32 = 50;

/// Shared plumbing for Calendar API calls
struct CalendarApi {
    client: Client,
    auth: Arc<GoogleAuth>,
}

impl CalendarApi {
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
            .map_err(|e| Error::Capability(format!("calendar request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Capability(format!(
                "calendar API error: {status} - {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Capability(format!("malformed calendar response: {e}")))
    }
}

/// Build the calendar capability set over one auth context
#[must_use]
pub fn calendar_capabilities(auth: Arc<GoogleAuth>) -> Vec<Arc<dyn Capability>> {
    let api = Arc::new(CalendarApi::new(auth));
    vec![
        Arc::new(GetCalendarEvents {
            api: Arc::clone(&api),
        }),
        Arc::new(CreateCalendarEvent {
            api: Arc::clone(&api),
        }),
        Arc::new(UpdateCalendarEvent { api }),
    ]
}

/// List events in a bounded time range
pub struct GetCalendarEvents {
    api: Arc<CalendarApi>,
}

#[async_trait]
impl Capability for GetCalendarEvents {
    fn name(&self) -> &'static str {
        "get_calendar_events"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_calendar_events".to_string(),
            description:
                "List calendar events in a time range. Provide at least one bound; the other \
                 defaults to a one-week window."
                    .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "time_min": {
                        "type": "string",
                        "description": "Range start, RFC 3339 (e.g. 2025-03-01T00:00:00Z)"
                    },
                    "time_max": {
                        "type": "string",
                        "description": "Range end, RFC 3339"
                    }
                }
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct ListArgs {
            #[serde(default)]
            time_min: Option<String>,
            #[serde(default)]
            time_max: Option<String>,
        }

        let args: ListArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::Capability(format!("get_calendar_events: invalid arguments: {e}")))?;

        let (time_min, time_max) = resolve_range(args.time_min, args.time_max)?;

        let url = format!(
            "{CALENDAR_BASE_URL}/calendars/primary/events?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults={MAX_RESULTS}",
            urlencoding::encode(&time_min),
            urlencoding::encode(&time_max),
        );

        self.api.request(Method::GET, url, None).await
    }
}

/// Create an event on the primary calendar
pub struct CreateCalendarEvent {
    api: Arc<CalendarApi>,
}

#[async_trait]
impl Capability for CreateCalendarEvent {
    fn name(&self) -> &'static str {
        "create_calendar_event"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_calendar_event".to_string(),
            description: "Create a calendar event with a title and start/end times.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Event title"
                    },
                    "start": {
                        "type": "string",
                        "description": "Start time, RFC 3339"
                    },
                    "end": {
                        "type": "string",
                        "description": "End time, RFC 3339"
                    },
                    "description": {
                        "type": "string",
                        "description": "Optional event description"
                    }
                },
                "required": ["summary", "start", "end"]
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct CreateArgs {
            summary: String,
            start: String,
            end: String,
            #[serde(default)]
            description: Option<String>,
        }

        let args: CreateArgs = serde_json::from_value(args.clone()).map_err(|e| {
            Error::Capability(format!("create_calendar_event: invalid arguments: {e}"))
        })?;

        let mut body = serde_json::json!({
            "summary": args.summary,
            "start": { "dateTime": args.start },
            "end": { "dateTime": args.end },
        });
        if let Some(description) = args.description {
            body["description"] = serde_json::json!(description);
        }

        let url = format!("{CALENDAR_BASE_URL}/calendars/primary/events");
        self.api.request(Method::POST, url, Some(&body)).await
    }
}

/// Reschedule or retitle an existing event
pub struct UpdateCalendarEvent {
    api: Arc<CalendarApi>,
}

#[async_trait]
impl Capability for UpdateCalendarEvent {
    fn name(&self) -> &'static str {
        "update_calendar_event"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "update_calendar_event".to_string(),
            description:
                "Update an existing calendar event, typically to move it to new start/end times. \
                 Use the event id from get_calendar_events."
                    .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "event_id": {
                        "type": "string",
                        "description": "Event id to update"
                    },
                    "start": {
                        "type": "string",
                        "description": "New start time, RFC 3339"
                    },
                    "end": {
                        "type": "string",
                        "description": "New end time, RFC 3339"
                    },
                    "summary": {
                        "type": "string",
                        "description": "New event title"
                    }
                },
                "required": ["event_id", "start", "end"]
            }),
        }
    }

    async fn invoke(
        &self,
        _user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct UpdateArgs {
            event_id: String,
            #[serde(default)]
            start: Option<String>,
            #[serde(default)]
            end: Option<String>,
            #[serde(default)]
            summary: Option<String>,
        }

        let args: UpdateArgs = serde_json::from_value(args.clone()).map_err(|e| {
            Error::Capability(format!("update_calendar_event: invalid arguments: {e}"))
        })?;

        let mut body = serde_json::Map::new();
        if let Some(start) = args.start {
            body.insert("start".to_string(), serde_json::json!({ "dateTime": start }));
        }
        if let Some(end) = args.end {
            body.insert("end".to_string(), serde_json::json!({ "dateTime": end }));
        }
        if let Some(summary) = args.summary {
            body.insert("summary".to_string(), serde_json::json!(summary));
        }
        if body.is_empty() {
            return Err(Error::Capability(
                "update_calendar_event: nothing to update, provide start/end/summary".to_string(),
            ));
        }

        let url = format!(
            "{CALENDAR_BASE_URL}/calendars/primary/events/{}",
            urlencoding::encode(&args.event_id),
        );
        let body = serde_json::Value::Object(body);
        self.api.request(Method::PATCH, url, Some(&body)).await
    }
}

/// Resolve list bounds, refusing a fully unbounded range
fn resolve_range(
    time_min: Option<String>,
    time_max: Option<String>,
) -> Result<(String, String)> {
    match (time_min, time_max) {
        (None, None) => Err(Error::Capability(
            "get_calendar_events: provide time_min and/or time_max".to_string(),
        )),
        (Some(min), Some(max)) => Ok((min, max)),
        (Some(min), None) => {
            let start = chrono::DateTime::parse_from_rfc3339(&min).map_err(|_| {
                Error::Capability(format!("get_calendar_events: invalid time_min: {min}"))
            })?;
            let end = start + chrono::Duration::days(DEFAULT_RANGE_DAYS);
            Ok((min, end.to_rfc3339()))
        }
        (None, Some(max)) => Ok((chrono::Utc::now().to_rfc3339(), max)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_range_rejected() {
        assert!(resolve_range(None, None).is_err());
    }

    #[test]
    fn test_explicit_bounds_kept() {
        let (min, max) = resolve_range(
            Some("2025-03-01T00:00:00Z".to_string()),
            Some("2025-03-02T00:00:00Z".to_string()),
        )
        .unwrap();
        assert_eq!(min, "2025-03-01T00:00:00Z");
        assert_eq!(max, "2025-03-02T00:00:00Z");
    }

    #[test]
    fn test_missing_max_defaults_to_one_week() {
        let (min, max) = resolve_range(Some("2025-03-01T00:00:00Z".to_string()), None).unwrap();
        assert_eq!(min, "2025-03-01T00:00:00Z");
        assert!(max.starts_with("2025-03-08"));
    }

    #[test]
    fn test_missing_min_defaults_to_now() {
        let (min, _max) = resolve_range(None, Some("2099-01-01T00:00:00Z".to_string())).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&min).is_ok());
    }

    #[test]
    fn test_invalid_min_rejected() {
        assert!(resolve_range(Some("tomorrow".to_string()), None).is_err());
    }
}
