//! System prompt builder
//!
//! Every turn gets a fresh prompt carrying the current time and whatever the
//! assistant has remembered about the sender. Absent facts render as
//! "unknown" so the model knows to ask rather than guess.

use chrono::{DateTime, Utc};

use crate::db::Profile;

/// Build the system prompt for one turn
#[must_use]
pub fn build_system_prompt(profile: Option<&Profile>, now: DateTime<Utc>) -> String {
    let name = profile
        .and_then(|p| p.display_name.as_deref())
        .unwrap_or("unknown");
    let preferences = profile
        .and_then(|p| p.preferences.as_deref())
        .unwrap_or("unknown");
    let timezone = profile
        .and_then(|p| p.timezone.as_deref())
        .unwrap_or("unknown");

    format!(
        "You are Concierge, a personal assistant reachable over WhatsApp. You help the user \
         manage their calendar and email and remember useful facts about them.\n\
         \n\
         Current time: {}\n\
         \n\
         What you know about the user:\n\
         - Name: {name}\n\
         - Preferences: {preferences}\n\
         - Timezone: {timezone}\n\
         \n\
         Guidelines:\n\
         - Keep replies short and conversational; this is a chat, not a document.\n\
         - Use your tools to look at real data instead of guessing. If a tool reports an \
         error, tell the user plainly what didn't work.\n\
         - When the user shares their name, preferences, or timezone, save them with \
         save_user_fact.\n\
         - Interpret times in the user's timezone when you know it, and say times in words \
         (e.g. \"tomorrow at 3pm\").\n\
         - Never invent calendar events or emails that a tool didn't return.",
        now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_profile_renders_unknown() {
        let prompt = build_system_prompt(None, Utc::now());
        assert!(prompt.contains("- Name: unknown"));
        assert!(prompt.contains("- Preferences: unknown"));
        assert!(prompt.contains("- Timezone: unknown"));
    }

    #[test]
    fn test_known_facts_rendered() {
        let profile = Profile {
            user_id: "u1".to_string(),
            display_name: Some("Ana".to_string()),
            preferences: None,
            timezone: Some("America/Mexico_City".to_string()),
            updated_at: Utc::now(),
        };

        let prompt = build_system_prompt(Some(&profile), Utc::now());
        assert!(prompt.contains("- Name: Ana"));
        assert!(prompt.contains("- Preferences: unknown"));
        assert!(prompt.contains("- Timezone: America/Mexico_City"));
    }

    #[test]
    fn test_prompt_carries_current_time() {
        let now = "2025-03-01T12:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let prompt = build_system_prompt(None, now);
        assert!(prompt.contains("Current time: 2025-03-01T12:30:00Z"));
    }
}
