//! Remembered-fact capabilities backed by the profile store

use std::sync::Arc;

use async_trait::async_trait;

use super::Capability;
use crate::db::{ProfilePatch, ProfileRepo};
use crate::gateway::ToolSchema;
use crate::{Error, Result};

/// Build the fact capability set over the profile store
#[must_use]
pub fn fact_capabilities(profiles: ProfileRepo) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(SaveUserFact {
            profiles: profiles.clone(),
        }),
        Arc::new(GetUserFact { profiles }),
    ]
}

/// Merge remembered facts into the sender's profile
pub struct SaveUserFact {
    profiles: ProfileRepo,
}

#[async_trait]
impl Capability for SaveUserFact {
    fn name(&self) -> &'static str {
        "save_user_fact"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "save_user_fact".to_string(),
            description:
                "Remember facts about the user for future conversations. Only provide the \
                 fields being updated; others keep their stored values."
                    .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "What the user likes to be called"
                    },
                    "preferences": {
                        "type": "string",
                        "description": "Free-text preferences (e.g. 'prefers morning meetings')"
                    },
                    "timezone": {
                        "type": "string",
                        "description": "IANA timezone (e.g. America/Mexico_City)"
                    }
                }
            }),
        }
    }

    async fn invoke(
        &self,
        user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct SaveArgs {
            #[serde(default)]
            name: Option<String>,
            #[serde(default)]
            preferences: Option<String>,
            #[serde(default)]
            timezone: Option<String>,
        }

        let args: SaveArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::Capability(format!("save_user_fact: invalid arguments: {e}")))?;

        let patch = ProfilePatch {
            display_name: args.name,
            preferences: args.preferences,
            timezone: args.timezone,
        };

        if patch.is_empty() {
            return Err(Error::Capability(
                "save_user_fact: provide at least one field".to_string(),
            ));
        }

        let mut saved = Vec::new();
        if patch.display_name.is_some() {
            saved.push("name");
        }
        if patch.preferences.is_some() {
            saved.push("preferences");
        }
        if patch.timezone.is_some() {
            saved.push("timezone");
        }

        self.profiles.upsert(user_id, &patch)?;

        Ok(serde_json::json!({ "status": "ok", "saved": saved }))
    }
}

/// Read one remembered fact from the sender's profile
pub struct GetUserFact {
    profiles: ProfileRepo,
}

#[async_trait]
impl Capability for GetUserFact {
    fn name(&self) -> &'static str {
        "get_user_fact"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_user_fact".to_string(),
            description: "Look up a remembered fact about the user.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "field_name": {
                        "type": "string",
                        "enum": ["name", "preferences", "timezone"],
                        "description": "Fact to look up"
                    }
                },
                "required": ["field_name"]
            }),
        }
    }

    async fn invoke(
        &self,
        user_id: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct GetArgs {
            field_name: String,
        }

        let args: GetArgs = serde_json::from_value(args.clone())
            .map_err(|e| Error::Capability(format!("get_user_fact: invalid arguments: {e}")))?;

        let value = self.profiles.field(user_id, &args.field_name)?;

        Ok(serde_json::json!({
            "field": args.field_name,
            "value": value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::is_error_result;
    use crate::capabilities::CapabilityRegistry;
    use crate::db::init_memory;

    fn registry() -> CapabilityRegistry {
        let pool = init_memory().unwrap();
        let mut registry = CapabilityRegistry::new();
        registry.register_all(fact_capabilities(ProfileRepo::new(pool)));
        registry
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let registry = registry();

        let saved = registry
            .invoke(
                "u1",
                "save_user_fact",
                &serde_json::json!({"name": "Ana", "timezone": "America/Mexico_City"}),
            )
            .await;
        assert_eq!(saved["status"], "ok");

        let fact = registry
            .invoke("u1", "get_user_fact", &serde_json::json!({"field_name": "name"}))
            .await;
        assert_eq!(fact["value"], "Ana");
    }

    #[tokio::test]
    async fn test_partial_save_keeps_other_fields() {
        let registry = registry();

        registry
            .invoke("u1", "save_user_fact", &serde_json::json!({"name": "Ana"}))
            .await;
        registry
            .invoke(
                "u1",
                "save_user_fact",
                &serde_json::json!({"preferences": "short replies"}),
            )
            .await;

        let name = registry
            .invoke("u1", "get_user_fact", &serde_json::json!({"field_name": "name"}))
            .await;
        assert_eq!(name["value"], "Ana");
    }

    #[tokio::test]
    async fn test_empty_save_is_error() {
        let registry = registry();

        let result = registry
            .invoke("u1", "save_user_fact", &serde_json::json!({}))
            .await;
        assert!(is_error_result(&result));
    }

    #[tokio::test]
    async fn test_unknown_field_is_error() {
        let registry = registry();

        let result = registry
            .invoke(
                "u1",
                "get_user_fact",
                &serde_json::json!({"field_name": "shoe_size"}),
            )
            .await;
        assert!(is_error_result(&result));
    }

    #[tokio::test]
    async fn test_unset_fact_is_null() {
        let registry = registry();

        let fact = registry
            .invoke(
                "u1",
                "get_user_fact",
                &serde_json::json!({"field_name": "timezone"}),
            )
            .await;
        assert!(fact["value"].is_null());
    }

    #[tokio::test]
    async fn test_facts_are_per_user() {
        let registry = registry();

        registry
            .invoke("u1", "save_user_fact", &serde_json::json!({"name": "Ana"}))
            .await;

        let other = registry
            .invoke("u2", "get_user_fact", &serde_json::json!({"field_name": "name"}))
            .await;
        assert!(other["value"].is_null());
    }
}
