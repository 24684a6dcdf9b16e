//! Configuration management for the concierge gateway
//!
//! Values resolve environment-first with an optional TOML file as fallback:
//! `~/.config/concierge/config.toml` on Linux. Credentials the deployment
//! cannot run without fail `load` with a message naming the missing key.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::db::HistoryPolicy;
use crate::{Error, Result};

/// Default HTTP server port
const DEFAULT_PORT: u16 = 18690;

/// Default chat model
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default model calls allowed per inbound message
const DEFAULT_TURN_BUDGET: usize = 5;

/// Default number of recent turns loaded as context
const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the `SQLite` database
    pub database_path: PathBuf,

    /// HTTP server port
    pub port: u16,

    /// `WhatsApp` Cloud API credentials
    pub whatsapp: WhatsAppConfig,

    /// Model gateway credentials and model choice
    pub openai: OpenAiConfig,

    /// Google API credentials for the calendar and email capabilities
    ///
    /// When absent those capabilities are not registered; the assistant still
    /// answers and remembers facts.
    pub google: Option<GoogleConfig>,

    /// Orchestration loop tuning
    pub agent: AgentConfig,
}

/// `WhatsApp` Cloud API credentials
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Business API access token
    pub access_token: String,

    /// Phone number ID for sending messages
    pub phone_number_id: String,

    /// Token echoed during the webhook verification handshake
    pub verify_token: String,
}

/// Model gateway configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: String,

    /// Chat model identifier
    pub model: String,

    /// API base URL override (proxies, compatible providers)
    pub base_url: Option<String>,
}

/// Google API credentials (Calendar and Gmail)
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Long-lived refresh token for the assistant's Google account
    pub refresh_token: String,
}

/// Orchestration loop tuning
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model calls per inbound message
    pub turn_budget: usize,

    /// Number of recent turns loaded as context
    pub history_window: usize,

    /// Idle minutes before a conversation is discarded (`None` keeps forever)
    pub history_ttl_minutes: Option<u64>,
}

impl AgentConfig {
    /// Convert to the history retention policy used by the store
    #[must_use]
    pub fn history_policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            window: self.history_window,
            ttl: self.history_ttl_minutes.map(|m| Duration::from_secs(m * 60)),
        }
    }
}

/// On-disk configuration file shape; every field optional
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    port: Option<u16>,
    #[serde(default)]
    whatsapp: WhatsAppFile,
    #[serde(default)]
    openai: OpenAiFile,
    #[serde(default)]
    google: GoogleFile,
    #[serde(default)]
    agent: AgentFile,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppFile {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFile {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentFile {
    turn_budget: Option<usize>,
    history_window: Option<usize>,
    history_ttl_minutes: Option<u64>,
}

/// Return the data directory, creating it if needed
///
/// Uses `~/.local/share/concierge/` on Linux
#[must_use]
pub fn data_dir() -> PathBuf {
    let dir = directories::ProjectDirs::from("", "", "concierge")
        .map_or_else(|| PathBuf::from(".concierge"), |d| d.data_dir().to_path_buf());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to create data directory");
    }

    dir
}

/// Locate the configuration file
///
/// Uses `~/.config/concierge/config.toml` on Linux
fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "concierge")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load the configuration file, falling back to empty defaults
fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            ConfigFile::default()
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing from both sources
    pub fn load() -> Result<Self> {
        let file = load_config_file();

        let database_path = std::env::var("CONCIERGE_DB_PATH")
            .ok()
            .map(PathBuf::from)
            .or(file.database_path)
            .unwrap_or_else(|| data_dir().join("concierge.db"));

        let port = std::env::var("CONCIERGE_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .or(file.port)
            .unwrap_or(DEFAULT_PORT);

        let whatsapp = WhatsAppConfig {
            access_token: require(
                std::env::var("WHATSAPP_TOKEN").ok().or(file.whatsapp.access_token),
                "WHATSAPP_TOKEN",
            )?,
            phone_number_id: require(
                std::env::var("WHATSAPP_PHONE_ID")
                    .ok()
                    .or(file.whatsapp.phone_number_id),
                "WHATSAPP_PHONE_ID",
            )?,
            verify_token: require(
                std::env::var("WHATSAPP_VERIFY_TOKEN")
                    .ok()
                    .or(file.whatsapp.verify_token),
                "WHATSAPP_VERIFY_TOKEN",
            )?,
        };

        let openai = OpenAiConfig {
            api_key: require(
                std::env::var("OPENAI_API_KEY").ok().or(file.openai.api_key),
                "OPENAI_API_KEY",
            )?,
            model: std::env::var("CONCIERGE_MODEL")
                .ok()
                .or(file.openai.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL").ok().or(file.openai.base_url),
        };

        // All three Google credentials or none; a partial set is a config slip
        // worth flagging rather than silently dropping capabilities
        let google_parts = (
            std::env::var("GOOGLE_CLIENT_ID").ok().or(file.google.client_id),
            std::env::var("GOOGLE_CLIENT_SECRET")
                .ok()
                .or(file.google.client_secret),
            std::env::var("GOOGLE_REFRESH_TOKEN")
                .ok()
                .or(file.google.refresh_token),
        );
        let google = match google_parts {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(GoogleConfig {
                client_id,
                client_secret,
                refresh_token,
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::Config(
                    "incomplete Google credentials: set GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, and GOOGLE_REFRESH_TOKEN together".to_string(),
                ));
            }
        };

        let agent = AgentConfig {
            turn_budget: std::env::var("CONCIERGE_TURN_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(file.agent.turn_budget)
                .unwrap_or(DEFAULT_TURN_BUDGET),
            history_window: std::env::var("CONCIERGE_HISTORY_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(file.agent.history_window)
                .unwrap_or(DEFAULT_HISTORY_WINDOW),
            history_ttl_minutes: std::env::var("CONCIERGE_HISTORY_TTL_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(file.agent.history_ttl_minutes),
        };

        Ok(Self {
            database_path,
            port,
            whatsapp,
            openai,
            google,
            agent,
        })
    }
}

/// Require a credential, naming the environment key in the error
fn require(value: Option<String>, key: &str) -> Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        Error::Config(format!(
            "{key} is not set (environment or config.toml)"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            port = 9000
            database_path = "/tmp/concierge-test.db"

            [whatsapp]
            access_token = "EAAtoken"
            phone_number_id = "123456"
            verify_token = "hunter2"

            [openai]
            api_key = "sk-test"
            model = "gpt-4o"

            [agent]
            turn_budget = 3
            history_window = 20
            history_ttl_minutes = 1440
            "#,
        )
        .unwrap();

        assert_eq!(file.port, Some(9000));
        assert_eq!(file.whatsapp.verify_token.as_deref(), Some("hunter2"));
        assert_eq!(file.openai.model.as_deref(), Some("gpt-4o"));
        assert_eq!(file.agent.turn_budget, Some(3));
        assert_eq!(file.agent.history_ttl_minutes, Some(1440));
    }

    #[test]
    fn test_partial_config_file_parses() {
        let file: ConfigFile = toml::from_str("port = 8080\n").unwrap();
        assert_eq!(file.port, Some(8080));
        assert!(file.whatsapp.access_token.is_none());
        assert!(file.agent.turn_budget.is_none());
    }

    #[test]
    fn test_history_policy_conversion() {
        let agent = AgentConfig {
            turn_budget: 5,
            history_window: 12,
            history_ttl_minutes: Some(30),
        };
        let policy = agent.history_policy();
        assert_eq!(policy.window, 12);
        assert_eq!(policy.ttl, Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require(Some("  ".to_string()), "SOME_KEY").is_err());
        assert!(require(None, "SOME_KEY").is_err());
        assert_eq!(
            require(Some("value".to_string()), "SOME_KEY").unwrap(),
            "value"
        );
    }
}
