//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::stream::openai::DEFAULT_BASE_URL;

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Key for the completion and embedding endpoints.
    pub openai_api_key: SecretString,
    /// Base URL of the OpenAI-compatible streaming endpoint.
    pub openai_base_url: String,
    /// Model for chat and onboarding turns.
    pub chat_model: String,
    /// Model for profile extraction.
    pub extraction_model: String,
    pub embedding_model: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Qdrant REST URL. Profile points stay in memory when unset.
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<SecretString>,
    pub profile_collection: String,
    /// Directory for daily-rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            openai_api_key: SecretString::from(String::new()),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: "gpt-4".to_string(),
            extraction_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            port: 8080,
            db_path: PathBuf::from("./data/companion.db"),
            qdrant_url: None,
            qdrant_api_key: None,
            profile_collection: "user_profiles".to_string(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let openai_api_key = get("OPENAI_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let port = match get("COMPANION_PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "COMPANION_PORT".to_string(),
                message: format!("{raw}: {e}"),
            })?,
            None => defaults.port,
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            chat_model: get("COMPANION_MODEL").unwrap_or(defaults.chat_model),
            extraction_model: get("COMPANION_EXTRACTION_MODEL")
                .unwrap_or(defaults.extraction_model),
            embedding_model: get("COMPANION_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            port,
            db_path: get("COMPANION_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            qdrant_url: get("COMPANION_QDRANT_URL"),
            qdrant_api_key: get("QDRANT_API_KEY").map(SecretString::from),
            profile_collection: get("COMPANION_PROFILE_COLLECTION")
                .unwrap_or(defaults.profile_collection),
            log_dir: get("COMPANION_LOG_DIR").map(PathBuf::from),
        })
    }
}
