//! Error types for the companion backend.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors, shared by the completion provider and the token source.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors surfaced on the outbound protocol stream.
///
/// Either variant ends the stream; the transport turns it into an aborted
/// response rather than a finish frame.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Upstream generation failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("Upstream stream ended without a finish event")]
    Incomplete,
}

/// Profile extraction and vector storage errors.
///
/// These never leave the extraction trigger; they exist so the stages can
/// use `?` and be logged in one place.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Extraction call failed: {0}")]
    Extraction(#[from] LlmError),

    #[error("Could not parse extracted profile points: {0}")]
    Parse(String),

    #[error("Embedding generation failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Vector store {operation} failed: {reason}")]
    Store { operation: String, reason: String },
}

/// Errors converting client chat payloads.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Unknown message role: {0}")]
    UnknownRole(String),

    #[error("Unsupported stream protocol: {0}")]
    UnsupportedProtocol(String),
}
