//! Error types for Toki Bot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

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

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Errors from the external account backend and provisioning partners.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend {service} did not answer within {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Backend {service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("Backend {service} has no record for {handle}")]
    NotFound { service: String, handle: String },

    #[error("Backend {service} rejected the request ({status}): {reason}")]
    Rejected {
        service: String,
        status: u16,
        reason: String,
    },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl BackendError {
    /// Whether the failure is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// Errors from the side-effect dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid completion payload: {0}")]
    Validation(String),

    #[error("Retryable failure applying {kind} for {handle}: {source}")]
    Retryable {
        kind: String,
        handle: String,
        #[source]
        source: BackendError,
    },

    #[error("Permanent failure applying {kind} for {handle}: {source}")]
    Permanent {
        kind: String,
        handle: String,
        #[source]
        source: BackendError,
    },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

impl DispatchError {
    /// Whether the caller should retry (or let the provider redeliver).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. } | Self::Store(_))
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
