//! Error types for Socialcast

use std::time::Duration;

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Authorization timed out after {}s, try connecting again", .0.as_secs())]
    Timeout(Duration),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Graph request failed: {0}")]
    Graph(#[from] GraphError),

    #[error("OAuth callback listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SocialcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialcastError::InvalidInput(_) => 3,
            SocialcastError::Authorization(_) | SocialcastError::Timeout(_) => 2,
            SocialcastError::Config(_)
            | SocialcastError::Database(_)
            | SocialcastError::Credential(_)
            | SocialcastError::Listener(_)
            | SocialcastError::Publish(_)
            | SocialcastError::Graph(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No publisher registered for platform {0}")]
    MissingPublisher(Platform),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stored value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Malformed encryption key: {0}")]
    MalformedKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Failures of the OAuth handshake, kept apart from timeouts so callers can
/// tell "the user said no" from "the provider broke" from "nobody came back".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("authorization was denied: {0}")]
    Denied(String),

    #[error("could not exchange authorization code: {0}")]
    CodeExchange(String),

    #[error("could not exchange for a long-lived token: {0}")]
    TokenExchange(String),

    #[error("could not list managed accounts: {0}")]
    AccountLookup(String),

    #[error("a newer connect request replaced this one")]
    Superseded,

    #[error("authorization request was cancelled")]
    Cancelled,
}

/// Failure of either phase of a two-phase publish.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("media creation failed: {0}")]
    CreateMedia(String),

    #[error("media publish failed: {0}")]
    PublishMedia(String),
}

/// Failure of a call on a post that is already live.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("could not list recent media: {0}")]
    RecentMedia(String),

    #[error("could not fetch insights: {0}")]
    Insights(String),

    #[error("could not delete post: {0}")]
    Delete(String),
}
