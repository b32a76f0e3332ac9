//! Error types for inbox-rules.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule evaluation error: {0}")]
    Rules(#[from] RulesError),

    #[error("Email processing error: {0}")]
    Mail(#[from] MailError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rule loading and rule configuration errors.
///
/// Every variant is fatal to a run: rules are loaded all-or-nothing before
/// any message is looked at.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to read rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules: {0}")]
    Parse(String),

    #[error("Rule {rule}: invalid predicate '{predicate}' ({context})")]
    InvalidPredicate {
        rule: usize,
        predicate: String,
        context: String,
    },

    #[error("Rule {rule}: unknown field '{field}'")]
    InvalidField { rule: usize, field: String },

    #[error("Rule {rule}: invalid value for {field}: {reason}")]
    InvalidValue {
        rule: usize,
        field: String,
        reason: String,
    },

    #[error("Rule {rule}: invalid action: {reason}")]
    InvalidAction { rule: usize, reason: String },
}

/// Mail provider errors (network, API, auth).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Mail API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid response from mail API: {0}")]
    InvalidResponse(String),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Label '{0}' does not exist")]
    UnknownLabel(String),
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

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
