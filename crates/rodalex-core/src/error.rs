//! Error types for Rodalex

/// Result type alias using Rodalex's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Rodalex operations
///
/// "Query is out of domain" is not an error; it is an ordinary
/// [`ClassificationResult`](crate::ClassificationResult).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Static ruleset missing or invalid (fatal at startup)
    #[error("lexicon load error: {0}")]
    LexiconLoad(String),

    /// Statistical classifier artifact could not be loaded (triggers retraining)
    #[error("classifier load error: {0}")]
    ClassifierLoad(String),

    /// Embedding or completion provider exceeded its deadline
    #[error("provider timed out after {0} ms")]
    ProviderTimeout(u64),

    /// Embedding or completion provider failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new lexicon load error
    pub fn lexicon(msg: impl Into<String>) -> Self {
        Self::LexiconLoad(msg.into())
    }

    /// Create a new classifier load error
    pub fn classifier_load(msg: impl Into<String>) -> Self {
        Self::ClassifierLoad(msg.into())
    }

    /// Create a new provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must abort startup rather than degrade a tier
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LexiconLoad(_) | Self::Config(_) | Self::Yaml(_))
    }
}
