use thiserror::Error;

/// Top-level error type for the Spellbee system.
///
/// Subsystem crates return this type directly so that `?` works across
/// crate boundaries. Only fatal-to-run failures travel as `Err`; per-asset
/// and playback failures are modelled as values by the crates that own them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpellbeeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Content generation error: {0}")]
    Generation(String),

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid session transition: {event} is not allowed in {from}")]
    InvalidTransition { from: String, event: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SpellbeeError {
    fn from(err: toml::de::Error) -> Self {
        SpellbeeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SpellbeeError {
    fn from(err: toml::ser::Error) -> Self {
        SpellbeeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SpellbeeError {
    fn from(err: serde_json::Error) -> Self {
        SpellbeeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Spellbee operations.
pub type Result<T> = std::result::Result<T, SpellbeeError>;
