//! Error types shared by the generator, the session engine and the stores.

use thiserror::Error;

/// A session configuration the engine refuses to run.
///
/// Raised while generating sequences, before any runtime state is touched,
/// so a rejected `start_game` never leaves a half-initialised session behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("n-back must be at least 1, got {0}")]
    InvalidNBack(usize),

    #[error("a session needs at least 1 event, got {0}")]
    InvalidNumberOfEvents(usize),

    #[error("a stimulus alphabet needs at least 1 combination, got {0}")]
    InvalidCombinations(usize),

    #[error("match percentage must be within 0..=100, got {0}")]
    InvalidMatchPercentage(u32),

    #[error("event interval must be longer than zero")]
    InvalidEventInterval,

    #[error("grid size must be at least 1, got {0}")]
    InvalidGridSize(usize),

    #[error("a {0}x{0} grid has more cells than stimulus labels")]
    GridTooLarge(usize),

    #[error("{0} combinations exceed the largest stimulus label")]
    TooManyCombinations(usize),

    #[error("{requested} letters requested but only {available} can be spoken")]
    TooManyLetters { requested: usize, available: usize },
}

/// Failure to start a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn session driver: {0}")]
    Driver(#[from] std::io::Error),
}

/// Failure reading or writing persisted preferences.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("preferences i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences are not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a speech-synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    #[error("speech engine is not ready")]
    NotReady,

    #[error("speech engine rejected utterance: {0}")]
    Rejected(String),
}
