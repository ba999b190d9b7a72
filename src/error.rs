//! Error types shared by the playback engine

use strudel_mini::ParseError;

/// Everything that can go wrong while acquiring audio or starting playback
///
/// Cloneable so the latest failure can be stored in [`SchedulerState::Failed`]
/// and handed to every state observer.
///
/// [`SchedulerState::Failed`]: crate::SchedulerState::Failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Opening the output device or attaching the analysis tap failed
    #[error("audio initialization failed: {0}")]
    InitializationFailed(String),

    /// The platform refused to resume a suspended output
    #[error("audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// Start or bind failed after a successful compile
    #[error("playback error: {0}")]
    Playback(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        EngineError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
