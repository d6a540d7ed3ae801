//! Error types for Stagehand.
//!
//! Library crates use [`StagehandError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.

use serde::Serialize;

use crate::types::{StageKind, StageName};

/// Top-level error type for all Stagehand operations.
///
/// Stage errors carry the name of the stage that produced them so callers
/// can scope retries or user messaging without string matching.
#[derive(Debug, thiserror::Error)]
pub enum StagehandError {
    /// A collection stage failed fatally (e.g., every lookup sub-call failed).
    #[error("collection failed in stage {stage}: {message}")]
    Collection { stage: StageName, message: String },

    /// A synthesis stage failed fatally with no viable fallback.
    #[error("synthesis failed in stage {stage}: {message}")]
    Synthesis { stage: StageName, message: String },

    /// An analysis stage failed fatally with no viable fallback.
    #[error("analysis failed in stage {stage}: {message}")]
    Analysis { stage: StageName, message: String },

    /// A generation/rendering stage failed fatally.
    #[error("generation failed in stage {stage}: {message}")]
    Generation { stage: StageName, message: String },

    /// The session id is unknown, expired, or deleted.
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// `update` was called on a session that has not completed.
    #[error("session {0} is not ready for update")]
    SessionNotReady(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StagehandError>;

impl StagehandError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Build the taxonomy variant matching a stage's declared kind.
    pub fn stage_failure(kind: StageKind, stage: StageName, msg: impl Into<String>) -> Self {
        let message = msg.into();
        match kind {
            StageKind::Collection => Self::Collection { stage, message },
            StageKind::Synthesis => Self::Synthesis { stage, message },
            StageKind::Analysis => Self::Analysis { stage, message },
            StageKind::Generation => Self::Generation { stage, message },
        }
    }

    /// The stage that produced this error, if it is stage-tagged.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Collection { stage, .. }
            | Self::Synthesis { stage, .. }
            | Self::Analysis { stage, .. }
            | Self::Generation { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stored stage failure
// ---------------------------------------------------------------------------

/// The stage-tagged failure recorded on a session when a stage fails fatally.
///
/// Cloneable/serializable so it can live inside the session record and be
/// surfaced verbatim by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: StageName,
    pub kind: StageKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: StageKind, stage: StageName, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Convert into the caller-facing taxonomy error.
    pub fn to_error(&self) -> StagehandError {
        StagehandError::stage_failure(self.kind, self.stage, self.message.clone())
    }
}
