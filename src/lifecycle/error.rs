//! Lifecycle-specific error types

use super::Stage;
use thiserror::Error;

/// Errors that can occur while driving the boot sequence
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A hook signalled failure
    #[error("Hook failed during {stage}: {message}")]
    HookFailed {
        /// Stage whose hook series failed
        stage: Stage,
        /// Error message
        message: String,
    },

    /// A hook did not signal completion in time
    #[error("Timeout during {phase}: {message}")]
    Timeout {
        /// The lifecycle phase where timeout occurred
        phase: String,
        /// Additional error message
        message: String,
    },

    /// Driving the lifecycle in the mode it was not configured for
    #[error("Lifecycle misuse: {0}")]
    Misuse(String),

    /// A stage was entered out of sequence
    #[error("Stage '{found}' entered out of order, expected '{expected}'")]
    OutOfOrder {
        /// The stage due next
        expected: Stage,
        /// The stage that was requested
        found: Stage,
    },

    /// Every stage has already run
    #[error("Lifecycle already finished")]
    Finished,
}

impl LifecycleError {
    /// Create a hook failure error
    pub fn hook_failed(stage: Stage, message: impl Into<String>) -> Self {
        Self::HookFailed {
            stage,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create a misuse error
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
