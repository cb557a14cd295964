//! Domain errors for the conductor orchestration core.
//!
//! Only genuinely exceptional conditions are errors here. Exhausting a
//! fallback chain and finding no feasible plan are ordinary outcomes and are
//! modelled as return values (`FallbackOutcome::Exhausted`, an empty `Plan`).

use thiserror::Error;

/// Errors surfaced to callers of `TaskDispatcher::submit`.
///
/// The dispatcher never swallows a capability failure and never retries on
/// its own; callers branch on the variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Capability not found: {name}")]
    CapabilityNotFound { name: String },

    #[error("Capability '{capability}' timed out after {timeout_ms}ms")]
    ExecutionTimeout { capability: String, timeout_ms: u64 },

    #[error("Capability '{capability}' failed: {message}")]
    ExecutionError { capability: String, message: String },
}

impl DispatchError {
    /// Name of the capability the error relates to.
    pub fn capability(&self) -> &str {
        match self {
            Self::CapabilityNotFound { name } => name,
            Self::ExecutionTimeout { capability, .. } | Self::ExecutionError { capability, .. } => {
                capability
            }
        }
    }

    /// Whether a wrapping caller may retry the submission.
    ///
    /// An unknown capability is fatal to the submission.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::CapabilityNotFound { .. })
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure reported by an externally supplied capability handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CapabilityError {
    /// Human readable failure description.
    pub message: String,
}

impl CapabilityError {
    /// Create a new capability error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Serialization error: {err}"))
    }
}

/// Failure of an optimization or fallback strategy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Strategy '{strategy}' is not registered")]
    UnknownStrategy { strategy: String },

    #[error("Strategy '{strategy}' failed: {message}")]
    ExecutionFailed { strategy: String, message: String },
}

impl StrategyError {
    /// Build an execution failure for the named strategy.
    pub fn failed(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading or saving escalation history.
#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
