//! Error types for the review pipeline.
//!
//! Library code returns these typed errors; the CLI wraps them in `anyhow`.

use thiserror::Error;

use crate::session::Slot;

/// Errors raised by the pipeline core.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Template rendering referenced variables absent from the bindings.
    #[error("missing template variable(s): {}", .0.join(", "))]
    MissingVariable(Vec<String>),

    /// The document loader could not produce text for a locator.
    #[error("unreadable document '{locator}': {reason}")]
    UnreadableDocument { locator: String, reason: String },

    /// The model service failed after the retry budget was spent.
    #[error("model invocation failed after {attempts} attempt(s): {cause}")]
    Invocation { attempts: u32, cause: ModelError },

    /// A stage result targeted a slot that already holds a value.
    #[error("session slot '{0}' was already populated")]
    SlotOccupied(Slot),

    /// A text result targeted a structured slot.
    #[error("stage produced text for structured slot '{0}'")]
    SlotMismatch(Slot),

    /// The chain was aborted by its driver.
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Build a `MissingVariable` error for a single name.
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingVariable(vec![name.into()])
    }
}

/// Failure of a single call to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Network or service-side failure worth retrying.
    #[error("transient service error: {0}")]
    Transient(String),

    /// The call exceeded the per-call timeout.
    #[error("call timed out after {0}ms")]
    Timeout(u64),

    /// The service rejected the request outright (auth, bad model id, ...).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ModelError {
    /// Whether another attempt with the same request could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// A stage failure tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {source}")]
pub struct StageFailure {
    pub stage: String,
    #[source]
    pub source: PipelineError,
}

/// Problems detected while assembling a chain, before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("stage '{stage}' reads '{slot}', which no earlier stage produces")]
    UnsatisfiedDependency { stage: String, slot: Slot },

    #[error("slot '{slot}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        slot: Slot,
        first: String,
        second: String,
    },

    #[error("stage '{stage}' writes input slot '{slot}'")]
    ProducesInput { stage: String, slot: Slot },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_message_lists_names() {
        let err = PipelineError::MissingVariable(vec!["aoh_text".into(), "keys".into()]);
        assert_eq!(err.to_string(), "missing template variable(s): aoh_text, keys");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::Transient("503".into()).is_transient());
        assert!(ModelError::Timeout(30_000).is_transient());
        assert!(!ModelError::Rejected("bad key".into()).is_transient());
    }
}
