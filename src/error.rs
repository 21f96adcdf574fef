//! Error taxonomy for the lifecycle engine and the checkpoint subsystem

use crate::models::LifecycleState;

/// Result type for engine operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Errors raised by the lifecycle manager, checkpoint store and compliance orchestrator
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("No valid transition out of state '{from}'")]
    InvalidStateTransition { from: LifecycleState },

    #[error("No active lifecycle context; call start() first")]
    NoActiveContext,

    #[error("Lifecycle context not found: {0}")]
    ContextNotFound(String),

    #[error("State handler for '{state}' failed: {reason}")]
    StateHandlerFailure {
        state: LifecycleState,
        reason: String,
    },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Checkpoint {id} digest mismatch (expected {expected}, got {actual})")]
    CheckpointDigestMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Protocol of Return failed for '{owner}': {reason}")]
    ProtocolOfReturnFailure { owner: String, reason: String },

    #[error("Checkpoint already exists: {0}")]
    CheckpointExists(String),

    #[error("Invalid alignment score: {0}")]
    InvalidAlignmentScore(f64),

    #[error("Checkpoint storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize checkpoint data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GovernanceError {
    /// Whether this error signals possible tampering with stored state
    pub fn is_tamper_signal(&self) -> bool {
        matches!(self, GovernanceError::CheckpointDigestMismatch { .. })
    }

    /// Whether the caller must escalate outside the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, GovernanceError::ProtocolOfReturnFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GovernanceError::InvalidStateTransition {
            from: LifecycleState::Final,
        };
        assert_eq!(err.to_string(), "No valid transition out of state 'final'");

        let err = GovernanceError::CheckpointNotFound("tcp_x".to_string());
        assert!(err.to_string().contains("tcp_x"));
    }

    #[test]
    fn test_error_classification() {
        let mismatch = GovernanceError::CheckpointDigestMismatch {
            id: "tcp_a".to_string(),
            expected: "sha256:00".to_string(),
            actual: "sha256:11".to_string(),
        };
        assert!(mismatch.is_tamper_signal());
        assert!(!mismatch.is_fatal());

        let por = GovernanceError::ProtocolOfReturnFailure {
            owner: "session_1".to_string(),
            reason: "no checkpoints".to_string(),
        };
        assert!(por.is_fatal());
        assert!(!GovernanceError::NoActiveContext.is_fatal());
    }
}
