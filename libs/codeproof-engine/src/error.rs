//! Error taxonomy for the verification engine.

use codeproof_common::{RegistryError, TestRejection};
use std::time::Duration;
use thiserror::Error;

/// Failures of one sandbox round.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The staging area could not be created or written.
    #[error("failed to stage build context: {0}")]
    Staging(#[from] std::io::Error),

    /// A runtime template did not render.
    #[error("failed to render {name}: {reason}")]
    Template { name: String, reason: String },

    /// The execution backend cannot be reached at all.
    #[error("execution backend unavailable: {0}")]
    InfrastructureUnavailable(String),

    /// The candidate source did not parse; nothing was staged.
    #[error("candidate does not parse: {0}")]
    InvalidSource(String),

    /// The image did not build. Whether the candidate is to blame depends
    /// on what the runtime's build does.
    #[error("build failed: {0}")]
    BuildFailure(String),

    #[error("execution timed out after {}ms", .0.as_millis())]
    ExecutionTimeout(Duration),

    /// The runtime adapter did not leave its report behind.
    #[error("test report missing at {path}: {reason}")]
    ReportMissing { path: String, reason: String },

    #[error("malformed test report: {0}")]
    MalformedReport(String),

    /// Any other backend call failure after the backend was reached.
    #[error("execution backend error: {0}")]
    Backend(String),
}

impl SandboxError {
    /// True when the candidate code is to blame and a revision may help.
    pub fn is_candidate_fault(&self) -> bool {
        matches!(
            self,
            SandboxError::InvalidSource(_)
                | SandboxError::BuildFailure(_)
                | SandboxError::ExecutionTimeout(_)
        )
    }
}

/// Failures talking to the generation backend. Never a judgment: a
/// judgment arrives inside a successful `GenerationResult`.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation API failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected generation response: {0}")]
    UnexpectedResponse(String),
}

/// Top-level error of the engine's public surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unsupported language or version; never attempted.
    #[error(transparent)]
    Caller(#[from] RegistryError),

    /// Test text refused before anything was built.
    #[error(transparent)]
    Rejected(#[from] TestRejection),

    /// Infrastructure failure that aborted the session.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Generation backend unreachable or unusable.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_faults_are_parse_build_and_timeout_only() {
        assert!(SandboxError::InvalidSource("bad".into()).is_candidate_fault());
        assert!(SandboxError::BuildFailure("bad".into()).is_candidate_fault());
        assert!(SandboxError::ExecutionTimeout(Duration::from_secs(1)).is_candidate_fault());

        assert!(!SandboxError::InfrastructureUnavailable("down".into()).is_candidate_fault());
        assert!(!SandboxError::ReportMissing {
            path: "/app/test_results.json".into(),
            reason: "no such file".into(),
        }
        .is_candidate_fault());
        assert!(!SandboxError::MalformedReport("x".into()).is_candidate_fault());
    }

    #[test]
    fn timeout_message_in_millis() {
        let err = SandboxError::ExecutionTimeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "execution timed out after 1500ms");
    }
}
