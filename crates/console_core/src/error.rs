use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("setup step {step} has no committed value")]
    MissingStepValue { step: usize },
    #[error("a commit is already in progress")]
    AlreadyCommitting,
    #[error("no commit is in progress")]
    NotCommitting,
    #[error("setup was already committed")]
    AlreadyCommitted,
    #[error("failed to create cluster: {0}")]
    Creation(#[source] ApiError),
}
