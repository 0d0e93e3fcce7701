// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job {0} is finalized and no longer accepts writes")]
    JobFinalized(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
