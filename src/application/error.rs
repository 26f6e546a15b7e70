//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("unknown election: {0}")]
    UnknownElection(String),

    #[error("unknown tie: {0}")]
    UnknownTie(String),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    /// The input broke the tally contract (as opposed to a defect or I/O problem).
    pub fn is_contract_violation(&self) -> bool {
        match self {
            ApplicationError::Domain(e) => e.is_contract_violation(),
            ApplicationError::UnknownElection(_) | ApplicationError::UnknownTie(_) => true,
            _ => false,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
