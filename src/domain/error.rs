//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent contract violations of the tally input and
/// broken invariants of a computed distribution.
///
/// Arithmetic ties are not errors: they surface as
/// [`ApportionmentState::HasOpenLotDecision`](crate::domain::ApportionmentState).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("negative vote count for {id}: {vote_count}")]
    NegativeVoteCount { id: String, vote_count: i64 },

    #[error("number of mandates must be positive for {id}: {mandates}")]
    NonPositiveSeats { id: String, mandates: i64 },

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("unknown list: {0}")]
    UnknownList(String),

    #[error("unknown row (district): {0}")]
    UnknownRow(String),

    #[error("unknown column (list union): {0}")]
    UnknownColumn(String),

    #[error("list {list} belongs to more than one union: {first}, {second}")]
    ListInMultipleUnions {
        list: String,
        first: String,
        second: String,
    },

    #[error("sub list union {sub_union} contains list {list} outside its union {union}")]
    SubUnionOutsideUnion {
        sub_union: String,
        union: String,
        list: String,
    },

    #[error("invalid quorum for {id}: {quorum} (expected a percentage 0..=100)")]
    InvalidQuorum { id: String, quorum: i64 },

    #[error("vote or seat total of {0} exceeds the supported range")]
    CountOverflow(String),

    #[error("no votes to apportion in {0}")]
    NoVotes(String),

    #[error("invalid lot decision for tie {tie}: {message}")]
    InvalidLotDecision { tie: String, message: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("empty group tree")]
    EmptyTree,
}

impl DomainError {
    /// Contract violations are raised before any round executes.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, DomainError::InvariantViolation(_))
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
