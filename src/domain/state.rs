//! Apportionment state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `Initial → {Completed | Error | HasOpenLotDecision}`.
///
/// `HasOpenLotDecision` turns into `Completed` once the missing lot decisions
/// are submitted; `Error` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApportionmentState {
    #[default]
    Initial,
    Error,
    HasOpenLotDecision,
    Completed,
}

impl ApportionmentState {
    /// Combines the state of two phases: the first non-completed state wins.
    pub fn and_then(self, next: ApportionmentState) -> ApportionmentState {
        match self {
            ApportionmentState::Completed => next,
            other => other,
        }
    }
}

impl fmt::Display for ApportionmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApportionmentState::Initial => "initial",
            ApportionmentState::Error => "error",
            ApportionmentState::HasOpenLotDecision => "open lot decision",
            ApportionmentState::Completed => "completed",
        };
        write!(f, "{label}")
    }
}

/// Phase of a double proportional apportionment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Super,
    Sub,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Super => write!(f, "super"),
            Phase::Sub => write!(f, "sub"),
        }
    }
}
