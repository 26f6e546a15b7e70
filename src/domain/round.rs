//! Audit trail of the Hagenbach-Bischoff procedure.

use serde::{Deserialize, Serialize};

use crate::domain::quotient::{exact, Rational};

/// Which tie-break tier decided a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerReason {
    /// Highest distribution number of the quotient
    Quotient,
    /// Equal distribution numbers, highest quotient remainder
    QuotientRemainder,
    /// Equal quotients, most votes
    VoteCount,
    /// Fully tied, but every tied group gets one of the remaining seats;
    /// the first in child order takes this one
    SeatForEveryTied,
    /// Fully tied, decided by a submitted lot decision
    LotDecision,
}

/// Values of one sibling in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupValues {
    pub group_id: String,
    /// Quotient the group competed with in this round
    #[serde(with = "exact")]
    pub previous_quotient: Rational,
    /// Quotient the group competes with in the next round
    #[serde(with = "exact")]
    pub next_quotient: Rational,
    pub number_of_mandates: u64,
    pub previous_number_of_mandates: u64,
    pub is_winner: bool,
}

/// One seat awarded to one child of `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRound {
    /// 0-based, strictly increasing over the whole run
    pub index: usize,
    pub group_id: String,
    pub winner_id: String,
    pub winner_reason: WinnerReason,
    pub values: Vec<GroupValues>,
}

impl CalculationRound {
    pub fn winner_values(&self) -> Option<&GroupValues> {
        self.values.iter().find(|v| v.is_winner)
    }
}
