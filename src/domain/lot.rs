//! Lot decisions: human resolution of ties the procedures cannot break.
//!
//! The resolver never picks a winner itself. It checks that a submitted
//! decision fully disambiguates a recorded tie and hands the winners back as a
//! pinned preference for the run.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::{DomainError, DomainResult};

/// Deterministic identifier of a tie within one apportionment run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TieId(String);

impl TieId {
    /// Tie inside `group_id` at the given round index.
    pub fn hagenbach_bischoff(group_id: &str, round: usize) -> Self {
        Self(format!("hb:{group_id}:{round}"))
    }

    pub fn super_apportionment() -> Self {
        Self("dp:super".to_string())
    }

    /// Sub-apportionment ties are keyed by their candidate set so a tie that
    /// reappears while the district divisors are adjusted resolves the same way.
    pub fn sub_apportionment(candidates: &[String]) -> Self {
        Self(format!(
            "dp:sub:{}",
            candidates.iter().map(String::as_str).sorted().join("+")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TieId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePhase {
    HagenbachBischoff,
    SuperApportionment,
    SubApportionment,
}

/// A tie awaiting a lot decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieGroup {
    pub id: TieId,
    pub phase: TiePhase,
    /// Tied list or list union ids, in deterministic order
    pub candidates: Vec<String>,
    /// Seats at stake among the candidates; always 1 for Hagenbach-Bischoff
    pub seats: usize,
}

impl fmt::Display for TieGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} seat(s) among {}",
            self.id,
            self.seats,
            self.candidates.join(", ")
        )
    }
}

/// One operator decision for one tied subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDecisionEntry {
    /// List or list union id
    pub subject_id: String,
    pub winning: bool,
}

/// All entries submitted for one tie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDecision {
    pub tie_id: TieId,
    pub entries: Vec<LotDecisionEntry>,
}

impl LotDecision {
    /// Complete decision for `tie`: the named winners win, every other tied
    /// candidate loses.
    pub fn for_tie(tie: &TieGroup, winners: &[&str]) -> DomainResult<Self> {
        if let Some(unknown) = winners
            .iter()
            .copied()
            .find(|w| !tie.candidates.iter().any(|c| c == w))
        {
            return Err(DomainError::InvalidLotDecision {
                tie: tie.id.to_string(),
                message: format!("{unknown} is not part of the tie"),
            });
        }
        Ok(Self {
            tie_id: tie.id.clone(),
            entries: tie
                .candidates
                .iter()
                .map(|c| LotDecisionEntry {
                    subject_id: c.clone(),
                    winning: winners.contains(&c.as_str()),
                })
                .collect(),
        })
    }

    pub fn winners(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.winning)
            .map(|e| e.subject_id.as_str())
    }
}

/// Outcome of resolving a tie against the submitted decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Winners, in candidate order
    Pinned(Vec<String>),
    /// The tie stays open; the reason is kept for the operator
    Open(String),
}

/// Looks up and validates lot decisions for recorded ties.
#[derive(Debug, Clone, Copy)]
pub struct LotDecisionResolver<'a> {
    decisions: &'a [LotDecision],
}

impl<'a> LotDecisionResolver<'a> {
    pub fn new(decisions: &'a [LotDecision]) -> Self {
        Self { decisions }
    }

    /// Resolves `tie`. The last decision submitted for a tie id wins.
    ///
    /// Subjects outside the tie or duplicated subjects make the decision
    /// malformed (contract violation). A decision that does not cover every
    /// tied candidate, or names the wrong number of winners, leaves the tie open.
    pub fn resolve(&self, tie: &TieGroup) -> DomainResult<Resolution> {
        let Some(decision) = self.decisions.iter().rev().find(|d| d.tie_id == tie.id) else {
            return Ok(Resolution::Open("no lot decision submitted".to_string()));
        };

        let mut seen = BTreeSet::new();
        for entry in &decision.entries {
            if !tie.candidates.contains(&entry.subject_id) {
                return Err(DomainError::InvalidLotDecision {
                    tie: tie.id.to_string(),
                    message: format!("{} is not part of the tie", entry.subject_id),
                });
            }
            if !seen.insert(entry.subject_id.as_str()) {
                return Err(DomainError::InvalidLotDecision {
                    tie: tie.id.to_string(),
                    message: format!("{} listed more than once", entry.subject_id),
                });
            }
        }

        if seen.len() != tie.candidates.len() {
            let reason = format!(
                "decision covers {} of {} tied candidates",
                seen.len(),
                tie.candidates.len()
            );
            warn!("lot decision {}: {}", tie.id, reason);
            return Ok(Resolution::Open(reason));
        }

        let winners: Vec<String> = tie
            .candidates
            .iter()
            .filter(|c| decision.winners().any(|w| w == c.as_str()))
            .cloned()
            .collect();
        if winners.len() != tie.seats {
            let reason = format!(
                "decision names {} winner(s), {} seat(s) at stake",
                winners.len(),
                tie.seats
            );
            warn!("lot decision {}: {}", tie.id, reason);
            return Ok(Resolution::Open(reason));
        }

        debug!("lot decision {} pins {:?}", tie.id, winners);
        Ok(Resolution::Pinned(winners))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tie() -> TieGroup {
        TieGroup {
            id: TieId::hagenbach_bischoff("e1", 0),
            phase: TiePhase::HagenbachBischoff,
            candidates: vec!["a".into(), "b".into()],
            seats: 1,
        }
    }

    fn entry(subject: &str, winning: bool) -> LotDecisionEntry {
        LotDecisionEntry {
            subject_id: subject.into(),
            winning,
        }
    }

    #[test]
    fn given_no_decision_when_resolving_then_open() {
        let resolver = LotDecisionResolver::new(&[]);
        assert!(matches!(resolver.resolve(&tie()).unwrap(), Resolution::Open(_)));
    }

    #[test]
    fn given_complete_decision_when_resolving_then_pinned() {
        let decisions = vec![LotDecision::for_tie(&tie(), &["b"]).unwrap()];
        let resolver = LotDecisionResolver::new(&decisions);
        assert_eq!(
            resolver.resolve(&tie()).unwrap(),
            Resolution::Pinned(vec!["b".to_string()])
        );
    }

    #[test]
    fn given_partial_decision_when_resolving_then_stays_open() {
        let decisions = vec![LotDecision {
            tie_id: tie().id,
            entries: vec![entry("a", true)],
        }];
        let resolver = LotDecisionResolver::new(&decisions);
        assert!(matches!(resolver.resolve(&tie()).unwrap(), Resolution::Open(_)));
    }

    #[test]
    fn given_two_winners_for_one_seat_when_resolving_then_stays_open() {
        let decisions = vec![LotDecision {
            tie_id: tie().id,
            entries: vec![entry("a", true), entry("b", true)],
        }];
        let resolver = LotDecisionResolver::new(&decisions);
        assert!(matches!(resolver.resolve(&tie()).unwrap(), Resolution::Open(_)));
    }

    #[test]
    fn given_foreign_subject_when_resolving_then_contract_violation() {
        let decisions = vec![LotDecision {
            tie_id: tie().id,
            entries: vec![entry("a", true), entry("b", false), entry("z", false)],
        }];
        let resolver = LotDecisionResolver::new(&decisions);
        assert!(matches!(
            resolver.resolve(&tie()),
            Err(DomainError::InvalidLotDecision { .. })
        ));
    }

    #[test]
    fn given_resubmitted_decision_when_resolving_then_last_one_counts() {
        let decisions = vec![
            LotDecision::for_tie(&tie(), &["a"]).unwrap(),
            LotDecision::for_tie(&tie(), &["b"]).unwrap(),
        ];
        let resolver = LotDecisionResolver::new(&decisions);
        assert_eq!(
            resolver.resolve(&tie()).unwrap(),
            Resolution::Pinned(vec!["b".to_string()])
        );
    }

    #[test]
    fn given_candidates_when_sub_tie_id_then_order_independent() {
        let a = TieId::sub_apportionment(&["x".into(), "a".into()]);
        let b = TieId::sub_apportionment(&["a".into(), "x".into()]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "dp:sub:a+x");
    }
}
