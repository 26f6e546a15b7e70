//! Apportionment session
//!
//! Keeps the input of one election between runs so an operator can inspect
//! open ties, submit lot decisions and re-run deterministically.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::application::services::double_proportional::{
    DoubleProportionalApportioner, DoubleProportionalOptions, DoubleProportionalResult,
};
use crate::application::services::hagenbach_bischoff::{
    HagenbachBischoffApportioner, HagenbachBischoffResult,
};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    ApportionmentState, DoubleProportionalInput, LotDecision, LotDecisionResolver,
    ProportionalElectionInput, TieGroup,
};

/// The election an apportionment runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionInput {
    HagenbachBischoff(ProportionalElectionInput),
    DoubleProportional(DoubleProportionalInput),
}

impl ElectionInput {
    pub fn id(&self) -> &str {
        match self {
            ElectionInput::HagenbachBischoff(input) => &input.id,
            ElectionInput::DoubleProportional(input) => &input.id,
        }
    }

    pub fn lot_decisions(&self) -> &[LotDecision] {
        match self {
            ElectionInput::HagenbachBischoff(input) => &input.lot_decisions,
            ElectionInput::DoubleProportional(input) => &input.lot_decisions,
        }
    }

    fn lot_decisions_mut(&mut self) -> &mut Vec<LotDecision> {
        match self {
            ElectionInput::HagenbachBischoff(input) => &mut input.lot_decisions,
            ElectionInput::DoubleProportional(input) => &mut input.lot_decisions,
        }
    }
}

/// Result of one run, tagged by procedure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "procedure", rename_all = "snake_case")]
pub enum ApportionmentOutcome {
    HagenbachBischoff(HagenbachBischoffResult),
    DoubleProportional(DoubleProportionalResult),
}

impl ApportionmentOutcome {
    pub fn id(&self) -> &str {
        match self {
            ApportionmentOutcome::HagenbachBischoff(r) => &r.election_id,
            ApportionmentOutcome::DoubleProportional(r) => &r.union_id,
        }
    }

    pub fn state(&self) -> ApportionmentState {
        match self {
            ApportionmentOutcome::HagenbachBischoff(r) => r.state,
            ApportionmentOutcome::DoubleProportional(r) => r.state(),
        }
    }

    /// Ties waiting for a lot decision.
    pub fn pending(&self) -> Vec<TieGroup> {
        match self {
            ApportionmentOutcome::HagenbachBischoff(r) => r.pending.iter().cloned().collect(),
            ApportionmentOutcome::DoubleProportional(r) => r.pending.clone(),
        }
    }
}

/// One election plus its latest outcome.
#[derive(Debug, Clone)]
pub struct ApportionmentSession {
    input: ElectionInput,
    hagenbach_bischoff: HagenbachBischoffApportioner,
    double_proportional: DoubleProportionalApportioner,
    outcome: Option<ApportionmentOutcome>,
}

impl ApportionmentSession {
    pub fn new(input: ElectionInput, options: DoubleProportionalOptions) -> Self {
        Self {
            input,
            hagenbach_bischoff: HagenbachBischoffApportioner::new(),
            double_proportional: DoubleProportionalApportioner::new(options),
            outcome: None,
        }
    }

    pub fn input(&self) -> &ElectionInput {
        &self.input
    }

    pub fn outcome(&self) -> Option<&ApportionmentOutcome> {
        self.outcome.as_ref()
    }

    pub fn state(&self) -> ApportionmentState {
        self.outcome
            .as_ref()
            .map(ApportionmentOutcome::state)
            .unwrap_or_default()
    }

    /// Runs the procedure on the current input, replacing any earlier outcome.
    #[instrument(level = "debug", skip(self), fields(election = %self.input.id()))]
    pub fn apportion(&mut self) -> ApplicationResult<&ApportionmentOutcome> {
        let outcome = match &self.input {
            ElectionInput::HagenbachBischoff(input) => {
                ApportionmentOutcome::HagenbachBischoff(self.hagenbach_bischoff.apportion(input)?)
            }
            ElectionInput::DoubleProportional(input) => {
                ApportionmentOutcome::DoubleProportional(self.double_proportional.apportion(input)?)
            }
        };
        debug!("election {} is {}", outcome.id(), outcome.state());
        Ok(self.outcome.insert(outcome))
    }

    /// Ties of the latest run that wait for a lot decision.
    pub fn pending_lot_decisions(&self) -> Vec<TieGroup> {
        self.outcome
            .as_ref()
            .map(ApportionmentOutcome::pending)
            .unwrap_or_default()
    }

    /// Records `decision` for a pending tie and re-runs.
    ///
    /// The decision must name a tie of the latest run; subjects outside the tie
    /// are rejected. An incomplete decision is kept and the tie stays open.
    #[instrument(level = "debug", skip(self, decision), fields(tie = %decision.tie_id))]
    pub fn submit_lot_decision(&mut self, decision: LotDecision) -> ApplicationResult<&ApportionmentOutcome> {
        let pending = self.pending_lot_decisions();
        let tie = pending
            .iter()
            .find(|t| t.id == decision.tie_id)
            .ok_or_else(|| ApplicationError::UnknownTie(decision.tie_id.to_string()))?;
        LotDecisionResolver::new(std::slice::from_ref(&decision)).resolve(tie)?;

        info!("lot decision submitted for {}", tie);
        self.input.lot_decisions_mut().push(decision);
        self.apportion()
    }

    /// Back to [`ApportionmentState::Initial`]; submitted lot decisions stay.
    pub fn reset(&mut self) {
        self.outcome = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListInput, LotDecisionEntry, TieId};

    fn session(votes: &[(&str, i64)], seats: i64) -> ApportionmentSession {
        let input = ProportionalElectionInput {
            id: "e".into(),
            number_of_mandates: seats,
            lists: votes
                .iter()
                .enumerate()
                .map(|(i, (id, v))| ListInput {
                    id: id.to_string(),
                    position: i as u32,
                    vote_count: *v,
                })
                .collect(),
            list_unions: vec![],
            lot_decisions: vec![],
        };
        ApportionmentSession::new(ElectionInput::HagenbachBischoff(input), DoubleProportionalOptions::default())
    }

    #[test]
    fn given_tie_when_submitting_decision_then_completed() {
        // Arrange
        let mut session = session(&[("A", 50), ("B", 50)], 1);
        session.apportion().unwrap();
        let tie = session.pending_lot_decisions().remove(0);

        // Act
        let decision = LotDecision::for_tie(&tie, &["A"]).unwrap();
        let state = session.submit_lot_decision(decision).unwrap().state();

        // Assert
        assert_eq!(state, ApportionmentState::Completed);
        assert!(session.pending_lot_decisions().is_empty());
    }

    #[test]
    fn given_unknown_tie_when_submitting_then_rejected() {
        let mut session = session(&[("A", 50), ("B", 50)], 1);
        session.apportion().unwrap();
        let decision = LotDecision {
            tie_id: TieId::from("hb:e:7"),
            entries: vec![],
        };
        assert!(matches!(
            session.submit_lot_decision(decision),
            Err(ApplicationError::UnknownTie(_))
        ));
    }

    #[test]
    fn given_partial_decision_when_submitting_then_tie_stays_open() {
        let mut session = session(&[("A", 50), ("B", 50)], 1);
        session.apportion().unwrap();
        let tie = session.pending_lot_decisions().remove(0);
        let decision = LotDecision {
            tie_id: tie.id.clone(),
            entries: vec![LotDecisionEntry {
                subject_id: "A".into(),
                winning: true,
            }],
        };

        let state = session.submit_lot_decision(decision).unwrap().state();

        assert_eq!(state, ApportionmentState::HasOpenLotDecision);
        assert_eq!(session.pending_lot_decisions(), vec![tie]);
    }

    #[test]
    fn given_completed_session_when_reset_then_initial() {
        let mut session = session(&[("A", 100), ("B", 60), ("C", 40)], 2);
        session.apportion().unwrap();
        assert_eq!(session.state(), ApportionmentState::Completed);

        session.reset();

        assert_eq!(session.state(), ApportionmentState::Initial);
        assert!(session.outcome().is_none());
    }
}
