//! Double proportional apportionment service
//!
//! Super-apportionment hands the seats of all districts to the list unions
//! (standard rounding over the union voter numbers). Sub-apportionment then
//! places each union's seats onto its district lists so that every district
//! also receives exactly its seats.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::services::sub_apportionment::SubApportionment;
use crate::application::ApplicationResult;
use crate::domain::quotient::{exact, Rational};
use crate::domain::{
    AllocationStatus, ApportionmentState, DivisorSearch, DomainError, DomainResult,
    DoubleProportionalInput, DoubleProportionalMatrix, LotDecisionResolver, Phase, TieGroup, TieId,
    TiePhase, VoterNumberBasis,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Tuning of the double proportional procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleProportionalOptions {
    /// Applies when the input does not choose a basis itself
    pub voter_number_basis: VoterNumberBasis,
    /// Cap on alternating scaling iterations of the sub-apportionment
    pub max_iterations: usize,
}

impl Default for DoubleProportionalOptions {
    fn default() -> Self {
        Self {
            voter_number_basis: VoterNumberBasis::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// One divisor of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivisorAudit {
    pub phase: Phase,
    /// Union id for the super divisor, column or district id otherwise
    pub subject: String,
    #[serde(with = "exact")]
    pub divisor: Rational,
}

/// Why a phase ended in [`ApportionmentState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApportionmentErrorDetail {
    pub phase: Phase,
    /// Column or district that could not be served
    pub subject: Option<String>,
    pub message: String,
}

/// How one phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PhaseOutcome {
    Completed,
    Open(Vec<TieGroup>),
    Failed(ApportionmentErrorDetail),
}

impl PhaseOutcome {
    fn state(&self) -> ApportionmentState {
        match self {
            PhaseOutcome::Completed => ApportionmentState::Completed,
            PhaseOutcome::Open(_) => ApportionmentState::HasOpenLotDecision,
            PhaseOutcome::Failed(_) => ApportionmentState::Error,
        }
    }
}

/// Outcome of one double proportional run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoubleProportionalResult {
    pub union_id: String,
    pub number_of_mandates: u64,
    pub cantonal_quorum: Option<u32>,
    pub super_apportionment_state: ApportionmentState,
    pub sub_apportionment_state: ApportionmentState,
    pub matrix: DoubleProportionalMatrix,
    pub divisors: Vec<DivisorAudit>,
    pub pending: Vec<TieGroup>,
    pub error: Option<ApportionmentErrorDetail>,
}

impl DoubleProportionalResult {
    /// Combined state: the first phase that did not complete decides.
    pub fn state(&self) -> ApportionmentState {
        self.super_apportionment_state
            .and_then(self.sub_apportionment_state)
    }

    /// Seats of a list (cell), lot seats included.
    pub fn mandates_of_list(&self, list_id: &str) -> Option<u64> {
        self.matrix
            .cell_by_list(list_id)
            .map(|c| c.sub_apportionment_number_of_mandates())
    }

    /// Super-apportioned seats of a list union (column).
    pub fn mandates_of_union(&self, union_id: &str) -> Option<u64> {
        self.matrix
            .column_by_id(union_id)
            .map(|c| c.super_apportionment_number_of_mandates)
    }
}

/// Runs super- and sub-apportionment on one matrix per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoubleProportionalApportioner {
    options: DoubleProportionalOptions,
}

impl DoubleProportionalApportioner {
    pub fn new(options: DoubleProportionalOptions) -> Self {
        Self { options }
    }

    /// Builds the matrix of `input` and runs both phases.
    ///
    /// Contract violations fail before any seat is handed out. A phase that
    /// cannot distribute its seats ends in [`ApportionmentState::Error`]; the
    /// sub-apportionment only starts once the super-apportionment completed.
    #[instrument(level = "debug", skip(self, input), fields(union = %input.id))]
    pub fn apportion(&self, input: &DoubleProportionalInput) -> ApplicationResult<DoubleProportionalResult> {
        let mut matrix = DoubleProportionalMatrix::from_input(input, self.options.voter_number_basis)?;
        let resolver = LotDecisionResolver::new(&input.lot_decisions);
        let mut divisors = Vec::new();

        let super_outcome = self.super_apportion(&mut matrix, resolver, &mut divisors)?;
        let sub_outcome = if super_outcome == PhaseOutcome::Completed {
            SubApportionment::new(resolver, self.options.max_iterations).run(&mut matrix, &mut divisors)?
        } else {
            debug!("sub-apportionment skipped, super-apportionment {}", super_outcome.state());
            PhaseOutcome::Open(Vec::new())
        };

        let super_state = super_outcome.state();
        let sub_state = if super_state == ApportionmentState::Completed {
            sub_outcome.state()
        } else {
            ApportionmentState::Initial
        };

        let (pending, error) = match (super_outcome, sub_outcome) {
            (PhaseOutcome::Failed(detail), _) | (_, PhaseOutcome::Failed(detail)) => (Vec::new(), Some(detail)),
            (PhaseOutcome::Open(ties), _) if !ties.is_empty() => (ties, None),
            (_, PhaseOutcome::Open(ties)) => (ties, None),
            _ => (Vec::new(), None),
        };

        if let Some(detail) = &error {
            warn!(
                "union {} is not distributable in the {} phase: {}",
                input.id, detail.phase, detail.message
            );
        } else if super_state == ApportionmentState::Completed && sub_state == ApportionmentState::Completed {
            verify(&matrix)?;
            info!("union {} completed", input.id);
        }

        Ok(DoubleProportionalResult {
            union_id: input.id.clone(),
            number_of_mandates: matrix.number_of_mandates,
            cantonal_quorum: matrix.cantonal_quorum,
            super_apportionment_state: super_state,
            sub_apportionment_state: sub_state,
            matrix,
            divisors,
            pending,
            error,
        })
    }

    /// Seats per column by standard rounding over the eligible columns.
    fn super_apportion(
        &self,
        matrix: &mut DoubleProportionalMatrix,
        resolver: LotDecisionResolver<'_>,
        divisors: &mut Vec<DivisorAudit>,
    ) -> DomainResult<PhaseOutcome> {
        let search = DivisorSearch::new(TiePhase::SuperApportionment, resolver);
        let allocation = search.apportion(&matrix.columns, matrix.number_of_mandates, |_| {
            TieId::super_apportionment()
        })?;

        for (column, (&seats, &from_lot)) in matrix
            .columns
            .iter_mut()
            .zip(allocation.seats.iter().zip(&allocation.seats_from_lot))
        {
            column.super_apportionment_number_of_mandates = seats;
            column.super_apportionment_number_of_mandates_from_lot = from_lot;
        }

        match allocation.status {
            AllocationStatus::Complete => {
                match &allocation.lot_applied {
                    Some(tie) => debug!("super-apportionment includes lot decision {}", tie),
                    None if !search.reproduces(&matrix.columns, &allocation) => {
                        return Err(DomainError::InvariantViolation(format!(
                            "super divisor of {} does not reproduce its seats",
                            matrix.id
                        )));
                    }
                    None => {}
                }
                if let Some(divisor) = allocation.divisor {
                    debug!("super divisor {}", divisor);
                    divisors.push(DivisorAudit {
                        phase: Phase::Super,
                        subject: matrix.id.clone(),
                        divisor,
                    });
                }
                Ok(PhaseOutcome::Completed)
            }
            AllocationStatus::Tied(tie) => {
                for column in &mut matrix.columns {
                    if tie.candidates.contains(&column.id) {
                        column.super_apportionment_lot_decision_required = true;
                    }
                }
                Ok(PhaseOutcome::Open(vec![tie]))
            }
            AllocationStatus::NoEligibleUnits => Ok(PhaseOutcome::Failed(ApportionmentErrorDetail {
                phase: Phase::Super,
                subject: None,
                message: "no list union reached a quorum".to_string(),
            })),
        }
    }
}

/// Sum checks of a completed matrix: columns against the total, cells against
/// their column and their district.
fn verify(matrix: &DoubleProportionalMatrix) -> DomainResult<()> {
    let total = matrix.super_apportioned();
    if total != matrix.number_of_mandates {
        return Err(DomainError::InvariantViolation(format!(
            "columns hold {total} mandates, {} available",
            matrix.number_of_mandates
        )));
    }
    for (j, column) in matrix.columns.iter().enumerate() {
        let cells = matrix.column_mandates(j);
        if cells != column.super_apportionment_number_of_mandates {
            return Err(DomainError::InvariantViolation(format!(
                "column {} holds {} mandates, its cells {}",
                column.id, column.super_apportionment_number_of_mandates, cells
            )));
        }
    }
    for (i, row) in matrix.rows.iter().enumerate() {
        let cells = matrix.row_mandates(i);
        if cells != row.number_of_mandates {
            return Err(DomainError::InvariantViolation(format!(
                "district {} has {} mandates, its cells {}",
                row.id, row.number_of_mandates, cells
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellInput, DistrictInput, LotDecision, UnionColumnInput};

    fn district(id: &str, position: u32, seats: i64, quorum: Option<i64>) -> DistrictInput {
        DistrictInput {
            id: id.into(),
            position,
            number_of_mandates: seats,
            quorum,
        }
    }

    fn union(id: &str, position: u32) -> UnionColumnInput {
        UnionColumnInput {
            id: id.into(),
            position,
        }
    }

    fn cell(list: &str, district: &str, union: &str, votes: i64) -> CellInput {
        CellInput {
            list_id: list.into(),
            district_id: district.into(),
            union_id: union.into(),
            vote_count: votes,
        }
    }

    fn input(districts: Vec<DistrictInput>, unions: Vec<UnionColumnInput>, cells: Vec<CellInput>) -> DoubleProportionalInput {
        DoubleProportionalInput {
            id: "kr".into(),
            districts,
            unions,
            cells,
            cantonal_quorum: None,
            voter_number_basis: None,
            lot_decisions: vec![],
        }
    }

    fn apportion(input: &DoubleProportionalInput) -> DoubleProportionalResult {
        DoubleProportionalApportioner::default().apportion(input).unwrap()
    }

    #[test]
    fn given_row_sums_fit_when_apportioning_then_completed_in_one_pass() {
        // Arrange
        let input = input(
            vec![district("d1", 1, 4, None), district("d2", 2, 2, None)],
            vec![union("u1", 1), union("u2", 2)],
            vec![
                cell("a1", "d1", "u1", 800),
                cell("b1", "d1", "u2", 200),
                cell("a2", "d2", "u1", 390),
                cell("b2", "d2", "u2", 10),
            ],
        );

        // Act
        let result = apportion(&input);

        // Assert
        assert_eq!(result.state(), ApportionmentState::Completed);
        assert_eq!(result.mandates_of_union("u1"), Some(5));
        assert_eq!(result.mandates_of_union("u2"), Some(1));
        assert_eq!(result.mandates_of_list("a1"), Some(3));
        assert_eq!(result.mandates_of_list("a2"), Some(2));
        assert_eq!(result.mandates_of_list("b1"), Some(1));
        assert_eq!(result.mandates_of_list("b2"), Some(0));
        assert_eq!(result.divisors[0].phase, Phase::Super);
    }

    #[test]
    fn given_district_overfilled_when_apportioning_then_district_divisors_shift_seats() {
        let input = input(
            vec![district("d1", 1, 2, None), district("d2", 2, 2, None)],
            vec![union("u1", 1), union("u2", 2)],
            vec![
                cell("a1", "d1", "u1", 700),
                cell("b1", "d1", "u2", 400),
                cell("a2", "d2", "u1", 500),
                cell("b2", "d2", "u2", 100),
            ],
        );

        let result = apportion(&input);

        assert_eq!(result.state(), ApportionmentState::Completed);
        assert_eq!(result.mandates_of_union("u1"), Some(3));
        assert_eq!(result.mandates_of_list("a1"), Some(1));
        assert_eq!(result.mandates_of_list("a2"), Some(2));
        assert_eq!(result.mandates_of_list("b1"), Some(1));
        assert_eq!(result.mandates_of_list("b2"), Some(0));
        assert!(result
            .divisors
            .iter()
            .any(|d| d.phase == Phase::Sub && d.subject == "d2"));
    }

    #[test]
    fn given_tie_decided_by_district_seats_when_apportioning_then_no_lot_needed() {
        let input = input(
            vec![district("d1", 1, 2, None), district("d2", 2, 2, None)],
            vec![union("u1", 1), union("u2", 2)],
            vec![
                cell("a1", "d1", "u1", 600),
                cell("b1", "d1", "u2", 400),
                cell("a2", "d2", "u1", 600),
                cell("b2", "d2", "u2", 100),
            ],
        );

        let result = apportion(&input);

        assert_eq!(result.state(), ApportionmentState::Completed);
        assert_eq!(result.mandates_of_list("a1"), Some(1));
        assert_eq!(result.mandates_of_list("a2"), Some(2));
        assert_eq!(result.matrix.cell_by_list("a2").unwrap().sub_apportionment_mandates_from_lot, 0);
    }

    #[test]
    fn given_equal_unions_for_one_seat_when_apportioning_then_super_lot_decision_required() {
        let mut input = input(
            vec![district("d1", 1, 1, None)],
            vec![union("u1", 1), union("u2", 2)],
            vec![cell("a1", "d1", "u1", 100), cell("b1", "d1", "u2", 100)],
        );

        let result = apportion(&input);
        assert_eq!(result.super_apportionment_state, ApportionmentState::HasOpenLotDecision);
        assert_eq!(result.sub_apportionment_state, ApportionmentState::Initial);
        assert!(result.matrix.columns.iter().all(|c| c.super_apportionment_lot_decision_required));
        let tie = result.pending[0].clone();
        assert_eq!(tie.id, TieId::super_apportionment());

        input.lot_decisions.push(LotDecision::for_tie(&tie, &["u2"]).unwrap());
        let result = apportion(&input);
        assert_eq!(result.state(), ApportionmentState::Completed);
        assert_eq!(result.mandates_of_union("u2"), Some(1));
        assert_eq!(result.matrix.column_by_id("u2").unwrap().super_apportionment_number_of_mandates_from_lot, 1);
        assert_eq!(result.mandates_of_list("b1"), Some(1));
    }

    #[test]
    fn given_no_union_reaching_quorum_when_apportioning_then_super_error() {
        let input = input(
            vec![district("d1", 1, 2, Some(60))],
            vec![union("u1", 1), union("u2", 2)],
            vec![cell("a1", "d1", "u1", 50), cell("b1", "d1", "u2", 50)],
        );

        let result = apportion(&input);

        assert_eq!(result.super_apportionment_state, ApportionmentState::Error);
        assert_eq!(result.state(), ApportionmentState::Error);
        assert_eq!(result.error.unwrap().phase, Phase::Super);
    }

    #[test]
    fn given_district_without_eligible_list_when_apportioning_then_sub_error_names_it() {
        let input = input(
            vec![district("d1", 1, 2, Some(0)), district("d2", 2, 1, Some(60))],
            vec![union("u1", 1), union("u2", 2)],
            vec![
                cell("a1", "d1", "u1", 120),
                cell("b1", "d1", "u2", 100),
                cell("a2", "d2", "u1", 50),
                cell("b2", "d2", "u2", 50),
            ],
        );

        let result = apportion(&input);

        assert_eq!(result.super_apportionment_state, ApportionmentState::Completed);
        assert_eq!(result.sub_apportionment_state, ApportionmentState::Error);
        let error = result.error.unwrap();
        assert_eq!(error.phase, Phase::Sub);
        assert_eq!(error.subject.as_deref(), Some("d2"));
    }

    #[test]
    fn given_union_below_every_quorum_when_apportioning_then_excluded() {
        let mut input = input(
            vec![district("d1", 1, 10, Some(5)), district("d2", 2, 10, Some(5))],
            vec![union("u1", 1), union("u2", 2), union("u3", 3)],
            vec![
                cell("a1", "d1", "u1", 800),
                cell("b1", "d1", "u2", 200),
                cell("c1", "d1", "u3", 45),
                cell("a2", "d2", "u1", 390),
                cell("b2", "d2", "u2", 10),
                cell("c2", "d2", "u3", 19),
            ],
        );

        let result = apportion(&input);

        assert_eq!(result.state(), ApportionmentState::Completed);
        assert_eq!(result.mandates_of_union("u3"), Some(0));
        assert_eq!(result.mandates_of_union("u1"), Some(17));
        assert_eq!(result.mandates_of_union("u2"), Some(3));
        // b2 misses the district quorum and u2 has no cantonal quorum to carry it
        assert_eq!(result.mandates_of_list("b2"), Some(0));
        assert_eq!(result.mandates_of_list("a2"), Some(10));
        assert_eq!(result.mandates_of_list("a1"), Some(7));
        assert_eq!(result.mandates_of_list("b1"), Some(3));

        input.cantonal_quorum = Some(1);
        let result = apportion(&input);
        assert!(result.matrix.column_by_id("u3").unwrap().cantonal_quorum_reached);
    }

    #[test]
    fn given_negative_votes_when_apportioning_then_contract_violation() {
        let input = input(
            vec![district("d1", 1, 1, None)],
            vec![union("u1", 1)],
            vec![cell("a1", "d1", "u1", -3)],
        );
        let err = DoubleProportionalApportioner::default().apportion(&input).unwrap_err();
        assert!(err.is_contract_violation());
    }
}
