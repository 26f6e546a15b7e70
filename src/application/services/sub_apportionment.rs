//! Sub-apportionment by alternating scaling.
//!
//! Column steps fit every list union to its super-apportioned seats, district
//! steps fit every district to its seats, until one step satisfies both. A
//! cell then holds `round(voter_number / (district divisor * union divisor))`.
//! Ties left by the last column step are settled by the district seats where
//! possible and by lot decisions otherwise.

use num::{One, Zero};
use tracing::{debug, instrument, trace, warn};

use crate::application::services::double_proportional::{
    ApportionmentErrorDetail, DivisorAudit, PhaseOutcome,
};
use crate::domain::quotient::Rational;
use crate::domain::{
    AllocationStatus, DivisorSearch, DomainError, DomainResult,
    DoubleProportionalMatrix, LotDecisionResolver, Phase, Resolution, TieGroup, TieId, TiePhase,
    WeightedUnit,
};

/// A non-distributable step; ends the phase in the error state.
type StepResult<T> = Result<T, ApportionmentErrorDetail>;

fn non_distributable(subject: &str, message: impl Into<String>) -> ApportionmentErrorDetail {
    ApportionmentErrorDetail {
        phase: Phase::Sub,
        subject: Some(subject.to_string()),
        message: message.into(),
    }
}

fn positive(divisor: Option<Rational>) -> Option<Rational> {
    divisor.filter(|d| *d > Rational::zero())
}

/// Tie left in one column by a column step.
struct ColumnTie {
    column: usize,
    tie: TieGroup,
}

/// Divisors and seats of the current iteration.
struct Scaling {
    row_divisors: Vec<Rational>,
    column_divisors: Vec<Option<Rational>>,
    /// Per cell, lot seats included
    seats: Vec<u64>,
    from_lot: Vec<u64>,
}

/// A column tie while it is being settled.
struct OpenTie {
    column: usize,
    /// Tied cells in districts that still have seats
    cells: Vec<usize>,
    seats: usize,
}

/// Seats every tie whose remaining candidates match its open seats, until
/// nothing changes.
fn force_by_district_seats(
    matrix: &DoubleProportionalMatrix,
    open: &mut [OpenTie],
    deficits: &mut [i64],
    scaling: &mut Scaling,
) -> StepResult<()> {
    loop {
        let mut changed = false;
        for tie in open.iter_mut().filter(|t| t.seats > 0) {
            let before = tie.cells.len();
            tie.cells.retain(|&k| deficits[matrix.cells[k].row] > 0);
            changed |= tie.cells.len() != before;
            if tie.cells.len() != tie.seats {
                continue;
            }
            for &k in &tie.cells {
                let row = matrix.cells[k].row;
                if deficits[row] <= 0 {
                    return Err(non_distributable(
                        &matrix.rows[row].id,
                        "tied seats exceed the district's remaining seats",
                    ));
                }
                scaling.seats[k] += 1;
                deficits[row] -= 1;
            }
            trace!("district seats settle {} tied seat(s)", tie.seats);
            tie.seats = 0;
            tie.cells.clear();
            changed = true;
        }
        if !changed {
            return Ok(());
        }
    }
}

pub(crate) struct SubApportionment<'a> {
    search: DivisorSearch<'static>,
    resolver: LotDecisionResolver<'a>,
    max_iterations: usize,
}

impl<'a> SubApportionment<'a> {
    /// Intermediate steps never consult lot decisions; only the final ties do.
    pub(crate) fn new(resolver: LotDecisionResolver<'a>, max_iterations: usize) -> Self {
        Self {
            search: DivisorSearch::new(TiePhase::SubApportionment, LotDecisionResolver::new(&[])),
            resolver,
            max_iterations,
        }
    }

    #[instrument(level = "debug", skip_all, fields(union = %matrix.id))]
    pub(crate) fn run(
        &self,
        matrix: &mut DoubleProportionalMatrix,
        divisors: &mut Vec<DivisorAudit>,
    ) -> DomainResult<PhaseOutcome> {
        let eligible: Vec<bool> = matrix
            .cells
            .iter()
            .map(|c| {
                matrix.is_cell_eligible(c)
                    && matrix.columns[c.column].super_apportionment_number_of_mandates > 0
            })
            .collect();
        if let Err(detail) = check_feasible(matrix, &eligible) {
            return Ok(PhaseOutcome::Failed(detail));
        }

        let mut scaling = Scaling {
            row_divisors: vec![Rational::one(); matrix.rows.len()],
            column_divisors: vec![None; matrix.columns.len()],
            seats: vec![0; matrix.cells.len()],
            from_lot: vec![0; matrix.cells.len()],
        };

        for iteration in 0..self.max_iterations {
            let ties = match self.column_step(matrix, &eligible, &mut scaling)? {
                Ok(ties) => ties,
                Err(detail) => return Ok(PhaseOutcome::Failed(detail)),
            };
            let deficits = row_deficits(matrix, &scaling.seats);
            if ties.is_empty() && deficits.iter().all(|&d| d == 0) {
                debug!("consistent after {} iteration(s)", iteration + 1);
                return self.finish(matrix, scaling, Vec::new(), divisors);
            }
            let at_stake: i64 = ties.iter().map(|t| t.tie.seats as i64).sum();
            if !ties.is_empty() && deficits.iter().all(|&d| d >= 0) && deficits.iter().sum::<i64>() == at_stake {
                debug!("{} tie(s) left after {} iteration(s)", ties.len(), iteration + 1);
                return self.settle(matrix, scaling, ties, deficits, divisors);
            }

            let row_tied = match self.row_step(matrix, &eligible, &mut scaling)? {
                Ok(tied) => tied,
                Err(detail) => return Ok(PhaseOutcome::Failed(detail)),
            };
            if !row_tied && columns_fit(matrix, &scaling.seats) {
                debug!("consistent after {} iteration(s)", iteration + 1);
                return self.finish(matrix, scaling, Vec::new(), divisors);
            }
            trace!("iteration {}: districts and unions not yet consistent", iteration);
        }

        warn!("no consistent sub-apportionment after {} iterations", self.max_iterations);
        Ok(PhaseOutcome::Failed(non_distributable(
            &matrix.id,
            format!("no consistent distribution after {} iterations", self.max_iterations),
        )))
    }

    /// Fits every column to its seats under the current district divisors.
    fn column_step(
        &self,
        matrix: &DoubleProportionalMatrix,
        eligible: &[bool],
        scaling: &mut Scaling,
    ) -> DomainResult<StepResult<Vec<ColumnTie>>> {
        let mut ties = Vec::new();
        for (j, column) in matrix.columns.iter().enumerate() {
            let cells: Vec<usize> = matrix.cells_in_column(j).map(|(k, _)| k).collect();
            let target = column.super_apportionment_number_of_mandates;
            if target == 0 {
                for &k in &cells {
                    scaling.seats[k] = 0;
                }
                scaling.column_divisors[j] = None;
                continue;
            }

            let units: Vec<WeightedUnit> = cells
                .iter()
                .map(|&k| {
                    let cell = &matrix.cells[k];
                    WeightedUnit {
                        id: cell.list_id.clone(),
                        weight: &cell.voter_number / &scaling.row_divisors[cell.row],
                        eligible: eligible[k],
                    }
                })
                .collect();
            let allocation = self.search.apportion(&units, target, TieId::sub_apportionment)?;
            for (&k, &s) in cells.iter().zip(&allocation.seats) {
                scaling.seats[k] = s;
            }

            let divisor = match &allocation.status {
                AllocationStatus::Complete => self.search.interior_divisor(&units, &allocation),
                AllocationStatus::Tied(tie) => {
                    ties.push(ColumnTie {
                        column: j,
                        tie: tie.clone(),
                    });
                    self.search.next_seat_quotient(&units, &allocation.seats)
                }
                AllocationStatus::NoEligibleUnits => None,
            };
            match positive(divisor) {
                Some(d) => scaling.column_divisors[j] = Some(d),
                None => {
                    return Ok(Err(non_distributable(
                        &column.id,
                        "no list of the union can take its seats",
                    )))
                }
            }
        }
        Ok(Ok(ties))
    }

    /// Fits every district to its seats under the current union divisors.
    /// Returns whether any district ended in a tie.
    fn row_step(
        &self,
        matrix: &DoubleProportionalMatrix,
        eligible: &[bool],
        scaling: &mut Scaling,
    ) -> DomainResult<StepResult<bool>> {
        let mut tied = false;
        for (i, row) in matrix.rows.iter().enumerate() {
            let cells: Vec<usize> = matrix.cells_in_row(i).map(|(k, _)| k).collect();
            let units: Vec<WeightedUnit> = cells
                .iter()
                .map(|&k| {
                    let cell = &matrix.cells[k];
                    match &scaling.column_divisors[cell.column] {
                        Some(y) => WeightedUnit {
                            id: cell.list_id.clone(),
                            weight: &cell.voter_number / y,
                            eligible: eligible[k],
                        },
                        None => WeightedUnit {
                            id: cell.list_id.clone(),
                            weight: Rational::zero(),
                            eligible: false,
                        },
                    }
                })
                .collect();
            let allocation = self
                .search
                .apportion(&units, row.number_of_mandates, TieId::sub_apportionment)?;
            for (&k, &s) in cells.iter().zip(&allocation.seats) {
                scaling.seats[k] = s;
            }

            let divisor = match &allocation.status {
                AllocationStatus::Complete => self.search.interior_divisor(&units, &allocation),
                AllocationStatus::Tied(_) => {
                    tied = true;
                    self.search.next_seat_quotient(&units, &allocation.seats)
                }
                AllocationStatus::NoEligibleUnits => None,
            };
            match positive(divisor) {
                Some(d) => scaling.row_divisors[i] = d,
                None => {
                    return Ok(Err(non_distributable(
                        &row.id,
                        "no eligible list of the district can take its seats",
                    )))
                }
            }
        }
        Ok(Ok(tied))
    }

    /// Resolves the ties of the last column step: district seats force what
    /// they can, submitted lot decisions pin the rest.
    fn settle(
        &self,
        matrix: &mut DoubleProportionalMatrix,
        mut scaling: Scaling,
        ties: Vec<ColumnTie>,
        mut deficits: Vec<i64>,
        divisors: &mut Vec<DivisorAudit>,
    ) -> DomainResult<PhaseOutcome> {
        let mut open: Vec<OpenTie> = ties
            .into_iter()
            .map(|t| OpenTie {
                column: t.column,
                cells: t
                    .tie
                    .candidates
                    .iter()
                    .filter_map(|id| matrix.cells.iter().position(|c| &c.list_id == id))
                    .collect(),
                seats: t.tie.seats,
            })
            .collect();

        if let Err(detail) = force_by_district_seats(matrix, &mut open, &mut deficits, &mut scaling) {
            return Ok(PhaseOutcome::Failed(detail));
        }

        // pinning one tie can force another, so repeat until no decision applies
        let mut waiting = Vec::new();
        loop {
            let mut pinned_any = false;
            waiting.clear();
            for i in 0..open.len() {
                let seats = open[i].seats;
                if seats == 0 {
                    continue;
                }
                let column = open[i].column;
                if open[i].cells.len() < seats {
                    return Ok(PhaseOutcome::Failed(non_distributable(
                        &matrix.columns[column].id,
                        "tied seats exceed the districts' remaining seats",
                    )));
                }
                let candidates: Vec<String> = open[i]
                    .cells
                    .iter()
                    .map(|&k| matrix.cells[k].list_id.clone())
                    .collect();
                let tie = TieGroup {
                    id: TieId::sub_apportionment(&candidates),
                    phase: TiePhase::SubApportionment,
                    candidates,
                    seats,
                };
                let winners = match self.resolver.resolve(&tie)? {
                    Resolution::Pinned(winners) => winners,
                    Resolution::Open(reason) => {
                        waiting.push((column, tie, reason));
                        continue;
                    }
                };
                for &k in open[i]
                    .cells
                    .iter()
                    .filter(|&&k| winners.contains(&matrix.cells[k].list_id))
                {
                    let row = matrix.cells[k].row;
                    if deficits[row] <= 0 {
                        return Err(DomainError::InvalidLotDecision {
                            tie: tie.id.to_string(),
                            message: format!(
                                "district {} has no seat left for {}",
                                matrix.rows[row].id, matrix.cells[k].list_id
                            ),
                        });
                    }
                    scaling.seats[k] += 1;
                    scaling.from_lot[k] += 1;
                    deficits[row] -= 1;
                }
                open[i].seats = 0;
                open[i].cells.clear();
                pinned_any = true;
                if let Err(detail) = force_by_district_seats(matrix, &mut open, &mut deficits, &mut scaling) {
                    return Ok(PhaseOutcome::Failed(detail));
                }
            }
            if !pinned_any {
                break;
            }
        }

        let mut pending = Vec::with_capacity(waiting.len());
        for (column, tie, reason) in waiting {
            debug!("sub-apportionment tie {} stays open: {}", tie.id, reason);
            matrix.columns[column].has_sub_apportionment_open_lot_decision = true;
            pending.push(tie);
        }

        self.finish(matrix, scaling, pending, divisors)
    }

    /// Writes seats and divisors back into the matrix.
    fn finish(
        &self,
        matrix: &mut DoubleProportionalMatrix,
        scaling: Scaling,
        pending: Vec<TieGroup>,
        divisors: &mut Vec<DivisorAudit>,
    ) -> DomainResult<PhaseOutcome> {
        for (k, cell) in matrix.cells.iter_mut().enumerate() {
            cell.sub_apportionment_mandates_excl_lot = scaling.seats[k] - scaling.from_lot[k];
            cell.sub_apportionment_mandates_from_lot = scaling.from_lot[k];
        }

        let row_mandates: Vec<u64> = (0..matrix.rows.len()).map(|i| matrix.row_mandates(i)).collect();
        for ((row, mandates), divisor) in matrix
            .rows
            .iter_mut()
            .zip(row_mandates)
            .zip(scaling.row_divisors)
        {
            row.sub_apportionment_number_of_mandates = mandates;
            divisors.push(DivisorAudit {
                phase: Phase::Sub,
                subject: row.id.clone(),
                divisor: divisor.clone(),
            });
            row.divisor = Some(divisor);
        }

        for (column, divisor) in matrix.columns.iter_mut().zip(scaling.column_divisors) {
            column.sub_apportionment_number_of_mandates = column.super_apportionment_number_of_mandates;
            if let Some(divisor) = &divisor {
                divisors.push(DivisorAudit {
                    phase: Phase::Sub,
                    subject: column.id.clone(),
                    divisor: divisor.clone(),
                });
            }
            column.divisor = divisor;
        }

        if pending.is_empty() {
            Ok(PhaseOutcome::Completed)
        } else {
            Ok(PhaseOutcome::Open(pending))
        }
    }
}

/// Every union with seats and every district needs an eligible list.
fn check_feasible(matrix: &DoubleProportionalMatrix, eligible: &[bool]) -> StepResult<()> {
    for (j, column) in matrix.columns.iter().enumerate() {
        if column.super_apportionment_number_of_mandates > 0
            && !matrix.cells_in_column(j).any(|(k, _)| eligible[k])
        {
            return Err(non_distributable(&column.id, "no eligible list in the union"));
        }
    }
    for (i, row) in matrix.rows.iter().enumerate() {
        if !matrix.cells_in_row(i).any(|(k, _)| eligible[k]) {
            return Err(non_distributable(&row.id, "no eligible list in the district"));
        }
    }
    Ok(())
}

/// District seats minus the seats its cells hold.
fn row_deficits(matrix: &DoubleProportionalMatrix, seats: &[u64]) -> Vec<i64> {
    let mut held = vec![0i64; matrix.rows.len()];
    for (cell, &s) in matrix.cells.iter().zip(seats) {
        held[cell.row] += s as i64;
    }
    matrix
        .rows
        .iter()
        .zip(held)
        .map(|(row, h)| row.number_of_mandates as i64 - h)
        .collect()
}

fn columns_fit(matrix: &DoubleProportionalMatrix, seats: &[u64]) -> bool {
    let mut held = vec![0u64; matrix.columns.len()];
    for (cell, &s) in matrix.cells.iter().zip(seats) {
        held[cell.column] += s;
    }
    matrix
        .columns
        .iter()
        .zip(held)
        .all(|(column, h)| column.super_apportionment_number_of_mandates == h)
}
