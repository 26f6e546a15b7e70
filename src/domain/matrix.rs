//! Double proportional matrix: districts (rows) × list unions (columns).

use std::collections::{BTreeMap, BTreeSet};

use num::Zero;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::divisor::Weighable;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::quotient::{exact, from_u64, ratio, round_half_up, Rational};
use crate::domain::tally::{DoubleProportionalInput, VoterNumberBasis};

/// A district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub id: String,
    pub position: u32,
    pub number_of_mandates: u64,
    /// District quorum in percent
    pub quorum: Option<u32>,
    #[serde(with = "exact")]
    pub voter_number: Rational,
    pub sub_apportionment_number_of_mandates: u64,
    /// District divisor of the sub-apportionment
    #[serde(with = "exact_option")]
    pub divisor: Option<Rational>,
}

/// A list union across all districts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub id: String,
    pub position: u32,
    #[serde(with = "exact")]
    pub voter_number: Rational,
    pub cantonal_quorum_reached: bool,
    /// Some cell of the column reached its district quorum
    pub any_required_quorum_reached: bool,
    pub super_apportionment_number_of_mandates: u64,
    pub super_apportionment_number_of_mandates_from_lot: u64,
    pub super_apportionment_lot_decision_required: bool,
    pub sub_apportionment_number_of_mandates: u64,
    pub has_sub_apportionment_open_lot_decision: bool,
    /// Union divisor of the sub-apportionment
    #[serde(with = "exact_option")]
    pub divisor: Option<Rational>,
}

impl Column {
    /// Takes part in the super-apportionment.
    pub fn is_eligible(&self) -> bool {
        self.cantonal_quorum_reached || self.any_required_quorum_reached
    }
}

impl Weighable for Column {
    fn unit_id(&self) -> &str {
        &self.id
    }

    fn weight(&self) -> Rational {
        self.voter_number.clone()
    }

    fn is_eligible(&self) -> bool {
        Column::is_eligible(self)
    }
}

/// One list in one district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub list_id: String,
    /// Index into [`DoubleProportionalMatrix::rows`]
    pub row: usize,
    /// Index into [`DoubleProportionalMatrix::columns`]
    pub column: usize,
    pub vote_count: u64,
    #[serde(with = "exact")]
    pub voter_number: Rational,
    /// District quorum reached by this cell's voter number
    pub quorum_reached: bool,
    pub sub_apportionment_mandates_excl_lot: u64,
    pub sub_apportionment_mandates_from_lot: u64,
}

impl Cell {
    pub fn sub_apportionment_number_of_mandates(&self) -> u64 {
        self.sub_apportionment_mandates_excl_lot + self.sub_apportionment_mandates_from_lot
    }
}

/// Matrix of one double proportional union, rows and columns in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoubleProportionalMatrix {
    pub id: String,
    pub number_of_mandates: u64,
    pub cantonal_quorum: Option<u32>,
    pub voter_number_basis: VoterNumberBasis,
    pub rows: Vec<Row>,
    pub columns: Vec<Column>,
    pub cells: Vec<Cell>,
}

fn non_negative(id: &str, vote_count: i64) -> DomainResult<u64> {
    u64::try_from(vote_count).map_err(|_| DomainError::NegativeVoteCount {
        id: id.to_string(),
        vote_count,
    })
}

fn percentage(id: &str, quorum: Option<i64>) -> DomainResult<Option<u32>> {
    match quorum {
        None => Ok(None),
        Some(q) if (0..=100).contains(&q) => Ok(Some(q as u32)),
        Some(q) => Err(DomainError::InvalidQuorum {
            id: id.to_string(),
            quorum: q,
        }),
    }
}

/// `share >= percent% of total`, exact.
fn quorum_reached(share: &Rational, total: &Rational, percent: u32) -> bool {
    share * from_u64(100) >= total * from_u64(percent as u64)
}

impl DoubleProportionalMatrix {
    /// Builds the matrix and evaluates all quorums.
    ///
    /// `default_basis` applies when the input does not name a voter number basis.
    #[instrument(level = "debug", skip(input), fields(id = %input.id))]
    pub fn from_input(
        input: &DoubleProportionalInput,
        default_basis: VoterNumberBasis,
    ) -> DomainResult<Self> {
        let basis = input.voter_number_basis.unwrap_or(default_basis);
        let cantonal_quorum = percentage(&input.id, input.cantonal_quorum)?;

        if input.districts.is_empty() {
            return Err(DomainError::NonPositiveSeats {
                id: input.id.clone(),
                mandates: 0,
            });
        }

        let mut seen = BTreeSet::new();
        let mut districts = input.districts.iter().collect::<Vec<_>>();
        districts.sort_by(|a, b| (a.position, &a.id).cmp(&(b.position, &b.id)));
        let mut rows = Vec::with_capacity(districts.len());
        for d in districts {
            if !seen.insert(d.id.as_str()) {
                return Err(DomainError::DuplicateId(d.id.clone()));
            }
            if d.number_of_mandates <= 0 {
                return Err(DomainError::NonPositiveSeats {
                    id: d.id.clone(),
                    mandates: d.number_of_mandates,
                });
            }
            rows.push(Row {
                id: d.id.clone(),
                position: d.position,
                number_of_mandates: d.number_of_mandates as u64,
                quorum: percentage(&d.id, d.quorum)?,
                voter_number: Rational::zero(),
                sub_apportionment_number_of_mandates: 0,
                divisor: None,
            });
        }

        let mut unions = input.unions.iter().collect::<Vec<_>>();
        unions.sort_by(|a, b| (a.position, &a.id).cmp(&(b.position, &b.id)));
        let mut columns = Vec::with_capacity(unions.len());
        for u in unions {
            if !seen.insert(u.id.as_str()) {
                return Err(DomainError::DuplicateId(u.id.clone()));
            }
            columns.push(Column {
                id: u.id.clone(),
                position: u.position,
                voter_number: Rational::zero(),
                cantonal_quorum_reached: false,
                any_required_quorum_reached: false,
                super_apportionment_number_of_mandates: 0,
                super_apportionment_number_of_mandates_from_lot: 0,
                super_apportionment_lot_decision_required: false,
                sub_apportionment_number_of_mandates: 0,
                has_sub_apportionment_open_lot_decision: false,
                divisor: None,
            });
        }

        let row_index: BTreeMap<&str, usize> =
            rows.iter().enumerate().map(|(i, r)| (r.id.as_str(), i)).collect();
        let column_index: BTreeMap<&str, usize> =
            columns.iter().enumerate().map(|(i, c)| (c.id.as_str(), i)).collect();

        let mut cells = Vec::with_capacity(input.cells.len());
        for c in &input.cells {
            if !seen.insert(c.list_id.as_str()) {
                return Err(DomainError::DuplicateId(c.list_id.clone()));
            }
            let row = *row_index
                .get(c.district_id.as_str())
                .ok_or_else(|| DomainError::UnknownRow(c.district_id.clone()))?;
            let column = *column_index
                .get(c.union_id.as_str())
                .ok_or_else(|| DomainError::UnknownColumn(c.union_id.clone()))?;
            let vote_count = non_negative(&c.list_id, c.vote_count)?;
            let voter_number = match basis {
                VoterNumberBasis::VoteCount => from_u64(vote_count),
                VoterNumberBasis::VotesPerSeat => Rational::from_integer(round_half_up(&ratio(
                    vote_count,
                    rows[row].number_of_mandates,
                ))),
            };
            cells.push(Cell {
                list_id: c.list_id.clone(),
                row,
                column,
                vote_count,
                voter_number,
                quorum_reached: false,
                sub_apportionment_mandates_excl_lot: 0,
                sub_apportionment_mandates_from_lot: 0,
            });
        }
        cells.sort_by(|a, b| (a.row, a.column, &a.list_id).cmp(&(b.row, b.column, &b.list_id)));

        let number_of_mandates = rows
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.number_of_mandates))
            .ok_or_else(|| DomainError::CountOverflow(input.id.clone()))?;
        let mut matrix = Self {
            id: input.id.clone(),
            number_of_mandates,
            cantonal_quorum,
            voter_number_basis: basis,
            rows,
            columns,
            cells,
        };
        matrix.aggregate_voter_numbers();
        if matrix.total_voter_number().is_zero() {
            return Err(DomainError::NoVotes(input.id.clone()));
        }
        matrix.evaluate_quorums();
        Ok(matrix)
    }

    fn aggregate_voter_numbers(&mut self) {
        for cell in &self.cells {
            self.rows[cell.row].voter_number += &cell.voter_number;
            self.columns[cell.column].voter_number += &cell.voter_number;
        }
    }

    pub fn total_voter_number(&self) -> Rational {
        self.columns
            .iter()
            .fold(Rational::zero(), |acc, c| acc + &c.voter_number)
    }

    /// Without any configured threshold every cell counts as having reached
    /// its quorum. Otherwise a district without quorum contributes none.
    fn evaluate_quorums(&mut self) {
        let thresholds_configured =
            self.cantonal_quorum.is_some() || self.rows.iter().any(|r| r.quorum.is_some());
        let total = self.total_voter_number();

        for column in &mut self.columns {
            column.cantonal_quorum_reached = self
                .cantonal_quorum
                .map(|q| quorum_reached(&column.voter_number, &total, q))
                .unwrap_or(false);
        }
        for cell in &mut self.cells {
            let row = &self.rows[cell.row];
            cell.quorum_reached = match row.quorum {
                Some(q) => quorum_reached(&cell.voter_number, &row.voter_number, q),
                None => !thresholds_configured,
            };
            if cell.quorum_reached {
                self.columns[cell.column].any_required_quorum_reached = true;
            }
        }
        debug!(
            "quorums: {} of {} unions eligible",
            self.columns.iter().filter(|c| c.is_eligible()).count(),
            self.columns.len()
        );
    }

    /// A cell takes part in the sub-apportionment.
    pub fn is_cell_eligible(&self, cell: &Cell) -> bool {
        let column = &self.columns[cell.column];
        column.is_eligible() && (cell.quorum_reached || column.cantonal_quorum_reached)
    }

    pub fn cells_in_column(&self, column: usize) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.column == column)
    }

    pub fn cells_in_row(&self, row: usize) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.row == row)
    }

    pub fn row_mandates(&self, row: usize) -> u64 {
        self.cells_in_row(row)
            .map(|(_, c)| c.sub_apportionment_number_of_mandates())
            .sum()
    }

    pub fn column_mandates(&self, column: usize) -> u64 {
        self.cells_in_column(column)
            .map(|(_, c)| c.sub_apportionment_number_of_mandates())
            .sum()
    }

    /// Sum of the super-apportioned seats, useful for the column invariant.
    pub fn super_apportioned(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| c.super_apportionment_number_of_mandates)
            .sum()
    }

    pub fn cell_by_list(&self, list_id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.list_id == list_id)
    }

    pub fn column_by_id(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }
}

/// Serde helper for optional exact rationals.
mod exact_option {
    use serde::Serializer;

    use crate::domain::quotient::Rational;

    pub fn serialize<S: Serializer>(value: &Option<Rational>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }
}
