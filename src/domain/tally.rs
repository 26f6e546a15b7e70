//! Tally input: the finalized vote counts handed over by the counting pipeline.
//!
//! Counts are signed on purpose so a negative count arriving from the outside
//! is reported as a contract violation instead of failing deserialization.

use serde::{Deserialize, Serialize};

use crate::domain::lot::LotDecision;

/// One list of a proportional election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInput {
    pub id: String,
    /// List number, used for deterministic ordering
    pub position: u32,
    pub vote_count: i64,
}

/// A sub list union inside a list union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubListUnionInput {
    pub id: String,
    pub position: u32,
    pub list_ids: Vec<String>,
}

/// A list union; its sub unions must only contain lists of the union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListUnionInput {
    pub id: String,
    pub position: u32,
    pub list_ids: Vec<String>,
    #[serde(default)]
    pub sub_list_unions: Vec<SubListUnionInput>,
}

/// Input of a Hagenbach-Bischoff apportionment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProportionalElectionInput {
    pub id: String,
    pub number_of_mandates: i64,
    pub lists: Vec<ListInput>,
    #[serde(default)]
    pub list_unions: Vec<ListUnionInput>,
    #[serde(default)]
    pub lot_decisions: Vec<LotDecision>,
}

/// A district (row) of a double proportional union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictInput {
    pub id: String,
    pub position: u32,
    pub number_of_mandates: i64,
    /// District quorum in percent of the district's voter number
    #[serde(default)]
    pub quorum: Option<i64>,
}

/// A list union spanning all districts (column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionColumnInput {
    pub id: String,
    pub position: u32,
}

/// The votes of one list in one district (cell).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    pub list_id: String,
    pub district_id: String,
    pub union_id: String,
    pub vote_count: i64,
}

/// How the voter number of a cell is derived from its votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterNumberBasis {
    /// Voter number equals the vote count
    #[default]
    VoteCount,
    /// Vote count divided by the district's mandates, rounded half up
    VotesPerSeat,
}

/// Input of a double proportional apportionment.
///
/// A single election is the one-district variant: one district, one column
/// per list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleProportionalInput {
    pub id: String,
    pub districts: Vec<DistrictInput>,
    pub unions: Vec<UnionColumnInput>,
    pub cells: Vec<CellInput>,
    /// Cantonal quorum in percent of the total voter number
    #[serde(default)]
    pub cantonal_quorum: Option<i64>,
    #[serde(default)]
    pub voter_number_basis: Option<VoterNumberBasis>,
    #[serde(default)]
    pub lot_decisions: Vec<LotDecision>,
}
