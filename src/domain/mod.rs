//! Domain layer: apportionment entities and procedures
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod divisor;
pub mod error;
pub mod group;
pub mod lot;
pub mod matrix;
pub mod quotient;
pub mod round;
pub mod state;
pub mod tally;
pub mod tree_traits;

pub use arena::{GroupNode, GroupSnapshot, GroupTree};
pub use builder::GroupTreeBuilder;
pub use divisor::{Allocation, AllocationStatus, DivisorSearch, Weighable, WeightedUnit};
pub use error::{DomainError, DomainResult};
pub use group::{GroupData, GroupKind};
pub use lot::{LotDecision, LotDecisionEntry, LotDecisionResolver, Resolution, TieGroup, TieId, TiePhase};
pub use matrix::{Cell, Column, DoubleProportionalMatrix, Row};
pub use quotient::Rational;
pub use round::{CalculationRound, GroupValues, WinnerReason};
pub use state::{ApportionmentState, Phase};
pub use tally::{
    CellInput, DistrictInput, DoubleProportionalInput, ListInput, ListUnionInput,
    ProportionalElectionInput, SubListUnionInput, UnionColumnInput, VoterNumberBasis,
};
pub use tree_traits::TreeNodeConvert;
