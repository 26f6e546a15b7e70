//! Application services
//!
//! Concrete apportionment services orchestrating the domain procedures.
//! Services are stateless structs; a session keeps the input between runs.

mod double_proportional;
mod hagenbach_bischoff;
mod session;
mod sub_apportionment;

pub use double_proportional::{
    ApportionmentErrorDetail, DivisorAudit, DoubleProportionalApportioner,
    DoubleProportionalOptions, DoubleProportionalResult, DEFAULT_MAX_ITERATIONS,
};
pub use hagenbach_bischoff::{HagenbachBischoffApportioner, HagenbachBischoffResult};
pub use session::{ApportionmentOutcome, ApportionmentSession, ElectionInput};
