//! Seat apportionment for proportional elections.
//!
//! Layers, innermost first: `domain` (group trees, divisor methods, lot
//! decisions), `application` (apportionment services and sessions),
//! `infrastructure` (tally files, wiring) and `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
