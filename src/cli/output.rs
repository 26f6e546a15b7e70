//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use colored::Colorize;
use itertools::Itertools;

use crate::application::audit::short_fingerprint;
use crate::application::services::{
    ApportionmentOutcome, DoubleProportionalResult, HagenbachBischoffResult,
};
use crate::domain::quotient::to_decimal_string;
use crate::domain::{ApportionmentState, TieGroup, TreeNodeConvert};

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

/// What a text report includes besides the seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub rounds: bool,
    pub tree: bool,
    pub decimal_places: u32,
}

fn state_label(state: ApportionmentState) -> String {
    match state {
        ApportionmentState::Completed => state.to_string().green().to_string(),
        ApportionmentState::HasOpenLotDecision => state.to_string().yellow().to_string(),
        ApportionmentState::Error => state.to_string().red().bold().to_string(),
        ApportionmentState::Initial => state.to_string(),
    }
}

/// Print one outcome as text.
pub fn outcome(outcome: &ApportionmentOutcome, fingerprint: &str, options: RenderOptions) {
    let procedure = match outcome {
        ApportionmentOutcome::HagenbachBischoff(_) => "hagenbach-bischoff",
        ApportionmentOutcome::DoubleProportional(_) => "double proportional",
    };
    header(&format!("{} ({procedure})", outcome.id()));
    detail(&format!("state: {}", state_label(outcome.state())));

    match outcome {
        ApportionmentOutcome::HagenbachBischoff(r) => hagenbach_bischoff(r, options),
        ApportionmentOutcome::DoubleProportional(r) => double_proportional(r, options),
    }

    for tie in outcome.pending() {
        pending_tie(&tie);
    }
    detail(&format!("fingerprint: {}", short_fingerprint(fingerprint).dimmed()));
}

fn hagenbach_bischoff(result: &HagenbachBischoffResult, options: RenderOptions) {
    if options.tree {
        for line in result.tree.to_tree_string().to_string().lines() {
            detail(&line);
        }
    }
    for (id, mandates) in result.list_mandates() {
        detail(&format!("{id}: {mandates}"));
    }
    if !options.rounds {
        return;
    }
    for round in &result.rounds {
        detail(&format!(
            "#{} {} -> {} ({:?})",
            round.index, round.group_id, round.winner_id, round.winner_reason
        ));
        for v in &round.values {
            let marker = if v.is_winner { "*" } else { " " };
            detail(&format!(
                "  {marker} {:<12} {:>14} -> {:>14}  mandates {}",
                v.group_id,
                to_decimal_string(&v.previous_quotient, options.decimal_places),
                to_decimal_string(&v.next_quotient, options.decimal_places),
                v.number_of_mandates
            ));
        }
    }
}

fn double_proportional(result: &DoubleProportionalResult, options: RenderOptions) {
    let matrix = &result.matrix;
    detail(&format!(
        "super: {}, sub: {}",
        state_label(result.super_apportionment_state),
        state_label(result.sub_apportionment_state)
    ));

    for column in &matrix.columns {
        let mut line = format!(
            "{}: {} seat(s)",
            column.id, column.super_apportionment_number_of_mandates
        );
        if !column.is_eligible() {
            line.push_str(" (quorum not reached)");
        }
        if column.super_apportionment_number_of_mandates_from_lot > 0 {
            line.push_str(&format!(
                " ({} by lot)",
                column.super_apportionment_number_of_mandates_from_lot
            ));
        }
        detail(&line);
    }

    for (r, row) in matrix.rows.iter().enumerate() {
        let cells = matrix
            .cells_in_row(r)
            .map(|(_, c)| format!("{} {}", c.list_id, c.sub_apportionment_number_of_mandates()))
            .join(", ");
        detail(&format!(
            "{} [{}/{}]: {}",
            row.id,
            matrix.row_mandates(r),
            row.number_of_mandates,
            cells
        ));
    }

    if options.rounds {
        for audit in &result.divisors {
            detail(&format!(
                "divisor {} {}: {}",
                audit.phase,
                audit.subject,
                to_decimal_string(&audit.divisor, options.decimal_places)
            ));
        }
    }

    if let Some(err) = &result.error {
        let subject = err.subject.as_deref().unwrap_or("-");
        error(&format!("{} apportionment failed at {}: {}", err.phase, subject, err.message));
    }
}

fn pending_tie(tie: &TieGroup) {
    warning(&format!("open lot decision {tie}"));
    detail(&format!(
        "resolve with: --lot {}={}",
        tie.id,
        tie.candidates.iter().take(tie.seats).join(",")
    ));
}

/// Print pending ties of one outcome, one per line.
pub fn pending(outcome: &ApportionmentOutcome) {
    let ties = outcome.pending();
    if ties.is_empty() {
        info(&format!("{}: {}", outcome.id(), "no open lot decision".green()));
        return;
    }
    for tie in ties {
        info(&format!("{}: {}", outcome.id(), tie));
    }
}
