//! Command dispatch

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::audit::fingerprint;
use crate::application::services::{ApportionmentOutcome, ApportionmentSession, ElectionInput};
use crate::application::{ApplicationError, ApplicationResult};
use crate::cli::args::{Cli, Commands, ConfigCommands, LotArg};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output::{self, RenderOptions};
use crate::config::{global_config_path, OutputFormat, Settings};
use crate::domain::{ApportionmentState, LotDecision};
use crate::exitcode;
use crate::infrastructure::di::ServiceContainer;

/// Runs the command and returns the process exit code.
pub fn execute_command(cli: &Cli) -> CliResult<i32> {
    match &cli.command {
        Some(Commands::Apportion {
            file,
            lots,
            json,
            rounds,
            tree,
        }) => {
            let settings = Settings::load(cli.config.as_deref())?;
            let json = *json || settings.output == OutputFormat::Json;
            let options = RenderOptions {
                rounds: *rounds || settings.show_rounds,
                tree: *tree || settings.show_tree,
                decimal_places: settings.decimal_places,
            };
            let container = ServiceContainer::new(settings);
            cmd_apportion(&container, file, lots, json, options)
        }
        Some(Commands::Pending { file }) => {
            let container = ServiceContainer::new(Settings::load(cli.config.as_deref())?);
            cmd_pending(&container, file)
        }
        Some(Commands::Config { command }) => cmd_config(cli, command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(exitcode::OK)
        }
        None => Err(CliError::Usage(
            "no command given, see `mandate --help`".to_string(),
        )),
    }
}

/// JSON report of one election.
#[derive(Debug, Serialize)]
struct Report<'a> {
    fingerprint: String,
    #[serde(flatten)]
    outcome: &'a ApportionmentOutcome,
}

/// Loads the tally and apportions every election in parallel.
///
/// Lot decisions are matched to pending ties by id and submitted until no
/// further tie can be resolved from `lots`.
#[instrument(level = "debug", skip(container, lots))]
pub fn run_file(
    container: &ServiceContainer,
    file: &Path,
    lots: &[LotArg],
) -> CliResult<Vec<ApportionmentSession>> {
    let inputs = container.loader.load(file)?.into_inputs();
    info!("apportioning {} election(s) from {}", inputs.len(), file.display());

    let sessions = inputs
        .into_par_iter()
        .map(|input| run_election(container, input, lots))
        .collect::<ApplicationResult<Vec<_>>>()?;

    let known: BTreeSet<&str> = sessions
        .iter()
        .flat_map(|s| s.input().lot_decisions())
        .map(|d| d.tie_id.as_str())
        .collect();
    for lot in lots.iter().filter(|l| !known.contains(l.tie.as_str())) {
        warn!("lot decision for {} matches no open tie", lot.tie);
        output::warning(&format!("--lot {} matches no open tie", lot.tie));
    }
    Ok(sessions)
}

fn run_election(
    container: &ServiceContainer,
    input: ElectionInput,
    lots: &[LotArg],
) -> ApplicationResult<ApportionmentSession> {
    let mut session = container.session(input);
    session.apportion()?;

    let mut applied = BTreeSet::new();
    loop {
        let next = session.pending_lot_decisions().into_iter().find_map(|tie| {
            lots.iter()
                .find(|l| l.tie == tie.id.as_str() && !applied.contains(&l.tie))
                .map(|l| (tie, l))
        });
        let Some((tie, lot)) = next else {
            break;
        };
        let winners: Vec<&str> = lot.winners.iter().map(String::as_str).collect();
        let decision = LotDecision::for_tie(&tie, &winners).map_err(ApplicationError::from)?;
        debug!("submitting lot decision {} for {}", lot.winners.join(","), tie.id);
        applied.insert(lot.tie.clone());
        session.submit_lot_decision(decision)?;
    }
    Ok(session)
}

/// Worst state over all elections decides the exit code.
fn exit_code_for(states: impl IntoIterator<Item = ApportionmentState>) -> i32 {
    let states: Vec<_> = states.into_iter().collect();
    if states.contains(&ApportionmentState::Error) {
        exitcode::DATAERR
    } else if states.contains(&ApportionmentState::HasOpenLotDecision) {
        exitcode::OPEN_LOT_DECISION
    } else {
        exitcode::OK
    }
}

fn outcomes(sessions: &[ApportionmentSession]) -> CliResult<Vec<&ApportionmentOutcome>> {
    sessions
        .iter()
        .map(|s| {
            s.outcome().ok_or_else(|| {
                CliError::from(ApplicationError::UnknownElection(s.input().id().to_string()))
            })
        })
        .collect()
}

fn cmd_apportion(
    container: &ServiceContainer,
    file: &Path,
    lots: &[LotArg],
    json: bool,
    options: RenderOptions,
) -> CliResult<i32> {
    let sessions = run_file(container, file, lots)?;
    let outcomes = outcomes(&sessions)?;

    let reports = outcomes
        .iter()
        .map(|&outcome| -> ApplicationResult<Report<'_>> {
            Ok(Report {
                fingerprint: fingerprint(outcome)?,
                outcome,
            })
        })
        .collect::<ApplicationResult<Vec<_>>>()?;

    if json {
        let rendered = serde_json::to_string_pretty(&reports).map_err(|e| {
            CliError::from(ApplicationError::OperationFailed {
                context: "render JSON".to_string(),
                source: Box::new(e),
            })
        })?;
        output::info(&rendered);
    } else {
        for report in &reports {
            output::outcome(report.outcome, &report.fingerprint, options);
        }
    }

    Ok(exit_code_for(outcomes.iter().map(|o| o.state())))
}

fn cmd_pending(container: &ServiceContainer, file: &Path) -> CliResult<i32> {
    let sessions = run_file(container, file, &[])?;
    let outcomes = outcomes(&sessions)?;
    for outcome in &outcomes {
        output::pending(outcome);
    }
    Ok(exit_code_for(outcomes.iter().map(|o| o.state())))
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<i32> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(cli.config.as_deref())?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => {
                    let marker = if path.exists() { "" } else { " (not found)" };
                    output::info(&format!("global: {}{marker}", path.display()));
                }
                None => output::info("global: <no config directory>"),
            }
            if let Some(path) = &cli.config {
                output::info(&format!("explicit: {}", path.display()));
            }
        }
    }
    Ok(exitcode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_mixed_states_when_exit_code_then_error_wins() {
        let code = exit_code_for([
            ApportionmentState::HasOpenLotDecision,
            ApportionmentState::Error,
            ApportionmentState::Completed,
        ]);
        assert_eq!(code, exitcode::DATAERR);
    }

    #[test]
    fn given_open_tie_when_exit_code_then_open_lot_decision() {
        let code = exit_code_for([
            ApportionmentState::Completed,
            ApportionmentState::HasOpenLotDecision,
        ]);
        assert_eq!(code, exitcode::OPEN_LOT_DECISION);
    }

    #[test]
    fn given_all_completed_when_exit_code_then_ok() {
        assert_eq!(exit_code_for([ApportionmentState::Completed]), exitcode::OK);
    }
}
