//! CLI argument definitions using clap

use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

/// Seat apportionment for proportional elections: Hagenbach-Bischoff and double proportional
#[derive(Parser, Debug)]
#[command(name = "mandate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apportion all elections of a tally file
    Apportion {
        /// Tally file (.toml or .json)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Lot decision: TIE=WINNER[,WINNER]
        #[arg(short, long = "lot", value_name = "TIE=WINNERS")]
        lots: Vec<LotArg>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Print every calculation round and divisor
        #[arg(long)]
        rounds: bool,

        /// Print the group tree
        #[arg(long)]
        tree: bool,
    },

    /// List ties that wait for a lot decision
    Pending {
        /// Tally file (.toml or .json)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print config template
    Template,

    /// Show config paths
    Path,
}

/// `--lot hb:nr:3=A` or `--lot dp:sub:a1+b1=a1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotArg {
    pub tie: String,
    pub winners: Vec<String>,
}

impl FromStr for LotArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Tie ids contain ':' but never '='
        let (tie, winners) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("expected TIE=WINNER[,WINNER], got '{s}'"))?;
        let tie = tie.trim();
        if tie.is_empty() {
            return Err(format!("missing tie id in '{s}'"));
        }
        let winners: Vec<String> = winners
            .split(',')
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        if winners.is_empty() {
            return Err(format!("missing winner in '{s}'"));
        }
        Ok(Self {
            tie: tie.to_string(),
            winners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("hb:nr:3=A", "hb:nr:3", &["A"])]
    #[case("dp:sub:a1+b1=a1, b1", "dp:sub:a1+b1", &["a1", "b1"])]
    #[case("dp:super=u2", "dp:super", &["u2"])]
    fn given_lot_arg_when_parsing_then_splits_tie_and_winners(
        #[case] raw: &str,
        #[case] tie: &str,
        #[case] winners: &[&str],
    ) {
        let arg: LotArg = raw.parse().unwrap();
        assert_eq!(arg.tie, tie);
        assert_eq!(arg.winners, winners);
    }

    #[rstest]
    #[case("hb:nr:3")]
    #[case("=A")]
    #[case("hb:nr:3=")]
    fn given_malformed_lot_arg_when_parsing_then_error(#[case] raw: &str) {
        assert!(raw.parse::<LotArg>().is_err());
    }
}
