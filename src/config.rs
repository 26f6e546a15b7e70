//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/mandate/mandate.toml`
//! 3. Explicit config file: `--config <file>`
//! 4. Environment variables: `MANDATE_*` prefix

use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::services::{DoubleProportionalOptions, DEFAULT_MAX_ITERATIONS};
use crate::application::ApplicationError;
use crate::domain::VoterNumberBasis;

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ApplicationError::Config {
                message: format!("unknown output format: {other}"),
            }),
        }
    }
}

/// Double proportional tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DoubleProportionalConfig {
    /// Voter number basis for unions that do not choose one
    pub voter_number_basis: VoterNumberBasis,
    /// Cap on alternating scaling iterations
    pub max_iterations: usize,
}

impl Default for DoubleProportionalConfig {
    fn default() -> Self {
        Self {
            voter_number_basis: VoterNumberBasis::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Raw double proportional config; `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawDoubleProportionalConfig {
    pub voter_number_basis: Option<VoterNumberBasis>,
    pub max_iterations: Option<usize>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub output: Option<OutputFormat>,
    pub show_rounds: Option<bool>,
    pub show_tree: Option<bool>,
    pub decimal_places: Option<u32>,
    pub double_proportional: RawDoubleProportionalConfig,
}

/// Unified configuration for mandate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Output format (default: text)
    pub output: OutputFormat,
    /// Print every calculation round in text output
    pub show_rounds: bool,
    /// Print the group tree in text output
    pub show_tree: bool,
    /// Decimals for quotients and divisors in text output
    pub decimal_places: u32,
    pub double_proportional: DoubleProportionalConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: OutputFormat::Text,
            show_rounds: false,
            show_tree: false,
            decimal_places: 4,
            double_proportional: DoubleProportionalConfig::default(),
        }
    }
}

/// Get the XDG config directory for mandate.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mandate").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("mandate.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            output: overlay.output.unwrap_or(self.output),
            show_rounds: overlay.show_rounds.unwrap_or(self.show_rounds),
            show_tree: overlay.show_tree.unwrap_or(self.show_tree),
            decimal_places: overlay.decimal_places.unwrap_or(self.decimal_places),
            double_proportional: DoubleProportionalConfig {
                voter_number_basis: overlay
                    .double_proportional
                    .voter_number_basis
                    .unwrap_or(self.double_proportional.voter_number_basis),
                max_iterations: overlay
                    .double_proportional
                    .max_iterations
                    .unwrap_or(self.double_proportional.max_iterations),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional explicit config file, layered over the global one
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), config_file)
    }

    /// Load with an explicit global path; a missing global file is skipped,
    /// a missing explicit file is an error.
    pub fn load_from(global: Option<&Path>, config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(global_path)?);
            }
        }

        if let Some(path) = config_file {
            current = current.merge_with(&load_raw_settings(path)?);
        }

        current = Self::apply_env_overrides(current)?;
        current.validate()?;
        Ok(current)
    }

    /// Apply MANDATE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("MANDATE").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("output") {
            settings.output = val.parse()?;
        }
        if let Ok(val) = config.get_bool("show_rounds") {
            settings.show_rounds = val;
        }
        if let Ok(val) = config.get_bool("show_tree") {
            settings.show_tree = val;
        }
        if let Ok(val) = config.get_int("decimal_places") {
            settings.decimal_places = u32::try_from(val).map_err(|_| ApplicationError::Config {
                message: format!("decimal_places out of range: {val}"),
            })?;
        }
        if let Ok(val) = config.get::<VoterNumberBasis>("double_proportional.voter_number_basis") {
            settings.double_proportional.voter_number_basis = val;
        }
        if let Ok(val) = config.get_int("double_proportional.max_iterations") {
            settings.double_proportional.max_iterations =
                usize::try_from(val).map_err(|_| ApplicationError::Config {
                    message: format!("max_iterations out of range: {val}"),
                })?;
        }

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ApplicationError> {
        if self.double_proportional.max_iterations == 0 {
            return Err(ApplicationError::Config {
                message: "double_proportional.max_iterations must be positive".to_string(),
            });
        }
        if self.decimal_places > 20 {
            return Err(ApplicationError::Config {
                message: format!("decimal_places too large: {}", self.decimal_places),
            });
        }
        Ok(())
    }

    pub fn double_proportional_options(&self) -> DoubleProportionalOptions {
        DoubleProportionalOptions {
            voter_number_basis: self.double_proportional.voter_number_basis,
            max_iterations: self.double_proportional.max_iterations,
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# mandate configuration
#
# Locations (by precedence, lowest to highest):
#   Global:   ~/.config/mandate/mandate.toml
#   Explicit: mandate --config <file>
#   Env:      MANDATE_* environment variables (nested keys use "__",
#             e.g. MANDATE_DOUBLE_PROPORTIONAL__MAX_ITERATIONS=500)

# Output format: "text" or "json"
# output = "text"

# Print every calculation round / the group tree in text output
# show_rounds = false
# show_tree = false

# Decimals for quotients and divisors in text output
# decimal_places = 4

[double_proportional]
# Voter number of a list: "vote_count" or "votes_per_seat"
# (votes divided by the district's mandates, rounded half up)
# voter_number_basis = "vote_count"

# Cap on alternating scaling iterations of the sub-apportionment
# max_iterations = 200
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
