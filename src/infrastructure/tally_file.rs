//! Tally files: the election inputs of one counting run.
//!
//! TOML or JSON, picked by file extension. A file may carry any number of
//! proportional elections and double proportional unions.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::services::ElectionInput;
use crate::domain::{DoubleProportionalInput, ProportionalElectionInput};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::traits::FileSystem;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyFile {
    #[serde(default)]
    pub proportional_elections: Vec<ProportionalElectionInput>,
    #[serde(default)]
    pub double_proportional: Vec<DoubleProportionalInput>,
}

impl TallyFile {
    pub fn is_empty(&self) -> bool {
        self.proportional_elections.is_empty() && self.double_proportional.is_empty()
    }

    /// Elections in file order, Hagenbach-Bischoff first.
    pub fn into_inputs(self) -> Vec<ElectionInput> {
        self.proportional_elections
            .into_iter()
            .map(ElectionInput::HagenbachBischoff)
            .chain(
                self.double_proportional
                    .into_iter()
                    .map(ElectionInput::DoubleProportional),
            )
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        }
    }
}

/// Reads tally files through the [`FileSystem`] boundary.
#[derive(Clone)]
pub struct TallyFileLoader {
    fs: Arc<dyn FileSystem>,
}

impl TallyFileLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> InfraResult<TallyFile> {
        if !self.fs.is_file(path) {
            return Err(InfraError::NotFound(path.to_path_buf()));
        }
        let content = self
            .fs
            .read_to_string(path)
            .map_err(|e| InfraError::io(format!("read {}", path.display()), e))?;

        let tally = Self::parse(&content, Format::of(path)).map_err(|m| InfraError::parse(path, m))?;
        if tally.is_empty() {
            return Err(InfraError::parse(path, "no elections found"));
        }
        debug!(
            "loaded {} proportional election(s), {} double proportional union(s)",
            tally.proportional_elections.len(),
            tally.double_proportional.len()
        );
        Ok(tally)
    }

    /// Parses `content`; the file extension decides the format.
    pub fn parse_str(&self, content: &str, path: &Path) -> InfraResult<TallyFile> {
        Self::parse(content, Format::of(path)).map_err(|m| InfraError::parse(path, m))
    }

    fn parse(content: &str, format: Format) -> Result<TallyFile, String> {
        match format {
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::traits::RealFileSystem;

    const TOML_TALLY: &str = r#"
[[proportional_elections]]
id = "nr"
number_of_mandates = 2
lists = [
    { id = "A", position = 1, vote_count = 100 },
    { id = "B", position = 2, vote_count = 60 },
]
"#;

    const JSON_TALLY: &str = r#"{
  "double_proportional": [{
    "id": "gr",
    "districts": [{ "id": "d1", "position": 1, "number_of_mandates": 3 }],
    "unions": [{ "id": "u1", "position": 1 }],
    "cells": [{ "list_id": "a1", "district_id": "d1", "union_id": "u1", "vote_count": 10 }]
  }]
}"#;

    fn loader() -> TallyFileLoader {
        TallyFileLoader::new(Arc::new(RealFileSystem))
    }

    #[test]
    fn given_toml_when_parsing_then_unions_default_to_empty() {
        let tally = loader().parse_str(TOML_TALLY, Path::new("tally.toml")).unwrap();

        assert_eq!(tally.proportional_elections.len(), 1);
        assert!(tally.proportional_elections[0].list_unions.is_empty());
        assert!(tally.double_proportional.is_empty());
    }

    #[test]
    fn given_json_extension_when_parsing_then_reads_json() {
        let tally = loader().parse_str(JSON_TALLY, Path::new("tally.JSON")).unwrap();

        let inputs = tally.into_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id(), "gr");
    }

    #[test]
    fn given_garbage_when_parsing_then_parse_error() {
        let result = loader().parse_str("lists = 3 = 4", Path::new("x.toml"));
        assert!(matches!(result, Err(InfraError::Parse { .. })));
    }

    #[test]
    fn given_missing_file_when_loading_then_not_found() {
        let result = loader().load(Path::new("/nonexistent/tally.toml"));
        assert!(matches!(result, Err(InfraError::NotFound(_))));
    }
}
