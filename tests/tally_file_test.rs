//! Tests for tally file loading and the apportion command flow.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use mandate::application::audit::fingerprint;
use mandate::cli::commands::run_file;
use mandate::cli::LotArg;
use mandate::config::Settings;
use mandate::domain::ApportionmentState;
use mandate::infrastructure::di::ServiceContainer;
use mandate::infrastructure::traits::RealFileSystem;
use mandate::infrastructure::{InfraError, TallyFileLoader};

const TALLY: &str = r#"
[[proportional_elections]]
id = "nr"
number_of_mandates = 3
lists = [
    { id = "A", position = 1, vote_count = 500 },
    { id = "B", position = 2, vote_count = 300 },
    { id = "C", position = 3, vote_count = 200 },
]

[[proportional_elections]]
id = "tie"
number_of_mandates = 1
lists = [
    { id = "X", position = 1, vote_count = 50 },
    { id = "Y", position = 2, vote_count = 50 },
]

[[double_proportional]]
id = "kr"
districts = [
    { id = "d1", position = 1, number_of_mandates = 4 },
    { id = "d2", position = 2, number_of_mandates = 2 },
]
unions = [
    { id = "u1", position = 1 },
    { id = "u2", position = 2 },
]
cells = [
    { list_id = "a1", district_id = "d1", union_id = "u1", vote_count = 800 },
    { list_id = "b1", district_id = "d1", union_id = "u2", vote_count = 200 },
    { list_id = "a2", district_id = "d2", union_id = "u1", vote_count = 390 },
    { list_id = "b2", district_id = "d2", union_id = "u2", vote_count = 10 },
]
"#;

/// Helper to create a tally file for testing
fn create_tally_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write tally file");
    path
}

fn container() -> ServiceContainer {
    ServiceContainer::with_deps(Settings::default(), Arc::new(RealFileSystem))
}

#[test]
fn given_tally_file_when_loading_then_elections_in_file_order() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(&temp, "tally.toml", TALLY);
    let loader = TallyFileLoader::new(Arc::new(RealFileSystem));

    // Act
    let inputs = loader.load(&path).unwrap().into_inputs();

    // Assert
    let ids: Vec<&str> = inputs.iter().map(|i| i.id()).collect();
    assert_eq!(ids, vec!["nr", "tie", "kr"]);
}

#[test]
fn given_empty_tally_when_loading_then_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(&temp, "empty.toml", "");
    let loader = TallyFileLoader::new(Arc::new(RealFileSystem));

    assert!(matches!(loader.load(&path), Err(InfraError::Parse { .. })));
}

#[test]
fn given_tally_file_when_running_then_states_per_election() {
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(&temp, "tally.toml", TALLY);

    let sessions = run_file(&container(), &path, &[]).unwrap();

    let states: Vec<ApportionmentState> = sessions.iter().map(|s| s.state()).collect();
    assert_eq!(
        states,
        vec![
            ApportionmentState::Completed,
            ApportionmentState::HasOpenLotDecision,
            ApportionmentState::Completed,
        ]
    );
    assert_eq!(sessions[1].pending_lot_decisions()[0].id.as_str(), "hb:tie:0");
}

#[test]
fn given_lot_argument_when_running_then_tie_resolved() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(&temp, "tally.toml", TALLY);
    let lots: Vec<LotArg> = vec!["hb:tie:0=Y".parse().unwrap()];

    // Act
    let sessions = run_file(&container(), &path, &lots).unwrap();

    // Assert
    assert!(sessions
        .iter()
        .all(|s| s.state() == ApportionmentState::Completed));
    assert_eq!(sessions[1].input().lot_decisions().len(), 1);
}

#[test]
fn given_same_file_when_run_twice_then_fingerprints_match() {
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(&temp, "tally.toml", TALLY);

    let prints = |sessions: Vec<mandate::application::services::ApportionmentSession>| -> Vec<String> {
        sessions
            .iter()
            .map(|s| fingerprint(s.outcome().unwrap()).unwrap())
            .collect()
    };
    let first = prints(run_file(&container(), &path, &[]).unwrap());
    let second = prints(run_file(&container(), &path, &[]).unwrap());

    assert_eq!(first, second);
    assert_eq!(first[0].len(), 64);
}

#[test]
fn given_json_tally_when_running_then_same_as_toml() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let toml_path = create_tally_file(&temp, "tally.toml", TALLY);
    let tally = TallyFileLoader::new(Arc::new(RealFileSystem))
        .load(&toml_path)
        .unwrap();
    let json_path = create_tally_file(&temp, "tally.json", &serde_json::to_string(&tally).unwrap());

    // Act
    let from_toml = run_file(&container(), &toml_path, &[]).unwrap();
    let from_json = run_file(&container(), &json_path, &[]).unwrap();

    // Assert
    for (a, b) in from_toml.iter().zip(&from_json) {
        assert_eq!(
            fingerprint(a.outcome().unwrap()).unwrap(),
            fingerprint(b.outcome().unwrap()).unwrap()
        );
    }
}

#[test]
fn given_negative_votes_in_file_when_running_then_contract_violation() {
    let temp = TempDir::new().unwrap();
    let path = create_tally_file(
        &temp,
        "bad.toml",
        r#"
[[proportional_elections]]
id = "bad"
number_of_mandates = 1
lists = [{ id = "A", position = 1, vote_count = -5 }]
"#,
    );

    let err = run_file(&container(), &path, &[]).unwrap_err();

    assert_eq!(err.exit_code(), mandate::exitcode::DATAERR);
}
