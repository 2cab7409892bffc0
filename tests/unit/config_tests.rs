//! Configuration parsing and validation tests.

use agent_workbench::{AppConfig, AppError};
use tempfile::TempDir;

fn minimal_toml(root: &str) -> String {
    format!("workspace_root = '{root}'\n")
}

fn full_toml(root: &str) -> String {
    format!(
        r"
workspace_root = '{root}'
state_dir = '/var/lib/agent-workbench'

[agent]
program = 'acw-nightly'
base_args = ['--verbose', '--no-color']

[tracker]
program = 'gh-enterprise'
"
    )
}

#[test]
fn minimal_config_applies_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = AppConfig::from_toml_str(&minimal_toml(root)).expect("config parses");

    assert_eq!(
        config.workspace_root,
        temp.path().canonicalize().expect("canonical root")
    );
    assert_eq!(config.agent.program, "acw");
    assert!(config.agent.base_args.is_empty());
    assert_eq!(config.tracker.program, "gh");
    assert_eq!(
        config.state_dir(),
        config.workspace_root.join(".agent-workbench")
    );
}

#[test]
fn full_config_overrides_every_default() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = AppConfig::from_toml_str(&full_toml(root)).expect("config parses");

    assert_eq!(config.agent.program, "acw-nightly");
    assert_eq!(config.agent.base_args, vec!["--verbose", "--no-color"]);
    assert_eq!(config.tracker.program, "gh-enterprise");
    assert_eq!(
        config.state_dir(),
        std::path::PathBuf::from("/var/lib/agent-workbench")
    );
}

#[test]
fn constructed_config_matches_parsed_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let config = AppConfig::new(temp.path().to_path_buf());
    assert_eq!(config.agent.program, "acw");
    assert_eq!(config.tracker.program, "gh");
    assert_eq!(config.state_dir(), temp.path().join(".agent-workbench"));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = AppConfig::from_toml_str("workspace_root = [not toml").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("invalid config"));
}

#[test]
fn missing_workspace_root_is_a_config_error() {
    let err = AppConfig::from_toml_str("[agent]\nprogram = 'acw'\n").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn nonexistent_workspace_root_fails_validation() {
    let err = AppConfig::from_toml_str("workspace_root = '/no/such/dir/anywhere'\n")
        .expect_err("must fail");
    assert!(err.to_string().contains("workspace_root invalid"));
}

#[test]
fn blank_agent_program_fails_validation() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("workspace_root = '{root}'\n\n[agent]\nprogram = '   '\n");
    let err = AppConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(err.to_string().contains("agent.program must not be empty"));
}

#[test]
fn errors_render_with_their_domain_prefix() {
    assert_eq!(AppError::Config("bad".to_owned()).to_string(), "config: bad");
    assert_eq!(AppError::Store("bad".to_owned()).to_string(), "store: bad");
    assert_eq!(
        AppError::NotFound("s1".to_owned()).to_string(),
        "not found: s1"
    );
}

#[test]
fn load_from_path_reads_and_validates() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, minimal_toml(root)).expect("write config");

    let config = AppConfig::load_from_path(&config_path).expect("config loads");
    assert_eq!(config.agent.program, "acw");

    let err = AppConfig::load_from_path(temp.path().join("absent.toml")).expect_err("must fail");
    assert!(err.to_string().contains("failed to read config"));
}
