//! Tests for root folder resolution priority

use mlib_common::config::{resolve_root_folder, TomlConfig};
use serial_test::serial;
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "MLIB_TEST_ROOT_FOLDER";

#[test]
#[serial]
fn test_cli_argument_wins() {
    std::env::set_var(ENV_VAR, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/from/cli")), ENV_VAR, &toml);

    assert_eq!(resolved, PathBuf::from("/from/cli"));
    std::env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    std::env::set_var(ENV_VAR, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, ENV_VAR, &toml);

    assert_eq!(resolved, PathBuf::from("/from/env"));
    std::env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_toml_used_without_cli_or_env() {
    std::env::remove_var(ENV_VAR);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, ENV_VAR, &toml);

    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_default_when_nothing_configured() {
    std::env::remove_var(ENV_VAR);

    let resolved = resolve_root_folder(None, ENV_VAR, &TomlConfig::default());

    assert!(resolved.ends_with("mlib") || resolved.ends_with("mlib_data"));
}

#[test]
fn test_load_explicit_missing_file_fails() {
    let result = TomlConfig::load(Some(Path::new("/definitely/not/here/config.toml")));
    assert!(result.is_err());
}

#[test]
fn test_load_explicit_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 5000\n[logging]\nlevel = \"warn\"\n").unwrap();

    let config = TomlConfig::load(Some(&path)).unwrap();

    assert_eq!(config.port, Some(5000));
    assert_eq!(config.logging.level, "warn");
}
