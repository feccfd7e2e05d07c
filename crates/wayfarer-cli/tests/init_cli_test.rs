//! Integration tests for the `wayfarer init` command.
//!
//! Each test points `XDG_CONFIG_HOME` at its own temporary directory so the
//! real user config is never touched.

use std::path::Path;
use std::process::{Command, Output};

fn wayfarer(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wayfarer"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run wayfarer binary")
}

#[test]
fn init_writes_config_file() {
    let tmp = tempfile::TempDir::new().unwrap();

    let out = wayfarer(
        tmp.path(),
        &["init", "--db-url", "postgresql://db.internal:5432/trips"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let written = std::fs::read_to_string(tmp.path().join("wayfarer/config.toml")).unwrap();
    let parsed: toml::Value = toml::from_str(&written).unwrap();
    assert_eq!(
        parsed["database"]["url"].as_str(),
        Some("postgresql://db.internal:5432/trips")
    );
    assert_eq!(parsed["ai"]["provider"].as_str(), Some("mock"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let tmp = tempfile::TempDir::new().unwrap();

    assert!(wayfarer(tmp.path(), &["init"]).status.success());

    let again = wayfarer(tmp.path(), &["init"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let forced = wayfarer(tmp.path(), &["init", "--force", "--provider", "openrouter"]);
    assert!(forced.status.success());
    assert!(String::from_utf8_lossy(&forced.stdout).contains("WAYFARER_AI_API_KEY"));

    let written = std::fs::read_to_string(tmp.path().join("wayfarer/config.toml")).unwrap();
    assert!(written.contains("openrouter"));
}

#[test]
fn init_rejects_unknown_provider() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = wayfarer(tmp.path(), &["init", "--provider", "carrier-pigeon"]);
    assert!(!out.status.success());
    assert!(!tmp.path().join("wayfarer/config.toml").exists());
}
