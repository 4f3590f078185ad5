//! Integration tests for parsing config fixtures from the workspace testkit.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use vault_sync_config::{
    CURRENT_CONFIG_VERSION, EngineConfig, parse_engine_config_json, parse_engine_config_toml,
};
use vault_sync_domain::FingerprintStrategy;
use vault_sync_shared::ErrorCode;

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn read_fixture(relative: &str) -> Result<String, Box<dyn Error>> {
    let path = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative);
    Ok(fs::read_to_string(path)?)
}

#[test]
fn parses_valid_fixture_and_normalizes() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/engine-config.valid.json")?;
    let config = parse_engine_config_json(&contents)?;

    assert_eq!(config.version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.store.name.as_ref(), "research-notes");
    assert_eq!(
        config.index.fingerprint_strategy,
        FingerprintStrategy::MtimeSize
    );
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.base_delay_ms, 1_000, "unset fields keep defaults");

    let extensions: Vec<&str> = config
        .documents
        .allowed_extensions
        .iter()
        .map(AsRef::as_ref)
        .collect();
    assert_eq!(extensions, vec!["md", "txt"]);

    let patterns: Vec<&str> = config
        .documents
        .ignore_patterns
        .iter()
        .map(AsRef::as_ref)
        .collect();
    assert_eq!(patterns, vec![".vault-sync/", "archive/old/", "templates/"]);
    Ok(())
}

#[test]
fn default_toml_fixture_matches_defaults() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/engine-config.default.toml")?;
    let config = parse_engine_config_toml(&contents)?;

    assert_eq!(config.into_inner(), EngineConfig::default());
    Ok(())
}

#[test]
fn invalid_fixture_reports_error_code() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/engine-config.invalid.json")?;
    let error = parse_engine_config_json(&contents)
        .err()
        .ok_or_else(|| std::io::Error::other("expected invalid fixture error"))?;

    assert_eq!(error.code, ErrorCode::new("config", "invalid_timeout"));
    assert_eq!(error.metadata_value("section"), Some("upload"));
    assert_eq!(error.metadata_value("field"), Some("operationTimeoutMs"));
    Ok(())
}
