//! Integration tests for env parsing and env-to-config merging.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use vault_sync_config::{EngineConfig, EngineEnv, EnvParseError, apply_env_overrides};
use vault_sync_shared::{ErrorCode, ErrorEnvelope};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn read_env_map(relative: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative);
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn env_fixture_merges_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env = EngineEnv::from_map(&read_env_map("env/engine-env.valid.json")?)?;
    let config = apply_env_overrides(EngineConfig::default(), &env)?;

    assert_eq!(config.store.name.as_ref(), "team-vault");
    assert_eq!(config.watch.debounce_ms, 750);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(
        config.provider.base_url.as_ref(),
        "https://index.example.com/v2"
    );

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
    assert_eq!(patterns, vec![".vault-sync/", "drafts/", "private/"]);

    assert_eq!(
        env.provider_api_key.as_ref().map(|key| key.expose()),
        Some("sk-fixture")
    );
    Ok(())
}

#[test]
fn invalid_env_fixture_is_rejected() -> Result<(), Box<dyn Error>> {
    let error = EngineEnv::from_map(&read_env_map("env/engine-env.invalid.json")?).err();
    assert!(matches!(error, Some(EnvParseError::InvalidUrl { .. })));

    let envelope: ErrorEnvelope = error
        .ok_or_else(|| std::io::Error::other("expected invalid env error"))?
        .into();
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_url"));
    Ok(())
}
