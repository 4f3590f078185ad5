//! Config loading helpers for CLI surfaces.

use crate::InfraResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vault_sync_config::{
    EngineEnv, ValidatedEngineConfig, engine_config_schema, load_engine_config_from_path,
    to_pretty_json, to_pretty_toml,
};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Directory under the vault root holding engine state and the default config.
pub const STATE_DIR_NAME: &str = ".vault-sync";

const CONFIG_FILE_NAMES: [&str; 2] = ["config.toml", "config.json"];

/// Rendering for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigRenderFormat {
    /// Pretty JSON.
    #[default]
    Json,
    /// TOML.
    Toml,
}

/// Explicit config path, or the first default config file present in the vault.
#[must_use]
pub fn resolve_config_path(config_path: Option<&Path>, vault_root: &Path) -> Option<PathBuf> {
    if let Some(path) = config_path {
        return Some(path.to_path_buf());
    }
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| vault_root.join(STATE_DIR_NAME).join(name))
        .find(|path| path.is_file())
}

/// Load and validate the effective config from an env map.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedEngineConfig> {
    let env = EngineEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_engine_config_from_path(config_path, overrides_json, &env)
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    render_effective_config(env, config_path, overrides_json, ConfigRenderFormat::Json)
}

/// Load and validate the effective config, rendered in `format`.
pub fn render_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    format: ConfigRenderFormat,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    match format {
        ConfigRenderFormat::Json => to_pretty_json(&config),
        ConfigRenderFormat::Toml => to_pretty_toml(&config),
    }
}

/// JSON Schema of the config file, pretty printed with a trailing newline.
pub fn config_schema_json() -> InfraResult<String> {
    let mut output = serde_json::to_string_pretty(&engine_config_schema()).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config schema: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Current process `VSYNC_*` variables.
#[must_use]
pub fn std_env_map() -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("VSYNC_"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_as_json() -> InfraResult<()> {
        let json = load_effective_config_json(&BTreeMap::new(), None, None)?;
        let value: serde_json::Value = serde_json::from_str(&json).expect("config json");
        assert_eq!(value["watch"]["debounceMs"], 2_000);
        assert_eq!(value["rateLimit"]["cooldownMs"], 60_000);
        assert!(json.ends_with('\n'));
        Ok(())
    }

    #[test]
    fn overrides_and_env_apply_in_order() -> InfraResult<()> {
        let env = BTreeMap::from([("VSYNC_DEBOUNCE_MS".to_owned(), "750".to_owned())]);
        let config = load_effective_config(
            &env,
            None,
            Some(r#"{"watch":{"debounceMs":500},"store":{"name":"notes"}}"#),
        )?;
        assert_eq!(config.watch.debounce_ms, 750);
        assert_eq!(config.store.name.as_ref(), "notes");
        Ok(())
    }

    #[test]
    fn toml_rendering_is_available() -> InfraResult<()> {
        let toml =
            render_effective_config(&BTreeMap::new(), None, None, ConfigRenderFormat::Toml)?;
        assert!(toml.contains("[store]"));
        Ok(())
    }

    #[test]
    fn schema_describes_top_level_sections() -> InfraResult<()> {
        let schema = config_schema_json()?;
        assert!(schema.contains("\"rateLimit\""));
        assert!(schema.contains("\"provider\""));
        Ok(())
    }

    #[test]
    fn explicit_path_wins_over_vault_default() {
        let explicit = Path::new("/tmp/elsewhere.toml");
        assert_eq!(
            resolve_config_path(Some(explicit), Path::new("/nonexistent-vault")),
            Some(explicit.to_path_buf())
        );
        assert_eq!(resolve_config_path(None, Path::new("/nonexistent-vault")), None);
    }
}
