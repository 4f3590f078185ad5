//! Config command handlers.

use crate::commands::VaultInput;
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use std::collections::BTreeMap;
use std::path::Path;
use vault_sync_infra::{
    ConfigRenderFormat, config_schema_json, render_effective_config, resolve_config_path,
    std_env_map,
};

/// Validate the effective config (env > overrides > file > defaults).
pub fn run_config_check(mode: OutputMode, input: &VaultInput) -> Result<CliOutput, CliError> {
    config_check_with_env(mode, &std_env_map(), input)
}

pub(crate) fn config_check_with_env(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    input: &VaultInput,
) -> Result<CliOutput, CliError> {
    let path = resolve_config_path(input.config_path.as_deref(), &input.vault_root);
    let config_json = match render_effective_config(
        env,
        path.as_deref(),
        input.overrides_json.as_deref(),
        ConfigRenderFormat::Json,
    ) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config check completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary(
            "ok",
            "config",
            Some(serde_json::json!({ "configPath": path_string(path.as_deref()) })),
        )
    } else if mode.is_json() {
        let config_value: serde_json::Value = serde_json::from_str(config_json.trim())?;
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": path_string(path.as_deref()),
            "effectiveConfig": config_value,
        });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        path.as_deref().map_or_else(
            || "status: ok\nconfig: ok\npath: <defaults>\n".to_string(),
            |path| format!("status: ok\nconfig: ok\npath: {}\n", path.to_string_lossy()),
        )
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the effective config as JSON or TOML.
pub fn run_config_show(
    mode: OutputMode,
    input: &VaultInput,
    format: ConfigRenderFormat,
) -> Result<CliOutput, CliError> {
    let env = std_env_map();
    let path = resolve_config_path(input.config_path.as_deref(), &input.vault_root);
    let rendered = match render_effective_config(
        &env,
        path.as_deref(),
        input.overrides_json.as_deref(),
        format,
    ) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let config_value = match format {
        ConfigRenderFormat::Json => serde_json::from_str(rendered.trim())?,
        ConfigRenderFormat::Toml => serde_json::Value::String(rendered.clone()),
    };
    let stdout = if mode.is_ndjson() {
        format_ndjson_summary(
            "ok",
            "config",
            Some(serde_json::json!({ "effectiveConfig": config_value })),
        )
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": path_string(path.as_deref()),
            "effectiveConfig": config_value,
        });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        rendered
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the JSON Schema of the config file.
pub fn run_config_schema(mode: OutputMode) -> Result<CliOutput, CliError> {
    let schema = match config_schema_json() {
        Ok(schema) => schema,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::Internal)),
    };

    let stdout = if mode.is_ndjson() {
        let value: serde_json::Value = serde_json::from_str(schema.trim())?;
        format_ndjson_summary(
            "ok",
            "schema",
            Some(serde_json::json!({ "schema": value })),
        )
    } else {
        schema
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn path_string(path: Option<&Path>) -> Option<String> {
    path.map(|value| value.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use std::path::PathBuf;

    fn json_mode() -> OutputMode {
        OutputMode {
            format: OutputFormat::Json,
            no_progress: true,
            log_json: false,
        }
    }

    fn defaults_input() -> VaultInput {
        VaultInput {
            vault_root: PathBuf::from("/nonexistent-vault"),
            ..VaultInput::default()
        }
    }

    #[test]
    fn overrides_reach_the_effective_config() -> Result<(), Box<dyn std::error::Error>> {
        let input = VaultInput {
            overrides_json: Some(r#"{"watch":{"debounceMs":1500}}"#.to_string()),
            ..defaults_input()
        };
        let output = config_check_with_env(json_mode(), &BTreeMap::new(), &input)?;
        assert_eq!(output.exit_code, ExitCode::Ok);
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        let debounce = value
            .pointer("/effectiveConfig/watch/debounceMs")
            .and_then(serde_json::Value::as_u64);
        assert_eq!(debounce, Some(1500));
        assert!(value.get("configPath").is_some_and(serde_json::Value::is_null));
        Ok(())
    }

    #[test]
    fn env_beats_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let env = BTreeMap::from([("VSYNC_DEBOUNCE_MS".to_string(), "900".to_string())]);
        let input = VaultInput {
            overrides_json: Some(r#"{"watch":{"debounceMs":1500}}"#.to_string()),
            ..defaults_input()
        };
        let output = config_check_with_env(json_mode(), &env, &input)?;
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        let debounce = value
            .pointer("/effectiveConfig/watch/debounceMs")
            .and_then(serde_json::Value::as_u64);
        assert_eq!(debounce, Some(900));
        Ok(())
    }

    #[test]
    fn invalid_overrides_are_invalid_input() -> Result<(), Box<dyn std::error::Error>> {
        let input = VaultInput {
            overrides_json: Some("{bad".to_string()),
            ..defaults_input()
        };
        let output = config_check_with_env(json_mode(), &BTreeMap::new(), &input)?;
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert!(output.stdout.contains("\"status\": \"error\""));
        Ok(())
    }

    #[test]
    fn schema_output_is_a_json_document() -> Result<(), Box<dyn std::error::Error>> {
        let output = run_config_schema(json_mode())?;
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        assert!(value.pointer("/properties/store").is_some());
        Ok(())
    }
}
