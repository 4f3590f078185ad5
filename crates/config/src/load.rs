//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::{EngineConfig, EngineEnv, ValidatedEngineConfig, apply_env_overrides};
use serde::Deserialize;
use std::path::Path;
use vault_sync_domain::FingerprintStrategy;
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json` (also used when the path has no extension).
    Json,
    /// `.toml`.
    Toml,
}

/// Load the engine config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`EngineEnv`)
/// - overrides JSON (partial config)
/// - config JSON (file content)
/// - defaults (`EngineConfig::default()`)
pub fn load_engine_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &EngineEnv,
) -> Result<ValidatedEngineConfig, ErrorEnvelope> {
    let config = match config_json {
        None => EngineConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };
    finish_load(config, overrides_json, env)
}

/// Load the engine config from an optional file path.
pub fn load_engine_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &EngineEnv,
) -> Result<ValidatedEngineConfig, ErrorEnvelope> {
    let config = match config_path {
        None => EngineConfig::default(),
        Some(path) => {
            let config_text = read_config_file(path)?;
            let format = detect_config_format(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };
    finish_load(config, overrides_json, env)
}

/// Load the engine config from std env and an optional file path.
pub fn load_engine_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedEngineConfig, ErrorEnvelope> {
    let env = EngineEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_engine_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &EngineConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &EngineConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Pick the parser from the file extension.
pub fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

fn finish_load(
    mut config: EngineConfig,
    overrides_json: Option<&str>,
    env: &EngineEnv,
) -> Result<ValidatedEngineConfig, ErrorEnvelope> {
    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        overrides.apply(&mut config);
    }

    // env is applied last and also validates/normalizes the resulting config.
    apply_env_overrides(config, env)
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<EngineConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<EngineConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

/// Read a config file, mapping I/O failures to stable codes.
pub fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct EngineConfigOverrides {
    version: Option<u32>,
    store: StoreOverrides,
    documents: DocumentsOverrides,
    index: IndexOverrides,
    watch: WatchOverrides,
    upload: UploadOverrides,
    retry: RetryOverrides,
    rate_limit: RateLimitOverrides,
    provider: ProviderOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct StoreOverrides {
    name: Option<Box<str>>,
    cache_path: Option<Box<str>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct DocumentsOverrides {
    allowed_extensions: Option<Vec<Box<str>>>,
    ignore_patterns: Option<Vec<Box<str>>>,
    max_file_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct IndexOverrides {
    fingerprint_strategy: Option<FingerprintStrategy>,
    min_content_bytes: Option<u64>,
    persist_every: Option<u32>,
    failure_log_capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct WatchOverrides {
    debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct UploadOverrides {
    poll_initial_ms: Option<u64>,
    poll_max_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct RetryOverrides {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter_ratio_pct: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct RateLimitOverrides {
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ProviderOverrides {
    base_url: Option<Box<str>>,
    timeout_ms: Option<u64>,
}

impl EngineConfigOverrides {
    fn apply(self, config: &mut EngineConfig) {
        set(&mut config.version, self.version);

        set(&mut config.store.name, self.store.name);
        set(&mut config.store.cache_path, self.store.cache_path);

        set(
            &mut config.documents.allowed_extensions,
            self.documents.allowed_extensions,
        );
        set(
            &mut config.documents.ignore_patterns,
            self.documents.ignore_patterns,
        );
        set(
            &mut config.documents.max_file_size_bytes,
            self.documents.max_file_size_bytes,
        );

        set(
            &mut config.index.fingerprint_strategy,
            self.index.fingerprint_strategy,
        );
        set(
            &mut config.index.min_content_bytes,
            self.index.min_content_bytes,
        );
        set(&mut config.index.persist_every, self.index.persist_every);
        set(
            &mut config.index.failure_log_capacity,
            self.index.failure_log_capacity,
        );

        set(&mut config.watch.debounce_ms, self.watch.debounce_ms);

        set(
            &mut config.upload.poll_initial_ms,
            self.upload.poll_initial_ms,
        );
        set(&mut config.upload.poll_max_ms, self.upload.poll_max_ms);
        set(
            &mut config.upload.operation_timeout_ms,
            self.upload.operation_timeout_ms,
        );

        set(&mut config.retry.max_retries, self.retry.max_retries);
        set(&mut config.retry.base_delay_ms, self.retry.base_delay_ms);
        set(&mut config.retry.max_delay_ms, self.retry.max_delay_ms);
        set(
            &mut config.retry.jitter_ratio_pct,
            self.retry.jitter_ratio_pct,
        );

        set(
            &mut config.rate_limit.cooldown_ms,
            self.rate_limit.cooldown_ms,
        );

        set(&mut config.provider.base_url, self.provider.base_url);
        set(&mut config.provider.timeout_ms, self.provider.timeout_ms);
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}
