//! Environment variable overrides for the engine config.
//!
//! Parsing is strict: a variable that is present must be valid. Empty values
//! are rejected except for list variables, where empty means "clear".

use crate::schema::{
    EngineConfig, ValidatedEngineConfig, collapse_forward_slashes, normalize_extensions,
};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;
use vault_sync_domain::FingerprintStrategy;
use vault_sync_shared::{ErrorCode, ErrorEnvelope, REDACTED_VALUE, SecretString, is_secret_key};

/// Remote store display name.
pub const ENV_STORE_NAME: &str = "VSYNC_STORE_NAME";
/// Cache file path.
pub const ENV_CACHE_PATH: &str = "VSYNC_CACHE_PATH";
/// Comma-separated extension allowlist.
pub const ENV_ALLOWED_EXTENSIONS: &str = "VSYNC_ALLOWED_EXTENSIONS";
/// Comma-separated ignore patterns.
pub const ENV_IGNORE_PATTERNS: &str = "VSYNC_IGNORE_PATTERNS";
/// Maximum document size in bytes.
pub const ENV_MAX_FILE_SIZE_BYTES: &str = "VSYNC_MAX_FILE_SIZE_BYTES";
/// `contentDigest` or `mtimeSize`.
pub const ENV_FINGERPRINT_STRATEGY: &str = "VSYNC_FINGERPRINT_STRATEGY";
/// Minimum meaningful content size in bytes.
pub const ENV_MIN_CONTENT_BYTES: &str = "VSYNC_MIN_CONTENT_BYTES";
/// Debounce quiet window (ms).
pub const ENV_DEBOUNCE_MS: &str = "VSYNC_DEBOUNCE_MS";
/// Operation polling timeout (ms).
pub const ENV_OPERATION_TIMEOUT_MS: &str = "VSYNC_OPERATION_TIMEOUT_MS";
/// Retries after the first upload attempt.
pub const ENV_RETRY_MAX_RETRIES: &str = "VSYNC_RETRY_MAX_RETRIES";
/// Rate-limit cooldown (ms).
pub const ENV_RATE_LIMIT_COOLDOWN_MS: &str = "VSYNC_RATE_LIMIT_COOLDOWN_MS";
/// Provider REST base URL.
pub const ENV_PROVIDER_BASE_URL: &str = "VSYNC_PROVIDER_BASE_URL";
/// Provider request timeout (ms).
pub const ENV_PROVIDER_TIMEOUT_MS: &str = "VSYNC_PROVIDER_TIMEOUT_MS";
/// Provider API key (never written to config files).
pub const ENV_PROVIDER_API_KEY: &str = "VSYNC_PROVIDER_API_KEY";

const MAX_CSV_ITEMS: usize = 512;

const ALL_VARS: [&str; 14] = [
    ENV_STORE_NAME,
    ENV_CACHE_PATH,
    ENV_ALLOWED_EXTENSIONS,
    ENV_IGNORE_PATTERNS,
    ENV_MAX_FILE_SIZE_BYTES,
    ENV_FINGERPRINT_STRATEGY,
    ENV_MIN_CONTENT_BYTES,
    ENV_DEBOUNCE_MS,
    ENV_OPERATION_TIMEOUT_MS,
    ENV_RETRY_MAX_RETRIES,
    ENV_RATE_LIMIT_COOLDOWN_MS,
    ENV_PROVIDER_BASE_URL,
    ENV_PROVIDER_TIMEOUT_MS,
    ENV_PROVIDER_API_KEY,
];

/// Parsed `VSYNC_*` overrides. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineEnv {
    /// `VSYNC_STORE_NAME`.
    pub store_name: Option<Box<str>>,
    /// `VSYNC_CACHE_PATH`.
    pub cache_path: Option<Box<str>>,
    /// `VSYNC_ALLOWED_EXTENSIONS`.
    pub allowed_extensions: Option<Vec<Box<str>>>,
    /// `VSYNC_IGNORE_PATTERNS`.
    pub ignore_patterns: Option<Vec<Box<str>>>,
    /// `VSYNC_MAX_FILE_SIZE_BYTES`.
    pub max_file_size_bytes: Option<u64>,
    /// `VSYNC_FINGERPRINT_STRATEGY`.
    pub fingerprint_strategy: Option<FingerprintStrategy>,
    /// `VSYNC_MIN_CONTENT_BYTES`.
    pub min_content_bytes: Option<u64>,
    /// `VSYNC_DEBOUNCE_MS`.
    pub debounce_ms: Option<u64>,
    /// `VSYNC_OPERATION_TIMEOUT_MS`.
    pub operation_timeout_ms: Option<u64>,
    /// `VSYNC_RETRY_MAX_RETRIES`.
    pub retry_max_retries: Option<u32>,
    /// `VSYNC_RATE_LIMIT_COOLDOWN_MS`.
    pub rate_limit_cooldown_ms: Option<u64>,
    /// `VSYNC_PROVIDER_BASE_URL`.
    pub provider_base_url: Option<Box<str>>,
    /// `VSYNC_PROVIDER_TIMEOUT_MS`.
    pub provider_timeout_ms: Option<u64>,
    /// `VSYNC_PROVIDER_API_KEY`.
    pub provider_api_key: Option<SecretString>,
}

impl EngineEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            store_name: parse_optional_trimmed_string(map, ENV_STORE_NAME)?,
            cache_path: parse_optional_trimmed_string(map, ENV_CACHE_PATH)?,
            allowed_extensions: parse_optional_csv_extensions(map, ENV_ALLOWED_EXTENSIONS)?,
            ignore_patterns: parse_optional_csv_patterns(map, ENV_IGNORE_PATTERNS)?,
            max_file_size_bytes: parse_optional_u64(map, ENV_MAX_FILE_SIZE_BYTES)?,
            fingerprint_strategy: parse_optional_strategy(map, ENV_FINGERPRINT_STRATEGY)?,
            min_content_bytes: parse_optional_u64(map, ENV_MIN_CONTENT_BYTES)?,
            debounce_ms: parse_optional_u64(map, ENV_DEBOUNCE_MS)?,
            operation_timeout_ms: parse_optional_u64(map, ENV_OPERATION_TIMEOUT_MS)?,
            retry_max_retries: parse_optional_u32(map, ENV_RETRY_MAX_RETRIES)?,
            rate_limit_cooldown_ms: parse_optional_u64(map, ENV_RATE_LIMIT_COOLDOWN_MS)?,
            provider_base_url: parse_optional_url_string(map, ENV_PROVIDER_BASE_URL)?,
            provider_timeout_ms: parse_optional_u64(map, ENV_PROVIDER_TIMEOUT_MS)?,
            provider_api_key: parse_optional_secret(map, ENV_PROVIDER_API_KEY)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        for name in ALL_VARS {
            if let Ok(value) = std::env::var(name) {
                map.insert(name.to_string(), value);
            }
        }

        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: EngineConfig,
    env: &EngineEnv,
) -> Result<ValidatedEngineConfig, ErrorEnvelope> {
    let mut config = base;

    set_clone(&mut config.store.name, env.store_name.as_ref());
    set_clone(&mut config.store.cache_path, env.cache_path.as_ref());
    set_clone(
        &mut config.documents.allowed_extensions,
        env.allowed_extensions.as_ref(),
    );
    set_clone(
        &mut config.documents.ignore_patterns,
        env.ignore_patterns.as_ref(),
    );
    set_value(
        &mut config.documents.max_file_size_bytes,
        env.max_file_size_bytes,
    );
    set_value(
        &mut config.index.fingerprint_strategy,
        env.fingerprint_strategy,
    );
    set_value(&mut config.index.min_content_bytes, env.min_content_bytes);
    set_value(&mut config.watch.debounce_ms, env.debounce_ms);
    set_value(
        &mut config.upload.operation_timeout_ms,
        env.operation_timeout_ms,
    );
    set_value(&mut config.retry.max_retries, env.retry_max_retries);
    set_value(
        &mut config.rate_limit.cooldown_ms,
        env.rate_limit_cooldown_ms,
    );
    set_clone(&mut config.provider.base_url, env.provider_base_url.as_ref());
    set_value(&mut config.provider.timeout_ms, env.provider_timeout_ms);

    config.validate_and_normalize().map_err(Into::into)
}

fn set_value<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_clone<T: Clone>(field: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        *field = value.clone();
    }
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// URL env var had an invalid value.
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// CSV list exceeds a safety limit.
    CsvTooLarge {
        /// Env var name.
        var: &'static str,
        /// Number of parsed items.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// CSV contained an invalid extension entry.
    InvalidExtensionEntry {
        /// Env var name.
        var: &'static str,
        /// Invalid entry.
        entry: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_env_url"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
            Self::CsvTooLarge { .. } | Self::InvalidExtensionEntry { .. } => {
                ErrorCode::new("config", "invalid_env_csv")
            },
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } | Self::EmptySecret { var } => {
                write!(formatter, "{var} must be non-empty")
            },
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
            Self::InvalidUrl { var, .. } => write!(formatter, "{var} must be a valid URL"),
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
            Self::CsvTooLarge { var, len, max } => {
                write!(formatter, "{var} is too large ({len} items, max {max})")
            },
            Self::InvalidExtensionEntry { var, entry } => {
                write!(formatter, "{var} contains invalid extension entry: {entry}")
            },
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope.with_metadata("env_var", var)
            },
            EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidUrl { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
            EnvParseError::CsvTooLarge { var, len, max } => envelope
                .with_metadata("env_var", var)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            EnvParseError::InvalidExtensionEntry { var, entry } => envelope
                .with_metadata("env_var", var)
                .with_metadata("entry", entry),
        }
    }
}

fn non_empty<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<(&'a String, &'a str)>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some((raw, trimmed)))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    Ok(non_empty(map, var)?.map(|(_, trimmed)| trimmed.into()))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(trimmed.to_owned())))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some((raw, trimmed)) = non_empty(map, var)? else {
        return Ok(None);
    };
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some((raw, trimmed)) = non_empty(map, var)? else {
        return Ok(None);
    };
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_strategy(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<FingerprintStrategy>, EnvParseError> {
    let Some((raw, trimmed)) = non_empty(map, var)? else {
        return Ok(None);
    };
    FingerprintStrategy::parse(trimmed)
        .map(Some)
        .ok_or_else(|| EnvParseError::InvalidEnum {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_url_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some((raw, trimmed)) = non_empty(map, var)? else {
        return Ok(None);
    };

    let parsed = Url::parse(trimmed).map_err(|_| EnvParseError::InvalidUrl {
        var,
        value: raw.clone(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(EnvParseError::InvalidUrl {
            var,
            value: raw.clone(),
        });
    }

    Ok(Some(trimmed.into()))
}

fn parse_optional_csv(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Vec<String>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if items.len() > MAX_CSV_ITEMS {
        return Err(EnvParseError::CsvTooLarge {
            var,
            len: items.len(),
            max: MAX_CSV_ITEMS,
        });
    }
    Ok(Some(items))
}

fn parse_optional_csv_extensions(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Vec<Box<str>>>, EnvParseError> {
    let Some(items) = parse_optional_csv(map, var)? else {
        return Ok(None);
    };
    let boxed: Vec<Box<str>> = items.into_iter().map(Into::into).collect();
    normalize_extensions(&boxed)
        .map(Some)
        .map_err(|error| EnvParseError::InvalidExtensionEntry {
            var,
            entry: match error {
                crate::ConfigSchemaError::InvalidExtension { extension } => extension,
                other => other.to_string(),
            },
        })
}

fn parse_optional_csv_patterns(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Vec<Box<str>>>, EnvParseError> {
    let Some(items) = parse_optional_csv(map, var)? else {
        return Ok(None);
    };
    let mut normalized: Vec<Box<str>> = items
        .iter()
        .map(|item| collapse_forward_slashes(&item.replace('\\', "/")).into())
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    Ok(Some(normalized))
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED_VALUE.to_string()
    } else {
        value.to_string()
    }
}
