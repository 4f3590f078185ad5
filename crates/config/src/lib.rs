//! # vault-sync-config
//!
//! Engine configuration schema, validation, env overrides, and loading.
//! This crate depends on `domain` and `shared` only.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{
    ENV_PROVIDER_API_KEY, ENV_PROVIDER_BASE_URL, EngineEnv, EnvParseError, apply_env_overrides,
};
pub use load::{
    ConfigFormat, detect_config_format, load_engine_config_from_path,
    load_engine_config_from_sources, load_engine_config_std_env, read_config_file,
    to_pretty_json, to_pretty_toml,
};
pub use schema::{
    CURRENT_CONFIG_VERSION, ConfigSchemaError, DocumentsConfig, EngineConfig, IndexConfig,
    ProviderConfig, RateLimitConfig, RetryConfig, STATE_DIR_IGNORE_PATTERN, StoreConfig,
    UploadConfig, ValidatedEngineConfig, WatchConfig, engine_config_schema,
    parse_engine_config_json, parse_engine_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_crate_compiles() {
        assert!(!config_crate_version().is_empty());
    }

    #[test]
    fn config_depends_only_on_domain_and_shared() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let internal: Vec<&str> = manifest
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("vault-sync-"))
            .collect();
        assert_eq!(
            internal,
            vec![
                "vault-sync-domain.workspace = true",
                "vault-sync-shared.workspace = true"
            ]
        );
    }
}
