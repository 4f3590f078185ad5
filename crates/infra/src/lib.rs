//! # vault-sync-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Local CLI orchestration helpers.
pub mod cli_local;
/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Engine assembly from config.
pub mod engine_factory;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Per-vault process lock.
pub mod vault_lock;

pub use cli_local::{
    LocalOptions, ProgressCallback, VaultStatus, WatchOptions, WatchSummary, read_status_local,
    run_index_local, run_index_local_with_provider, run_watch_local, run_watch_local_until,
};
pub use config_check::{
    ConfigRenderFormat, STATE_DIR_NAME, config_schema_json, load_effective_config,
    load_effective_config_json, render_effective_config, resolve_config_path, std_env_map,
};
pub use engine_factory::{
    LogFormat, VaultAdapters, build_engine, build_index_provider, build_logger, engine_settings,
};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use vault_lock::VaultLock;

// Re-export redaction utilities for CLI boundary sanitization
pub use vault_sync_shared::is_secret_key;

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_adapters::adapters_crate_version;
    use vault_sync_app::app_crate_version;
    use vault_sync_config::config_crate_version;
    use vault_sync_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("vault-sync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        let required = [
            "vault-sync-app",
            "vault-sync-adapters",
            "vault-sync-config",
        ];

        for expected in required {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
    }

    #[test]
    fn infra_can_use_app_adapters_config_shared() {
        assert!(!infra_crate_version().is_empty());
        assert!(!app_crate_version().is_empty());
        assert!(!adapters_crate_version().is_empty());
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
