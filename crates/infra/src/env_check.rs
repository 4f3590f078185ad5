//! Environment validation helpers for CLI surfaces.

use std::collections::BTreeMap;
use vault_sync_config::{EngineConfig, EngineEnv, apply_env_overrides};
use vault_sync_shared::ErrorEnvelope;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that `VSYNC_*` overrides parse and merge into the default config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = EngineEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(EngineConfig::default(), &parsed)?;
    Ok(())
}
