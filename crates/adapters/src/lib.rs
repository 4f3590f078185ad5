//! # vault-sync-adapters
//!
//! Adapter implementations for the vault-sync ports: the local vault
//! (document store, policy, watcher), the cache file, the REST index
//! provider, and log sinks. This crate never depends on `app` or `infra`.

pub mod cache_store;
pub mod fs;
pub mod log_sink;
pub mod logger;
pub mod policy;
#[cfg(feature = "http-provider")]
pub mod provider_http;
pub mod tracing_logger;
#[cfg(feature = "fs-watch")]
pub mod watcher;

pub use cache_store::JsonFileCacheStore;
pub use fs::LocalDocumentStore;
pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::JsonLogger;
pub use policy::DocumentPolicy;
#[cfg(feature = "http-provider")]
pub use provider_http::{HttpIndexProvider, HttpIndexProviderConfig};
pub use tracing_logger::TracingLogger;
#[cfg(feature = "fs-watch")]
pub use watcher::VaultWatcher;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("vault-sync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_owned());
            }
        }
        deps
    }

    #[test]
    fn adapters_do_not_depend_on_app_or_infra() {
        let deps = workspace_deps();
        for forbidden in ["vault-sync-app", "vault-sync-infra"] {
            assert!(
                !deps.iter().any(|dep| dep == forbidden),
                "forbidden dependency found: {forbidden}"
            );
        }
        assert!(deps.iter().any(|dep| dep == "vault-sync-ports"));
    }

    #[test]
    fn adapters_crate_version_is_set() {
        assert!(!adapters_crate_version().is_empty());
    }
}
