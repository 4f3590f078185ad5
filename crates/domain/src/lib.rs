//! # vault-sync-domain
//!
//! Domain entities and value objects for incremental vault indexing.
//!
//! - **Primitives** - `DocumentPath`, `StoreId`, `RemoteResourceId`, `OperationHandle`
//! - **Fingerprints** - `Fingerprint`, `FingerprintStrategy`
//! - **Cache** - `IndexedEntry`, `IndexCacheRecord`
//! - **Changes** - `DocumentEvent`, `PendingChange`, coalescing rules
//! - **State** - `RunState` transitions, `ProgressEvent`, `SyncStatus`
//! - **Tree** - `IndexTreeNode` read model
//!
//! ## Dependency Rules
//!
//! - Depends only on the `shared` crate
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cache;
pub mod change;
pub mod fingerprint;
pub mod outcome;
pub mod primitives;
pub mod states;
pub mod tree;

pub use cache::{IndexCacheRecord, IndexedEntry};
pub use change::{ChangeKind, DocumentEvent, PendingChange, coalesce, coalesce_all};
pub use fingerprint::{CACHE_SCHEMA_GENERATION, Fingerprint, FingerprintStrategy};
pub use outcome::{FailedEntry, FailureKind, FailureLog, IndexResult, SyncStatus};
pub use primitives::{
    DocumentPath, OperationHandle, PrimitiveError, RemoteResourceId, StoreId, StoreName,
};
pub use states::{ProgressEvent, RunEvent, RunState};
pub use tree::IndexTreeNode;

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_crate_version_is_set() {
        assert!(!domain_crate_version().is_empty());
    }

    #[test]
    fn domain_depends_only_on_shared() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let internal: Vec<&str> = manifest
            .lines()
            .map(str::trim_start)
            .filter(|line| line.starts_with("vault-sync-"))
            .collect();
        assert_eq!(internal, vec!["vault-sync-shared.workspace = true"]);
    }
}
