//! Persisted index cache record.

use crate::{DocumentPath, Fingerprint, RemoteResourceId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of one successfully indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedEntry {
    /// Vault-relative path.
    pub path: DocumentPath,
    /// Provider id of the uploaded document.
    pub remote_resource_id: RemoteResourceId,
    /// Fingerprint at upload time.
    pub fingerprint: Fingerprint,
    /// Upload completion time (epoch ms).
    pub last_indexed_at_ms: u64,
}

/// Versioned on-disk cache, one per vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCacheRecord {
    /// Layout + fingerprint strategy version.
    pub schema_version: Box<str>,
    /// Remote store the entries belong to.
    #[serde(default)]
    pub store_id: Option<StoreId>,
    /// Completion time of the last full pass (epoch ms).
    #[serde(default)]
    pub last_full_sync_ms: Option<u64>,
    /// Indexed documents keyed by path.
    #[serde(default)]
    pub entries: BTreeMap<DocumentPath, IndexedEntry>,
}

impl IndexCacheRecord {
    /// Fresh record with no store and no entries.
    #[must_use]
    pub fn empty(schema_version: impl Into<Box<str>>) -> Self {
        Self {
            schema_version: schema_version.into(),
            store_id: None,
            last_full_sync_ms: None,
            entries: BTreeMap::new(),
        }
    }

    /// Keep only the store id, re-stamped with `schema_version`.
    #[must_use]
    pub fn rebuilt_for(self, schema_version: impl Into<Box<str>>) -> Self {
        Self {
            store_id: self.store_id,
            ..Self::empty(schema_version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn entry(path: &str, fingerprint: &str) -> Result<IndexedEntry, Box<dyn Error>> {
        Ok(IndexedEntry {
            path: DocumentPath::parse(path)?,
            remote_resource_id: RemoteResourceId::parse(format!("docs/{path}"))?,
            fingerprint: Fingerprint::parse(fingerprint)?,
            last_indexed_at_ms: 10,
        })
    }

    #[test]
    fn record_serializes_camel_case() -> Result<(), Box<dyn Error>> {
        let mut record = IndexCacheRecord::empty("3:sha256");
        record.store_id = Some(StoreId::parse("stores/1")?);
        let a = entry("a.md", "fp1")?;
        record.entries.insert(a.path.clone(), a);

        let value = serde_json::to_value(&record)?;
        assert_eq!(value["schemaVersion"], "3:sha256");
        assert_eq!(value["storeId"], "stores/1");
        assert_eq!(value["entries"]["a.md"]["remoteResourceId"], "docs/a.md");
        assert_eq!(value["entries"]["a.md"]["lastIndexedAtMs"], 10);

        let decoded: IndexCacheRecord = serde_json::from_value(value)?;
        assert_eq!(decoded, record);
        Ok(())
    }

    #[test]
    fn missing_optional_fields_default() -> Result<(), Box<dyn Error>> {
        let decoded: IndexCacheRecord = serde_json::from_str(r#"{"schemaVersion":"3:sha256"}"#)?;
        assert_eq!(decoded, IndexCacheRecord::empty("3:sha256"));
        Ok(())
    }

    #[test]
    fn rebuild_keeps_only_store_id() -> Result<(), Box<dyn Error>> {
        let mut record = IndexCacheRecord::empty("2");
        record.store_id = Some(StoreId::parse("stores/keep")?);
        record.last_full_sync_ms = Some(5);
        let a = entry("a.md", "fp1")?;
        record.entries.insert(a.path.clone(), a);

        let rebuilt = record.rebuilt_for("3:sha256");
        assert_eq!(rebuilt.schema_version.as_ref(), "3:sha256");
        assert_eq!(rebuilt.store_id.as_ref().map(StoreId::as_str), Some("stores/keep"));
        assert!(rebuilt.entries.is_empty());
        assert_eq!(rebuilt.last_full_sync_ms, None);
        Ok(())
    }
}
