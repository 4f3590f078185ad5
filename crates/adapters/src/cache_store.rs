//! File-backed cache store with atomic replace.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vault_sync_ports::{BoxFuture, CacheStorePort};
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, ResultExt};

/// Persists the serialized index cache as a single JSON file.
///
/// Writes go to a synced sibling temp file that is renamed over the target.
/// If the rename is refused with `AlreadyExists`, the target is removed and
/// the rename retried. A crash between those two steps loses the record,
/// which triggers a full re-index on the next start.
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    /// Store writing to `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Resolve `cache_path` against the vault root unless it is absolute.
    #[must_use]
    pub fn for_vault(vault_root: &Path, cache_path: &str) -> Self {
        let candidate = PathBuf::from(cache_path);
        if candidate.is_absolute() {
            Self::new(candidate)
        } else {
            Self::new(vault_root.join(candidate))
        }
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "cache".into(), |name| name.to_string_lossy().into_owned());
        let suffix = uuid::Uuid::new_v4().simple();
        self.path.with_file_name(format!("{file_name}.tmp-{suffix}"))
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("path", parent.display().to_string())?;
        }

        let temp = self.temp_path();
        let written = write_synced(&temp, bytes).await;
        if let Err(error) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(error);
        }

        match tokio::fs::rename(&temp, &self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "rename refused, replacing target");
                tokio::fs::remove_file(&self.path)
                    .await
                    .or_else(|error| {
                        if error.kind() == ErrorKind::NotFound {
                            Ok(())
                        } else {
                            Err(error)
                        }
                    })
                    .map_err(|error| persist_error(&self.path, &error))?;
                tokio::fs::rename(&temp, &self.path)
                    .await
                    .map_err(|error| persist_error(&self.path, &error))
            },
            Err(error) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(persist_error(&self.path, &error))
            },
        }
    }
}

impl CacheStorePort for JsonFileCacheStore {
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("cache_store.load")?;
            match tokio::fs::read(&self.path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(ErrorEnvelope::from(error))
                    .with_error_metadata("path", self.path.display().to_string()),
            }
        })
    }

    fn store(&self, ctx: &RequestContext, bytes: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("cache_store.store")?;
            self.write_atomic(&bytes).await
        })
    }

    fn describe(&self) -> Box<str> {
        self.path.display().to_string().into_boxed_str()
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|error| persist_error(path, &error))?;
    file.write_all(bytes)
        .await
        .map_err(|error| persist_error(path, &error))?;
    file.sync_all()
        .await
        .map_err(|error| persist_error(path, &error))
}

fn persist_error(path: &Path, error: &std::io::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("cache", "persist_failed"),
        format!("failed to persist index cache: {error}"),
        ErrorClass::Retriable,
    )
    .with_metadata("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("vsync_cache_{name}_{}", uuid::Uuid::new_v4()))
            .join(".vault-sync")
            .join("index-cache.json")
    }

    #[tokio::test]
    async fn load_missing_file_is_none() -> Result<()> {
        let store = JsonFileCacheStore::new(scratch_file("missing"));
        assert_eq!(store.load(&RequestContext::new_request()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn store_creates_parents_and_replaces_contents() -> Result<()> {
        let path = scratch_file("replace");
        let store = JsonFileCacheStore::new(path.clone());
        let ctx = RequestContext::new_request();

        store.store(&ctx, br#"{"v":1}"#.to_vec()).await?;
        store.store(&ctx, br#"{"v":2}"#.to_vec()).await?;
        assert_eq!(store.load(&ctx).await?, Some(br#"{"v":2}"#.to_vec()));

        let parent = path.parent().expect("parent");
        let leftovers: Vec<_> = std::fs::read_dir(parent)
            .expect("read dir")
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind");

        if let Some(root) = parent.parent() {
            std::fs::remove_dir_all(root).ok();
        }
        Ok(())
    }

    #[test]
    fn relative_cache_path_resolves_under_vault() {
        let store = JsonFileCacheStore::for_vault(Path::new("/vault"), ".vault-sync/cache.json");
        assert_eq!(store.path(), Path::new("/vault/.vault-sync/cache.json"));
        assert_eq!(store.describe().as_ref(), "/vault/.vault-sync/cache.json");
    }
}
