//! Advisory lock keeping one engine per cache file.

use crate::InfraResult;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use vault_sync_shared::{ErrorCode, ErrorEnvelope, ResultExt};

/// Exclusive lock held next to the index cache while an engine runs.
///
/// The lock is released when the guard is dropped or the process exits.
#[derive(Debug)]
pub struct VaultLock {
    file: File,
    path: PathBuf,
}

impl VaultLock {
    /// Lock file guarding `cache_path`.
    #[must_use]
    pub fn path_for(cache_path: &Path) -> PathBuf {
        cache_path.with_extension("lock")
    }

    /// Take the lock without waiting; fails with `vault:locked` when held.
    pub fn acquire(cache_path: &Path) -> InfraResult<Self> {
        let path = Self::path_for(cache_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("path", parent.display().to_string())?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(ErrorEnvelope::from)
            .with_error_metadata("path", path.display().to_string())?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("vault", "locked"),
                "another vsync process is using this vault",
            )
            .with_metadata("lockPath", path.display().to_string()));
        }
        tracing::debug!(lock = %path.display(), "vault lock acquired");
        Ok(Self { file, path })
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("vsync-lock-{label}-{unique}"));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn second_holder_is_refused_until_release() -> InfraResult<()> {
        let cache = temp_dir("exclusive").join(".vault-sync/index-cache.json");
        let first = VaultLock::acquire(&cache)?;
        assert!(first.path().ends_with("index-cache.lock"));

        let error = VaultLock::acquire(&cache).expect_err("lock is held");
        assert_eq!(error.code, ErrorCode::new("vault", "locked"));

        drop(first);
        let _again = VaultLock::acquire(&cache)?;
        Ok(())
    }
}
