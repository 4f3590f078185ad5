//! Filesystem-backed document store.

use crate::policy::DocumentPolicy;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use vault_sync_domain::DocumentPath;
use vault_sync_ports::{BoxFuture, DocumentContent, DocumentStat, DocumentStorePort};
use vault_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, ResultExt};

/// Document store over a local vault directory.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
    policy: DocumentPolicy,
}

impl LocalDocumentStore {
    /// Store rooted at `root` applying `policy`.
    #[must_use]
    pub const fn new(root: PathBuf, policy: DocumentPolicy) -> Self {
        Self { root, policy }
    }

    /// Vault root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexability policy.
    #[must_use]
    pub const fn policy(&self) -> &DocumentPolicy {
        &self.policy
    }

    fn full_path(&self, path: &DocumentPath) -> PathBuf {
        path.segments()
            .fold(self.root.clone(), |full, segment| full.join(segment))
    }

    async fn walk(&self, ctx: &RequestContext) -> Result<Vec<DocumentPath>> {
        let mut documents = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::from([String::new()]);

        while let Some(relative_dir) = queue.pop_front() {
            ctx.ensure_not_cancelled("document_store.enumerate")?;
            let dir = if relative_dir.is_empty() {
                self.root.clone()
            } else {
                self.root.join(&relative_dir)
            };

            let mut entries = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("dir", dir.display().to_string())?;
            while let Some(entry) = read_dir.next_entry().await.map_err(ErrorEnvelope::from)? {
                let file_type = entry.file_type().await.map_err(ErrorEnvelope::from)?;
                let name = entry.file_name().to_string_lossy().into_owned();
                entries.push((name, file_type, entry.path()));
            }
            entries.sort_by(|left, right| left.0.cmp(&right.0));

            for (name, file_type, full_path) in entries {
                let relative = if relative_dir.is_empty() {
                    name
                } else {
                    format!("{relative_dir}/{name}")
                };
                if file_type.is_dir() {
                    if !self.policy.skips_directory(&relative) {
                        queue.push_back(relative);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Ok(path) = DocumentPath::parse(&relative) else {
                    continue;
                };
                if !self.policy.should_index(&path) {
                    continue;
                }
                let size = tokio::fs::metadata(&full_path)
                    .await
                    .map(|metadata| metadata.len())
                    .unwrap_or(u64::MAX);
                if size <= self.policy.max_file_size_bytes() {
                    documents.push(path);
                }
            }
            tokio::task::yield_now().await;
        }

        Ok(documents)
    }
}

impl DocumentStorePort for LocalDocumentStore {
    fn enumerate(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<DocumentPath>>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.walk(&ctx).await })
    }

    fn read(
        &self,
        ctx: &RequestContext,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<DocumentContent>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("document_store.read")?;
            let full_path = self.full_path(&path);
            let metadata = tokio::fs::metadata(&full_path)
                .await
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("path", path.as_str())?;
            if !metadata.is_file() {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::new("store", "not_a_file"),
                    "document path is not a file",
                )
                .with_metadata("path", path.as_str()));
            }
            if metadata.len() > self.policy.max_file_size_bytes() {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::new("store", "document_too_large"),
                    "document exceeds max file size",
                )
                .with_metadata("path", path.as_str())
                .with_metadata("sizeBytes", metadata.len().to_string()));
            }

            let bytes = tokio::fs::read(&full_path)
                .await
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("path", path.as_str())?;
            Ok(DocumentContent::from_bytes(bytes))
        })
    }

    fn stat(&self, ctx: &RequestContext, path: DocumentPath) -> BoxFuture<'_, Result<DocumentStat>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("document_store.stat")?;
            let metadata = tokio::fs::metadata(self.full_path(&path))
                .await
                .map_err(ErrorEnvelope::from)
                .with_error_metadata("path", path.as_str())?;
            let modified_ms = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
                .unwrap_or(0);
            Ok(DocumentStat {
                size_bytes: metadata.len(),
                modified_ms,
            })
        })
    }

    fn should_index(&self, path: &DocumentPath) -> bool {
        self.policy.should_index(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("vsync_fs_{name}_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&root).expect("create scratch dir");
        root
    }

    fn write(root: &Path, relative: &str, body: &[u8]) {
        let full = root.join(relative);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(full, body).expect("write file");
    }

    fn policy(max: u64) -> DocumentPolicy {
        DocumentPolicy::new(["md", "pdf"], [".obsidian/", "drafts"], max)
    }

    #[tokio::test]
    async fn enumerates_breadth_first_in_name_order() -> Result<()> {
        let root = scratch_dir("enumerate");
        write(&root, "b.md", b"b");
        write(&root, "a.md", b"a");
        write(&root, "notes/z.md", b"z");
        write(&root, "notes/deep/c.md", b"c");
        write(&root, "notes/image.png", b"png");
        write(&root, ".obsidian/workspace.md", b"ignored");
        write(&root, "drafts/todo.md", b"ignored");
        write(&root, "big.pdf", &[0_u8; 64]);

        let store = LocalDocumentStore::new(root.clone(), policy(32));
        let paths = store.enumerate(&RequestContext::new_request()).await?;
        let paths: Vec<&str> = paths.iter().map(DocumentPath::as_str).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "notes/z.md", "notes/deep/c.md"]);

        fs::remove_dir_all(root).ok();
        Ok(())
    }

    #[tokio::test]
    async fn read_classifies_text_and_binary() -> Result<()> {
        let root = scratch_dir("read");
        write(&root, "note.md", "# héllo".as_bytes());
        write(&root, "scan.pdf", &[0x25, 0x50, 0xff, 0xfe]);
        let store = LocalDocumentStore::new(root.clone(), policy(1024));
        let ctx = RequestContext::new_request();

        let text = store.read(&ctx, DocumentPath::parse("note.md")?).await?;
        assert_eq!(text, DocumentContent::Text("# héllo".into()));
        let binary = store.read(&ctx, DocumentPath::parse("scan.pdf")?).await?;
        assert!(binary.is_binary());

        let stat = store.stat(&ctx, DocumentPath::parse("scan.pdf")?).await?;
        assert_eq!(stat.size_bytes, 4);
        assert!(stat.modified_ms > 0);

        fs::remove_dir_all(root).ok();
        Ok(())
    }

    #[tokio::test]
    async fn read_rejects_oversized_and_missing_documents() -> Result<()> {
        let root = scratch_dir("limits");
        write(&root, "big.md", &[b'x'; 16]);
        let store = LocalDocumentStore::new(root.clone(), policy(8));
        let ctx = RequestContext::new_request();

        let error = store
            .read(&ctx, DocumentPath::parse("big.md")?)
            .await
            .expect_err("oversized");
        assert_eq!(error.code, ErrorCode::new("store", "document_too_large"));

        let error = store
            .read(&ctx, DocumentPath::parse("gone.md")?)
            .await
            .expect_err("missing");
        assert_eq!(error.code, ErrorCode::not_found());
        assert_eq!(error.metadata_value("path"), Some("gone.md"));

        fs::remove_dir_all(root).ok();
        Ok(())
    }

    #[tokio::test]
    async fn enumerate_honours_cancellation() {
        let root = scratch_dir("cancel");
        write(&root, "a.md", b"a");
        let store = LocalDocumentStore::new(root.clone(), policy(1024));
        let ctx = RequestContext::new_request();
        ctx.cancel();

        let error = store.enumerate(&ctx).await.expect_err("cancelled");
        assert!(error.is_cancelled());
        fs::remove_dir_all(root).ok();
    }
}
