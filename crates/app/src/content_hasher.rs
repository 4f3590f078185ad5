//! Change fingerprints for vault documents.

use vault_sync_domain::{DocumentPath, Fingerprint, FingerprintStrategy};
use vault_sync_ports::{DocumentContent, DocumentStorePort};
use vault_sync_shared::{RequestContext, Result};

/// Fingerprint plus the content read to compute it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedDocument {
    /// Change fingerprint.
    pub fingerprint: Fingerprint,
    /// Content already read while hashing; `None` for metadata strategies.
    pub content: Option<DocumentContent>,
}

/// Computes fingerprints with one fixed strategy.
///
/// A cache generation is only ever compared against fingerprints from the
/// same strategy; the strategy is part of the cache schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentHasher {
    strategy: FingerprintStrategy,
}

impl ContentHasher {
    /// Hasher for `strategy`.
    #[must_use]
    pub const fn new(strategy: FingerprintStrategy) -> Self {
        Self { strategy }
    }

    /// Active strategy.
    #[must_use]
    pub const fn strategy(self) -> FingerprintStrategy {
        self.strategy
    }

    /// Cache schema version matching the active strategy.
    #[must_use]
    pub fn schema_version(self) -> String {
        self.strategy.cache_schema_version()
    }

    /// Fingerprint of already loaded content.
    #[must_use]
    pub fn fingerprint_content(content: &DocumentContent) -> Fingerprint {
        Fingerprint::digest(content.as_bytes())
    }

    /// Fingerprint the document at `path`.
    ///
    /// The digest strategy reads the document and hands the content back so
    /// an upload does not read it twice.
    pub async fn fingerprint(
        self,
        ctx: &RequestContext,
        documents: &dyn DocumentStorePort,
        path: &DocumentPath,
    ) -> Result<HashedDocument> {
        match self.strategy {
            FingerprintStrategy::ContentDigest => {
                let content = documents.read(ctx, path.clone()).await?;
                Ok(HashedDocument {
                    fingerprint: Self::fingerprint_content(&content),
                    content: Some(content),
                })
            },
            FingerprintStrategy::MtimeSize => {
                let stat = documents.stat(ctx, path.clone()).await?;
                Ok(HashedDocument {
                    fingerprint: Fingerprint::proxy(stat.modified_ms, stat.size_bytes),
                    content: None,
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_testkit::in_memory::InMemoryDocumentStore;

    fn path(value: &str) -> DocumentPath {
        DocumentPath::parse(value).expect("path")
    }

    #[tokio::test]
    async fn digest_is_stable_for_unchanged_content() -> Result<()> {
        let store = InMemoryDocumentStore::new();
        store.seed("a.md", "# title\n\nbody");
        let ctx = RequestContext::new_request();
        let hasher = ContentHasher::new(FingerprintStrategy::ContentDigest);

        let first = hasher.fingerprint(&ctx, &store, &path("a.md")).await?;
        let second = hasher.fingerprint(&ctx, &store, &path("a.md")).await?;
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.content, Some(DocumentContent::Text("# title\n\nbody".into())));

        store.seed("a.md", "# title\n\nbody!");
        let changed = hasher.fingerprint(&ctx, &store, &path("a.md")).await?;
        assert_ne!(first.fingerprint, changed.fingerprint);
        Ok(())
    }

    #[tokio::test]
    async fn proxy_strategy_does_not_read_content() -> Result<()> {
        let store = InMemoryDocumentStore::new();
        store.seed("a.md", "body");
        let ctx = RequestContext::new_request();
        let hasher = ContentHasher::new(FingerprintStrategy::MtimeSize);

        let hashed = hasher.fingerprint(&ctx, &store, &path("a.md")).await?;
        assert!(hashed.content.is_none());
        assert!(hashed.fingerprint.as_str().ends_with(":4"));
        assert_eq!(store.read_calls(), 0);
        Ok(())
    }

    #[test]
    fn schema_version_embeds_strategy() {
        assert_ne!(
            ContentHasher::new(FingerprintStrategy::ContentDigest).schema_version(),
            ContentHasher::new(FingerprintStrategy::MtimeSize).schema_version()
        );
    }
}
