//! Document store boundary contract.

use crate::BoxFuture;
use vault_sync_domain::DocumentPath;
use vault_sync_shared::{RequestContext, Result};

/// Document body as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Valid UTF-8 text.
    Text(Box<str>),
    /// Anything else.
    Binary(Vec<u8>),
}

impl DocumentContent {
    /// Classify raw bytes by UTF-8 validity.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text.into_boxed_str()),
            Err(error) => Self::Binary(error.into_bytes()),
        }
    }

    /// Raw bytes of the content.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True when the content has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes ignoring surrounding whitespace for text.
    #[must_use]
    pub fn meaningful_len(&self) -> usize {
        match self {
            Self::Text(text) => text.trim().len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// True for binary content.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// Metadata used by proxy fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStat {
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time (epoch ms).
    pub modified_ms: u64,
}

/// Boundary contract for the vault that owns the documents.
///
/// Change notifications are pushed onto a channel by the store adapter; this
/// trait only covers pull-style access.
pub trait DocumentStorePort: Send + Sync {
    /// Every currently indexable document, in a deterministic order.
    fn enumerate(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<DocumentPath>>>;

    /// Read a document's content.
    fn read(&self, ctx: &RequestContext, path: DocumentPath)
    -> BoxFuture<'_, Result<DocumentContent>>;

    /// Read size and modification time.
    fn stat(&self, ctx: &RequestContext, path: DocumentPath) -> BoxFuture<'_, Result<DocumentStat>>;

    /// Extension/location policy check; does not touch the filesystem.
    fn should_index(&self, path: &DocumentPath) -> bool;
}
