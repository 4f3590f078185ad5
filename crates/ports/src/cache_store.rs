//! Persistence contract for the index cache record.

use crate::BoxFuture;
use vault_sync_shared::{RequestContext, Result};

/// Byte-level storage for the serialized cache record.
///
/// `store` must be atomic: readers observe either the previous bytes or the
/// new bytes, never a partial write.
pub trait CacheStorePort: Send + Sync {
    /// Load the stored bytes; `None` when nothing was persisted yet.
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<Vec<u8>>>>;

    /// Replace the stored bytes.
    fn store(&self, ctx: &RequestContext, bytes: Vec<u8>) -> BoxFuture<'_, Result<()>>;

    /// Human-readable location for logs.
    fn describe(&self) -> Box<str>;
}
