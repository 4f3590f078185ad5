//! # vault-sync-ports
//!
//! Port traits for the vault-sync hexagonal architecture.
//!
//! This crate defines the interfaces between the engine and its
//! collaborators. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod cache_store;
pub mod document_store;
pub mod logger;
pub mod provider;

pub use cache_store::*;
pub use document_store::*;
pub use logger::*;
pub use provider::*;
