//! Change fingerprints.
//!
//! Fingerprints from different strategies are not comparable, so the
//! strategy is baked into the cache schema version.

use crate::PrimitiveError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Generation of the persisted cache layout, independent of the strategy.
pub const CACHE_SCHEMA_GENERATION: u32 = 3;

/// How a document fingerprint is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FingerprintStrategy {
    /// SHA-256 over the full document bytes.
    #[default]
    ContentDigest,
    /// Modification time and byte size, without reading content.
    MtimeSize,
}

impl FingerprintStrategy {
    /// Stable identifier used in config and env values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentDigest => "contentDigest",
            Self::MtimeSize => "mtimeSize",
        }
    }

    /// Parse a config/env value (case-insensitive, `-`/`_` tolerant).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let folded: String = value
            .trim()
            .chars()
            .filter(|ch| *ch != '-' && *ch != '_')
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "contentdigest" | "sha256" | "digest" => Some(Self::ContentDigest),
            "mtimesize" | "mtime" => Some(Self::MtimeSize),
            _ => None,
        }
    }

    /// Cache schema version for caches built with this strategy.
    #[must_use]
    pub fn cache_schema_version(self) -> String {
        let suffix = match self {
            Self::ContentDigest => "sha256",
            Self::MtimeSize => "mtime-size",
        };
        format!("{CACHE_SCHEMA_GENERATION}:{suffix}")
    }

    /// True when this strategy must read full document content.
    #[must_use]
    pub const fn reads_content(self) -> bool {
        matches!(self, Self::ContentDigest)
    }
}

impl fmt::Display for FingerprintStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Opaque change fingerprint of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Box<str>);

impl Fingerprint {
    /// Parse a stored fingerprint.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyFingerprint);
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Lower-case hex SHA-256 of `bytes`.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()).into_boxed_str())
    }

    /// `mtime:size` proxy fingerprint.
    #[must_use]
    pub fn proxy(modified_ms: u64, size_bytes: u64) -> Self {
        Self(format!("{modified_ms}:{size_bytes}").into_boxed_str())
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
