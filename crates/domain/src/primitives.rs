//! Domain primitives with validated constructors.

use serde::{Deserialize, Serialize};
use std::fmt;
use vault_sync_shared::{ErrorCode, ErrorEnvelope};

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `DocumentPath` is empty after normalization.
    EmptyDocumentPath {
        /// Length of the raw input.
        input_length: usize,
    },
    /// `DocumentPath` is absolute or escapes the vault root.
    DocumentPathOutsideVault {
        /// Normalized input that failed validation.
        input: String,
    },
    /// An identifier (`StoreId`, `RemoteResourceId`, ...) is empty after trimming.
    EmptyIdentifier {
        /// Which identifier failed.
        kind: &'static str,
        /// Length of the raw input.
        input_length: usize,
    },
    /// `Fingerprint` is empty after trimming.
    EmptyFingerprint,
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyDocumentPath { .. } | Self::DocumentPathOutsideVault { .. } => {
                ErrorCode::new("domain", "invalid_document_path")
            },
            Self::EmptyIdentifier { .. } => ErrorCode::new("domain", "invalid_identifier"),
            Self::EmptyFingerprint => ErrorCode::new("domain", "invalid_fingerprint"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDocumentPath { .. } => formatter.write_str("DocumentPath must be non-empty"),
            Self::DocumentPathOutsideVault { input } => {
                write!(formatter, "DocumentPath must stay inside the vault: {input}")
            },
            Self::EmptyIdentifier { kind, .. } => write!(formatter, "{kind} must be non-empty"),
            Self::EmptyFingerprint => formatter.write_str("Fingerprint must be non-empty"),
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::EmptyDocumentPath { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::DocumentPathOutsideVault { input } => {
                envelope.with_metadata("input", input)
            },
            PrimitiveError::EmptyIdentifier { kind, input_length } => envelope
                .with_metadata("identifier", kind)
                .with_metadata("input_length", input_length.to_string()),
            PrimitiveError::EmptyFingerprint => envelope,
        }
    }
}

/// Vault-relative document path using `/` separators.
///
/// Normalization converts `\` to `/`, drops `.` and empty segments, and
/// rejects absolute paths and `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(Box<str>);

impl DocumentPath {
    /// Parse and normalize a vault-relative path.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let unified = raw.trim().replace('\\', "/");
        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(PrimitiveError::DocumentPathOutsideVault { input: unified });
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {},
                ".." => return Err(PrimitiveError::DocumentPathOutsideVault { input: unified }),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PrimitiveError::EmptyDocumentPath {
                input_length: raw.len(),
            });
        }

        Ok(Self(segments.join("/").into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the underlying string.
    #[must_use]
    pub fn into_inner(self) -> Box<str> {
        self.0
    }

    /// Path segments from the vault root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Final path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Lower-cased extension of the final segment, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, extension) = name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }
}

fn has_drive_prefix(input: &str) -> bool {
    let bytes = input.as_bytes();
    matches!(bytes, [letter, b':', ..] if letter.is_ascii_alphabetic())
}

impl TryFrom<String> for DocumentPath {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentPath> for String {
    fn from(value: DocumentPath) -> Self {
        value.0.into_string()
    }
}

impl AsRef<str> for DocumentPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

macro_rules! trimmed_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Box<str>);

        impl $name {
            /// Parse from input; surrounding whitespace is trimmed.
            pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
                let raw = input.as_ref();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(PrimitiveError::EmptyIdentifier {
                        kind: $label,
                        input_length: raw.len(),
                    });
                }
                Ok(Self(trimmed.to_owned().into_boxed_str()))
            }

            /// Access the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }
    };
}

trimmed_identifier!(
    /// Human-readable name of the remote store backing a vault.
    StoreName,
    "StoreName"
);
trimmed_identifier!(
    /// Provider-assigned identifier of the remote store.
    StoreId,
    "StoreId"
);
trimmed_identifier!(
    /// Provider-assigned identifier of one uploaded document.
    RemoteResourceId,
    "RemoteResourceId"
);
trimmed_identifier!(
    /// Handle of an asynchronous provider operation.
    OperationHandle,
    "OperationHandle"
);
