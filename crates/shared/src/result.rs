//! Workspace result alias and combinators.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for attaching context to envelope errors.
pub trait ResultExt<T> {
    /// Attach a metadata entry to the error, if any.
    #[must_use]
    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Self;

    /// Replace the error message while keeping code, class and metadata.
    #[must_use]
    fn context(self, message: impl Into<String>) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Self {
        self.map_err(|error| error.with_metadata(key, value))
    }

    fn context(self, message: impl Into<String>) -> Self {
        self.map_err(|mut error| {
            let detail = std::mem::take(&mut error.message);
            error.message = format!("{}: {detail}", message.into());
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCode, ErrorEnvelope};

    #[test]
    fn with_error_metadata_leaves_ok_untouched() {
        let value: Result<i32> = Ok(1);
        assert!(matches!(value.with_error_metadata("path", "a.md"), Ok(1)));
    }

    #[test]
    fn with_error_metadata_tags_errors() {
        let value: Result<i32> = Err(ErrorEnvelope::expected(ErrorCode::io(), "disk"));
        let Err(error) = value.with_error_metadata("path", "a.md") else {
            panic!("expected error");
        };
        assert_eq!(error.metadata_value("path"), Some("a.md"));
    }

    #[test]
    fn context_prefixes_message() {
        let value: Result<()> = Err(ErrorEnvelope::expected(ErrorCode::io(), "denied"));
        let Err(error) = value.context("persist cache") else {
            panic!("expected error");
        };
        assert_eq!(error.message, "persist cache: denied");
        assert_eq!(error.code, ErrorCode::io());
    }
}
