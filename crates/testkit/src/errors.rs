//! Error fixtures shared by engine and adapter tests.

use std::time::Duration;
use vault_sync_ports::provider_error;
use vault_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Error codes tests commonly assert on.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::not_found(),
        ErrorCode::timeout(),
        ErrorCode::io(),
        ErrorCode::internal(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// Transient network failure.
pub fn transient_error() -> ErrorEnvelope {
    provider_error::connection("connection reset by peer")
}

/// Truncated provider response.
pub fn malformed_response_error() -> ErrorEnvelope {
    provider_error::invalid_response("unexpected end of JSON input")
}

/// Provider rate limit, optionally with a retry hint.
pub fn rate_limited_error(retry_after: Option<Duration>) -> ErrorEnvelope {
    provider_error::rate_limited("quota exceeded", retry_after)
}

/// Rejected credentials.
pub fn auth_error() -> ErrorEnvelope {
    provider_error::auth("invalid api key")
}

/// Permanent validation failure.
pub fn invalid_request_error() -> ErrorEnvelope {
    provider_error::invalid_request("document rejected")
}

/// A retriable timeout error fixture.
pub fn timeout_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
}
