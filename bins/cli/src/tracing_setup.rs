//! Tracing subscriber initialization for the `vsync` binary.
//!
//! `VSYNC_LOG` holds `EnvFilter` directives (e.g. `vault_sync=debug,warn`);
//! unset or unparsable values fall back to `info`. Output goes to stderr so
//! stdout stays reserved for command results.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use vault_sync_ports::LogLevel;

/// Env var carrying log directives.
pub const ENV_LOG: &str = "VSYNC_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. A second call is a no-op.
pub fn init_subscriber() {
    let filter = build_env_filter(std::env::var(ENV_LOG).ok().as_deref());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn build_env_filter(directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = directives
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    EnvFilter::new(DEFAULT_DIRECTIVE)
}

/// Minimum level for the JSON engine logger, read from a bare `VSYNC_LOG`
/// level. Directive lists keep the default.
#[must_use]
pub fn json_min_level(directives: Option<&str>) -> LogLevel {
    match directives.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("trace" | "debug") => LogLevel::Debug,
        Some("warn") => LogLevel::Warn,
        Some("error") => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_directives_fall_back_to_info() {
        let filter = build_env_filter(Some("vault_sync=loud"));
        assert_eq!(filter.to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn explicit_directives_are_kept() {
        let filter = build_env_filter(Some("debug"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn json_level_follows_bare_levels_only() {
        assert_eq!(json_min_level(Some("DEBUG")), LogLevel::Debug);
        assert_eq!(json_min_level(Some("error")), LogLevel::Error);
        assert_eq!(json_min_level(Some("vault_sync=debug,warn")), LogLevel::Info);
        assert_eq!(json_min_level(None), LogLevel::Info);
    }
}
