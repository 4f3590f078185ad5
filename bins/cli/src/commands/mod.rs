//! Local CLI command handlers.

pub mod config;
pub mod index;
pub mod status;
pub mod watch;

pub use config::{run_config_check, run_config_schema, run_config_show};
pub use index::run_index;
pub use status::run_status;
pub use watch::run_watch;

use crate::format::{OutputMode, ProgressTarget};
use crate::tracing_setup::{ENV_LOG, json_min_level};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use vault_sync_domain::{ProgressEvent, RunState};
use vault_sync_infra::{LocalOptions, LogFormat, ProgressCallback, build_logger};

/// Config selection shared by the vault commands.
#[derive(Debug, Clone, Default)]
pub struct VaultInput {
    pub vault_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub overrides_json: Option<String>,
}

/// Infra options for a command: logger choice and live progress output.
pub(crate) fn local_options(mode: OutputMode, input: &VaultInput) -> LocalOptions {
    let logger = if mode.log_json {
        let level = json_min_level(std::env::var(ENV_LOG).ok().as_deref());
        build_logger(LogFormat::Json, level)
    } else {
        build_logger(LogFormat::Tracing, vault_sync_ports::LogLevel::Info)
    };

    LocalOptions {
        config_path: input.config_path.clone(),
        overrides_json: input.overrides_json.clone(),
        logger: Some(logger),
        on_progress: progress_callback(mode),
    }
}

fn progress_callback(mode: OutputMode) -> Option<ProgressCallback> {
    let callback: ProgressCallback = match mode.progress_target()? {
        ProgressTarget::Stdout => Arc::new(|event: &ProgressEvent| {
            if let Some(line) = format_event_ndjson(event) {
                let mut stdout = io::stdout().lock();
                let _ = stdout.write_all(line.as_bytes());
                let _ = stdout.flush();
            }
        }),
        ProgressTarget::Stderr => Arc::new(|event: &ProgressEvent| {
            if let Some(line) = format_event_text(event) {
                let _ = io::stderr().lock().write_all(line.as_bytes());
            }
        }),
    };
    Some(callback)
}

pub(crate) fn format_event_text(event: &ProgressEvent) -> Option<String> {
    let line = match event {
        ProgressEvent::Progress {
            phase,
            current,
            total,
            percentage,
        } => format!("progress: {phase} {current}/{total} ({percentage}%)"),
        ProgressEvent::State { state } => format!("state: {}", state_label(state)),
        ProgressEvent::DocumentIndexed { path, .. } => format!("indexed: {path}"),
        ProgressEvent::DocumentRemoved { path } => format!("removed: {path}"),
        ProgressEvent::DocumentFailed { failure } => format!(
            "failed: {} ({} after {} attempts)",
            failure.path, failure.error_message, failure.attempts
        ),
        ProgressEvent::RunCompleted { .. } => return None,
    };
    Some(format!("info: {line}\n"))
}

pub(crate) fn format_event_ndjson(event: &ProgressEvent) -> Option<String> {
    let payload = serde_json::json!({
        "type": "event",
        "event": event,
    });
    let mut out = serde_json::to_string(&payload).ok()?;
    out.push('\n');
    Some(out)
}

pub(crate) fn state_label(state: &RunState) -> String {
    match state {
        RunState::RateLimited { resume_at_ms } => {
            format!("{} (until {resume_at_ms})", state.label())
        },
        RunState::Error { reason } => format!("{} ({reason})", state.label()),
        _ => state.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_sync_domain::{DocumentPath, IndexResult};

    #[test]
    fn text_events_skip_run_completion() -> Result<(), Box<dyn std::error::Error>> {
        let indexed = ProgressEvent::DocumentRemoved {
            path: DocumentPath::parse("notes/old.md")?,
        };
        assert_eq!(
            format_event_text(&indexed).as_deref(),
            Some("info: removed: notes/old.md\n")
        );
        let progress = ProgressEvent::progress("full_run", 1, 4);
        assert_eq!(
            format_event_text(&progress).as_deref(),
            Some("info: progress: full_run 1/4 (25%)\n")
        );
        let done = ProgressEvent::RunCompleted {
            result: IndexResult::default(),
        };
        assert!(format_event_text(&done).is_none());
        Ok(())
    }

    #[test]
    fn ndjson_events_wrap_the_tagged_payload() -> Result<(), Box<dyn std::error::Error>> {
        let line = format_event_ndjson(&ProgressEvent::state(RunState::Paused))
            .ok_or("missing line")?;
        let value: serde_json::Value = serde_json::from_str(line.trim())?;
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"]["type"], "state");
        assert_eq!(value["event"]["state"]["status"], "paused");
        Ok(())
    }

    #[test]
    fn rate_limited_state_shows_resume_time() {
        let label = state_label(&RunState::RateLimited {
            resume_at_ms: 1_700,
        });
        assert_eq!(label, "rate_limited (until 1700)");
    }
}
