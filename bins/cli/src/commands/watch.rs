//! Watch command handler.

use crate::commands::index::index_exit_code;
use crate::commands::{VaultInput, local_options, state_label};
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, infra_exit_code, log_info};
use std::io::{self, Write};
use vault_sync_infra::{WatchOptions, WatchSummary, run_watch_local};

/// Keep the vault in sync until Ctrl-C.
pub fn run_watch(
    mode: OutputMode,
    input: &VaultInput,
    initial_index: bool,
) -> Result<CliOutput, CliError> {
    let options = local_options(mode, input);
    if !mode.no_progress && !mode.is_ndjson() {
        let _ = writeln!(
            io::stderr(),
            "info: watching {} (Ctrl-C to stop)",
            input.vault_root.display()
        );
    }

    match run_watch_local(&input.vault_root, &options, WatchOptions { initial_index }) {
        Ok(summary) => format_watch_output(mode, &summary),
        Err(error) => Ok(format_error_output(mode, &error, infra_exit_code(&error))),
    }
}

fn watch_exit_code(summary: &WatchSummary) -> ExitCode {
    let initial = summary
        .initial_run
        .as_ref()
        .map_or(ExitCode::Ok, index_exit_code);
    if initial == ExitCode::Ok && summary.final_status.failed_count == 0 {
        ExitCode::Ok
    } else {
        ExitCode::Incomplete
    }
}

fn format_watch_output(mode: OutputMode, summary: &WatchSummary) -> Result<CliOutput, CliError> {
    let exit_code = watch_exit_code(summary);
    let status = exit_code.status_label();

    let stdout = if mode.is_ndjson() {
        let payload = serde_json::json!({
            "type": "summary",
            "status": status,
            "kind": "watch",
            "initialRun": summary.initial_run,
            "finalStatus": summary.final_status,
        });
        let mut out = serde_json::to_string(&payload)?;
        out.push('\n');
        out
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": status,
            "initialRun": summary.initial_run,
            "finalStatus": summary.final_status,
        });
        let mut out = serde_json::to_string_pretty(&payload)?;
        out.push('\n');
        out
    } else {
        format_watch_text(status, summary)
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "watch stopped", mode.no_progress);

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code,
    })
}

fn format_watch_text(status: &str, summary: &WatchSummary) -> String {
    let final_status = &summary.final_status;
    let mut out = format!("status: {status}\n");
    if let Some(initial) = summary.initial_run.as_ref() {
        out.push_str(&format!(
            "initialIndexed: {}\ninitialSkipped: {}\ninitialFailed: {}\n",
            initial.indexed, initial.skipped, initial.failed
        ));
    }
    out.push_str(&format!(
        "state: {}\nindexed: {}\npending: {}\nfailed: {}\n",
        state_label(&final_status.state),
        final_status.indexed_count,
        final_status.pending_count,
        final_status.failed_count,
    ));
    for failure in &final_status.recent_failures {
        out.push_str(&format!(
            "  failure: {} ({})\n",
            failure.path, failure.error_message
        ));
    }
    out
}
