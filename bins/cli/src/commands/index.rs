//! Index command handler.

use crate::commands::{VaultInput, local_options};
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, infra_exit_code, log_info};
use vault_sync_domain::IndexResult;
use vault_sync_infra::run_index_local;

/// Run one full index pass over the vault.
pub fn run_index(mode: OutputMode, input: &VaultInput) -> Result<CliOutput, CliError> {
    let options = local_options(mode, input);
    match run_index_local(&input.vault_root, &options) {
        Ok(result) => format_index_output(mode, &result),
        Err(error) => Ok(format_error_output(mode, &error, infra_exit_code(&error))),
    }
}

pub(crate) fn index_exit_code(result: &IndexResult) -> ExitCode {
    if result.failed > 0 || result.stopped_early {
        ExitCode::Incomplete
    } else {
        ExitCode::Ok
    }
}

fn format_index_output(mode: OutputMode, result: &IndexResult) -> Result<CliOutput, CliError> {
    let exit_code = index_exit_code(result);
    let status = exit_code.status_label();

    let stdout = if mode.is_ndjson() {
        let payload = serde_json::json!({
            "type": "summary",
            "status": status,
            "kind": "index",
            "result": result,
        });
        let mut out = serde_json::to_string(&payload)?;
        out.push('\n');
        out
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": status,
            "result": result,
        });
        let mut out = serde_json::to_string_pretty(&payload)?;
        out.push('\n');
        out
    } else {
        format_index_text(status, result)
    };

    let mut stderr = String::new();
    if result.stopped_early {
        log_info(&mut stderr, "index run stopped before the end", mode.no_progress);
    }

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code,
    })
}

fn format_index_text(status: &str, result: &IndexResult) -> String {
    format!(
        "status: {status}\nindexed: {}\nskipped: {}\nfailed: {}\nremoved: {}\nstoppedEarly: {}\ndurationMs: {}\n",
        result.indexed,
        result.skipped,
        result.failed,
        result.removed,
        result.stopped_early,
        result.duration_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_make_the_run_incomplete() {
        let clean = IndexResult {
            indexed: 3,
            ..IndexResult::default()
        };
        assert_eq!(index_exit_code(&clean), ExitCode::Ok);

        let failed = IndexResult {
            failed: 1,
            ..clean
        };
        assert_eq!(index_exit_code(&failed), ExitCode::Incomplete);

        let cancelled = IndexResult {
            stopped_early: true,
            ..clean
        };
        assert_eq!(index_exit_code(&cancelled), ExitCode::Incomplete);
    }

    #[test]
    fn text_summary_lists_every_count() {
        let result = IndexResult {
            indexed: 4,
            skipped: 1,
            ..IndexResult::default()
        };
        let text = format_index_text("ok", &result);
        assert!(text.starts_with("status: ok\n"));
        assert!(text.contains("indexed: 4\n"));
        assert!(text.contains("skipped: 1\n"));
        assert!(text.contains("stoppedEarly: false\n"));
    }
}
