//! Output format flags and where progress goes for each format.

use clap::{Args, ValueEnum};

/// Output format choices for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-friendly `key: value` lines.
    Text,
    /// One pretty-printed JSON document.
    Json,
    /// Line-delimited JSON; progress events stream ahead of the summary line.
    Ndjson,
}

/// Output-related CLI flags.
#[derive(Debug, Args)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "CLI flags are intentionally boolean to keep UX predictable."
)]
pub struct OutputArgs {
    /// Output format for command responses.
    #[arg(long, global = true, value_enum)]
    pub output: Option<OutputFormat>,
    /// Machine-friendly defaults: NDJSON output and no progress.
    #[arg(long, global = true)]
    pub agent: bool,
    /// Suppress progress output.
    #[arg(long, global = true)]
    pub no_progress: bool,
    /// Emit engine log events as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
    /// Alias for `--output json`.
    #[arg(long, global = true, hide = true)]
    pub json: bool,
}

/// Stream that receives live progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTarget {
    /// `info:` lines on stderr.
    Stderr,
    /// `{"type":"event"}` lines on stdout.
    Stdout,
}

/// Output mode derived from CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    pub format: OutputFormat,
    pub no_progress: bool,
    pub log_json: bool,
}

impl OutputMode {
    /// Resolve flags; an explicit `--output` beats `--json`, which beats `--agent`.
    #[must_use]
    pub const fn from_args(args: &OutputArgs) -> Self {
        let format = if let Some(format) = args.output {
            format
        } else if args.json {
            OutputFormat::Json
        } else if args.agent {
            OutputFormat::Ndjson
        } else {
            OutputFormat::Text
        };

        Self {
            format,
            no_progress: args.agent || args.no_progress,
            log_json: args.log_json,
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    #[must_use]
    pub const fn is_ndjson(self) -> bool {
        matches!(self.format, OutputFormat::Ndjson)
    }

    /// `None` when progress is suppressed.
    #[must_use]
    pub const fn progress_target(self) -> Option<ProgressTarget> {
        if self.no_progress {
            None
        } else if self.is_ndjson() {
            Some(ProgressTarget::Stdout)
        } else {
            Some(ProgressTarget::Stderr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(output: Option<OutputFormat>, agent: bool, no_progress: bool) -> OutputArgs {
        OutputArgs {
            output,
            agent,
            no_progress,
            log_json: false,
            json: false,
        }
    }

    #[test]
    fn explicit_output_beats_agent_defaults() {
        let mode = OutputMode::from_args(&args(Some(OutputFormat::Text), true, false));
        assert_eq!(mode.format, OutputFormat::Text);
        assert!(mode.no_progress);
        assert_eq!(mode.progress_target(), None);
    }

    #[test]
    fn ndjson_streams_progress_on_stdout() {
        let mode = OutputMode::from_args(&args(Some(OutputFormat::Ndjson), false, false));
        assert_eq!(mode.progress_target(), Some(ProgressTarget::Stdout));

        let text = OutputMode::from_args(&args(None, false, false));
        assert_eq!(text.progress_target(), Some(ProgressTarget::Stderr));
    }
}
