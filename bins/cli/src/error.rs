//! CLI-level failures and process exit codes.

use std::fmt;

/// Process exit codes reported by `vsync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 0,
    Internal = 1,
    InvalidInput = 2,
    Io = 3,
    /// The run finished but some documents failed or it stopped early.
    Incomplete = 4,
}

impl ExitCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// `status` field printed with command summaries.
    #[must_use]
    pub const fn status_label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Incomplete => "incomplete",
            Self::Internal | Self::InvalidInput | Self::Io => "error",
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.as_u8())
    }
}

/// Failures raised before a command reaches the engine, or while writing its output.
#[derive(Debug)]
pub enum CliError {
    /// A flag value was rejected.
    InvalidFlag {
        flag: &'static str,
        reason: &'static str,
    },
    /// Reading the working directory or writing output failed.
    Io(std::io::Error),
    /// A response could not be rendered as JSON.
    Render(serde_json::Error),
}

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidFlag { .. } => ExitCode::InvalidInput,
            Self::Io(_) => ExitCode::Io,
            Self::Render(_) => ExitCode::Internal,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFlag { flag, reason } => write!(formatter, "{flag}: {reason}"),
            Self::Io(error) => write!(formatter, "io error: {error}"),
            Self::Render(error) => write!(formatter, "failed to render output: {error}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidFlag { .. } => None,
            Self::Io(error) => Some(error),
            Self::Render(error) => Some(error),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Render(error)
    }
}
