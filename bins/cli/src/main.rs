//! `vsync` binary entrypoint.

mod commands;
mod error;
mod format;
mod tracing_setup;

use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{
    VaultInput, run_config_check, run_config_schema, run_config_show, run_index, run_status,
    run_watch,
};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode};
use std::io::{self, Write};
use std::path::PathBuf;
use vault_sync_infra::{ConfigRenderFormat, InfraError, is_secret_key};
use vault_sync_shared::ErrorKind;

#[derive(Debug, Parser)]
#[command(
    name = "vsync",
    version,
    about = "Keep a local document vault indexed in a remote search store",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Vault and config selection.
#[derive(Debug, Args)]
struct VaultArgs {
    /// Vault root (defaults to current directory).
    #[arg(long)]
    vault: Option<PathBuf>,
    /// Config file (JSON/TOML). Defaults to `.vault-sync/config.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON object merged over the config file.
    #[arg(long)]
    overrides_json: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one full index pass and exit.
    Index {
        #[command(flatten)]
        vault: VaultArgs,
    },
    /// Show index status from the local cache (no provider calls).
    Status {
        #[command(flatten)]
        vault: VaultArgs,
        /// Include the folder tree with per-document index state.
        #[arg(long)]
        tree: bool,
    },
    /// Watch the vault and sync changes until Ctrl-C.
    Watch {
        #[command(flatten)]
        vault: VaultArgs,
        /// Skip the full pass at startup; only sync new changes.
        #[arg(long)]
        no_initial_index: bool,
    },
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate the effective config.
    Check {
        #[command(flatten)]
        vault: VaultArgs,
    },
    /// Print the effective config.
    Show {
        #[command(flatten)]
        vault: VaultArgs,
        /// Rendering format.
        #[arg(long, value_enum, default_value_t = ConfigFormatArg::Json)]
        format: ConfigFormatArg,
    },
    /// Print the JSON Schema of the config file.
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfigFormatArg {
    Json,
    Toml,
}

impl From<ConfigFormatArg> for ConfigRenderFormat {
    fn from(value: ConfigFormatArg) -> Self {
        match value {
            ConfigFormatArg::Json => Self::Json,
            ConfigFormatArg::Toml => Self::Toml,
        }
    }
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);
    tracing_setup::init_subscriber();
    tracing::debug!(format = ?mode.format, "vsync starting");

    match run(&cli.command, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => output.exit_code.into(),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    error.exit_code().into()
}

fn run(command: &Commands, mode: OutputMode) -> Result<CliOutput, CliError> {
    match command {
        Commands::Index { vault } => run_index(mode, &vault_input(vault)?),
        Commands::Status { vault, tree } => run_status(mode, &vault_input(vault)?, *tree),
        Commands::Watch {
            vault,
            no_initial_index,
        } => run_watch(mode, &vault_input(vault)?, !no_initial_index),
        Commands::Config { command } => match command {
            ConfigCommands::Check { vault } => run_config_check(mode, &vault_input(vault)?),
            ConfigCommands::Show { vault, format } => {
                run_config_show(mode, &vault_input(vault)?, (*format).into())
            },
            ConfigCommands::Schema => run_config_schema(mode),
        },
    }
}

fn vault_input(args: &VaultArgs) -> Result<VaultInput, CliError> {
    let vault_root = match args.vault.as_ref() {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(CliError::InvalidFlag {
                flag: "--vault",
                reason: "cannot be empty",
            });
        },
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    Ok(VaultInput {
        vault_root,
        config_path: args.config.clone(),
        overrides_json: args.overrides_json.clone(),
    })
}

pub(crate) fn format_error_output(
    mode: OutputMode,
    error: &InfraError,
    exit_code: ExitCode,
) -> CliOutput {
    let error = sanitize_error(error);
    let payload = error_payload(&error);

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_error(&payload)
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "error",
            "error": payload,
        });

        // This is a CLI boundary, so JSON serialization errors are internal.
        let mut output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_string()
        });
        output.push('\n');
        output
    } else {
        format_error_text(&error)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code,
    }
}

pub(crate) const fn infra_exit_code(error: &InfraError) -> ExitCode {
    match error.kind {
        ErrorKind::Expected => ExitCode::InvalidInput,
        ErrorKind::Invariant | ErrorKind::Unexpected => ExitCode::Internal,
    }
}

fn sanitize_error(error: &InfraError) -> InfraError {
    let secret_keys: Vec<&str> = error
        .metadata
        .keys()
        .map(String::as_str)
        .filter(|key| is_secret_key(key))
        .collect();
    error.clone().redact_metadata(&secret_keys)
}

fn error_payload(error: &InfraError) -> serde_json::Value {
    serde_json::json!({
        "code": error.code.to_string(),
        "message": error.message,
        "kind": error.kind,
        "class": error.class,
        "meta": error.metadata,
    })
}

fn format_error_text(error: &InfraError) -> String {
    let mut out = String::new();
    out.push_str("status: error\n");
    out.push_str("code: ");
    out.push_str(&error.code.to_string());
    out.push('\n');
    out.push_str("message: ");
    out.push_str(&error.message);
    out.push('\n');
    out.push_str("kind: ");
    out.push_str(&error.kind.to_string());
    out.push('\n');

    if !error.metadata.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in &error.metadata {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    out
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

pub(crate) fn format_ndjson_summary(
    status: &str,
    kind: &str,
    extra: Option<serde_json::Value>,
) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "type".to_string(),
        serde_json::Value::String("summary".to_string()),
    );
    payload.insert(
        "status".to_string(),
        serde_json::Value::String(status.to_string()),
    );
    payload.insert(
        "kind".to_string(),
        serde_json::Value::String(kind.to_string()),
    );
    if let Some(serde_json::Value::Object(map)) = extra {
        for (key, value) in map {
            payload.insert(key, value);
        }
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_string()
    });
    out.push('\n');
    out
}

fn format_ndjson_error(error: &serde_json::Value) -> String {
    let payload = serde_json::json!({
        "type": "error",
        "status": "error",
        "error": error,
    });
    let mut out = serde_json::to_string(&payload).unwrap_or_else(|_| {
        "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_string()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;
    stdout.flush()?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}
