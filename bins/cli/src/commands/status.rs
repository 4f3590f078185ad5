//! Status command handler.

use crate::commands::{VaultInput, local_options};
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, infra_exit_code};
use vault_sync_domain::IndexTreeNode;
use vault_sync_infra::{VaultStatus, read_status_local};

/// Report index status from the persisted cache without contacting the provider.
pub fn run_status(
    mode: OutputMode,
    input: &VaultInput,
    include_tree: bool,
) -> Result<CliOutput, CliError> {
    let options = local_options(mode, input);
    match read_status_local(&input.vault_root, &options, include_tree) {
        Ok(status) => format_status_output(mode, &status),
        Err(error) => Ok(format_error_output(mode, &error, infra_exit_code(&error))),
    }
}

fn format_status_output(mode: OutputMode, status: &VaultStatus) -> Result<CliOutput, CliError> {
    let stdout = if mode.is_ndjson() {
        let payload = serde_json::json!({
            "type": "summary",
            "status": "ok",
            "kind": "status",
            "vault": status,
        });
        let mut out = serde_json::to_string(&payload)?;
        out.push('\n');
        out
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "ok",
            "vault": status,
        });
        let mut out = serde_json::to_string_pretty(&payload)?;
        out.push('\n');
        out
    } else {
        format_status_text(status)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn format_status_text(status: &VaultStatus) -> String {
    let mut out = String::new();
    out.push_str("status: ok\n");
    push_kv(&mut out, "vault", &status.vault_root.to_string_lossy());
    push_kv(&mut out, "cache", &status.cache_path.to_string_lossy());
    push_kv(&mut out, "cacheExists", bool_str(status.cache_exists));
    push_kv(
        &mut out,
        "schemaVersion",
        status.schema_version.as_deref().unwrap_or("<none>"),
    );
    push_kv(&mut out, "cacheCurrent", bool_str(status.cache_current));
    push_kv(
        &mut out,
        "storeId",
        status.store_id.as_ref().map_or("<none>", |id| id.as_str()),
    );
    push_kv(&mut out, "indexed", &status.indexed_count.to_string());
    if let Some(count) = status.not_indexed_count {
        push_kv(&mut out, "notIndexed", &count.to_string());
    }
    push_kv(&mut out, "lastFullSyncMs", &option_u64(status.last_full_sync_ms));
    if let Some(tree) = status.tree.as_ref() {
        out.push_str("tree:\n");
        write_tree(&mut out, tree, 1);
    }
    out
}

fn write_tree(out: &mut String, node: &IndexTreeNode, depth: usize) {
    match node {
        IndexTreeNode::Folder { name, children } => {
            let mut child_depth = depth;
            if !name.is_empty() {
                push_indent(out, depth);
                out.push_str(name);
                out.push_str("/\n");
                child_depth += 1;
            }
            for child in children {
                write_tree(out, child, child_depth);
            }
        },
        IndexTreeNode::Entry { name, .. } => {
            push_indent(out, depth);
            out.push_str(name);
            out.push_str(" [indexed]\n");
        },
        IndexTreeNode::Leaf { name } => {
            push_indent(out, depth);
            out.push_str(name);
            out.push_str(" [not indexed]\n");
        },
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn option_u64(value: Option<u64>) -> String {
    value.map_or_else(|| "<none>".to_string(), |value| value.to_string())
}

const fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[inline]
fn push_kv(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}
