//! CLI integration tests.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};
use vault_sync_testkit::fixtures::{basic_vault_root, fixture_path};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vsync() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_vsync"));
    for (key, _) in std::env::vars() {
        if key.starts_with("VSYNC_") {
            command.env_remove(key);
        }
    }
    command
}

fn run_cli(args: &[&str]) -> std::io::Result<Output> {
    vsync().args(args).output()
}

fn stdout_json(output: &Output) -> std::io::Result<serde_json::Value> {
    serde_json::from_slice(&output.stdout).map_err(std::io::Error::other)
}

fn temp_dir(label: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("vsync-cli-{label}-{unique}"));
    std::fs::create_dir_all(&dir).expect("temp dir");
    dir
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("create dir");
    for entry in std::fs::read_dir(from).expect("read dir") {
        let entry = entry.expect("dir entry");
        let target = to.join(entry.file_name());
        if entry.file_type().expect("file type").is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).expect("copy file");
        }
    }
}

fn vault_copy(label: &str) -> PathBuf {
    let root = temp_dir(label).join("vault");
    copy_dir(&basic_vault_root(), &root);
    root
}

#[test]
fn cli_version_runs() -> std::io::Result<()> {
    let output = run_cli(&["--version"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "--version failed: {stderr}");
    assert!(stdout.starts_with("vsync "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn config_check_runs_on_valid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/engine-config.valid.json");
    let output = run_cli(&["config", "check", "--config", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config check failed: {stderr}");
    assert!(stdout.contains("status: ok"));
    Ok(())
}

#[test]
fn config_check_fails_on_invalid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/engine-config.invalid.json");
    let output = run_cli(&["config", "check", "--config", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(2));
    assert!(stdout.contains("status: error"));
    Ok(())
}

#[test]
fn config_check_env_overrides_win() -> std::io::Result<()> {
    let path = fixture_path("config/engine-config.valid.json");
    let output = vsync()
        .args(["--output", "json", "config", "check", "--config"])
        .arg(path)
        .env("VSYNC_DEBOUNCE_MS", "750")
        .output()?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    let debounce = value
        .pointer("/effectiveConfig/watch/debounceMs")
        .and_then(serde_json::Value::as_u64);
    assert_eq!(debounce, Some(750));
    let store = value
        .pointer("/effectiveConfig/store/name")
        .and_then(serde_json::Value::as_str);
    assert_eq!(store, Some("research-notes"));
    Ok(())
}

#[test]
fn config_show_renders_toml() -> std::io::Result<()> {
    let vault = vault_copy("show-toml");
    let output = run_cli(&[
        "config",
        "show",
        "--vault",
        vault.to_string_lossy().as_ref(),
        "--format",
        "toml",
    ])?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[store]"));
    assert!(stdout.contains("[rateLimit]"));
    Ok(())
}

#[test]
fn config_schema_prints_json_schema() -> std::io::Result<()> {
    let output = run_cli(&["config", "schema"])?;
    assert!(output.status.success());
    let value = stdout_json(&output)?;
    assert!(value.pointer("/properties/provider").is_some());
    Ok(())
}

#[test]
fn status_lists_the_tree_before_any_index() -> std::io::Result<()> {
    let vault = vault_copy("status-tree");
    let output = run_cli(&[
        "--output",
        "json",
        "status",
        "--vault",
        vault.to_string_lossy().as_ref(),
        "--tree",
    ])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(
        value.pointer("/vault/cacheExists").and_then(serde_json::Value::as_bool),
        Some(false)
    );
    assert_eq!(
        value.pointer("/vault/notIndexedCount").and_then(serde_json::Value::as_u64),
        Some(5)
    );
    assert_eq!(
        value.pointer("/vault/tree/kind").and_then(serde_json::Value::as_str),
        Some("folder")
    );
    Ok(())
}

#[test]
fn status_on_a_missing_vault_exits_with_invalid_input() -> std::io::Result<()> {
    let missing = temp_dir("missing").join("nope");
    let output = run_cli(&[
        "--output",
        "ndjson",
        "status",
        "--vault",
        missing.to_string_lossy().as_ref(),
    ])?;

    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(value.get("type").and_then(serde_json::Value::as_str), Some("error"));
    Ok(())
}

#[test]
fn index_uploads_through_the_rest_provider() -> std::io::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/stores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stores": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/stores"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "id": "store-7", "name": "vault" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/stores/store-7/documents"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "operation": "op-7" })))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/operations/op-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": true, "resourceId": "docs/7"
            })))
            .mount(&server)
            .await;
        server
    });

    let vault = vault_copy("index");
    let overrides = json!({
        "store": { "name": "vault" },
        "upload": { "pollInitialMs": 10, "pollMaxMs": 20 },
    })
    .to_string();
    let output = vsync()
        .args(["--output", "json", "--no-progress", "index", "--vault"])
        .arg(&vault)
        .args(["--overrides-json", overrides.as_str()])
        .env("VSYNC_PROVIDER_BASE_URL", format!("{}/v1", server.uri()))
        .env("VSYNC_PROVIDER_API_KEY", "test-key")
        .output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "index failed: {stderr}");
    assert!(!stderr.contains("test-key"));

    let value = stdout_json(&output)?;
    assert_eq!(
        value.pointer("/result/indexed").and_then(serde_json::Value::as_u64),
        Some(4)
    );
    assert_eq!(
        value.pointer("/result/skipped").and_then(serde_json::Value::as_u64),
        Some(1)
    );

    let status = run_cli(&[
        "--output",
        "json",
        "status",
        "--vault",
        vault.to_string_lossy().as_ref(),
    ])?;
    let value = stdout_json(&status)?;
    assert_eq!(
        value.pointer("/vault/storeId").and_then(serde_json::Value::as_str),
        Some("store-7")
    );
    assert_eq!(
        value.pointer("/vault/indexedCount").and_then(serde_json::Value::as_u64),
        Some(4)
    );

    drop(server);
    drop(runtime);
    Ok(())
}
