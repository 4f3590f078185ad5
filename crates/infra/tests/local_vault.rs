//! Local entry points against a temp copy of the fixture vault.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use vault_sync_domain::ProgressEvent;
use vault_sync_infra::{
    InfraResult, LocalOptions, VaultLock, WatchOptions, read_status_local, run_index_local,
    run_index_local_with_provider, run_watch_local_until,
};
use vault_sync_shared::ErrorCode;
use vault_sync_testkit::fixtures::basic_vault_root;
use vault_sync_testkit::in_memory::ScriptedIndexProvider;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn temp_dir(label: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("vsync-infra-{label}-{unique}"));
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

fn fast_polling(base_url: Option<&str>) -> LocalOptions {
    let mut overrides = json!({
        "store": { "name": "vault" },
        "upload": { "pollInitialMs": 10, "pollMaxMs": 20 },
    });
    if let Some(base_url) = base_url {
        overrides["provider"] = json!({ "baseUrl": base_url });
    }
    LocalOptions {
        overrides_json: Some(overrides.to_string()),
        ..LocalOptions::default()
    }
}

async fn mount_provider(server: &MockServer, expected_uploads: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/stores"))
        .and(query_param("name", "vault"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stores": [{ "id": "store-1", "name": "vault" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/stores/store-1/documents"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "operation": "op-1" })))
        .expect(expected_uploads)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true, "resourceId": "docs/1"
        })))
        .mount(server)
        .await;
}

#[test]
fn index_over_http_then_status_reads_the_cache() -> InfraResult<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let server = runtime.block_on(MockServer::start());
    runtime.block_on(mount_provider(&server, 4));
    let vault = vault_copy("http-index");
    let options = fast_polling(Some(&format!("{}/v1", server.uri())));

    let result = run_index_local(&vault, &options)?;
    assert_eq!(result.indexed, 4);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
    assert!(!result.stopped_early);

    // Nothing changed, so the second pass uploads nothing.
    let again = run_index_local(&vault, &options)?;
    assert_eq!(again.indexed, 0);
    assert_eq!(again.skipped, 5);

    let status = read_status_local(&vault, &options, true)?;
    assert!(status.cache_exists);
    assert!(status.cache_current);
    assert_eq!(status.store_id.as_ref().map(|id| id.as_str()), Some("store-1"));
    assert_eq!(status.indexed_count, 4);
    assert_eq!(status.not_indexed_count, Some(1));
    assert!(status.last_full_sync_ms.is_some());
    assert!(vault.join(".vault-sync/index-cache.json").is_file());

    drop(runtime);
    Ok(())
}

#[test]
fn status_without_a_cache_is_empty() -> InfraResult<()> {
    let vault = vault_copy("status-empty");
    let status = read_status_local(&vault, &LocalOptions::default(), false)?;
    assert!(!status.cache_exists);
    assert!(status.cache_current);
    assert_eq!(status.indexed_count, 0);
    assert!(status.tree.is_none());
    Ok(())
}

#[test]
fn status_flags_a_cache_from_another_strategy() -> InfraResult<()> {
    let vault = vault_copy("status-stale");
    let cache = json!({
        "schemaVersion": "3:mtime-size",
        "storeId": "store-9",
        "lastFullSyncMs": 1_700_000_000_000_u64,
        "entries": {
            "index.md": {
                "path": "index.md",
                "remoteResourceId": "docs/9",
                "fingerprint": "1700000000000:78",
                "lastIndexedAtMs": 1_700_000_000_000_u64
            }
        }
    });
    std::fs::create_dir_all(vault.join(".vault-sync"))?;
    std::fs::write(vault.join(".vault-sync/index-cache.json"), cache.to_string())?;

    let status = read_status_local(&vault, &LocalOptions::default(), true)?;
    assert!(status.cache_exists);
    assert!(!status.cache_current);
    assert_eq!(status.schema_version.as_deref(), Some("3:mtime-size"));
    assert_eq!(status.store_id.as_ref().map(|id| id.as_str()), Some("store-9"));
    assert_eq!(status.indexed_count, 0);
    assert_eq!(status.not_indexed_count, Some(5));
    Ok(())
}

#[test]
fn corrupt_cache_is_reported() {
    let vault = vault_copy("status-corrupt");
    std::fs::create_dir_all(vault.join(".vault-sync")).expect("state dir");
    std::fs::write(vault.join(".vault-sync/index-cache.json"), b"{not json").expect("write");

    let error = read_status_local(&vault, &LocalOptions::default(), false)
        .expect_err("corrupt cache");
    assert_eq!(error.code, ErrorCode::new("cache", "corrupt"));
}

#[test]
fn missing_vault_root_is_rejected() {
    let missing = temp_dir("missing").join("nope");
    let error = read_status_local(&missing, &LocalOptions::default(), false)
        .expect_err("missing vault");
    assert_eq!(error.code, ErrorCode::invalid_input());
}

#[test]
fn locked_vault_refuses_a_second_engine() -> InfraResult<()> {
    let vault = vault_copy("locked");
    let _held = VaultLock::acquire(&vault.join(".vault-sync/index-cache.json"))?;
    let provider = Arc::new(ScriptedIndexProvider::new());

    let error = run_index_local_with_provider(&vault, &fast_polling(None), provider.clone())
        .expect_err("vault is locked");
    assert_eq!(error.code, ErrorCode::new("vault", "locked"));
    assert_eq!(provider.upload_count(), 0);
    Ok(())
}

#[test]
fn index_reports_progress_to_the_callback() -> InfraResult<()> {
    let vault = vault_copy("progress");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = LocalOptions {
        on_progress: Some(Arc::new(move |event: &ProgressEvent| {
            sink.lock().expect("events").push(event.clone());
        })),
        ..fast_polling(None)
    };
    let provider = Arc::new(ScriptedIndexProvider::new());

    let result = run_index_local_with_provider(&vault, &options, provider.clone())?;
    assert_eq!(result.indexed, 4);
    assert_eq!(provider.upload_count(), 4);
    let events = seen.lock().expect("events");
    assert!(events
        .iter()
        .any(|event| matches!(event, ProgressEvent::RunCompleted { .. })));
    Ok(())
}

#[test]
fn watch_runs_the_initial_pass_and_stops_cleanly() -> InfraResult<()> {
    let vault = vault_copy("watch");
    let provider = Arc::new(ScriptedIndexProvider::new());

    let summary = run_watch_local_until(
        &vault,
        &fast_polling(None),
        WatchOptions::default(),
        provider.clone(),
        async { tokio::time::sleep(Duration::from_millis(300)).await },
    )?;

    let initial = summary.initial_run.expect("initial run");
    assert_eq!(initial.indexed, 4);
    assert_eq!(summary.final_status.indexed_count, 4);
    assert_eq!(provider.upload_count(), 4);

    // The lock is released once the session ends.
    let _lock = VaultLock::acquire(&vault.join(".vault-sync/index-cache.json"))?;
    Ok(())
}
