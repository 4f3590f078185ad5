//! Local CLI orchestration helpers.
//!
//! Each entry point loads the effective config for a vault, wires the
//! adapters, and drives the engine on a current-thread runtime.

use crate::config_check::{resolve_config_path, std_env_map};
use crate::engine_factory::{VaultAdapters, build_engine, build_index_provider};
use crate::vault_lock::VaultLock;
use crate::{InfraError, InfraResult, load_effective_config};
use serde::Serialize;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use vault_sync_adapters::VaultWatcher;
use vault_sync_app::Engine;
use vault_sync_config::{EngineEnv, ValidatedEngineConfig};
use vault_sync_domain::{
    IndexCacheRecord, IndexResult, IndexTreeNode, ProgressEvent, StoreId, SyncStatus,
};
use vault_sync_ports::{DocumentStorePort, IndexProviderPort, LoggerPort};
use vault_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, ResultExt, SecretString,
};

/// Progress callback for local runs.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Inputs shared by every local command.
#[derive(Clone, Default)]
pub struct LocalOptions {
    /// Explicit config file; defaults to `.vault-sync/config.{toml,json}` in the vault.
    pub config_path: Option<PathBuf>,
    /// Partial config JSON applied over the file.
    pub overrides_json: Option<String>,
    /// Engine logger; `None` disables engine logging.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Receives every progress event.
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for LocalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalOptions")
            .field("config_path", &self.config_path)
            .field("overrides_json", &self.overrides_json)
            .field("logger", &self.logger.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Offline status read from the persisted cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    /// Vault root.
    pub vault_root: PathBuf,
    /// Cache file location.
    pub cache_path: PathBuf,
    /// Whether the cache file exists.
    pub cache_exists: bool,
    /// Schema version found in the cache file.
    pub schema_version: Option<Box<str>>,
    /// False when the cache was written with another fingerprint strategy
    /// and will be rebuilt by the next run.
    pub cache_current: bool,
    /// Remote store the cache is bound to.
    pub store_id: Option<StoreId>,
    /// Entries the engine would keep.
    pub indexed_count: u64,
    /// Indexable documents without an entry (only with the tree).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_indexed_count: Option<u64>,
    /// Completion time of the last full pass (epoch ms).
    pub last_full_sync_ms: Option<u64>,
    /// Folder tree over the vault and the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<IndexTreeNode>,
}

/// Watch session options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Run a full index pass before watching.
    pub initial_index: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            initial_index: true,
        }
    }
}

/// Summary of a finished watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSummary {
    /// Result of the initial full pass, when one ran.
    pub initial_run: Option<IndexResult>,
    /// Engine status right before shutdown.
    pub final_status: SyncStatus,
}

struct LoadedVault {
    config: ValidatedEngineConfig,
    api_key: Option<SecretString>,
    adapters: VaultAdapters,
}

fn load_vault(vault_root: &Path, options: &LocalOptions) -> InfraResult<LoadedVault> {
    ensure_vault_root(vault_root)?;
    let config_path = resolve_config_path(options.config_path.as_deref(), vault_root);
    let env_map = std_env_map();
    let api_key = EngineEnv::from_map(&env_map)
        .map_err(ErrorEnvelope::from)?
        .provider_api_key;
    let config = load_effective_config(
        &env_map,
        config_path.as_deref(),
        options.overrides_json.as_deref(),
    )?;
    let adapters = VaultAdapters::new(vault_root, &config);
    Ok(LoadedVault {
        config,
        api_key,
        adapters,
    })
}

fn ensure_vault_root(vault_root: &Path) -> InfraResult<()> {
    if vault_root.is_dir() {
        return Ok(());
    }
    Err(
        ErrorEnvelope::expected(ErrorCode::invalid_input(), "vault root is not a directory")
            .with_metadata("vaultRoot", vault_root.display().to_string()),
    )
}

/// Run one full index pass over a local vault.
///
/// Ctrl-C cancels the run; the partial result is returned.
pub fn run_index_local(vault_root: &Path, options: &LocalOptions) -> InfraResult<IndexResult> {
    let vault = load_vault(vault_root, options)?;
    let provider = build_index_provider(&vault.config, vault.api_key.clone())?;
    run_index_with_provider(&vault, provider, options)
}

/// [`run_index_local`] against an explicit provider.
pub fn run_index_local_with_provider(
    vault_root: &Path,
    options: &LocalOptions,
    provider: Arc<dyn IndexProviderPort>,
) -> InfraResult<IndexResult> {
    let vault = load_vault(vault_root, options)?;
    run_index_with_provider(&vault, provider, options)
}

fn run_index_with_provider(
    vault: &LoadedVault,
    provider: Arc<dyn IndexProviderPort>,
    options: &LocalOptions,
) -> InfraResult<IndexResult> {
    let _lock = VaultLock::acquire(&vault.adapters.cache_path())?;
    let engine = Arc::new(build_engine(
        &vault.adapters,
        provider,
        &vault.config,
        options.logger.clone(),
    )?);

    run_async(async move {
        let forwarder = spawn_progress_forwarder(&engine, options.on_progress.clone());
        let interrupt = spawn_interrupt_canceller(&engine);

        let outcome = async {
            engine.initialize().await?;
            engine.run_full_index().await
        }
        .await;
        let shutdown = engine.shutdown().await;

        finalize_task(Some(interrupt)).await?;
        finalize_task(forwarder).await?;
        let result = outcome?;
        shutdown?;
        Ok(result)
    })
}

/// Read status offline from the cache file, optionally with the folder tree.
pub fn read_status_local(
    vault_root: &Path,
    options: &LocalOptions,
    include_tree: bool,
) -> InfraResult<VaultStatus> {
    let vault = load_vault(vault_root, options)?;
    let cache_path = vault.adapters.cache_path();
    let expected_schema = vault.config.index.fingerprint_strategy.cache_schema_version();
    let record = read_cache_record(&cache_path)?;

    let cache_exists = record.is_some();
    let schema_version = record.as_ref().map(|record| record.schema_version.clone());
    let cache_current = record
        .as_ref()
        .is_none_or(|record| *record.schema_version == *expected_schema);
    let record = record.map(|record| {
        if cache_current {
            record
        } else {
            record.rebuilt_for(expected_schema.as_str())
        }
    });

    let mut status = VaultStatus {
        vault_root: vault_root.to_path_buf(),
        cache_path,
        cache_exists,
        schema_version,
        cache_current,
        store_id: record.as_ref().and_then(|record| record.store_id.clone()),
        indexed_count: record
            .as_ref()
            .map_or(0, |record| u64::try_from(record.entries.len()).unwrap_or(u64::MAX)),
        not_indexed_count: None,
        last_full_sync_ms: record.as_ref().and_then(|record| record.last_full_sync_ms),
        tree: None,
    };

    if include_tree {
        let documents = Arc::clone(&vault.adapters.documents);
        let paths = run_async(async move {
            let ctx = RequestContext::new_request();
            documents.enumerate(&ctx).await
        })?;
        let entries = record.map(|record| record.entries).unwrap_or_default();
        let tree = IndexTreeNode::build(paths.iter(), &entries);
        status.not_indexed_count = Some(tree.counts().1);
        status.tree = Some(tree);
    }
    Ok(status)
}

fn read_cache_record(path: &Path) -> InfraResult<Option<IndexCacheRecord>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(InfraError::from(error))
                .with_error_metadata("path", path.display().to_string());
        },
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("cache", "corrupt"),
            format!("index cache is unreadable: {error}"),
        )
        .with_metadata("path", path.display().to_string())
    })
}

/// Watch a vault until Ctrl-C, syncing changes as they settle.
pub fn run_watch_local(
    vault_root: &Path,
    options: &LocalOptions,
    watch: WatchOptions,
) -> InfraResult<WatchSummary> {
    let vault = load_vault(vault_root, options)?;
    let provider = build_index_provider(&vault.config, vault.api_key.clone())?;
    run_watch_with_provider(&vault, provider, options, watch, async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

/// [`run_watch_local`] against an explicit provider, stopping when `stop` resolves.
pub fn run_watch_local_until<F>(
    vault_root: &Path,
    options: &LocalOptions,
    watch: WatchOptions,
    provider: Arc<dyn IndexProviderPort>,
    stop: F,
) -> InfraResult<WatchSummary>
where
    F: Future<Output = ()>,
{
    let vault = load_vault(vault_root, options)?;
    run_watch_with_provider(&vault, provider, options, watch, stop)
}

fn run_watch_with_provider<F>(
    vault: &LoadedVault,
    provider: Arc<dyn IndexProviderPort>,
    options: &LocalOptions,
    watch: WatchOptions,
    stop: F,
) -> InfraResult<WatchSummary>
where
    F: Future<Output = ()>,
{
    let _lock = VaultLock::acquire(&vault.adapters.cache_path())?;
    let engine = Arc::new(build_engine(
        &vault.adapters,
        provider,
        &vault.config,
        options.logger.clone(),
    )?);
    let root = vault.adapters.documents.root().to_path_buf();

    run_async(async move {
        let forwarder = spawn_progress_forwarder(&engine, options.on_progress.clone());
        let outcome = watch_session(&engine, &root, watch, stop).await;
        let shutdown = engine.shutdown().await;
        finalize_task(forwarder).await?;
        let summary = outcome?;
        shutdown?;
        Ok(summary)
    })
}

async fn watch_session<F>(
    engine: &Arc<Engine>,
    root: &Path,
    watch: WatchOptions,
    stop: F,
) -> InfraResult<WatchSummary>
where
    F: Future<Output = ()>,
{
    engine.initialize().await?;
    let _watcher = VaultWatcher::start(root, engine.event_sender())?;
    tracing::info!(vault = %root.display(), "watching vault");

    tokio::pin!(stop);
    let mut initial_run = None;
    if watch.initial_index {
        let run = engine.run_full_index();
        tokio::pin!(run);
        let interrupted = tokio::select! {
            result = &mut run => {
                initial_run = Some(result?);
                false
            },
            () = &mut stop => true,
        };
        if interrupted {
            engine.cancel_run();
            initial_run = Some(run.await?);
            return Ok(WatchSummary {
                initial_run,
                final_status: engine.get_status().await,
            });
        }
    }

    stop.await;
    tracing::info!("stopping watch");
    if engine.sync_pending_now().await {
        tracing::info!("flushed pending changes before exit");
    }
    Ok(WatchSummary {
        initial_run,
        final_status: engine.get_status().await,
    })
}

fn spawn_progress_forwarder(
    engine: &Engine,
    on_progress: Option<ProgressCallback>,
) -> Option<JoinHandle<()>> {
    let on_progress = on_progress?;
    let mut receiver = engine.subscribe_progress();
    Some(tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => on_progress(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress consumer fell behind");
                },
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

fn spawn_interrupt_canceller(engine: &Arc<Engine>) -> JoinHandle<()> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && engine.cancel_run() {
            tracing::info!("interrupt received, cancelling index run");
        }
    })
}

async fn finalize_task(handle: Option<JoinHandle<()>>) -> InfraResult<()> {
    let Some(handle) = handle else {
        return Ok(());
    };
    // Let the forwarder drain events already broadcast.
    tokio::task::yield_now().await;
    handle.abort();
    if let Err(error) = handle.await
        && error.is_panic()
    {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("background task failed: {error}"),
            ErrorClass::NonRetriable,
        ));
    }
    Ok(())
}

fn run_async<T>(future: impl Future<Output = InfraResult<T>>) -> InfraResult<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(InfraError::from)?;
    runtime.block_on(future)
}
