//! Engine assembly from a validated config.

use crate::InfraResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vault_sync_adapters::{
    DocumentPolicy, HttpIndexProvider, HttpIndexProviderConfig, JsonFileCacheStore, JsonLogger,
    LocalDocumentStore, StderrLogSink, TracingLogger,
};
use vault_sync_app::{Engine, EngineDeps, EngineSettings, UploadSettings};
use vault_sync_config::ValidatedEngineConfig;
use vault_sync_domain::StoreName;
use vault_sync_ports::{IndexProviderPort, LogLevel, LoggerPort};
use vault_sync_shared::{ErrorEnvelope, SecretString};

/// Where engine log events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Forward to the installed `tracing` subscriber.
    #[default]
    Tracing,
    /// One JSON object per line on stderr.
    Json,
}

/// Build the engine logger for `format`.
///
/// `min_level` only applies to JSON output; tracing output is filtered by
/// the subscriber.
#[must_use]
pub fn build_logger(format: LogFormat, min_level: LogLevel) -> Arc<dyn LoggerPort> {
    match format {
        LogFormat::Tracing => Arc::new(TracingLogger::new()),
        LogFormat::Json => {
            Arc::new(JsonLogger::new(Arc::new(StderrLogSink)).with_min_level(min_level))
        },
    }
}

/// Map the validated config onto engine settings.
pub fn engine_settings(config: &ValidatedEngineConfig) -> InfraResult<EngineSettings> {
    let store_name = StoreName::parse(config.store.name.as_ref()).map_err(ErrorEnvelope::from)?;
    Ok(EngineSettings {
        store_name,
        fingerprint_strategy: config.index.fingerprint_strategy,
        persist_every: config.index.persist_every,
        failure_log_capacity: config.index.failure_log_capacity,
        debounce: config.debounce(),
        upload: UploadSettings {
            min_content_bytes: config.index.min_content_bytes,
            poll_initial: Duration::from_millis(config.upload.poll_initial_ms),
            poll_max: Duration::from_millis(config.upload.poll_max_ms),
            operation_timeout: Duration::from_millis(config.upload.operation_timeout_ms),
        },
        retry: config.retry_policy(),
        cooldown: config.cooldown(),
    })
}

/// Adapters for one local vault.
#[derive(Debug, Clone)]
pub struct VaultAdapters {
    /// Filesystem document store.
    pub documents: Arc<LocalDocumentStore>,
    /// Cache file store.
    pub cache_store: Arc<JsonFileCacheStore>,
}

impl VaultAdapters {
    /// Local adapters rooted at `vault_root`.
    #[must_use]
    pub fn new(vault_root: &Path, config: &ValidatedEngineConfig) -> Self {
        let policy = DocumentPolicy::from_documents_config(&config.documents);
        Self {
            documents: Arc::new(LocalDocumentStore::new(vault_root.to_path_buf(), policy)),
            cache_store: Arc::new(JsonFileCacheStore::for_vault(
                vault_root,
                config.store.cache_path.as_ref(),
            )),
        }
    }

    /// Resolved cache file path.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache_store.path().to_path_buf()
    }
}

/// REST index provider from the `provider` section and the env-only API key.
pub fn build_index_provider(
    config: &ValidatedEngineConfig,
    api_key: Option<SecretString>,
) -> InfraResult<Arc<dyn IndexProviderPort>> {
    let provider_config = HttpIndexProviderConfig::from_provider_config(&config.provider, api_key);
    Ok(Arc::new(HttpIndexProvider::new(&provider_config)?))
}

/// Wire an engine for a local vault. The engine is not initialized.
pub fn build_engine(
    adapters: &VaultAdapters,
    provider: Arc<dyn IndexProviderPort>,
    config: &ValidatedEngineConfig,
    logger: Option<Arc<dyn LoggerPort>>,
) -> InfraResult<Engine> {
    let settings = engine_settings(config)?;
    let deps = EngineDeps {
        documents: adapters.documents.clone(),
        provider,
        cache_store: adapters.cache_store.clone(),
        logger,
    };
    Ok(Engine::new(deps, settings))
}
