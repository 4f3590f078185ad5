//! Shared engine harness for the integration tests.

#![allow(dead_code, reason = "shared across integration test binaries")]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use vault_sync_app::{Engine, EngineDeps, EngineSettings};
use vault_sync_domain::{ProgressEvent, RunState, StoreName};
use vault_sync_shared::Result;
use vault_sync_testkit::in_memory::{
    InMemoryCacheStore, InMemoryDocumentStore, RecordingLogger, ScriptedIndexProvider,
};

pub struct Harness {
    pub engine: Arc<Engine>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub provider: Arc<ScriptedIndexProvider>,
    pub cache: Arc<InMemoryCacheStore>,
    pub logger: RecordingLogger,
}

pub fn settings() -> EngineSettings {
    let mut settings = EngineSettings::new(StoreName::parse("vault").expect("store name"));
    settings.debounce = Duration::from_secs(2);
    settings.cooldown = Duration::from_secs(60);
    settings
}

pub fn note(title: &str) -> String {
    format!("# {title}\n\nThis note has enough words in it to be worth indexing.")
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(ScriptedIndexProvider::new()),
            Arc::new(InMemoryCacheStore::new()),
            settings(),
        )
    }

    pub fn with_parts(
        documents: Arc<InMemoryDocumentStore>,
        provider: Arc<ScriptedIndexProvider>,
        cache: Arc<InMemoryCacheStore>,
        settings: EngineSettings,
    ) -> Self {
        let logger = RecordingLogger::new();
        let engine = Engine::new(
            EngineDeps {
                documents: documents.clone(),
                provider: provider.clone(),
                cache_store: cache.clone(),
                logger: Some(Arc::new(logger.clone())),
            },
            settings,
        );
        documents.connect(engine.event_sender());
        Self {
            engine: Arc::new(engine),
            documents,
            provider,
            cache,
            logger,
        }
    }

    pub async fn started(self) -> Result<Self> {
        self.engine.initialize().await?;
        Ok(self)
    }

    pub fn seed_notes(&self, paths: &[&str]) {
        for path in paths {
            self.documents.seed(path, &note(path));
        }
    }
}

/// Drain every event currently buffered in `receiver`.
pub fn drain(receiver: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn states(events: &[ProgressEvent]) -> Vec<RunState> {
    events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::State { state } => Some(state.clone()),
            _ => None,
        })
        .collect()
}

/// Let spawned tasks observe queued events without moving the clock.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
