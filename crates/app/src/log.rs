//! Optional structured logger used by the engine components.

use std::sync::Arc;
use vault_sync_ports::{LogFields, LogLevel, LoggerPort, log_fields};
use vault_sync_shared::ErrorEnvelope;

#[derive(Clone, Default)]
pub struct EngineLog {
    logger: Option<Arc<dyn LoggerPort>>,
}

impl EngineLog {
    pub fn new(logger: Option<Arc<dyn LoggerPort>>) -> Self {
        Self { logger }
    }

    pub fn child(&self, component: &str) -> Self {
        Self {
            logger: self.logger.as_ref().map(|logger| {
                Arc::from(logger.child(log_fields([("component", component)])))
            }),
        }
    }

    pub fn debug(&self, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.logger.as_ref() {
            logger.debug(event, message, fields);
        }
    }

    pub fn info(&self, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.logger.as_ref() {
            logger.info(event, message, fields);
        }
    }

    pub fn warn(&self, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.logger.as_ref() {
            logger.warn(event, message, fields);
        }
    }

    pub fn failure(
        &self,
        level: LogLevel,
        event: &str,
        message: &str,
        fields: Option<LogFields>,
        error: &ErrorEnvelope,
    ) {
        if let Some(logger) = self.logger.as_ref() {
            logger.log_error(level, event, message, fields, error);
        }
    }
}

impl std::fmt::Debug for EngineLog {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EngineLog")
            .field("enabled", &self.logger.is_some())
            .finish()
    }
}
