//! Shared process state handed to the HTTP layer.
//!
//! Everything here is immutable after startup or internally synchronized:
//! the mapping registry sits behind an `Arc`, the object store and failure
//! tracker are trait objects, and database connections are opened per
//! request from the configured path.

use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::db;
use crate::ocr::{HttpOcrService, OcrClient, OcrError};
use crate::pipeline::failures::{FailureTracker, InMemoryFailureTracker};
use crate::pipeline::mapping::FieldMapper;
use crate::pipeline::DocumentProcessor;
use crate::registry::{MappingConfig, Registry, RegistryError};
use crate::storage::{LocalObjectStore, ObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Mapping registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("OCR client error: {0}")]
    Ocr(#[from] OcrError),
}

pub struct CoreState {
    pub config: AppConfig,
    registry: Arc<Registry>,
    store: Arc<dyn ObjectStore>,
    failures: Arc<dyn FailureTracker>,
    processor: Arc<DocumentProcessor>,
}

impl CoreState {
    /// Wire up the production stack: local object store, HTTP OCR client,
    /// in-memory failure counter. Runs migrations once up front.
    ///
    /// Builds a blocking HTTP client, so call it outside the async runtime.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let registry = Arc::new(Registry::load(config.mapping_path.as_deref())?);
        tracing::info!(version = registry.version(), "Mapping configuration loaded");

        db::open_database(&config.db_path)?;
        tracing::info!(path = %config.db_path.display(), "Database ready");

        let signing_key = match &config.signing_key {
            Some(key) => key.as_bytes().to_vec(),
            None => {
                tracing::warn!("AGCERT_SIGNING_KEY not set; signed URLs will not survive a restart");
                rand::random::<[u8; 32]>().to_vec()
            }
        };
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
            &config.storage_dir,
            &signing_key,
            &config.public_url,
        )?);

        let service = HttpOcrService::new(&config.ocr_base_url, config.ocr_timeout_secs)?;
        let ocr = OcrClient::new(Arc::new(service), config.retry.clone(), config.poll.clone());

        Ok(Self::with_parts(
            config,
            registry,
            store,
            ocr,
            Arc::new(InMemoryFailureTracker::new()),
        ))
    }

    /// Assemble from explicit components.
    pub fn with_parts(
        config: AppConfig,
        registry: Arc<Registry>,
        store: Arc<dyn ObjectStore>,
        ocr: OcrClient,
        failures: Arc<dyn FailureTracker>,
    ) -> Self {
        let processor = Arc::new(DocumentProcessor::new(
            config.db_path.clone(),
            ocr,
            Arc::clone(&store),
            FieldMapper::new(Arc::clone(&registry)),
            Arc::clone(&failures),
        ));
        Self {
            config,
            registry,
            store,
            failures,
            processor,
        }
    }

    /// Open a database connection. Most common operation in handlers.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        Ok(db::open_database(&self.config.db_path)?)
    }

    pub fn mapping(&self) -> &MappingConfig {
        &self.registry.mapping
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn failures(&self) -> &dyn FailureTracker {
        self.failures.as_ref()
    }

    pub fn processor(&self) -> &Arc<DocumentProcessor> {
        &self.processor
    }
}
