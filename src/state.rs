//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::document::{DocumentProvider, PdfProvider, Rgb};
use crate::ocr::{DisabledOcr, OcrMyPdf, OcrProcessor};
use crate::patch::{PatchApplier, SpanExtractor};
use crate::session::SessionRegistry;
use crate::storage::{FileStorage, LocalStorage, StorageError};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize upload storage: {0}")]
    StorageInit(#[from] StorageError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    storage: Arc<dyn FileStorage>,
    registry: SessionRegistry,
    provider: Arc<dyn DocumentProvider>,
    ocr: Arc<dyn OcrProcessor>,
    applier: Arc<PatchApplier>,
    extractor: SpanExtractor,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn FileStorage>,
        provider: Arc<dyn DocumentProvider>,
        ocr: Arc<dyn OcrProcessor>,
    ) -> Self {
        let registry = SessionRegistry::new(storage.clone());
        let applier = PatchApplier::default().with_fallback(config.patch.fallback_font, Rgb::BLACK);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                storage,
                registry,
                provider,
                ocr,
                applier: Arc::new(applier),
                extractor: SpanExtractor::new(),
            }),
        }
    }

    /// Build the production stack: local storage, the lopdf provider and
    /// ocrmypdf unless OCR is switched off.
    pub async fn from_config(config: Config) -> Result<Self, StateError> {
        let storage = LocalStorage::new(config.upload.folder.clone()).await?;
        tracing::info!(folder = %storage.root().display(), "Upload storage ready");

        let ocr: Arc<dyn OcrProcessor> = if config.ocr.enabled {
            let ocr = OcrMyPdf::new(&config.ocr.language, config.ocr.timeout);
            if !ocr.is_available().await {
                tracing::warn!("OCR dependencies missing, uploads will be processed without OCR");
            }
            Arc::new(ocr)
        } else {
            tracing::info!("OCR disabled");
            Arc::new(DisabledOcr)
        };

        Ok(Self::new(config, Arc::new(storage), Arc::new(PdfProvider), ocr))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.inner.storage
    }

    /// Get the session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.inner.provider
    }

    pub fn ocr(&self) -> &Arc<dyn OcrProcessor> {
        &self.inner.ocr
    }

    pub fn applier(&self) -> &Arc<PatchApplier> {
        &self.inner.applier
    }

    pub fn extractor(&self) -> &SpanExtractor {
        &self.inner.extractor
    }
}
