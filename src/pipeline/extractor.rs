use std::sync::Arc;

use chrono::{Datelike, Local};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument};
use url::Url;

use crate::app::cache_json::{get_json, set_json};
use crate::app::ports::{Cache, StructuredModel, StructuredRequest};
use crate::config::ModelConfig;
use crate::constants::{cache_key, EXTRACTOR_CACHE_NS};
use crate::error::{ExtractorError, Result};
use crate::metrics;
use crate::pipeline::prompt::{system_prompt, user_prompt};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::schema::ResponseSchema;
use crate::types::{ContentBlock, ExtractionMode, ExtractionResult};

/// Counting permit pool bounding concurrent model calls across a run.
#[derive(Clone)]
pub struct ExtractionGate {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ExtractionGate {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| ExtractorError::config("extraction gate closed"))
    }
}

/// Settings of the structured-generation call.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub retry: RetryPolicy,
}

impl ExtractorSettings {
    pub fn from_config(model: &ModelConfig, retry: RetryPolicy) -> Self {
        Self {
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            retry,
        }
    }
}

/// Turns cleaned content blocks into typed event data, memoized per
/// (model, URL).
pub struct StructuredExtractor {
    model: Arc<dyn StructuredModel>,
    cache: Arc<dyn Cache>,
    gate: ExtractionGate,
    settings: ExtractorSettings,
    single: ResponseSchema,
    multiple: ResponseSchema,
}

impl StructuredExtractor {
    pub fn new(
        model: Arc<dyn StructuredModel>,
        cache: Arc<dyn Cache>,
        gate: ExtractionGate,
        settings: ExtractorSettings,
    ) -> Result<Self> {
        Ok(Self {
            model,
            cache,
            gate,
            settings,
            single: ResponseSchema::for_mode(ExtractionMode::Single)?,
            multiple: ResponseSchema::for_mode(ExtractionMode::Multiple)?,
        })
    }

    pub fn gate(&self) -> &ExtractionGate {
        &self.gate
    }

    fn shape(&self, mode: ExtractionMode) -> &ResponseSchema {
        match mode {
            ExtractionMode::Single => &self.single,
            ExtractionMode::Multiple => &self.multiple,
        }
    }

    #[instrument(skip(self, blocks), fields(url = %url, model = %self.settings.model))]
    pub async fn extract(&self, url: &Url, blocks: &[ContentBlock], mode: ExtractionMode) -> Result<ExtractionResult> {
        let key = cache_key(EXTRACTOR_CACHE_NS, &self.settings.model, url);
        if let Some(cached) = get_json::<ExtractionResult>(self.cache.as_ref(), EXTRACTOR_CACHE_NS, &key).await {
            if cached.mode() == mode {
                return Ok(cached);
            }
            debug!(key = %key, "Cached result has another shape, extracting again");
        }

        let shape = self.shape(mode);
        let request = StructuredRequest {
            model: self.settings.model.clone(),
            system: system_prompt(mode, Local::now().year())?,
            user: user_prompt(blocks)?,
            schema_name: shape.name().to_string(),
            schema: shape.schema().clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let result = {
            let _permit = self.gate.acquire().await?;
            info!("Extracting event data");
            let request = &request;
            self.settings
                .retry
                .run(
                    |attempt| async move {
                        metrics::model_attempt(&request.model);
                        debug!(attempt, "Calling model");
                        let value = self.model.generate(request).await?;
                        Ok::<_, ExtractorError>(shape.parse(value)?)
                    },
                    ExtractorError::is_transient,
                )
                .await?
        };

        set_json(self.cache.as_ref(), &key, &result).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_never_has_zero_permits() {
        let gate = ExtractionGate::new(0);
        assert_eq!(gate.size(), 1);
        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        drop(permit);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn clones_share_permits() {
        let gate = ExtractionGate::new(2);
        let other = gate.clone();
        let _a = gate.acquire().await.unwrap();
        let _b = other.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
    }
}
