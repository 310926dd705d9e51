use std::sync::Arc;

use anyhow::{Context, Result};
use sitegen_bucket::S3BucketStore;
use sitegen_core::artifacts::ArtifactLayout;
use sitegen_core::config::Settings;
use sitegen_core::llm::AnthropicClient;
use sitegen_core::pipeline::GeneratorSet;
use sitegen_core::publish::Uploader;
use sitegen_core::Pipeline;
use tracing::{info, warn};

/// Shared, immutable request state.
pub struct AppState {
    pipeline: Pipeline,
    layout: ArtifactLayout,
}

impl AppState {
    pub fn new(pipeline: Pipeline, layout: ArtifactLayout) -> Self {
        Self { pipeline, layout }
    }

    /// Wire live clients for whichever credentials are present.
    pub async fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let mut pipeline = Pipeline::new()
            .with_layout(settings.layout.clone())
            .require_doctype(settings.require_doctype);

        if settings.llm.is_configured() {
            let client = AnthropicClient::new(settings.llm.clone())
                .context("failed to build generative text client")?;
            info!(model = client.model(), "live generation enabled");
            pipeline = pipeline.with_live(GeneratorSet::live(Arc::new(client)));
        } else {
            warn!("ANTHROPIC_API_KEY not set; only mock generation is available");
        }

        match &settings.storage {
            Some(config) => {
                let store = S3BucketStore::new(config.clone())
                    .await
                    .context("failed to initialise bucket store")?;
                info!(bucket = store.bucket(), "uploads enabled");
                pipeline = pipeline.with_uploader(Uploader::new(Arc::new(store)));
            }
            None => warn!("S3_BUCKET not set; uploads will be skipped"),
        }

        Ok(Arc::new(Self::new(pipeline, settings.layout.clone())))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }
}
