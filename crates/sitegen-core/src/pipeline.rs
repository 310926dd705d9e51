//! Orchestration: validate -> architect -> builder -> upload.
//!
//! Each stage either hands its output to the next or stops the run with a
//! [`PipelineError`] tagged with the stage name. Nothing is retried and no
//! stage is resumable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::architect::{LiveArchitect, MockArchitect, SpecGenerator};
use crate::artifacts::ArtifactLayout;
use crate::builder::{LiveBuilder, MarkupGenerator, MockBuilder};
use crate::business::BusinessRecord;
use crate::error::{FieldError, GenerationError, Phase, PipelineError};
use crate::llm::TextGenerator;
use crate::markup::has_doctype;
use crate::publish::{UploadReceipt, Uploader};
use crate::specification::Specification;
use crate::validation::validate;

pub const MISSING_DOCTYPE_WARNING: &str = "markup does not start with <!DOCTYPE html>";
pub const STORAGE_UNCONFIGURED_WARNING: &str = "storage is not configured; upload skipped";
pub const EMPTY_MARKUP_ERROR: &str = "markup is empty";

/// The two generation stages, either both live or both mock.
#[derive(Clone)]
pub struct GeneratorSet {
    pub architect: Arc<dyn SpecGenerator>,
    pub builder: Arc<dyn MarkupGenerator>,
}

impl GeneratorSet {
    pub fn mock() -> Self {
        Self {
            architect: Arc::new(MockArchitect),
            builder: Arc::new(MockBuilder),
        }
    }

    pub fn live(client: Arc<dyn TextGenerator>) -> Self {
        Self {
            architect: Arc::new(LiveArchitect::new(client.clone())),
            builder: Arc::new(LiveBuilder::new(client)),
        }
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Use the deterministic generators instead of the hosted service.
    pub mock: bool,
    pub skip_upload: bool,
    /// Best-effort copy of the markup into the local artifact layout.
    pub save_local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessRecord {
    pub run_id: String,
    pub business_name: String,
    pub business_slug: String,
    pub html_size_bytes: usize,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub error_phase: Phase,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<FieldError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_path: Option<String>,
}

impl ErrorRecord {
    pub fn from_error(run_id: Option<String>, err: PipelineError) -> Self {
        Self {
            run_id,
            error_phase: err.phase,
            error_message: err.message,
            validation_errors: err.validation_errors,
            expected_path: None,
        }
    }
}

/// Terminal result of a run, serialized with a `status` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Success(SuccessRecord),
    Error(ErrorRecord),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }
}

/// Output of the specification-only flow, enough to hand the build off.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SpecifiedRun {
    pub run_id: String,
    pub record: BusinessRecord,
    pub business_slug: String,
    pub specification: Specification,
}

pub struct Pipeline {
    live: Option<GeneratorSet>,
    mock: GeneratorSet,
    uploader: Option<Uploader>,
    layout: Option<ArtifactLayout>,
    require_doctype: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// A pipeline with only the mock generators and no storage or local layout.
    pub fn new() -> Self {
        Self {
            live: None,
            mock: GeneratorSet::mock(),
            uploader: None,
            layout: None,
            require_doctype: false,
        }
    }

    pub fn with_live(mut self, generators: GeneratorSet) -> Self {
        self.live = Some(generators);
        self
    }

    pub fn with_mock(mut self, generators: GeneratorSet) -> Self {
        self.mock = generators;
        self
    }

    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_layout(mut self, layout: ArtifactLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Treat a missing doctype as a builder failure instead of a warning.
    pub fn require_doctype(mut self, required: bool) -> Self {
        self.require_doctype = required;
        self
    }

    pub fn has_live_generators(&self) -> bool {
        self.live.is_some()
    }

    pub fn has_uploader(&self) -> bool {
        self.uploader.is_some()
    }

    pub fn layout(&self) -> Option<&ArtifactLayout> {
        self.layout.as_ref()
    }

    pub fn new_run_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn run(&self, input: &Value, options: RunOptions) -> GenerationOutcome {
        self.run_with_id(Self::new_run_id(), input, options).await
    }

    pub async fn run_with_id(
        &self,
        run_id: String,
        input: &Value,
        options: RunOptions,
    ) -> GenerationOutcome {
        match self.execute(&run_id, input, options).await {
            Ok(record) => GenerationOutcome::Success(record),
            Err(err) => {
                error!(
                    run_id = %run_id,
                    phase = %err.phase,
                    error = %err.message,
                    "pipeline run failed"
                );
                GenerationOutcome::Error(ErrorRecord::from_error(Some(run_id), err))
            }
        }
    }

    async fn execute(
        &self,
        run_id: &str,
        input: &Value,
        options: RunOptions,
    ) -> Result<SuccessRecord, PipelineError> {
        let record = validate(input).map_err(PipelineError::validation)?;
        let slug = record.slug();
        info!(run_id, slug = %slug, mock = options.mock, "business record validated");

        let generators = self.generators(options.mock)?;

        let spec = generators
            .architect
            .generate_spec(&record)
            .await
            .map_err(PipelineError::architect)?;
        info!(run_id, slug = %slug, "specification generated");

        let markup = generators
            .builder
            .generate_markup(&spec, &record)
            .await
            .map_err(PipelineError::builder)?;

        let mut warnings = Vec::new();
        if !has_doctype(&markup) {
            if self.require_doctype {
                return Err(PipelineError::builder(GenerationError::Rejected(
                    MISSING_DOCTYPE_WARNING.to_string(),
                )));
            }
            warn!(run_id, slug = %slug, "{MISSING_DOCTYPE_WARNING}");
            warnings.push(MISSING_DOCTYPE_WARNING.to_string());
        }
        info!(run_id, slug = %slug, html_size_bytes = markup.len(), "markup generated");

        let local_path = if options.save_local {
            self.save_local(run_id, &slug, &markup).await
        } else {
            None
        };

        let receipt = if options.skip_upload {
            None
        } else if let Some(uploader) = &self.uploader {
            Some(
                uploader
                    .upload(&slug, &markup, run_id)
                    .await
                    .map_err(PipelineError::upload)?,
            )
        } else {
            warn!(run_id, slug = %slug, "{STORAGE_UNCONFIGURED_WARNING}");
            warnings.push(STORAGE_UNCONFIGURED_WARNING.to_string());
            None
        };

        Ok(SuccessRecord {
            run_id: run_id.to_string(),
            business_name: record.business_name,
            business_slug: slug,
            html_size_bytes: markup.len(),
            generated_at: Utc::now(),
            storage_path: receipt.as_ref().map(|receipt| receipt.storage_path.clone()),
            public_url: receipt.map(|receipt| receipt.public_url),
            local_path,
            warnings,
        })
    }

    /// Validate and run the architect only.
    pub async fn specify(
        &self,
        run_id: String,
        input: &Value,
        mock: bool,
    ) -> Result<SpecifiedRun, PipelineError> {
        let record = validate(input).map_err(PipelineError::validation)?;
        let business_slug = record.slug();

        let specification = self
            .generators(mock)?
            .architect
            .generate_spec(&record)
            .await
            .map_err(PipelineError::architect)?;
        info!(run_id = %run_id, slug = %business_slug, "specification generated for handoff");

        Ok(SpecifiedRun {
            run_id,
            record,
            business_slug,
            specification,
        })
    }

    /// Upload markup produced outside the pipeline (manual handoff, watcher).
    pub async fn publish(
        &self,
        slug: &str,
        run_id: &str,
        markup: &str,
    ) -> Result<UploadReceipt, PipelineError> {
        if markup.trim().is_empty() {
            return Err(PipelineError::new(Phase::Upload, EMPTY_MARKUP_ERROR));
        }
        let uploader = self
            .uploader
            .as_ref()
            .ok_or_else(|| PipelineError::new(Phase::Upload, "storage is not configured"))?;

        if !has_doctype(markup) {
            if self.require_doctype {
                return Err(PipelineError::new(Phase::Upload, MISSING_DOCTYPE_WARNING));
            }
            warn!(run_id, slug, "{MISSING_DOCTYPE_WARNING}");
        }

        uploader
            .upload(slug, markup, run_id)
            .await
            .map_err(PipelineError::upload)
    }

    fn generators(&self, mock: bool) -> Result<&GeneratorSet, PipelineError> {
        if mock {
            return Ok(&self.mock);
        }
        self.live.as_ref().ok_or_else(|| {
            PipelineError::architect(GenerationError::Configuration(
                "ANTHROPIC_API_KEY is not set; retry with mock=true".into(),
            ))
        })
    }

    async fn save_local(&self, run_id: &str, slug: &str, markup: &str) -> Option<String> {
        let layout = self.layout.as_ref()?;
        match layout.write_markup(slug, run_id, markup).await {
            Ok(path) => {
                info!(run_id, slug, path = %path.display(), "markup saved locally");
                Some(path.display().to_string())
            }
            Err(err) => {
                warn!(run_id, slug, error = %err, "failed to save markup locally");
                None
            }
        }
    }
}
