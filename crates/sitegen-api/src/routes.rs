use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sitegen_core::artifacts::is_valid_run_id;
use sitegen_core::config::parse_bool;
use sitegen_core::error::ArtifactError;
use sitegen_core::pipeline::ErrorRecord;
use sitegen_core::slug::is_valid_slug;
use sitegen_core::validation::validate;
use sitegen_core::{
    FieldError, GenerationOutcome, Phase, Pipeline, PipelineError, RunOptions, Specification,
};
use tracing::{error, info};

use crate::AppState;

/// Query flags. Values are parsed leniently, so they arrive as strings.
#[derive(Debug, Default, Deserialize)]
pub struct FlagQuery {
    mock: Option<String>,
    skip_upload: Option<String>,
    save_local: Option<String>,
}

impl FlagQuery {
    fn run_options(&self) -> Result<RunOptions, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut flag = |name: &str, value: &Option<String>| match value.as_deref() {
            None => false,
            Some("") => true,
            Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                errors.push(FieldError::new(name, format!("{name} must be true or false")));
                false
            }),
        };
        let options = RunOptions {
            mock: flag("mock", &self.mock),
            skip_upload: flag("skip_upload", &self.skip_upload),
            save_local: flag("save_local", &self.save_local),
        };
        if errors.is_empty() {
            Ok(options)
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub run_id: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
struct SpecResponse {
    status: &'static str,
    run_id: String,
    business_slug: String,
    spec_path: String,
    task_path: String,
    expected_markup_path: String,
    specification: Specification,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    run_id: String,
    business_slug: String,
    html_size_bytes: usize,
    storage_path: String,
    public_url: String,
    uploaded_at: DateTime<Utc>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FlagQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let run_id = Pipeline::new_run_id();
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return malformed_body(Some(run_id), rejection),
    };
    let options = match query.run_options() {
        Ok(options) => options,
        Err(errors) => return failure(Some(run_id), PipelineError::validation(errors)),
    };

    info!(
        run_id = %run_id,
        mock = options.mock,
        skip_upload = options.skip_upload,
        "generate requested"
    );
    let task_id = run_id.clone();
    let run = async move { state.pipeline().run_with_id(task_id, &input, options).await };
    match guarded(&run_id, run).await {
        Ok(outcome) => outcome_response(outcome),
        Err(response) => response,
    }
}

pub async fn spec(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FlagQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let run_id = Pipeline::new_run_id();
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return malformed_body(Some(run_id), rejection),
    };
    let mock = match query.run_options() {
        Ok(options) => options.mock,
        Err(errors) => return failure(Some(run_id), PipelineError::validation(errors)),
    };

    let task_state = state.clone();
    let task_id = run_id.clone();
    let specify = async move { task_state.pipeline().specify(task_id, &input, mock).await };
    let specified = match guarded(&run_id, specify).await {
        Ok(Ok(specified)) => specified,
        Ok(Err(err)) => return failure(Some(run_id), err),
        Err(response) => return response,
    };

    let layout = state.layout();
    let slug = &specified.business_slug;
    let spec_path = match layout.write_spec(slug, &run_id, &specified.specification).await {
        Ok(path) => path,
        Err(err) => return unexpected(Some(run_id), err),
    };
    let task_path = match layout
        .write_task(&run_id, &specified.record, &specified.specification)
        .await
    {
        Ok(path) => path,
        Err(err) => return unexpected(Some(run_id), err),
    };
    info!(run_id = %run_id, slug = %slug, task_path = %task_path.display(), "handoff written");

    let body = SpecResponse {
        status: "success",
        expected_markup_path: display(&layout.markup_path(slug, &run_id)),
        spec_path: display(&spec_path),
        task_path: display(&task_path),
        business_slug: specified.business_slug,
        specification: specified.specification,
        run_id,
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed_body(None, rejection),
    };

    let mut errors = Vec::new();
    if !is_valid_run_id(&request.run_id) {
        errors.push(FieldError::new(
            "run_id",
            "run_id must contain only letters, digits, '-' or '_'",
        ));
    }
    if !is_valid_slug(&request.slug) {
        errors.push(FieldError::new("slug", "slug must be lowercase letters, digits and hyphens"));
    }
    if !errors.is_empty() {
        return failure(Some(request.run_id), PipelineError::validation(errors));
    }

    let markup = match state.layout().read_markup(&request.slug, &request.run_id).await {
        Ok(markup) => markup,
        Err(ArtifactError::Missing(path)) => {
            let expected_path = display(&path);
            error!(
                run_id = %request.run_id,
                slug = %request.slug,
                expected_path = %expected_path,
                "markup not found"
            );
            let record = ErrorRecord {
                run_id: Some(request.run_id),
                error_phase: Phase::Upload,
                error_message: format!("markup not found at {expected_path}"),
                validation_errors: Vec::new(),
                expected_path: Some(expected_path),
            };
            return error_response(StatusCode::NOT_FOUND, record);
        }
        Err(err) => return unexpected(Some(request.run_id), err),
    };

    let (slug, run_id) = (request.slug.clone(), request.run_id.clone());
    let publish = async move { state.pipeline().publish(&slug, &run_id, &markup).await };
    let published = match guarded(&request.run_id, publish).await {
        Ok(published) => published,
        Err(response) => return response,
    };

    match published {
        Ok(receipt) => {
            let body = UploadResponse {
                status: "success",
                run_id: request.run_id,
                business_slug: request.slug,
                html_size_bytes: receipt.size_bytes,
                storage_path: receipt.storage_path,
                public_url: receipt.public_url,
                uploaded_at: receipt.uploaded_at,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => failure(Some(request.run_id), err),
    }
}

pub async fn validate_record(payload: Result<Json<Value>, JsonRejection>) -> Response {
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => {
            let errors = vec![FieldError::new("body", rejection.body_text())];
            return (StatusCode::BAD_REQUEST, Json(json!({ "valid": false, "errors": errors })))
                .into_response();
        }
    };

    match validate(&input) {
        Ok(record) => {
            (StatusCode::OK, Json(json!({ "valid": true, "record": record }))).into_response()
        }
        Err(errors) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "valid": false, "errors": errors })))
                .into_response()
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let layout = state.layout();
    Json(json!({
        "status": "ok",
        "llm_configured": state.pipeline().has_live_generators(),
        "storage_configured": state.pipeline().has_uploader(),
        "output_root": display(&layout.output_root),
        "tasks_root": display(&layout.tasks_root),
    }))
}

/// Run pipeline work on its own task so a panic inside a generator or store
/// comes back as an `unknown`-phase 500 record instead of a dropped connection.
async fn guarded<T, F>(run_id: &str, work: F) -> Result<T, Response>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await.map_err(|err| {
        let message = if err.is_panic() {
            "run panicked before completing".to_string()
        } else {
            format!("run was cancelled: {err}")
        };
        unexpected(Some(run_id.to_string()), message)
    })
}

fn outcome_response(outcome: GenerationOutcome) -> Response {
    let status = match &outcome {
        GenerationOutcome::Success(_) => StatusCode::OK,
        GenerationOutcome::Error(record) => status_for(record.error_phase),
    };
    (status, Json(outcome)).into_response()
}

fn failure(run_id: Option<String>, err: PipelineError) -> Response {
    let record = ErrorRecord::from_error(run_id, err);
    error_response(status_for(record.error_phase), record)
}

fn malformed_body(run_id: Option<String>, rejection: JsonRejection) -> Response {
    let errors = vec![FieldError::new("body", rejection.body_text())];
    failure(run_id, PipelineError::validation(errors))
}

fn unexpected(run_id: Option<String>, err: impl fmt::Display) -> Response {
    error!(run_id = ?run_id, error = %err, "unexpected failure");
    failure(run_id, PipelineError::new(Phase::Unknown, err.to_string()))
}

fn error_response(status: StatusCode, record: ErrorRecord) -> Response {
    (status, Json(GenerationOutcome::Error(record))).into_response()
}

fn status_for(phase: Phase) -> StatusCode {
    match phase {
        Phase::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
