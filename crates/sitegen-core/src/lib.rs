pub mod architect;
pub mod artifacts;
pub mod builder;
pub mod business;
pub mod config;
pub mod error;
pub mod llm;
pub mod markup;
pub mod pipeline;
pub mod publish;
pub mod slug;
pub mod specification;
pub mod validation;
pub mod watcher;

pub use business::BusinessRecord;
pub use error::{FieldError, Phase, PipelineError};
pub use pipeline::{GenerationOutcome, Pipeline, RunOptions};
pub use specification::Specification;
