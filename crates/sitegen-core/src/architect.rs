//! "Architect" stage: business record in, site specification out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::business::BusinessRecord;
use crate::error::GenerationError;
use crate::llm::TextGenerator;
use crate::markup::strip_code_fences;
use crate::specification::{SpecSource, Specification};

#[async_trait]
pub trait SpecGenerator: Send + Sync {
    async fn generate_spec(&self, record: &BusinessRecord)
        -> Result<Specification, GenerationError>;
}

pub fn architect_prompt(record: &BusinessRecord) -> String {
    let mut prompt = String::from(
        "You are a senior web designer planning a single-page website for a local business.\n\
         Write a specification another model will follow to produce one self-contained HTML file \
         with inline CSS and JavaScript.\n\n\
         Business profile:\n",
    );
    for line in record.summary_lines() {
        prompt.push_str("- ");
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRespond with JSON only, using this shape:\n\
         {\"instructions\": \"<detailed build instructions>\", \
         \"palette\": [\"<hex colour>\", ...], \
         \"fonts\": [\"<font family>\", ...], \
         \"sections\": [\"<section name>\", ...]}\n",
    );
    prompt
}

pub struct LiveArchitect {
    client: Arc<dyn TextGenerator>,
}

impl LiveArchitect {
    pub fn new(client: Arc<dyn TextGenerator>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpecGenerator for LiveArchitect {
    async fn generate_spec(
        &self,
        record: &BusinessRecord,
    ) -> Result<Specification, GenerationError> {
        let response = self.client.complete(&architect_prompt(record)).await?;
        let cleaned = strip_code_fences(&response);
        let (spec, source) = Specification::parse_or_wrap(&cleaned);

        match source {
            SpecSource::Structured => {
                debug!("architect response parsed as structured specification")
            }
            SpecSource::Wrapped => {
                warn!("architect response was not structured JSON; using raw text as instructions")
            }
        }

        Ok(spec)
    }
}

/// Deterministic stand-in that never leaves the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockArchitect;

impl MockArchitect {
    pub fn specification(record: &BusinessRecord) -> Specification {
        let instructions = format!(
            "Build a single-page website for {name}, a {category} located at {location}. \
             Open with a hero that states what {name} offers, follow with an about section \
             based on this description: {description} \
             Close with contact details and a map link for {city}, {state}.",
            name = record.business_name,
            category = record.category.to_lowercase(),
            location = record.location(),
            description = record.description,
            city = record.city,
            state = record.state,
        );

        Specification {
            instructions,
            palette: Some(vec![
                "#1F3A5F".to_string(),
                "#F4F1EA".to_string(),
                "#E07A5F".to_string(),
            ]),
            fonts: Some(vec!["Playfair Display".to_string(), "Inter".to_string()]),
            sections: Some(vec![
                "hero".to_string(),
                "about".to_string(),
                "services".to_string(),
                "contact".to_string(),
            ]),
        }
    }
}

#[async_trait]
impl SpecGenerator for MockArchitect {
    async fn generate_spec(
        &self,
        record: &BusinessRecord,
    ) -> Result<Specification, GenerationError> {
        Ok(Self::specification(record))
    }
}
