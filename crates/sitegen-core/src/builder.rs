//! "Builder" stage: specification in, self-contained HTML document out.

use std::sync::Arc;

use async_trait::async_trait;

use crate::business::BusinessRecord;
use crate::error::GenerationError;
use crate::llm::TextGenerator;
use crate::markup::{escape_html, strip_code_fences};
use crate::specification::Specification;

#[async_trait]
pub trait MarkupGenerator: Send + Sync {
    async fn generate_markup(
        &self,
        spec: &Specification,
        record: &BusinessRecord,
    ) -> Result<String, GenerationError>;
}

pub fn builder_prompt(spec: &Specification, record: &BusinessRecord) -> String {
    format!(
        "You are an expert front-end developer. Build the website described below as ONE \
         complete HTML document.\n\
         Requirements:\n\
         - Start with <!DOCTYPE html>.\n\
         - Inline all CSS in a <style> element and all JavaScript in a <script> element.\n\
         - Responsive layout, accessible markup, no external build steps.\n\
         - Output only the HTML, no commentary and no markdown fences.\n\n\
         Business: {name} ({category}), {location}\n\n\
         Specification:\n{spec}",
        name = record.business_name,
        category = record.category,
        location = record.location(),
        spec = spec.to_markdown(),
    )
}

pub struct LiveBuilder {
    client: Arc<dyn TextGenerator>,
}

impl LiveBuilder {
    pub fn new(client: Arc<dyn TextGenerator>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarkupGenerator for LiveBuilder {
    async fn generate_markup(
        &self,
        spec: &Specification,
        record: &BusinessRecord,
    ) -> Result<String, GenerationError> {
        let response = self.client.complete(&builder_prompt(spec, record)).await?;
        let markup = strip_code_fences(&response);
        if markup.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "builder returned an empty document".into(),
            ));
        }
        Ok(markup)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockBuilder;

impl MockBuilder {
    pub fn render(spec: &Specification, record: &BusinessRecord) -> String {
        let palette = spec.palette.clone().unwrap_or_default();
        let primary = palette.first().map(String::as_str).unwrap_or("#1F3A5F");
        let background = palette.get(1).map(String::as_str).unwrap_or("#FFFFFF");
        let accent = palette.get(2).map(String::as_str).unwrap_or("#E07A5F");
        let font = spec
            .fonts
            .as_ref()
            .and_then(|fonts| fonts.last())
            .map(String::as_str)
            .unwrap_or("system-ui");

        let name = escape_html(&record.business_name);
        let mut contact = format!("<p>{}</p>\n", escape_html(&record.location()));
        if let Some(phone) = &record.phone {
            contact.push_str(&format!("      <p>Phone: {}</p>\n", escape_html(phone)));
        }
        if let Some(email) = &record.email {
            contact.push_str(&format!("      <p>Email: {}</p>\n", escape_html(email)));
        }
        if let Some(hours) = &record.hours {
            contact.push_str(&format!("      <p>Hours: {}</p>\n", escape_html(hours)));
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{name}</title>
  <style>
    body {{ margin: 0; font-family: {font}, sans-serif; background: {background}; color: {primary}; }}
    header {{ padding: 4rem 1.5rem; background: {primary}; color: {background}; text-align: center; }}
    section {{ max-width: 48rem; margin: 0 auto; padding: 2rem 1.5rem; }}
    a {{ color: {accent}; }}
  </style>
</head>
<body>
  <header>
    <h1>{name}</h1>
    <p>{category} in {city}</p>
  </header>
  <main>
    <section id="about">
      <h2>About</h2>
      <p>{description}</p>
    </section>
    <section id="contact">
      <h2>Contact</h2>
      {contact}    </section>
  </main>
</body>
</html>
"#,
            name = name,
            font = escape_html(font),
            background = escape_html(background),
            primary = escape_html(primary),
            accent = escape_html(accent),
            category = escape_html(&record.category),
            city = escape_html(&record.city),
            description = escape_html(&record.description),
            contact = contact,
        )
    }
}

#[async_trait]
impl MarkupGenerator for MockBuilder {
    async fn generate_markup(
        &self,
        spec: &Specification,
        record: &BusinessRecord,
    ) -> Result<String, GenerationError> {
        Ok(Self::render(spec, record))
    }
}
