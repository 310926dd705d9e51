use serde::{Deserialize, Serialize};

/// Architect output: natural-language build instructions plus optional
/// structured design hints for the Builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Specification {
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fonts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<String>>,
}

/// How [`Specification::parse_or_wrap`] arrived at its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecSource {
    Structured,
    Wrapped,
}

impl Specification {
    pub fn from_instructions(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            palette: None,
            fonts: None,
            sections: None,
        }
    }

    /// Parse a model response as a specification, falling back to treating
    /// the whole text as instructions when it is not a JSON specification.
    pub fn parse_or_wrap(text: &str) -> (Self, SpecSource) {
        match serde_json::from_str::<Specification>(text) {
            Ok(spec) if !spec.instructions.trim().is_empty() => (spec, SpecSource::Structured),
            _ => (Self::from_instructions(text.trim()), SpecSource::Wrapped),
        }
    }

    /// Markdown rendering used in prompts and handoff files.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(self.instructions.trim());
        out.push('\n');

        let hints = [
            ("Palette", &self.palette),
            ("Fonts", &self.fonts),
            ("Sections", &self.sections),
        ];
        for (label, values) in hints {
            if let Some(values) = values.as_ref().filter(|values| !values.is_empty()) {
                out.push_str(&format!("\n{label}: {}\n", values.join(", ")));
            }
        }

        out
    }
}
