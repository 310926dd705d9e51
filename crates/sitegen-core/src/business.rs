use serde::{Deserialize, Serialize};

use crate::slug::business_slug;

/// A validated business profile. Produced by [`crate::validation::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusinessRecord {
    pub business_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

impl BusinessRecord {
    pub fn slug(&self) -> String {
        business_slug(&self.business_name)
    }

    pub fn location(&self) -> String {
        format!("{}, {}, {}", self.address, self.city, self.state)
    }

    /// Line-per-field rendering used when embedding the record in prompts and
    /// handoff files.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Business name: {}", self.business_name),
            format!("Category: {}", self.category),
            format!("Address: {}", self.location()),
            format!("Description: {}", self.description),
        ];

        let optional = [
            ("Owner", &self.owner_name),
            ("Phone", &self.phone),
            ("Email", &self.email),
            ("Hours", &self.hours),
            ("Website", &self.website),
        ];
        for (label, value) in optional {
            if let Some(value) = value {
                lines.push(format!("{label}: {value}"));
            }
        }

        if !self.photos.is_empty() {
            lines.push(format!("Photos: {}", self.photos.join(", ")));
        }

        lines
    }
}
