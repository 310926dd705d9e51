// crates/sitegen-core/src/validation.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::business::BusinessRecord;
use crate::error::FieldError;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]{7,20}$").expect("phone pattern compiles"));
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("url pattern compiles"));

/// Required text fields with their inclusive character-length bounds.
pub const REQUIRED_FIELDS: [(&str, usize, usize); 6] = [
    ("business_name", 2, 100),
    ("address", 5, 200),
    ("city", 2, 50),
    ("state", 2, 50),
    ("category", 2, 50),
    ("description", 20, 2000),
];

const OWNER_NAME_MAX: usize = 100;
const HOURS_MAX: usize = 200;

/// Check an untyped submission against the business record schema.
///
/// Every problem is collected before returning, so callers can report all of
/// them at once.
pub fn validate(input: &Value) -> Result<BusinessRecord, Vec<FieldError>> {
    let Some(object) = input.as_object() else {
        return Err(vec![FieldError::new(
            "record",
            "record must be a JSON object",
        )]);
    };

    let mut errors = Vec::new();
    let required = REQUIRED_FIELDS
        .map(|(field, min, max)| required_text(object, field, min, max, &mut errors));

    let owner_name = optional_text(object, "owner_name", &mut errors)
        .filter(|value| within_max("owner_name", value, OWNER_NAME_MAX, &mut errors));
    let hours = optional_text(object, "hours", &mut errors)
        .filter(|value| within_max("hours", value, HOURS_MAX, &mut errors));
    let phone = optional_text(object, "phone", &mut errors).filter(|value| {
        matches_pattern("phone", value, &PHONE_PATTERN, "phone number", &mut errors)
    });
    let email = optional_text(object, "email", &mut errors).filter(|value| {
        matches_pattern("email", value, &EMAIL_PATTERN, "email address", &mut errors)
    });
    let website = optional_text(object, "website", &mut errors)
        .filter(|value| matches_pattern("website", value, &URL_PATTERN, "URL", &mut errors));
    let photos = photo_list(object, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    let [business_name, address, city, state, category, description] =
        required.map(Option::unwrap_or_default);
    Ok(BusinessRecord {
        business_name,
        address,
        city,
        state,
        category,
        description,
        owner_name,
        phone,
        email,
        hours,
        website,
        photos,
    })
}

fn required_text(
    object: &Map<String, Value>,
    field: &str,
    min: usize,
    max: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let value = match object.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, format!("{field} is required")));
            return None;
        }
        Some(Value::String(value)) => value.trim(),
        Some(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a string")));
            return None;
        }
    };

    let length = value.chars().count();
    if length == 0 {
        errors.push(FieldError::new(field, format!("{field} is required")));
        None
    } else if length < min {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at least {min} characters"),
        ));
        None
    } else if length > max {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at most {max} characters"),
        ));
        None
    } else {
        Some(value.to_string())
    }
}

/// Absent, null and blank values all read as "not provided".
fn optional_text(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a string")));
            None
        }
    }
}

fn within_max(field: &str, value: &str, max: usize, errors: &mut Vec<FieldError>) -> bool {
    if value.chars().count() > max {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at most {max} characters"),
        ));
        false
    } else {
        true
    }
}

fn matches_pattern(
    field: &str,
    value: &str,
    pattern: &Regex,
    description: &str,
    errors: &mut Vec<FieldError>,
) -> bool {
    if pattern.is_match(value) {
        true
    } else {
        errors.push(FieldError::new(
            field,
            format!("{field} must be a valid {description}"),
        ));
        false
    }
}

fn photo_list(object: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Vec<String> {
    let entries = match object.get("photos") {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            errors.push(FieldError::new("photos", "photos must be a list of URLs"));
            return Vec::new();
        }
    };

    let mut photos = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let field = format!("photos[{index}]");
        match entry.as_str().map(str::trim) {
            Some(url) if URL_PATTERN.is_match(url) => photos.push(url.to_string()),
            _ => errors.push(FieldError::new(
                field.clone(),
                format!("{field} must be a valid URL"),
            )),
        }
    }
    photos
}
