use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use sitegen_bucket::S3Config;

use crate::artifacts::ArtifactLayout;
use crate::error::ConfigError;
use crate::llm::{
    LlmConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};

const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub bind: SocketAddr,
    pub llm: LlmConfig,
    /// `None` when no bucket is configured; uploads are then skipped.
    pub storage: Option<S3Config>,
    pub layout: ArtifactLayout,
    pub require_doctype: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind: SocketAddr = parse_or(
            "SITEGEN_BIND",
            get("SITEGEN_BIND"),
            DEFAULT_BIND.parse().ok(),
        )?;

        let llm = LlmConfig {
            api_key: get("ANTHROPIC_API_KEY"),
            base_url: get("ANTHROPIC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("SITEGEN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_or(
                "SITEGEN_MAX_TOKENS",
                get("SITEGEN_MAX_TOKENS"),
                Some(DEFAULT_MAX_TOKENS),
            )?,
            timeout: Duration::from_secs(parse_or(
                "SITEGEN_LLM_TIMEOUT_SECS",
                get("SITEGEN_LLM_TIMEOUT_SECS"),
                Some(DEFAULT_TIMEOUT_SECS),
            )?),
        };

        let storage = match get("S3_BUCKET") {
            None => None,
            Some(bucket) => {
                let defaults = S3Config::default();
                Some(S3Config {
                    bucket,
                    region: get("S3_REGION").unwrap_or(defaults.region),
                    endpoint: get("S3_ENDPOINT_URL"),
                    access_key_id: get("S3_ACCESS_KEY_ID"),
                    secret_access_key: get("S3_SECRET_ACCESS_KEY"),
                    force_path_style: parse_flag(
                        "S3_FORCE_PATH_STYLE",
                        get("S3_FORCE_PATH_STYLE"),
                    )?,
                    public_base_url: get("S3_PUBLIC_BASE_URL"),
                })
            }
        };

        let layout = ArtifactLayout::new(
            get("SITEGEN_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            get("SITEGEN_TASKS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tasks")),
        );

        Ok(Self {
            database_url: get("DATABASE_URL").or_else(|| get("SITEGEN_DATABASE_URL")),
            bind,
            llm,
            storage,
            layout,
            require_doctype: parse_flag("SITEGEN_REQUIRE_DOCTYPE", get("SITEGEN_REQUIRE_DOCTYPE"))?,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing {
            name: "DATABASE_URL (or SITEGEN_DATABASE_URL)",
        })
    }

    pub fn require_storage(&self) -> Result<&S3Config, ConfigError> {
        self.storage
            .as_ref()
            .ok_or(ConfigError::Missing { name: "S3_BUCKET" })
    }

    pub fn storage_configured(&self) -> bool {
        self.storage.is_some()
    }
}

/// Accepts `true/false/1/0/yes/no` (any case). Absent means `false`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value {
        None => Ok(false),
        Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
            name,
            value,
            reason: "expected true or false".into(),
        }),
    }
}

fn parse_or<T>(
    name: &'static str,
    value: Option<String>,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
            value,
        }),
        None => default.ok_or(ConfigError::Missing { name }),
    }
}
