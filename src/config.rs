use std::path::PathBuf;

use anyhow::Context;

const DEFAULT_LUT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_LUT_API_MODEL: &str = "mistral";
const DEFAULT_PORT: u16 = 8080;

/// Process settings read from the environment (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub lut_api_base_url: String,
    pub lut_api_model: String,
    pub port: u16,
    pub pretrained_luts_path: Option<PathBuf>,
    pub cors_allow_origin: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL")
            .context("DATABASE_URL must be set (copy .env.example to .env)")?;
        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT '{raw}' is not a valid port"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            lut_api_base_url: get("LUT_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LUT_API_BASE_URL.to_string()),
            lut_api_model: get("LUT_API_MODEL").unwrap_or_else(|| DEFAULT_LUT_API_MODEL.to_string()),
            port,
            pretrained_luts_path: get("PRETRAINED_LUTS_PATH").map(PathBuf::from),
            cors_allow_origin: get("CORS_ALLOW_ORIGIN"),
        })
    }
}
