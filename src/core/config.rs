//! Process-wide configuration, read once at startup.
//!
//! All knobs come from the environment (a `.env` file is honored by the
//! binary before this runs). The provider API key is mandatory: startup
//! fails fast instead of letting unauthenticated calls fail downstream.

use std::env;
use std::path::PathBuf;

use crate::core::errors::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_TOP_K: usize = 2;
pub const DEFAULT_HISTORY_CAP: usize = 8;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    /// Number of pages retrieved per question.
    pub top_k: usize,
    /// Message-history length that triggers trimming of the oldest pair.
    pub history_cap: usize,
    pub log_dir: PathBuf,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        let api_key = env::var("PAPERCHAT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ApiError::Config("PAPERCHAT_API_KEY is not set".to_string())
            })?;

        let base_url = env::var("PAPERCHAT_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let chat_model =
            env::var("PAPERCHAT_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let embed_model =
            env::var("PAPERCHAT_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());

        let top_k = parse_env("PAPERCHAT_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(ApiError::Config(
                "PAPERCHAT_TOP_K must be at least 1".to_string(),
            ));
        }
        let history_cap = parse_env("PAPERCHAT_HISTORY_CAP", DEFAULT_HISTORY_CAP)?;
        if history_cap < 2 {
            return Err(ApiError::Config(
                "PAPERCHAT_HISTORY_CAP must be at least 2".to_string(),
            ));
        }

        let log_dir = env::var("PAPERCHAT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let port = parse_env("PORT", 0u16)?;

        Ok(Self {
            api_key,
            base_url,
            chat_model,
            embed_model,
            top_k,
            history_cap,
            log_dir,
            port,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ApiError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ApiError::Config(format!("{} is not a valid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
