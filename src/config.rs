//! Configuration
//!
//! Settings come from the environment (optionally via `.env`); command-line
//! flags override them in the binaries.

use crate::error::{Result, RoamingError};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_DB_PATH: &str = "telecom_data.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

/// Bounds for one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_steps: usize,
    pub top_k: usize,
    /// Ceiling for a row count the question asks for explicitly.
    pub max_explicit_rows: usize,
    /// Tool results longer than this are cut before entering the transcript.
    pub max_result_chars: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_steps: 15,
            top_k: 5,
            max_explicit_rows: 1000,
            max_result_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub db_path: PathBuf,
    pub loop_settings: LoopSettings,
    pub log_dir: PathBuf,
    pub server_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = LoopSettings::default();

        let top_k = parse_number(&get, "ROAMING_TOP_K", defaults.top_k)?;
        let max_steps = parse_number(&get, "ROAMING_MAX_STEPS", defaults.max_steps)?;
        if top_k == 0 {
            return Err(RoamingError::Config("ROAMING_TOP_K must be at least 1".to_string()));
        }
        if max_steps == 0 {
            return Err(RoamingError::Config("ROAMING_MAX_STEPS must be at least 1".to_string()));
        }

        Ok(Self {
            llm: LlmSettings {
                api_key: get("GOOGLE_API_KEY").or_else(|| get("LLM_API_KEY")),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            db_path: PathBuf::from(get("ROAMING_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string())),
            loop_settings: LoopSettings {
                max_steps,
                top_k,
                ..defaults
            },
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
            server_addr: get("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.llm.api_key.as_deref().ok_or_else(|| {
            RoamingError::Config(
                "no LLM credential configured; set GOOGLE_API_KEY or LLM_API_KEY".to_string(),
            )
        })
    }
}

fn parse_number<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            RoamingError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
    }
}
