//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub openai_api_key: String,
    pub ai_model: String,
    pub local_store_path: PathBuf,
    pub question_page_size: usize,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Backend ---
        let database_url = required("DATABASE_URL")?;
        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;

        // --- AI provider ---
        let openai_api_key = required("OPENAI_API_KEY")?;
        let ai_model = lookup("AI_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        // --- Local state ---
        let local_store_path = lookup("LOCAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./fitqa-store.json"));

        let question_page_size = match lookup("QUESTION_PAGE_SIZE") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "QUESTION_PAGE_SIZE".to_string(),
                        format!("'{}' is not a positive integer", raw),
                    ))
                }
            },
            None => fitqa_core::store::DEFAULT_PAGE_SIZE,
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            database_url,
            supabase_url,
            supabase_anon_key,
            openai_api_key,
            ai_model,
            local_store_path,
            question_page_size,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/fitqa"),
        ("SUPABASE_URL", "https://demo.supabase.co/"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = Config::from_lookup(vars(&REQUIRED)).unwrap();
        assert_eq!(config.supabase_url, "https://demo.supabase.co");
        assert_eq!(config.ai_model, "gpt-3.5-turbo");
        assert_eq!(config.question_page_size, fitqa_core::store::DEFAULT_PAGE_SIZE);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.local_store_path, PathBuf::from("./fitqa-store.json"));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(vars(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "DATABASE_URL"));
    }

    #[test]
    fn bad_page_size_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("QUESTION_PAGE_SIZE", "0"));
        let err = Config::from_lookup(vars(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "QUESTION_PAGE_SIZE"));
    }
}
