//! Server Configuration
//!
//! Every setting comes from the environment (after `.env` is loaded).
//! Required credentials are checked in one pass so that startup reports
//! all missing variables at once, before any agent or client is built.

use std::str::FromStr;

use agent_core::provider::DEFAULT_MODEL;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which language-model backend answers the agent's prompts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmBackend {
    #[default]
    Groq,
    Ollama,
}

impl FromStr for LlmBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: LlmBackend,
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub ollama_model: String,
    pub noaa_api_key: Option<String>,
    pub copernicus_uid: Option<String>,
    pub copernicus_api_key: Option<String>,
    pub nasa_api_key: Option<String>,
    pub max_iterations: usize,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            backend: parse_or(&get, "LLM_BACKEND", LlmBackend::default())?,
            groq_api_key: get("GROQ_API_KEY"),
            groq_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into()),
            ollama_port: parse_or(&get, "OLLAMA_PORT", 11434)?,
            ollama_model: get("OLLAMA_MODEL").unwrap_or_else(|| "llama3.2".into()),
            noaa_api_key: get("NOAA_API_KEY"),
            copernicus_uid: get("COPERNICUS_UID"),
            copernicus_api_key: get("COPERNICUS_API_KEY"),
            nasa_api_key: get("NASA_API_KEY"),
            max_iterations: parse_or(&get, "AGENT_MAX_ITERATIONS", 10)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
        })
    }

    /// Names of all required variables that are unset
    pub fn missing(&self) -> Vec<&'static str> {
        let mut required = Vec::new();
        if self.backend == LlmBackend::Groq {
            required.push(("GROQ_API_KEY", &self.groq_api_key));
        }
        required.extend([
            ("NOAA_API_KEY", &self.noaa_api_key),
            ("COPERNICUS_UID", &self.copernicus_uid),
            ("COPERNICUS_API_KEY", &self.copernicus_api_key),
            ("NASA_API_KEY", &self.nasa_api_key),
        ]);

        required
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key)
            .collect()
    }

    /// Model name sent with every completion request
    pub fn model(&self) -> &str {
        match self.backend {
            LlmBackend::Groq => &self.groq_model,
            LlmBackend::Ollama => &self.ollama_model,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
