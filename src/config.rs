//! Configuration management for placepilot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub places: PlacesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// The two streaming inference endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Endpoint of the function-calling model that emits plans.
    pub plan_endpoint: String,
    /// Endpoint of the chat model that writes the final summary.
    pub summary_endpoint: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

fn default_auth_token_env() -> String {
    "PLACEPILOT_MODEL_TOKEN".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_places_key_env")]
    pub api_key_env: String,
}

fn default_places_key_env() -> String {
    "GOOGLE_MAPS_API_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Requests past this many queue for admission.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Pause between dry-run preview lines.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Pause between typewriter dots on an executing step.
    #[serde(default = "default_typewriter_delay_ms")]
    pub typewriter_delay_ms: u64,
    /// How many times the summary prompt may be truncated and retried
    /// before giving up.
    #[serde(default = "default_summary_retry_limit")]
    pub summary_retry_limit: u32,
}

fn default_max_concurrent() -> usize {
    20
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_typewriter_delay_ms() -> u64 {
    100
}

fn default_summary_retry_limit() -> u32 {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            step_delay_ms: default_step_delay_ms(),
            typewriter_delay_ms: default_typewriter_delay_ms(),
            summary_retry_limit: default_summary_retry_limit(),
        }
    }
}

impl PipelineConfig {
    /// Delay-free settings for tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            step_delay_ms: 0,
            typewriter_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig {
                plan_endpoint: "http://localhost:8080".to_string(),
                summary_endpoint: "http://localhost:8081".to_string(),
                auth_token: None,
                auth_token_env: default_auth_token_env(),
            },
            places: PlacesConfig {
                api_key: None,
                api_key_env: default_places_key_env(),
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".placepilot").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default()
        };

        if let Ok(endpoint) = std::env::var("PLACEPILOT_PLAN_ENDPOINT") {
            config.models.plan_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("PLACEPILOT_SUMMARY_ENDPOINT") {
            config.models.summary_endpoint = endpoint;
        }

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Bearer token for the model endpoints, if any is configured.
    pub fn model_token(&self) -> Option<String> {
        if let Some(token) = &self.models.auth_token {
            if !token.is_empty() {
                return Some(token.clone());
            }
        }
        std::env::var(&self.models.auth_token_env).ok()
    }

    pub fn places_api_key(&self) -> Result<String> {
        if let Some(key) = &self.places.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var(&self.places.api_key_env).with_context(|| {
            format!(
                "Places API key not found. Either:\n  \
                 1. Set api_key in config file: {}\n  \
                 2. Set environment variable: export {}=your-key",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.places.api_key_env
            )
        })
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(config_path)
    }
}
