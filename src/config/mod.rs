//! Configuration management

pub mod commands;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::translate::llm::DEFAULT_MODEL;
use crate::translate::orchestrator::{DEFAULT_ASYNC_MAX_TOKENS, DEFAULT_MAX_TOKENS};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "idml-translator";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL
    #[serde(default)]
    pub openai_api_base: Option<String>,

    /// Chat model used for translation and token estimates
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Used when `translate` is run without `-t`
    #[serde(default)]
    pub target_languages: Vec<String>,

    /// System prompt template; `{from_lang}` and `{to_lang}` are substituted
    #[serde(default)]
    pub custom_prompt: Option<String>,

    /// Token ceiling per batch in sequential mode
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Token ceiling per batch in concurrent mode
    #[serde(default = "default_async_max_tokens")]
    pub async_max_tokens: usize,

    /// Pause after each batch, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    #[serde(default)]
    pub concurrent: bool,
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_async_max_tokens() -> usize {
    DEFAULT_ASYNC_MAX_TOKENS
}

fn default_delay_secs() -> f64 {
    1.0
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_languages: Vec::new(),
            custom_prompt: None,
            max_tokens: default_max_tokens(),
            async_max_tokens: default_async_max_tokens(),
            delay_secs: default_delay_secs(),
            concurrent: false,
        }
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Load config from default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config path")?;
        Self::load_from(&path)
    }

    /// Load config from `path`, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path().context("Could not determine config path")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// API key from the config file, then `OPENAI_API_KEY`
    pub fn get_api_key(&self) -> Option<String> {
        self.api
            .openai_api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn get_api_base(&self) -> Option<String> {
        self.api.openai_api_base.clone()
    }

    /// Model from the config file, then `OPENAI_MODEL`, then the built-in default
    pub fn get_model(&self) -> String {
        self.api
            .model
            .clone()
            .or_else(|| std::env::var("OPENAI_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Set a value by dotted key (e.g. `translation.max_tokens`).
    /// An empty value clears optional keys.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["api", "openai_api_key"] => self.api.openai_api_key = optional(value),
            ["api", "openai_api_base"] => self.api.openai_api_base = optional(value),
            ["api", "model"] => self.api.model = optional(value),
            ["translation", "source_language"] => {
                self.translation.source_language = value.to_string();
            }
            ["translation", "target_languages"] => {
                self.translation.target_languages = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["translation", "custom_prompt"] => self.translation.custom_prompt = optional(value),
            ["translation", "max_tokens"] => {
                self.translation.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid token count: {}", value))?;
            }
            ["translation", "async_max_tokens"] => {
                self.translation.async_max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid token count: {}", value))?;
            }
            ["translation", "delay_secs"] => {
                let delay: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid delay: {}", value))?;
                anyhow::ensure!(delay >= 0.0, "Delay must not be negative");
                self.translation.delay_secs = delay;
            }
            ["translation", "concurrent"] => {
                self.translation.concurrent = value
                    .parse()
                    .with_context(|| format!("Expected true or false, got {}", value))?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }

    /// Read a value by dotted key. API keys come back masked.
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let parts: Vec<&str> = key.split('.').collect();

        let value = match parts.as_slice() {
            ["api", "openai_api_key"] => self.api.openai_api_key.as_deref().map(mask_key),
            ["api", "openai_api_base"] => self.api.openai_api_base.clone(),
            ["api", "model"] => self.api.model.clone(),
            ["translation", "source_language"] => Some(self.translation.source_language.clone()),
            ["translation", "target_languages"] => {
                Some(self.translation.target_languages.join(","))
            }
            ["translation", "custom_prompt"] => self.translation.custom_prompt.clone(),
            ["translation", "max_tokens"] => Some(self.translation.max_tokens.to_string()),
            ["translation", "async_max_tokens"] => {
                Some(self.translation.async_max_tokens.to_string())
            }
            ["translation", "delay_secs"] => Some(self.translation.delay_secs.to_string()),
            ["translation", "concurrent"] => Some(self.translation.concurrent.to_string()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        };

        Ok(value)
    }
}
