use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) must be set")]
    MissingApiKey,
    #[error("model identifier must not be empty")]
    EmptyModel,
    #[error("invalid API base URL: {0}")]
    InvalidApiBase(String),
}

#[derive(Debug, Parser)]
#[command(
    name = "addisafe",
    version,
    about = "Escanea etiquetas de alimentos y evalúa sus aditivos"
)]
pub struct Config {
    /// Credential for the Gemini inference API
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub model: String,

    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the camera page and the scanning API
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
        bind: String,
    },
    /// Analyze a single label photo and print the result
    Scan { path: PathBuf },
}

impl Config {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            bind: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn analysis_config(&self) -> Result<AnalysisConfig, ConfigError> {
        // Older deployments only export API_KEY
        let api_key = self
            .api_key
            .clone()
            .or_else(|| env::var("API_KEY").ok())
            .unwrap_or_default();

        AnalysisConfig::new(api_key, self.model.clone())?.with_api_base(&self.api_base)
    }
}

/// Settings handed to the analysis client. Construction validates them so a
/// bad key or model never reaches the first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    api_key: String,
    model: String,
    api_base: String,
}

impl AnalysisConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into().trim().to_string();
        let model = model.into().trim().to_string();

        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        Ok(Self {
            api_key,
            model,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, ConfigError> {
        let api_base = api_base.trim().trim_end_matches('/');
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(ConfigError::InvalidApiBase(api_base.to_string()));
        }
        self.api_base = api_base.to_string();
        Ok(self)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate_content_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}
