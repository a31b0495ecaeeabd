use std::collections::HashMap;

use serde::Deserialize;

use crate::infrastructure::workflow::WorkflowEngineConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub engine: WorkflowEngineConfig,
    pub ai: AiConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Text generation backend settings
///
/// Without an `api_key` AI_PROMPT steps fail with a configuration error.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
    pub timeout_secs: u64,

    /// Prompt library addressed by `prompt_template_id`
    pub prompts: HashMap<String, String>,
}

/// Outbound client used by FETCH_API_DATA steps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            input_price_per_1k: 0.00015,
            output_price_per_1k: 0.0006,
            timeout_secs: 60,
            prompts: HashMap::new(),
        }
    }
}

impl AiConfig {
    /// API key, if one is set and not blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
