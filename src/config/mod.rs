//! Layered application configuration

mod app_config;

pub use app_config::{AiConfig, AppConfig, HttpConfig, LogFormat, LoggingConfig};
