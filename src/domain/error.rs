use thiserror::Error;

/// Errors raised by the collaborators behind step handlers
///
/// Record stores, the execution log store, mailers, the text generator and
/// the outbound API client all report through this type. Handlers turn it
/// into a failed step; the engine never retries on it.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A record, execution log or prompt template does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Input rejected before any side effect, e.g. an empty recipient
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Closing an execution log that is already completed
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The text generator or an external API answered with an error
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Workflow files or backing stores could not be read or written
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// `provider` names the backend: `openai` for text generation, `http`
    /// for FETCH_API_DATA calls
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
