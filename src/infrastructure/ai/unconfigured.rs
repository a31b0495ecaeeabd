use async_trait::async_trait;

use crate::domain::{DomainError, Generation, GenerationRequest, TextGenerator};

/// Stand-in used when no AI backend is configured; every call fails
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredTextGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredTextGenerator {
    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, DomainError> {
        Err(DomainError::configuration(
            "No AI provider configured; set ai.api_key to enable AI_PROMPT steps",
        ))
    }
}
