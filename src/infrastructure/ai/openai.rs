use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::http::{ApiAuth, ApiClient, ApiRequest};
use crate::domain::workflow::template::render_with;
use crate::domain::{DomainError, Generation, GenerationRequest, TextGenerator};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const PROVIDER: &str = "openai";

/// Price per thousand tokens, used to estimate the cost of a generation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TokenPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Text generator backed by an OpenAI-compatible chat completions API
///
/// Requests naming a `prompt_template_id` are rendered from the configured
/// prompt library with the request variables. Variables are also sent to the
/// model as a system message holding their JSON.
pub struct OpenAiTextGenerator<C: ApiClient> {
    client: C,
    api_key: String,
    base_url: String,
    model: String,
    pricing: TokenPricing,
    prompts: HashMap<String, String>,
}

impl<C: ApiClient> OpenAiTextGenerator<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            pricing: TokenPricing::default(),
            prompts: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_prompts(mut self, prompts: HashMap<String, String>) -> Self {
        self.prompts = prompts;
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Final prompt text: inline when given, otherwise the rendered template
    fn prompt_text(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        if !request.prompt.trim().is_empty() {
            return Ok(request.prompt.clone());
        }

        let template_id = request
            .prompt_template_id
            .as_deref()
            .ok_or_else(|| DomainError::validation("Generation request has no prompt"))?;
        let template = self.prompts.get(template_id).ok_or_else(|| {
            DomainError::not_found(format!("Prompt template '{}' not found", template_id))
        })?;

        Ok(render_with(template, &request.variables))
    }

    fn build_request(
        &self,
        model: &str,
        prompt: String,
        request: &GenerationRequest,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if !request.variables.is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: format!(
                    "Input data:\n{}",
                    serde_json::Value::Object(request.variables.clone())
                ),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: prompt,
        });

        serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Generation, DomainError> {
        let response: OpenAiResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::provider(PROVIDER, "No choices in response"))?;

        let text = choice.message.content.unwrap_or_default();
        let usage = response.usage.unwrap_or_default();

        Ok(Generation::from_text(response.model, text)
            .with_token_usage(usage.prompt_tokens + usage.completion_tokens)
            .with_cost(self.pricing.cost(usage.prompt_tokens, usage.completion_tokens)))
    }
}

#[async_trait]
impl<C: ApiClient> TextGenerator for OpenAiTextGenerator<C> {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, DomainError> {
        let prompt = self.prompt_text(&request)?;
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());

        debug!(model = %model, prompt_chars = prompt.len(), "Calling chat completions");

        let body = self.build_request(&model, prompt, &request);
        let response = self
            .client
            .send(
                ApiRequest::post(self.chat_completions_url())
                    .with_auth(ApiAuth::Bearer(self.api_key.clone()))
                    .with_payload(body),
            )
            .await
            .map_err(|e| DomainError::provider(PROVIDER, e.to_string()))?;

        self.parse_response(response.body)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::http::{ApiResponse, HttpMethod, MockApiClient};
    use crate::infrastructure::http::ReqwestApiClient;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_URL: &str = "https://api.openai.com/v1/chat/completions";

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
        })
    }

    fn replying(content: &'static str, check: fn(&ApiRequest) -> bool) -> MockApiClient {
        let mut client = MockApiClient::new();
        client
            .expect_send()
            .withf(move |req| {
                req.method == HttpMethod::Post && req.url == TEST_URL && check(req)
            })
            .times(1)
            .returning(move |_| Ok(ApiResponse::new(200, completion(content))));
        client
    }

    #[test]
    fn test_token_pricing() {
        let pricing = TokenPricing::new(0.5, 1.5);
        assert!((pricing.cost(2000, 1000) - 2.5).abs() < f64::EPSILON);
        assert_eq!(TokenPricing::default().cost(100, 100), 0.0);
    }

    #[tokio::test]
    async fn test_generate_inline_prompt() {
        let client = replying(r#"{"title": "Hi"}"#, |req| {
            let body = req.payload.as_ref().unwrap();
            req.auth == ApiAuth::Bearer("test-key".into())
                && body["model"] == json!("gpt-4o-mini")
                && body["messages"] == json!([{"role": "user", "content": "Write a title"}])
        });
        let generator =
            OpenAiTextGenerator::new(client, "test-key").with_pricing(TokenPricing::new(0.15, 0.6));

        let generation = generator
            .generate(GenerationRequest::new("Write a title"))
            .await
            .unwrap();

        assert_eq!(generation.parsed, json!({"title": "Hi"}));
        assert_eq!(generation.raw.model, "gpt-4o-mini");
        assert_eq!(generation.token_usage, 1500);
        assert!((generation.cost - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_generate_from_template() {
        let client = replying("Dear Ada", |req| {
            let body = req.payload.as_ref().unwrap();
            body["model"] == json!("gpt-4o")
                && body["messages"][0]["role"] == json!("system")
                && body["messages"][1]["content"] == json!("Write to Ada about pricing")
        });
        let prompts = HashMap::from([(
            "outreach".to_string(),
            "Write to {{ name }} about {{ topic }}".to_string(),
        )]);
        let generator = OpenAiTextGenerator::new(client, "test-key")
            .with_model("gpt-4o")
            .with_prompts(prompts);

        let mut variables = serde_json::Map::new();
        variables.insert("name".to_string(), json!("Ada"));
        variables.insert("topic".to_string(), json!("pricing"));
        let request = GenerationRequest::from_template("outreach").with_variables(variables);

        let generation = generator.generate(request).await.unwrap();
        assert_eq!(generation.parsed, json!({"text": "Dear Ada"}));
    }

    #[tokio::test]
    async fn test_unknown_template_is_not_found() {
        let mut client = MockApiClient::new();
        client.expect_send().never();
        let generator = OpenAiTextGenerator::new(client, "test-key");

        let err = generator
            .generate(GenerationRequest::from_template("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_provider_error() {
        let mut client = MockApiClient::new();
        client
            .expect_send()
            .returning(|_| Err(DomainError::provider("http", "HTTP 401: API key invalid")));
        let generator = OpenAiTextGenerator::new(client, "invalid-key");

        let err = generator
            .generate(GenerationRequest::new("Hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Provider { ref provider, .. } if provider == "openai"));
    }

    #[tokio::test]
    async fn test_response_without_choices() {
        let mut client = MockApiClient::new();
        client
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(200, json!({"model": "x", "choices": []}))));
        let generator = OpenAiTextGenerator::new(client, "key");

        let err = generator
            .generate(GenerationRequest::new("Hello"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No choices in response"));
    }

    #[tokio::test]
    async fn test_against_http_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer server-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("pong")))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiTextGenerator::new(ReqwestApiClient::new(), "server-key")
            .with_base_url(format!("{}/", server.uri()));

        let generation = generator.generate(GenerationRequest::new("ping")).await.unwrap();
        assert_eq!(generation.raw.text, "pong");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let generator =
            OpenAiTextGenerator::new(ReqwestApiClient::new(), "nope").with_base_url(server.uri());

        let err = generator
            .generate(GenerationRequest::new("ping"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 401"));
    }
}
