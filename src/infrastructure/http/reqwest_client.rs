use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::domain::http::{ApiAuth, ApiClient, ApiRequest, ApiResponse, HttpMethod};
use crate::domain::DomainError;

const PROVIDER: &str = "http";

/// ApiClient backed by a shared reqwest connection pool
#[derive(Debug, Clone, Default)]
pub struct ReqwestApiClient {
    client: reqwest::Client,
}

impl ReqwestApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn builder(&self, request: &ApiRequest) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .header(ACCEPT, "application/json");

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.auth {
            ApiAuth::None => builder,
            ApiAuth::Bearer(token) => builder.bearer_auth(token),
            ApiAuth::Basic { username, password } => {
                builder.basic_auth(username, password.as_ref())
            }
            ApiAuth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
        };

        match (&request.payload, request.method) {
            (None, _) => builder,
            (Some(_), HttpMethod::Get) => builder.query(&request.query_pairs()),
            (Some(payload), _) => builder.json(payload),
        }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// JSON when the body parses, plain text otherwise
fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl ApiClient for ReqwestApiClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, DomainError> {
        debug!(method = %request.method, url = %request.url, "Sending API request");

        let response = self
            .builder(&request)
            .send()
            .await
            .map_err(|e| DomainError::provider(PROVIDER, format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            DomainError::provider(PROVIDER, format!("Failed to read response: {}", e))
        })?;

        if !status.is_success() {
            return Err(DomainError::provider(
                PROVIDER,
                format!("HTTP {}: {}", status.as_u16(), text),
            ));
        }

        Ok(ApiResponse::new(status.as_u16(), decode_body(text)))
    }
}
