//! Outbound API calls made by FETCH_API_DATA steps and the text generator

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;
use crate::domain::workflow::template::value_to_string;

/// HTTP methods a step may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse a method name case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials attached to an API request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ApiAuth {
    #[default]
    None,
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
    /// Arbitrary header such as `X-Api-Key`
    Header { name: String, value: String },
}

/// A single outbound API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub auth: ApiAuth,

    /// Query parameters for GET, JSON body for every other method
    pub payload: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            auth: ApiAuth::None,
            payload: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_auth(mut self, auth: ApiAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Payload flattened to query parameters; only object payloads qualify
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match &self.payload {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| (key.clone(), value_to_string(value)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Successful API response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,

    /// Decoded JSON, the raw text when the body is not JSON, `null` when empty
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Client for outbound API calls
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Send the request; a non-success status is a provider error
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, DomainError>;
}
