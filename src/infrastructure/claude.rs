// src/infrastructure/claude.rs
use crate::application::{CardGenerator, GenerationRequest, ProviderInfo};
use crate::domain::GenerationError;
use crate::infrastructure::config::ClaudeConfig;
use crate::infrastructure::http::{build_client, check_status, join_url, map_request_error};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, instrument};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Card generation through the Anthropic Messages API.
pub struct ClaudeGenerator {
    client: Client,
    config: ClaudeConfig,
    api_key: Option<String>,
}

impl ClaudeGenerator {
    /// Reads the API key from the environment variable named in the config.
    pub fn new(config: ClaudeConfig, timeout_secs: u64) -> Result<Self, GenerationError> {
        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.trim().is_empty());
        Ok(Self {
            client: build_client(timeout_secs)?,
            config,
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key.as_deref().ok_or_else(|| {
            GenerationError::Auth(format!(
                "environment variable {} is not set",
                self.config.api_key_env
            ))
        })
    }
}

impl CardGenerator for ClaudeGenerator {
    #[instrument(level = "debug", skip(self, request), fields(model = %self.config.model))]
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(join_url(&self.config.base_url, "v1/messages"))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(map_request_error)?;
        let response = check_status(response)?;

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| GenerationError::Network(format!("Invalid response body: {}", e)))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        debug!(chars = text.len(), "Received completion");

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "claude".to_string(),
            model: self.config.model.clone(),
        }
    }

    fn check_availability(&self) -> Result<(), GenerationError> {
        self.api_key()
            .map(|_| ())
            .map_err(|e| GenerationError::Unavailable(e.to_string()))
    }
}
