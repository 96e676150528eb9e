// src/infrastructure/ollama.rs
use crate::application::{CardGenerator, GenerationRequest, ImageCaptioner, ProviderInfo};
use crate::application::prompt::truncate_chars;
use crate::domain::GenerationError;
use crate::infrastructure::config::{OllamaConfig, VisionConfig};
use crate::infrastructure::http::{build_client, check_status, join_url, map_request_error};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const AVAILABILITY_TIMEOUT_SECS: u64 = 5;
const PAGE_CONTEXT_LIMIT: usize = 300;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    model_info: Map<String, Value>,
}

/// Thin client for a local Ollama server.
struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    fn generate(&self, body: &GenerateRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(join_url(&self.base_url, "api/generate"))
            .json(body)
            .send()
            .map_err(map_request_error)?;
        let parsed: GenerateResponse = check_status(response)?
            .json()
            .map_err(|e| GenerationError::Network(format!("Invalid response body: {}", e)))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    /// Context window the server reports for the model, if any.
    fn context_length(&self) -> Result<Option<usize>, GenerationError> {
        let response = self
            .client
            .post(join_url(&self.base_url, "api/show"))
            .json(&json!({ "model": self.model }))
            .send()
            .map_err(map_request_error)?;
        let show: ShowResponse = check_status(response)?
            .json()
            .map_err(|e| GenerationError::Network(format!("Invalid show response: {}", e)))?;
        Ok(context_length_from(&show.model_info))
    }

    /// Server reachable and the model pulled. Names match by substring either way,
    /// so `llava` matches `llava:latest`.
    fn check_model(&self) -> Result<(), GenerationError> {
        let client = build_client(AVAILABILITY_TIMEOUT_SECS)?;
        let response = client
            .get(join_url(&self.base_url, "api/tags"))
            .send()
            .map_err(|e| GenerationError::Unavailable(format!("Ollama not reachable: {}", e)))?;
        let tags: TagsResponse = check_status(response)?
            .json()
            .map_err(|e| GenerationError::Unavailable(format!("Invalid tags response: {}", e)))?;

        let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        if names
            .iter()
            .any(|name| name.contains(&self.model) || self.model.contains(name))
        {
            Ok(())
        } else {
            Err(GenerationError::Unavailable(format!(
                "model '{}' not found, available: {}",
                self.model,
                names.join(", ")
            )))
        }
    }
}

/// Card generation with a local Ollama text model.
pub struct OllamaGenerator {
    inner: OllamaClient,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(config: &OllamaConfig, timeout_secs: u64) -> Result<Self, GenerationError> {
        Ok(Self {
            inner: OllamaClient::new(&config.base_url, &config.model, timeout_secs)?,
            temperature: config.temperature,
        })
    }
}

impl OllamaGenerator {
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn context_length(&self) -> Result<Option<usize>, GenerationError> {
        self.inner.context_length()
    }
}

impl CardGenerator for OllamaGenerator {
    #[instrument(level = "debug", skip(self, request), fields(model = %self.inner.model))]
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            model: &self.inner.model,
            prompt: &request.prompt,
            stream: false,
            system: request.system.as_deref(),
            images: vec![],
            options: Some(GenerateOptions {
                temperature: self.temperature,
            }),
        };
        let text = self.inner.generate(&body)?;
        debug!(chars = text.len(), "Received completion");
        Ok(text)
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "ollama".to_string(),
            model: self.inner.model.clone(),
        }
    }

    fn check_availability(&self) -> Result<(), GenerationError> {
        self.inner.check_model()
    }
}

/// Image captions from an Ollama vision model.
pub struct OllamaVision {
    inner: OllamaClient,
    subject_context: String,
}

impl OllamaVision {
    pub fn new(config: &VisionConfig, subject_context: &str) -> Result<Self, GenerationError> {
        Ok(Self {
            inner: OllamaClient::new(&config.base_url, &config.model, config.timeout_secs)?,
            subject_context: subject_context.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn check_availability(&self) -> Result<(), GenerationError> {
        self.inner.check_model()
    }
}

impl ImageCaptioner for OllamaVision {
    #[instrument(level = "debug", skip(self, context), fields(image = %image.display()))]
    fn describe(&self, image: &Path, page: u32, context: &str) -> Option<String> {
        let bytes = match fs::read(image) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %image.display(), error = %e, "Cannot read image");
                return None;
            }
        };
        let prompt = caption_prompt(page, context, &self.subject_context);
        let body = GenerateRequest {
            model: &self.inner.model,
            prompt: &prompt,
            stream: false,
            system: None,
            images: vec![STANDARD.encode(bytes)],
            options: None,
        };

        match self.inner.generate(&body) {
            Ok(description) => {
                info!(image = %image.display(), "Described image");
                Some(description)
            }
            Err(e) => {
                warn!(image = %image.display(), error = %e, "Image description failed");
                None
            }
        }
    }
}

/// Model info keys are prefixed by architecture, e.g. `llama.context_length`.
fn context_length_from(model_info: &Map<String, Value>) -> Option<usize> {
    model_info
        .iter()
        .filter(|(key, _)| key.contains("context_length"))
        .find_map(|(_, value)| value.as_u64())
        .and_then(|n| usize::try_from(n).ok())
}

fn caption_prompt(page: u32, context: &str, subject_context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        format!(
            "Describe this image from {} (page {}) in 50-100 words.\n\n\
             Include:\n\
             - Type (diagram, graph, formula, table, algorithm, example)\n\
             - Main concept shown\n\
             - Key visual elements\n\n\
             Be concise and technical.",
            subject_context, page
        )
    } else {
        format!(
            "This image appears on page {} of {}.\n\n\
             Page context: {}\n\n\
             Describe this image in 50-100 words, focusing on how it illustrates the concepts from this page. \
             Include the image type and key visual elements.",
            page,
            subject_context,
            truncate_chars(context, PAGE_CONTEXT_LIMIT)
        )
    }
}
