// src/infrastructure/mod.rs
pub mod apkg;
pub mod claude;
pub mod config;
pub mod http;
pub mod media;
pub mod metadata;
pub mod ollama;
pub mod pdf;

pub use claude::ClaudeGenerator;
pub use config::Config;
pub use media::ImageDirectory;
pub use metadata::MetadataStore;
pub use ollama::{OllamaGenerator, OllamaVision};
pub use pdf::TextPdfExtractor;

use crate::application::CardGenerator;
use crate::domain::DomainError;
use config::GenerationConfig;

/// Generator for a provider name, `"claude"` or `"ollama"`.
pub fn create_generator(
    config: &GenerationConfig,
    provider: &str,
) -> Result<Box<dyn CardGenerator>, DomainError> {
    let generator: Box<dyn CardGenerator> = match provider {
        "claude" => Box::new(
            ClaudeGenerator::new(config.claude.clone(), config.timeout_secs)
                .map_err(|e| DomainError::Config(e.to_string()))?,
        ),
        "ollama" => Box::new(
            OllamaGenerator::new(&config.ollama, config.timeout_secs)
                .map_err(|e| DomainError::Config(e.to_string()))?,
        ),
        other => {
            return Err(DomainError::Config(format!(
                "unknown provider '{}', expected 'claude' or 'ollama'",
                other
            )))
        }
    };
    Ok(generator)
}
