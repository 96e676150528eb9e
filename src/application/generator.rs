// src/application/generator.rs
use crate::domain::GenerationError;
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
}

impl fmt::Display for ProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.model)
    }
}

/// A language model that turns a prompt into raw card text.
pub trait CardGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    fn provider_info(&self) -> ProviderInfo;

    /// Cheap check that the provider is configured and reachable.
    fn check_availability(&self) -> Result<(), GenerationError>;
}

impl<G: CardGenerator + ?Sized> CardGenerator for Box<G> {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }

    fn provider_info(&self) -> ProviderInfo {
        (**self).provider_info()
    }

    fn check_availability(&self) -> Result<(), GenerationError> {
        (**self).check_availability()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Call the generator, retrying transient failures with exponential backoff.
///
/// Non-transient errors (bad credentials, client errors, empty output) are returned
/// immediately. After the last attempt the final error is returned as is.
#[instrument(level = "debug", skip(generator, request), fields(provider = %generator.provider_info()))]
pub fn generate_with_retry<G: CardGenerator + ?Sized>(
    generator: &G,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<String, GenerationError> {
    let mut attempt = 1;
    loop {
        match generator.generate(request) {
            Ok(text) => {
                debug!(attempt, chars = text.len(), "Generation succeeded");
                return Ok(text);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "Transient generation failure, retrying");
                thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
