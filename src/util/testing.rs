// src/util/testing.rs

use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::env;
use std::io;
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::application::{CardGenerator, GenerationRequest, MediaStore, ProviderInfo};
use crate::domain::GenerationError;

/// In-memory media store for validator and packager tests
///
/// # Examples
///
/// ```
/// use flashbang::application::MediaStore;
/// use flashbang::util::testing::MockMediaStore;
///
/// let store = MockMediaStore::builder()
///     .with_file("dag.png", b"png-bytes")
///     .build();
/// assert!(store.contains("dag.png"));
/// assert!(!store.contains("missing.png"));
/// ```
pub struct MockMediaStore {
    files: HashMap<String, Vec<u8>>,
    unreadable: Vec<String>,
}

impl MockMediaStore {
    pub fn builder() -> MockMediaStoreBuilder {
        MockMediaStoreBuilder::new()
    }
}

impl MediaStore for MockMediaStore {
    fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
        if self.unreadable.iter().any(|f| f == filename) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot read {}", filename),
            ));
        }
        self.files
            .get(filename)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, filename.to_string()))
    }
}

/// Builder for MockMediaStore
pub struct MockMediaStoreBuilder {
    files: HashMap<String, Vec<u8>>,
    unreadable: Vec<String>,
}

impl MockMediaStoreBuilder {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            unreadable: vec![],
        }
    }

    /// Add a file that exists and can be read
    pub fn with_file(mut self, filename: &str, bytes: &[u8]) -> Self {
        self.files.insert(filename.to_string(), bytes.to_vec());
        self
    }

    /// Add a file that exists but fails with a permission error on read
    pub fn with_unreadable_file(mut self, filename: &str) -> Self {
        self.files.insert(filename.to_string(), vec![]);
        self.unreadable.push(filename.to_string());
        self
    }

    pub fn build(self) -> MockMediaStore {
        MockMediaStore {
            files: self.files,
            unreadable: self.unreadable,
        }
    }
}

impl Default for MockMediaStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted card generator
///
/// Each call to `generate` consumes the next scripted outcome. Once the script runs
/// out, every further call fails with `EmptyResponse`.
pub struct MockCardGenerator {
    outcomes: RefCell<VecDeque<Result<String, GenerationError>>>,
    available: Option<GenerationError>,
    calls: Cell<usize>,
    last_request: RefCell<Option<GenerationRequest>>,
}

impl MockCardGenerator {
    pub fn builder() -> MockCardGeneratorBuilder {
        MockCardGeneratorBuilder::new()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.borrow().clone()
    }
}

impl CardGenerator for MockCardGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.set(self.calls.get() + 1);
        *self.last_request.borrow_mut() = Some(request.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "mock".to_string(),
            model: "scripted".to_string(),
        }
    }

    fn check_availability(&self) -> Result<(), GenerationError> {
        match &self.available {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}

/// Builder for MockCardGenerator
pub struct MockCardGeneratorBuilder {
    outcomes: VecDeque<Result<String, GenerationError>>,
    available: Option<GenerationError>,
}

impl MockCardGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
            available: None,
        }
    }

    /// Queue a successful response
    pub fn with_response(mut self, text: &str) -> Self {
        self.outcomes.push_back(Ok(text.to_string()));
        self
    }

    /// Queue a failed call
    pub fn with_failure(mut self, error: GenerationError) -> Self {
        self.outcomes.push_back(Err(error));
        self
    }

    /// Make `check_availability` fail
    pub fn unavailable(mut self, error: GenerationError) -> Self {
        self.available = Some(error);
        self
    }

    pub fn build(self) -> MockCardGenerator {
        MockCardGenerator {
            outcomes: RefCell::new(self.outcomes),
            available: self.available,
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }
}

impl Default for MockCardGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_test_setup() -> Result<()> {
    // Set up logging first
    setup_test_logging();

    info!("Test Setup complete");
    Ok(())
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "trace");
    }

    // Create a filter for noisy modules
    let noisy_modules = ["reqwest", "hyper", "rustls", "mio", "lopdf"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    // Set up the subscriber with environment filter
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    // Build and set the subscriber
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}
