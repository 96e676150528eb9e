// src/application/mod.rs
pub mod card_formatter;
pub mod card_parser;
pub mod card_validator;
pub mod context_budget;
pub mod deck_packager;
pub mod extraction;
pub mod generator;
pub mod media_store;
pub mod pipeline;
pub mod prompt;
pub mod unit_registry;

pub use card_parser::{parse_card_bytes, parse_card_text};
pub use card_validator::{CardValidator, RecordStatus, ValidationOptions, ValidationReport};
pub use context_budget::{ContextFit, ContextUsage};
pub use deck_packager::{DeckPackager, PackageOptions, PackageSummary};
pub use extraction::{ExtractedDocument, ExtractedImage, ImageCaptioner, PdfExtractor};
pub use generator::{CardGenerator, GenerationRequest, ProviderInfo, RetryPolicy};
pub use media_store::MediaStore;
pub use unit_registry::{unit_status, StorageLayout};
