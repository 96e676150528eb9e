// src/domain/mod.rs
pub mod card;
pub mod deck;
pub mod error;
pub mod note;
pub mod unit;

pub use card::CardRecord;
pub use deck::{Deck, MediaAsset};
pub use error::{CardField, CardParseError, Defect, DomainError, GenerationError, PackageError};
pub use note::PackagedNote;
pub use unit::{ArtifactStatus, StatusSnapshot, UnitSource, UnitSpec, UnitStage};
