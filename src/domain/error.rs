// src/domain/error.rs
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    #[error("Missing {kind} for unit '{unit}': {path}")]
    MissingArtifact {
        unit: String,
        kind: &'static str,
        path: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure to turn a generated card file into records. Aborts the unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardParseError {
    #[error("Malformed header at line {line}: expected '{expected}', found '{found}'")]
    MalformedHeader {
        line: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Line {line}: expected 3 columns, found {found}")]
    ColumnCountMismatch { line: usize, found: usize },
    #[error("Invalid UTF-8 at line {line} (byte offset {byte_offset})")]
    EncodingError { line: usize, byte_offset: usize },
    #[error("Line {line}: {field} field is empty")]
    EmptyField { line: usize, field: CardField },
}

impl CardParseError {
    /// Line in the card file the error points at (1-based).
    pub fn line(&self) -> usize {
        match self {
            CardParseError::MalformedHeader { line, .. }
            | CardParseError::ColumnCountMismatch { line, .. }
            | CardParseError::EncodingError { line, .. }
            | CardParseError::EmptyField { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    Front,
    Back,
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardField::Front => write!(f, "front"),
            CardField::Back => write!(f, "back"),
        }
    }
}

/// Advisory validation finding. The caller decides whether it is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    #[error("media file '{filename}' referenced in {field} is missing")]
    MissingMedia { filename: String, field: CardField },
    #[error("tag '{tag}' contains characters outside letters, digits, '-' and '_'")]
    InvalidTag { tag: String },
    #[error("unbalanced <{tag}> in {field}: {problem}")]
    UnbalancedMarkup {
        tag: String,
        field: CardField,
        problem: MarkupProblem,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupProblem {
    UnexpectedClose,
    Unclosed,
}

impl fmt::Display for MarkupProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkupProblem::UnexpectedClose => write!(f, "closing tag without opening tag"),
            MarkupProblem::Unclosed => write!(f, "opening tag never closed"),
        }
    }
}

/// Fatal packaging failure. No archive is written when one of these is returned.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Unit '{unit}' references missing media: {}", .missing.join(", "))]
    UnresolvedMedia { unit: String, missing: Vec<String> },
    #[error("Unit '{0}' has no cards to package")]
    EmptyDeck(String),
    #[error("Unit '{unit}' has {count} cards, more than the {max} a deck can address")]
    TooManyRecords {
        unit: String,
        count: usize,
        max: usize,
    },
    #[error("Unit '{unit}' failed validation with {defects} defect(s)")]
    ValidationFailed { unit: String, defects: usize },
    #[error("I/O error while packaging: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<rusqlite::Error> for PackageError {
    fn from(e: rusqlite::Error) -> Self {
        PackageError::Archive(format!("collection database: {}", e))
    }
}

impl From<zip::result::ZipError> for PackageError {
    fn from(e: zip::result::ZipError) -> Self {
        PackageError::Archive(format!("zip container: {}", e))
    }
}

impl From<serde_json::Error> for PackageError {
    fn from(e: serde_json::Error) -> Self {
        PackageError::Archive(format!("collection metadata: {}", e))
    }
}

/// Failure reported by a card generation provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Provider rate limit hit: {0}")]
    RateLimited(String),
    #[error("Provider rejected credentials: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Provider returned an empty response")]
    EmptyResponse,
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Whether retrying the same request can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::RateLimited(_)
            | GenerationError::Network(_)
            | GenerationError::Timeout => true,
            GenerationError::Api { status, .. } => *status >= 500,
            GenerationError::Auth(_)
            | GenerationError::EmptyResponse
            | GenerationError::Unavailable(_) => false,
        }
    }
}
