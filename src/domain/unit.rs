use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Where a unit's configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitSource {
    AutoDiscovered,
    Configured,
    ConfiguredOnly,
}

impl fmt::Display for UnitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSource::AutoDiscovered => write!(f, "auto-discovered"),
            UnitSource::Configured => write!(f, "configured"),
            UnitSource::ConfiguredOnly => write!(f, "configured-only"),
        }
    }
}

/// One lecture's worth of cards, tracked from PDF to archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSpec {
    pub unit_name: String,
    pub pdf_filename: String,
    pub target_cards: u32,
    pub tags: Vec<String>,
    pub source: UnitSource,
}

/// Informational pipeline stage derived from which artifacts exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum UnitStage {
    NoSource,
    Source,
    Extracted,
    Generated,
    Packaged,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnitStage::NoSource => "no source",
            UnitStage::Source => "source only",
            UnitStage::Extracted => "extracted",
            UnitStage::Generated => "generated",
            UnitStage::Packaged => "packaged",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub path: PathBuf,
    pub present: bool,
    pub modified: Option<SystemTime>,
}

impl ArtifactStatus {
    pub fn absent(path: PathBuf) -> Self {
        Self {
            path,
            present: false,
            modified: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub unit_name: String,
    pub source: ArtifactStatus,
    pub markdown: ArtifactStatus,
    pub cards: ArtifactStatus,
    pub archive: ArtifactStatus,
}

impl StatusSnapshot {
    /// Furthest stage whose artifact is present. Earlier artifacts may be missing;
    /// nothing enforces the order.
    pub fn stage(&self) -> UnitStage {
        if self.archive.present {
            UnitStage::Packaged
        } else if self.cards.present {
            UnitStage::Generated
        } else if self.markdown.present {
            UnitStage::Extracted
        } else if self.source.present {
            UnitStage::Source
        } else {
            UnitStage::NoSource
        }
    }
}
