// src/application/unit_registry.rs
use crate::constants::{ARCHIVE_SUFFIX, CARD_FILE_SUFFIX};
use crate::domain::{ArtifactStatus, StatusSnapshot, UnitSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Resolved directories of every pipeline artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub pdf_dir: PathBuf,
    pub markdown_dir: PathBuf,
    pub images_dir: PathBuf,
    pub anki_dir: PathBuf,
    pub apkg_dir: PathBuf,
    pub metadata_dir: PathBuf,
}

impl StorageLayout {
    /// Conventional layout under one project directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            pdf_dir: root.join("pdfs"),
            markdown_dir: root.join("outputs/markdown"),
            images_dir: root.join("outputs/images"),
            anki_dir: root.join("outputs/anki"),
            apkg_dir: root.join("outputs/apkg"),
            metadata_dir: root.join("outputs/metadata"),
        }
    }

    pub fn pdf_path(&self, unit: &UnitSpec) -> PathBuf {
        self.pdf_dir.join(&unit.pdf_filename)
    }

    pub fn markdown_path(&self, unit_name: &str) -> PathBuf {
        self.markdown_dir.join(format!("{}.md", unit_name))
    }

    pub fn card_file_path(&self, unit_name: &str) -> PathBuf {
        self.anki_dir.join(format!("{}{}", unit_name, CARD_FILE_SUFFIX))
    }

    pub fn archive_path(&self, unit_name: &str) -> PathBuf {
        self.apkg_dir.join(format!("{}{}", unit_name, ARCHIVE_SUFFIX))
    }
}

/// Which artifacts exist for a unit. Touches the filesystem read-only and never fails:
/// anything unreadable counts as absent.
pub fn unit_status(unit: &UnitSpec, layout: &StorageLayout) -> StatusSnapshot {
    StatusSnapshot {
        unit_name: unit.unit_name.clone(),
        source: artifact(layout.pdf_path(unit)),
        markdown: artifact(layout.markdown_path(&unit.unit_name)),
        cards: artifact(layout.card_file_path(&unit.unit_name)),
        archive: artifact(layout.archive_path(&unit.unit_name)),
    }
}

fn artifact(path: PathBuf) -> ArtifactStatus {
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => {
            trace!(path = %path.display(), "Artifact present");
            ArtifactStatus {
                modified: meta.modified().ok(),
                present: true,
                path,
            }
        }
        _ => ArtifactStatus::absent(path),
    }
}
