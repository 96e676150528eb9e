// src/infrastructure/metadata.rs
use crate::constants::METADATA_FILE;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const METADATA_VERSION: &str = "1.0";

/// Everything known about one extracted image.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub unit: String,
    pub page: u32,
    pub path: String,
    /// x0, y0, x1, y1 in PDF points, when the extractor knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    pub extracted_at: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub contains_math: Option<bool>,
    #[serde(default)]
    pub described_at: Option<String>,
}

impl ImageMetadata {
    pub fn new(filename: &str, unit: &str, page: u32, path: &Path) -> Self {
        Self {
            filename: filename.to_string(),
            unit: unit.to_string(),
            page,
            path: path.to_string_lossy().into_owned(),
            bbox: None,
            extracted_at: Utc::now().to_rfc3339(),
            description: None,
            kind: None,
            contains_math: None,
            described_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetadataCollection {
    #[serde(default = "default_version")]
    pub version: String,
    pub generated_at: String,
    #[serde(default)]
    pub images: BTreeMap<String, ImageMetadata>,
}

fn default_version() -> String {
    METADATA_VERSION.to_string()
}

impl Default for MetadataCollection {
    fn default() -> Self {
        Self {
            version: default_version(),
            generated_at: Utc::now().to_rfc3339(),
            images: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStats {
    pub total_images: usize,
    pub described: usize,
    pub units: usize,
}

/// JSON file of image metadata keyed by filename.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    collection: MetadataCollection,
}

impl MetadataStore {
    /// Open `<metadata_dir>/image_descriptions.json`. A missing file yields an empty store.
    pub fn load(metadata_dir: &Path) -> Result<Self> {
        let path = metadata_dir.join(METADATA_FILE);
        let collection = if path.is_file() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse metadata file: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No metadata file yet, starting empty");
            MetadataCollection::default()
        };
        Ok(Self { path, collection })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self) -> &MetadataCollection {
        &self.collection
    }

    /// Write the store atomically.
    pub fn save(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Metadata path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create metadata directory: {}", dir.display()))?;

        let json = serde_json::to_string_pretty(&self.collection)
            .context("Failed to serialize image metadata")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write metadata file: {}", self.path.display()))?;

        info!(path = %self.path.display(), images = self.collection.images.len(), "Saved image metadata");
        Ok(())
    }

    /// Add or replace entries by filename.
    pub fn add_images(&mut self, images: impl IntoIterator<Item = ImageMetadata>) {
        for image in images {
            self.collection.images.insert(image.filename.clone(), image);
        }
    }

    /// Attach a caption. Returns false when the image is unknown.
    pub fn update_description(&mut self, filename: &str, description: &str) -> bool {
        match self.collection.images.get_mut(filename) {
            Some(image) => {
                image.kind = Some(image_kind(description).to_string());
                image.contains_math = Some(mentions_math(description));
                image.description = Some(description.to_string());
                image.described_at = Some(Utc::now().to_rfc3339());
                true
            }
            None => false,
        }
    }

    /// Images of one unit, ordered by page then filename.
    pub fn images_for_unit(&self, unit: &str) -> Vec<&ImageMetadata> {
        let mut images: Vec<&ImageMetadata> = self
            .collection
            .images
            .values()
            .filter(|img| img.unit == unit)
            .collect();
        images.sort_by(|a, b| a.page.cmp(&b.page).then_with(|| a.filename.cmp(&b.filename)));
        images
    }

    pub fn undescribed(&self) -> Vec<&ImageMetadata> {
        self.collection
            .images
            .values()
            .filter(|img| img.description.is_none())
            .collect()
    }

    pub fn stats(&self) -> MetadataStats {
        let units: BTreeSet<&str> = self
            .collection
            .images
            .values()
            .map(|img| img.unit.as_str())
            .collect();
        MetadataStats {
            total_images: self.collection.images.len(),
            described: self
                .collection
                .images
                .values()
                .filter(|img| img.description.is_some())
                .count(),
            units: units.len(),
        }
    }
}

/// Coarse image category guessed from caption keywords.
pub fn image_kind(description: &str) -> &'static str {
    const KINDS: &[(&str, &[&str])] = &[
        ("network", &["bayesian network", "network diagram", "network structure"]),
        ("algorithm", &["algorithm", "flowchart", "flow chart", "pseudocode"]),
        ("formula", &["formula", "equation", "mathematical expression"]),
        ("table", &["table", "matrix"]),
        ("graph", &["graph", "plot", "chart"]),
        ("example", &["example", "problem"]),
    ];

    let lower = description.to_lowercase();
    KINDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or("diagram")
}

fn mentions_math(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["math", "equation", "formula"].iter().any(|k| lower.contains(k))
}
