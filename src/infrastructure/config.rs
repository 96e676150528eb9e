// src/infrastructure/config.rs
use crate::application::card_validator::ValidationOptions;
use crate::application::unit_registry::StorageLayout;
use crate::constants::{DEFAULT_MODEL_ID, DEFAULT_MODEL_NAME};
use crate::domain::{UnitSource, UnitSpec};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

lazy_static! {
    static ref SEPARATOR_RUN_REGEX: Regex =
        Regex::new(r"[\s\-.]+").expect("Failed to compile separator regex");
    static ref NON_WORD_REGEX: Regex = Regex::new(r"[^\w]").expect("Failed to compile word regex");
}

/// TOML configuration for a flashcard project
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub subject: SubjectConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub card_distribution: CardDistribution,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub package: PackageConfig,
    /// Per-PDF overrides keyed by PDF filename.
    #[serde(default)]
    pub units: BTreeMap<String, UnitOverride>,
    /// Directory relative paths are resolved against. Set by `load`.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubjectConfig {
    #[serde(default = "default_subject_name")]
    pub name: String,
    /// Prefix of every deck name.
    #[serde(default = "default_short_name")]
    pub short_name: String,
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default = "default_description")]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: String,
    #[serde(default = "default_markdown_dir")]
    pub markdown_dir: String,
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    #[serde(default = "default_anki_dir")]
    pub anki_dir: String,
    #[serde(default = "default_apkg_dir")]
    pub apkg_dir: String,
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub extract_images: bool,
    #[serde(default = "default_min_image_size")]
    pub min_image_width: u32,
    #[serde(default = "default_min_image_size")]
    pub min_image_height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Defaults {
    #[serde(default = "default_target_cards")]
    pub target_cards: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GenerationConfig {
    /// "claude" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClaudeConfig {
    #[serde(default = "default_claude_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_claude_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VisionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

/// Share of each card type in the generated set. Should sum to 1.0.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CardDistribution {
    #[serde(default = "default_conceptual")]
    pub conceptual: f64,
    #[serde(default = "default_minor_share")]
    pub worked_examples: f64,
    #[serde(default = "default_minor_share")]
    pub algorithm: f64,
    #[serde(default = "default_small_share")]
    pub pattern_recognition: f64,
    #[serde(default = "default_small_share")]
    pub visual: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PromptsConfig {
    /// Template with `{field}`, `{name}` and `{description}` placeholders.
    #[serde(default = "default_system_context")]
    pub system_context: String,
    #[serde(default = "default_quality_focus")]
    pub card_quality_focus: Vec<String>,
    #[serde(default = "default_example_cards")]
    pub example_cards: Vec<ExampleCard>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExampleCard {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct ValidationConfig {
    /// Treat validation defects as packaging errors.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub allow_unicode_tags: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PackageConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_model_id")]
    pub model_id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct UnitOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cards: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// Default value functions
fn default_subject_name() -> String { "Course Materials".to_string() }
fn default_short_name() -> String { "Flashcards".to_string() }
fn default_field() -> String { "Education".to_string() }
fn default_description() -> String { "Educational materials".to_string() }
fn default_pdf_dir() -> String { "pdfs".to_string() }
fn default_markdown_dir() -> String { "outputs/markdown".to_string() }
fn default_images_dir() -> String { "outputs/images".to_string() }
fn default_anki_dir() -> String { "outputs/anki".to_string() }
fn default_apkg_dir() -> String { "outputs/apkg".to_string() }
fn default_metadata_dir() -> String { "outputs/metadata".to_string() }
fn default_true() -> bool { true }
fn default_min_image_size() -> u32 { 100 }
fn default_target_cards() -> u32 { 50 }
fn default_provider() -> String { "claude".to_string() }
fn default_generation_timeout() -> u64 { 120 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 1000 }
fn default_claude_model() -> String { "claude-sonnet-4-20250514".to_string() }
fn default_api_key_env() -> String { "ANTHROPIC_API_KEY".to_string() }
fn default_max_tokens() -> u32 { 16000 }
fn default_claude_base_url() -> String { "https://api.anthropic.com".to_string() }
fn default_ollama_model() -> String { "ministral-3:14b".to_string() }
fn default_ollama_base_url() -> String { "http://localhost:11434".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_vision_model() -> String { "ministral-3:8b".to_string() }
fn default_vision_timeout() -> u64 { 60 }
fn default_conceptual() -> f64 { 0.40 }
fn default_minor_share() -> f64 { 0.20 }
fn default_small_share() -> f64 { 0.10 }
fn default_system_context() -> String {
    "You are generating educational flashcards for {name}, a {field} course. {description}.".to_string()
}
fn default_quality_focus() -> Vec<String> {
    vec![
        "Test understanding, not memorization".to_string(),
        "Use concrete examples".to_string(),
        "Keep calculations simple".to_string(),
        "Focus on concepts".to_string(),
    ]
}
fn default_example_cards() -> Vec<ExampleCard> {
    vec![ExampleCard {
        front: "Why does this algorithm avoid recomputing history?".to_string(),
        back: "It uses <strong>recursive computation</strong> that only needs the previous state."
            .to_string(),
        tags: "algorithm recursion".to_string(),
    }]
}
fn default_model_name() -> String { DEFAULT_MODEL_NAME.to_string() }
fn default_model_id() -> i64 { DEFAULT_MODEL_ID }

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            name: default_subject_name(),
            short_name: default_short_name(),
            field: default_field(),
            description: default_description(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pdf_dir: default_pdf_dir(),
            markdown_dir: default_markdown_dir(),
            images_dir: default_images_dir(),
            anki_dir: default_anki_dir(),
            apkg_dir: default_apkg_dir(),
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            extract_images: default_true(),
            min_image_width: default_min_image_size(),
            min_image_height: default_min_image_size(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            target_cards: default_target_cards(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            claude: ClaudeConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: default_claude_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            base_url: default_claude_base_url(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: default_ollama_model(),
            base_url: default_ollama_base_url(),
            temperature: default_temperature(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            model: default_vision_model(),
            base_url: default_ollama_base_url(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

impl Default for CardDistribution {
    fn default() -> Self {
        Self {
            conceptual: default_conceptual(),
            worked_examples: default_minor_share(),
            algorithm: default_minor_share(),
            pattern_recognition: default_small_share(),
            visual: default_small_share(),
        }
    }
}

impl CardDistribution {
    pub fn total(&self) -> f64 {
        self.conceptual + self.worked_examples + self.algorithm + self.pattern_recognition + self.visual
    }
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_context: default_system_context(),
            card_quality_focus: default_quality_focus(),
            example_cards: default_example_cards(),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            model_id: default_model_id(),
        }
    }
}

impl ValidationConfig {
    pub fn options(&self) -> ValidationOptions {
        ValidationOptions {
            allow_unicode_tags: self.allow_unicode_tags,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content).context("Failed to parse TOML config")?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load the file when it exists, otherwise defaults rooted at the file's directory.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            return Self::load(path);
        }
        debug!(path = %path.display(), "No config file, using defaults");
        Ok(Self {
            base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            ..Self::default()
        })
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Create default configuration file at path
    pub fn create_default(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.save(path.as_ref())?;
        config.base_dir = path
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    fn resolve(&self, dir: &str) -> PathBuf {
        let dir = Path::new(dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.base_dir.join(dir)
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout {
            pdf_dir: self.resolve(&self.paths.pdf_dir),
            markdown_dir: self.resolve(&self.paths.markdown_dir),
            images_dir: self.resolve(&self.paths.images_dir),
            anki_dir: self.resolve(&self.paths.anki_dir),
            apkg_dir: self.resolve(&self.paths.apkg_dir),
            metadata_dir: self.resolve(&self.paths.metadata_dir),
        }
    }

    /// PDF filenames directly inside the PDF directory, sorted.
    pub fn discover_pdfs(&self) -> Vec<String> {
        let pdf_dir = self.resolve(&self.paths.pdf_dir);
        if !pdf_dir.is_dir() {
            warn!(dir = %pdf_dir.display(), "PDF directory not found");
            return Vec::new();
        }

        let mut pdfs: Vec<String> = WalkDir::new(&pdf_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        pdfs.sort();

        debug!(count = pdfs.len(), "Discovered PDF files");
        pdfs
    }

    /// Every unit: discovered PDFs merged with configured entries, in PDF filename order.
    pub fn all_units(&self) -> Vec<UnitSpec> {
        let mut units: BTreeMap<String, UnitSpec> = self
            .discover_pdfs()
            .into_iter()
            .map(|pdf| {
                let unit_name = generate_unit_name(&pdf);
                let spec = UnitSpec {
                    tags: vec![unit_name.clone()],
                    unit_name,
                    pdf_filename: pdf.clone(),
                    target_cards: self.defaults.target_cards,
                    source: UnitSource::AutoDiscovered,
                };
                (pdf, spec)
            })
            .collect();

        for (pdf, overrides) in &self.units {
            match units.get_mut(pdf) {
                Some(spec) => {
                    if let Some(name) = &overrides.unit_name {
                        spec.unit_name = name.clone();
                    }
                    if let Some(target) = overrides.target_cards {
                        spec.target_cards = target;
                    }
                    if let Some(tags) = &overrides.tags {
                        spec.tags = tags.clone();
                    }
                    spec.source = UnitSource::Configured;
                }
                None => {
                    warn!(pdf = %pdf, "PDF is configured but not found in PDF directory");
                    let unit_name = overrides
                        .unit_name
                        .clone()
                        .unwrap_or_else(|| generate_unit_name(pdf));
                    units.insert(
                        pdf.clone(),
                        UnitSpec {
                            tags: overrides
                                .tags
                                .clone()
                                .unwrap_or_else(|| vec![unit_name.clone()]),
                            unit_name,
                            pdf_filename: pdf.clone(),
                            target_cards: overrides.target_cards.unwrap_or(self.defaults.target_cards),
                            source: UnitSource::ConfiguredOnly,
                        },
                    );
                }
            }
        }

        units.into_values().collect()
    }

    pub fn unit_by_name(&self, unit_name: &str) -> Option<UnitSpec> {
        self.all_units()
            .into_iter()
            .find(|u| u.unit_name == unit_name)
    }

    /// Subject context with `{field}`, `{name}` and `{description}` filled in.
    pub fn system_context(&self) -> String {
        self.prompts
            .system_context
            .replace("{field}", &self.subject.field)
            .replace("{name}", &self.subject.name)
            .replace("{description}", &self.subject.description)
    }

    /// "<short name> - <Title Case unit>"
    pub fn deck_name(&self, unit_name: &str) -> String {
        let words: Vec<String> = unit_name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(title_case_word)
            .collect();
        format!("{} - {}", self.subject.short_name, words.join(" "))
    }

    /// Problems that would make the pipeline misbehave. Empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let paths = [
            ("paths.pdf_dir", &self.paths.pdf_dir),
            ("paths.markdown_dir", &self.paths.markdown_dir),
            ("paths.images_dir", &self.paths.images_dir),
            ("paths.anki_dir", &self.paths.anki_dir),
            ("paths.apkg_dir", &self.paths.apkg_dir),
            ("paths.metadata_dir", &self.paths.metadata_dir),
        ];
        for (key, value) in paths {
            if value.trim().is_empty() {
                problems.push(format!("{} is empty", key));
            }
        }

        let total = self.card_distribution.total();
        if (total - 1.0).abs() > 0.01 {
            problems.push(format!("card_distribution sums to {:.2}, expected 1.00", total));
        }

        if !matches!(self.generation.provider.as_str(), "claude" | "ollama") {
            problems.push(format!(
                "generation.provider '{}' is unknown (expected 'claude' or 'ollama')",
                self.generation.provider
            ));
        }

        if self.generation.max_retries == 0 {
            problems.push("generation.max_retries must be at least 1".to_string());
        }

        problems
    }
}

/// Unit name for a PDF filename: `"Lecture 3.pdf"` → `"unit_lecture_3"`.
pub fn generate_unit_name(pdf_filename: &str) -> String {
    let stem = pdf_filename
        .strip_suffix(".pdf")
        .or_else(|| pdf_filename.strip_suffix(".PDF"))
        .unwrap_or(pdf_filename);
    let lower = stem.to_lowercase();
    let underscored = SEPARATOR_RUN_REGEX.replace_all(&lower, "_");
    let cleaned = NON_WORD_REGEX.replace_all(&underscored, "");
    let name = cleaned.trim_matches('_');

    if name.starts_with("unit") {
        name.to_string()
    } else {
        format!("unit_{}", name)
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn given_no_file_when_creating_default_then_creates_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("flashbang.toml");

        let config = Config::create_default(&config_path).unwrap();

        assert_eq!(config.subject.short_name, "Flashcards");
        assert_eq!(config.generation.provider, "claude");
        assert_eq!(config.package.model_id, 1_894_532_617);
        assert!(config_path.exists());
    }

    #[test]
    fn given_config_when_saving_then_writes_toml_sections() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        Config::default().save(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[subject]"));
        assert!(content.contains("[paths]"));
        assert!(content.contains("[generation.claude]"));
        assert!(content.contains("[validation]"));
    }

    #[test]
    fn given_partial_toml_when_loading_then_uses_defaults() {
        // Arrange
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        let toml_content = r#"
[subject]
short_name = "PGM"

[generation]
provider = "ollama"

[units."Lecture 3.pdf"]
target_cards = 70
"#;
        fs::write(&config_path, toml_content).unwrap();

        // Act
        let config = Config::load(&config_path).unwrap();

        // Assert
        assert_eq!(config.subject.short_name, "PGM");
        assert_eq!(config.subject.name, "Course Materials");
        assert_eq!(config.generation.provider, "ollama");
        assert_eq!(config.generation.ollama.model, "ministral-3:14b");
        assert_eq!(config.units["Lecture 3.pdf"].target_cards, Some(70));
        assert_eq!(config.base_dir, temp_dir.path());
    }

    #[test]
    fn given_nonexistent_file_when_loading_then_returns_error() {
        let result = Config::load("/nonexistent/path/flashbang.toml");

        assert!(result.is_err());
    }

    #[test]
    fn given_missing_file_when_loading_or_defaulting_then_defaults_rooted_at_parent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("flashbang.toml");

        let config = Config::load_or_default(&config_path).unwrap();

        assert_eq!(config.base_dir, temp_dir.path());
        assert_eq!(config.layout().pdf_dir, temp_dir.path().join("pdfs"));
    }

    #[test]
    fn given_round_trip_when_saving_and_loading_then_preserves_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("roundtrip.toml");
        let mut original = Config {
            base_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        original.subject.short_name = "ML".to_string();
        original.units.insert(
            "Intro.pdf".to_string(),
            UnitOverride {
                unit_name: Some("unit_0_intro".to_string()),
                ..Default::default()
            },
        );

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn given_pdf_filenames_when_generating_unit_names_then_normalizes() {
        assert_eq!(generate_unit_name("Intro.pdf"), "unit_intro");
        assert_eq!(generate_unit_name("Unit_1.pdf"), "unit_1");
        assert_eq!(generate_unit_name("lecture 3.pdf"), "unit_lecture_3");
        assert_eq!(generate_unit_name("Unit 1.pdf"), "unit_1");
        assert_eq!(generate_unit_name("Bayes-Nets (v2).PDF"), "unit_bayes_nets_v2");
    }

    #[test]
    fn given_discovered_and_configured_pdfs_when_listing_units_then_merges() {
        // Arrange
        let temp_dir = TempDir::new().unwrap();
        let pdf_dir = temp_dir.path().join("pdfs");
        fs::create_dir_all(&pdf_dir).unwrap();
        fs::write(pdf_dir.join("Intro.pdf"), b"%PDF").unwrap();
        fs::write(pdf_dir.join("Lecture 2.pdf"), b"%PDF").unwrap();
        fs::write(pdf_dir.join("notes.txt"), b"x").unwrap();

        let mut config = Config {
            base_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        config.units.insert(
            "Lecture 2.pdf".to_string(),
            UnitOverride {
                unit_name: Some("unit_2_bayes".to_string()),
                target_cards: Some(70),
                tags: None,
            },
        );
        config.units.insert("Missing.pdf".to_string(), UnitOverride::default());

        // Act
        let units = config.all_units();

        // Assert
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].unit_name, "unit_intro");
        assert_eq!(units[0].source, UnitSource::AutoDiscovered);
        assert_eq!(units[0].target_cards, 50);
        assert_eq!(units[1].unit_name, "unit_2_bayes");
        assert_eq!(units[1].target_cards, 70);
        assert_eq!(units[1].tags, vec!["unit_lecture_2".to_string()]);
        assert_eq!(units[1].source, UnitSource::Configured);
        assert_eq!(units[2].unit_name, "unit_missing");
        assert_eq!(units[2].source, UnitSource::ConfiguredOnly);
        assert!(config.unit_by_name("unit_2_bayes").is_some());
    }

    #[test]
    fn given_unit_name_when_building_deck_name_then_title_cases() {
        let mut config = Config::default();
        config.subject.short_name = "PGM".to_string();

        assert_eq!(
            config.deck_name("unit3_bayesian_networks"),
            "PGM - Unit3 Bayesian Networks"
        );
    }

    #[test]
    fn given_template_when_rendering_system_context_then_interpolates_subject() {
        let mut config = Config::default();
        config.prompts.system_context = "Cards for {name} ({field}): {description}".to_string();
        config.subject.name = "PGM".to_string();
        config.subject.field = "Machine Learning".to_string();
        config.subject.description = "graphical models".to_string();

        assert_eq!(
            config.system_context(),
            "Cards for PGM (Machine Learning): graphical models"
        );
    }

    #[test]
    fn given_bad_values_when_validating_then_reports_each_problem() {
        let mut config = Config::default();
        config.paths.anki_dir = String::new();
        config.card_distribution.visual = 0.5;
        config.generation.provider = "gpt".to_string();
        config.generation.max_retries = 0;

        let problems = config.validate();

        assert_eq!(problems.len(), 4);
        assert!(Config::default().validate().is_empty());
    }
}
