// src/application/pipeline.rs
use crate::application::card_formatter::normalize_generated;
use crate::application::card_parser::parse_card_bytes;
use crate::application::card_validator::{CardValidator, ValidationReport};
use crate::application::context_budget::ContextUsage;
use crate::application::deck_packager::{DeckPackager, PackageOptions, PackageSummary};
use crate::application::extraction::{render_unit_markdown, ImageCaptioner, PdfExtractor};
use crate::application::generator::{
    generate_with_retry, CardGenerator, GenerationRequest, RetryPolicy,
};
use crate::application::prompt::{build_generation_prompt, GenerationContext, ImageManifestEntry};
use crate::constants::PROMPT_CONTENT_LIMIT;
use crate::domain::{CardRecord, DomainError, PackageError, UnitSpec};
use crate::infrastructure::config::Config;
use crate::infrastructure::media::ImageDirectory;
use crate::infrastructure::metadata::{ImageMetadata, MetadataStore};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const GENERATION_SYSTEM: &str =
    "You write Anki flashcards. Reply with the card file only, no commentary.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub unit_name: String,
    pub pages: usize,
    pub images: usize,
    pub described: usize,
    pub markdown: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSummary {
    pub unit_name: String,
    pub provider: String,
    pub cards: usize,
    pub dropped_lines: usize,
    pub defects: usize,
    pub output: PathBuf,
}

/// Parsed card file together with its validation outcome.
#[derive(Debug)]
pub struct UnitValidation {
    pub unit_name: String,
    pub card_file: PathBuf,
    pub records: Vec<CardRecord>,
    pub report: ValidationReport,
}

#[derive(Debug)]
pub struct UnitOutcome<T> {
    pub unit_name: String,
    pub result: Result<T>,
}

#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<UnitOutcome<T>>,
    /// Units never attempted because an earlier one failed with stop-on-error.
    pub skipped: usize,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.skipped == 0
    }
}

/// Run `op` over `units` in order. A failure is recorded and the batch moves on,
/// unless `stop_on_error` is set, in which case the rest are skipped.
pub fn run_batch<T, F>(units: &[UnitSpec], stop_on_error: bool, mut op: F) -> BatchReport<T>
where
    F: FnMut(&UnitSpec) -> Result<T>,
{
    let mut outcomes = Vec::with_capacity(units.len());
    for (idx, unit) in units.iter().enumerate() {
        let result = op(unit);
        let failed = result.is_err();
        if let Err(e) = &result {
            let error = format!("{:#}", e);
            warn!(unit = %unit.unit_name, %error, "Unit failed");
        }
        outcomes.push(UnitOutcome {
            unit_name: unit.unit_name.clone(),
            result,
        });
        if failed && stop_on_error {
            let skipped = units.len() - idx - 1;
            info!(skipped, "Stopping batch after failure");
            return BatchReport { outcomes, skipped };
        }
    }
    BatchReport {
        outcomes,
        skipped: 0,
    }
}

/// PDF to markdown, with optional image captions recorded in the metadata store.
#[instrument(level = "debug", skip(config, extractor, captioner), fields(unit = %unit.unit_name))]
pub fn extract_unit(
    config: &Config,
    unit: &UnitSpec,
    extractor: &dyn PdfExtractor,
    captioner: Option<&dyn ImageCaptioner>,
    with_images: bool,
) -> Result<ExtractSummary> {
    let layout = config.layout();
    let pdf = layout.pdf_path(unit);
    if !pdf.is_file() {
        return Err(DomainError::MissingArtifact {
            unit: unit.unit_name.clone(),
            kind: "PDF",
            path: pdf.display().to_string(),
        }
        .into());
    }

    let mut doc = extractor.extract(&pdf, &unit.unit_name)?;
    if !with_images {
        doc.images.clear();
    }

    let mut store = MetadataStore::load(&layout.metadata_dir)?;
    store.add_images(doc.images.iter().map(|img| {
        let mut meta = ImageMetadata::new(
            &img.filename,
            &unit.unit_name,
            img.page,
            &layout.images_dir.join(&img.filename),
        );
        meta.bbox = img.bbox;
        meta
    }));

    let mut captions = BTreeMap::new();
    if let Some(captioner) = captioner {
        for img in &doc.images {
            let path = layout.images_dir.join(&img.filename);
            match captioner.describe(&path, img.page, doc.page_text(img.page)) {
                Some(description) => {
                    store.update_description(&img.filename, &description);
                    captions.insert(img.filename.clone(), description);
                }
                None => debug!(image = %img.filename, "No caption"),
            }
        }
    }
    if !doc.images.is_empty() {
        store.save()?;
    }

    let markdown = render_unit_markdown(&unit.unit_name, &doc, &captions);
    let output = layout.markdown_path(&unit.unit_name);
    write_atomic(&output, markdown.as_bytes())?;

    info!(
        unit = %unit.unit_name,
        pages = doc.page_count(),
        images = doc.images.len(),
        "Extracted unit"
    );
    Ok(ExtractSummary {
        unit_name: unit.unit_name.clone(),
        pages: doc.page_count(),
        images: doc.images.len(),
        described: captions.len(),
        markdown: output,
    })
}

/// Markdown to card file through the generator.
#[instrument(level = "debug", skip(config, generator), fields(unit = %unit.unit_name))]
pub fn generate_unit<G: CardGenerator + ?Sized>(
    config: &Config,
    unit: &UnitSpec,
    generator: &G,
) -> Result<GenerateSummary> {
    let layout = config.layout();
    let markdown_path = layout.markdown_path(&unit.unit_name);
    let markdown = fs::read_to_string(&markdown_path)
        .map_err(|e| read_error(e, unit, "markdown", &markdown_path))?;

    let prompt = unit_prompt(config, unit, &markdown)?;
    let request = GenerationRequest::new(prompt).with_system(GENERATION_SYSTEM);
    let policy = RetryPolicy::new(
        config.generation.max_retries,
        Duration::from_millis(config.generation.retry_backoff_ms),
    );

    let provider = generator.provider_info();
    info!(unit = %unit.unit_name, %provider, target = unit.target_cards, "Generating cards");
    let raw = generate_with_retry(generator, &request, &policy)
        .with_context(|| format!("Card generation failed for unit '{}'", unit.unit_name))?;

    let unit_tag = unit.tags.first().unwrap_or(&unit.unit_name);
    let normalized = normalize_generated(&raw, unit_tag);
    if normalized.dropped_lines > 0 {
        warn!(dropped = normalized.dropped_lines, "Dropped malformed generated lines");
    }

    let output = layout.card_file_path(&unit.unit_name);
    write_atomic(&output, normalized.text.as_bytes())?;

    let validation = validate_unit(config, unit)?;
    Ok(GenerateSummary {
        unit_name: unit.unit_name.clone(),
        provider: provider.to_string(),
        cards: validation.records.len(),
        dropped_lines: normalized.dropped_lines,
        defects: validation.report.defect_count(),
        output,
    })
}

/// Estimate how much of a `context_length` token window the unit's generation
/// request would take.
#[instrument(level = "debug", skip(config), fields(unit = %unit.unit_name))]
pub fn analyze_unit(config: &Config, unit: &UnitSpec, context_length: usize) -> Result<ContextUsage> {
    let markdown_path = config.layout().markdown_path(&unit.unit_name);
    let markdown = fs::read_to_string(&markdown_path)
        .map_err(|e| read_error(e, unit, "markdown", &markdown_path))?;
    let prompt = unit_prompt(config, unit, &markdown)?;
    let truncated = markdown.chars().count() > PROMPT_CONTENT_LIMIT;

    let usage = ContextUsage::new(
        &unit.unit_name,
        &format!("{}\n{}", GENERATION_SYSTEM, prompt),
        unit.target_cards,
        context_length,
        truncated,
    );
    debug!(tokens = usage.total(), fit = %usage.fit(), "Estimated context usage");
    Ok(usage)
}

/// Generation prompt for the unit, with its described images as the manifest.
fn unit_prompt(config: &Config, unit: &UnitSpec, markdown: &str) -> Result<String> {
    let store = MetadataStore::load(&config.layout().metadata_dir)?;
    let manifest: Vec<ImageManifestEntry> = store
        .images_for_unit(&unit.unit_name)
        .into_iter()
        .filter_map(|img| {
            img.description.as_ref().map(|description| ImageManifestEntry {
                filename: img.filename.clone(),
                page: img.page,
                kind: img.kind.clone().unwrap_or_else(|| "diagram".to_string()),
                description: description.clone(),
            })
        })
        .collect();

    let ctx = GenerationContext::from_config(config);
    Ok(build_generation_prompt(&ctx, markdown, unit.target_cards, &manifest))
}

/// Parse and validate the unit's card file.
#[instrument(level = "debug", skip(config), fields(unit = %unit.unit_name))]
pub fn validate_unit(config: &Config, unit: &UnitSpec) -> Result<UnitValidation> {
    let layout = config.layout();
    let card_file = layout.card_file_path(&unit.unit_name);
    let bytes = fs::read(&card_file).map_err(|e| read_error(e, unit, "card file", &card_file))?;
    let records = parse_card_bytes(&bytes)
        .with_context(|| format!("Failed to parse card file: {}", card_file.display()))?;

    let validator = CardValidator::new(
        ImageDirectory::new(&layout.images_dir),
        config.validation.options(),
    );
    let report = validator.validate(&records);
    debug!(
        records = report.record_count(),
        defects = report.defect_count(),
        "Validated card file"
    );

    Ok(UnitValidation {
        unit_name: unit.unit_name.clone(),
        card_file,
        records,
        report,
    })
}

/// Card file to `.apkg`. Defects are fatal when `strict` is set, warnings otherwise.
#[instrument(level = "debug", skip(config), fields(unit = %unit.unit_name))]
pub fn package_unit(config: &Config, unit: &UnitSpec, strict: bool) -> Result<PackageSummary> {
    let validation = validate_unit(config, unit)?;
    if !validation.report.is_clean() {
        if strict {
            return Err(PackageError::ValidationFailed {
                unit: unit.unit_name.clone(),
                defects: validation.report.defect_count(),
            }
            .into());
        }
        for (idx, defect) in validation.report.findings() {
            warn!(unit = %unit.unit_name, record = idx + 1, %defect, "Card defect");
        }
    }

    let layout = config.layout();
    let options = PackageOptions::new(config.deck_name(&unit.unit_name))
        .with_model(&config.package.model_name, config.package.model_id);

    let packager = DeckPackager::new(ImageDirectory::new(&layout.images_dir));
    let summary = packager.package_to(
        &unit.unit_name,
        &validation.records,
        &options,
        &layout.apkg_dir,
    )?;
    Ok(summary)
}

/// `MissingArtifact` for a file that does not exist, the I/O error with context otherwise.
fn read_error(e: io::Error, unit: &UnitSpec, kind: &'static str, path: &Path) -> anyhow::Error {
    if e.kind() == io::ErrorKind::NotFound {
        DomainError::MissingArtifact {
            unit: unit.unit_name.clone(),
            kind,
            path: path.display().to_string(),
        }
        .into()
    } else {
        anyhow::Error::new(e).context(format!("Failed to read {} {}", kind, path.display()))
    }
}

/// Write through a temp file in the target directory, then rename into place.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {}", path.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context_budget::{ContextFit, CHARS_PER_TOKEN, OUTPUT_TOKENS_PER_CARD};
    use crate::application::extraction::{ExtractedDocument, ExtractedImage};
    use crate::domain::{GenerationError, UnitSource};
    use crate::util::testing::MockCardGenerator;
    use tempfile::TempDir;

    struct FixedExtractor(ExtractedDocument);

    impl PdfExtractor for FixedExtractor {
        fn extract(&self, _pdf: &Path, _unit_name: &str) -> Result<ExtractedDocument> {
            Ok(self.0.clone())
        }
    }

    struct EchoCaptioner;

    impl ImageCaptioner for EchoCaptioner {
        fn describe(&self, image: &Path, page: u32, _context: &str) -> Option<String> {
            let name = image.file_name()?.to_string_lossy().into_owned();
            Some(format!("Diagram {} on page {}", name, page))
        }
    }

    fn setup() -> (TempDir, Config, UnitSpec) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.base_dir = temp_dir.path().to_path_buf();
        config.generation.retry_backoff_ms = 0;
        let unit = UnitSpec {
            unit_name: "unit_1".to_string(),
            pdf_filename: "Unit 1.pdf".to_string(),
            target_cards: 5,
            tags: vec!["unit_1".to_string()],
            source: UnitSource::AutoDiscovered,
        };
        (temp_dir, config, unit)
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn given_failures_when_running_batch_then_continues_past_them() {
        // Arrange
        let (_dir, _config, unit) = setup();
        let units: Vec<UnitSpec> = ["a", "b", "c"]
            .iter()
            .map(|n| UnitSpec {
                unit_name: n.to_string(),
                ..unit.clone()
            })
            .collect();

        // Act
        let report = run_batch(&units, false, |u| {
            if u.unit_name == "b" {
                anyhow::bail!("boom")
            }
            Ok(u.unit_name.clone())
        });

        // Assert
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped, 0);
        assert!(!report.is_success());
    }

    #[test]
    fn given_stop_on_error_when_running_batch_then_skips_rest() {
        let (_dir, _config, unit) = setup();
        let units: Vec<UnitSpec> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| UnitSpec {
                unit_name: n.to_string(),
                ..unit.clone()
            })
            .collect();
        let mut seen = Vec::new();

        let report: BatchReport<()> = run_batch(&units, true, |u| {
            seen.push(u.unit_name.clone());
            if u.unit_name == "b" {
                anyhow::bail!("boom")
            }
            Ok(())
        });

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn given_pdf_when_extracting_then_writes_markdown_and_metadata() {
        // Arrange
        let (_dir, config, unit) = setup();
        let layout = config.layout();
        write(&layout.pdf_path(&unit), "%PDF-1.4");
        let extractor = FixedExtractor(ExtractedDocument {
            pages: vec!["Bayes rule".to_string()],
            images: vec![ExtractedImage {
                filename: "unit_1_page01_img01.png".to_string(),
                page: 1,
                bbox: Some([0.0, 0.0, 10.0, 10.0]),
            }],
        });

        // Act
        let summary = extract_unit(&config, &unit, &extractor, Some(&EchoCaptioner), true).unwrap();

        // Assert
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.described, 1);
        let md = fs::read_to_string(&summary.markdown).unwrap();
        assert!(md.contains("![Diagram unit_1_page01_img01.png on page 1]"));
        let store = MetadataStore::load(&layout.metadata_dir).unwrap();
        assert_eq!(store.images_for_unit("unit_1").len(), 1);
        assert_eq!(store.stats().described, 1);
    }

    #[test]
    fn given_no_images_flag_when_extracting_then_images_dropped() {
        let (_dir, config, unit) = setup();
        write(&config.layout().pdf_path(&unit), "%PDF-1.4");
        let extractor = FixedExtractor(ExtractedDocument {
            pages: vec!["text".to_string()],
            images: vec![ExtractedImage {
                filename: "x.png".to_string(),
                page: 1,
                bbox: None,
            }],
        });

        let summary = extract_unit(&config, &unit, &extractor, None, false).unwrap();

        assert_eq!(summary.images, 0);
        assert!(!config.layout().metadata_dir.exists());
    }

    #[test]
    fn given_missing_pdf_when_extracting_then_missing_artifact() {
        let (_dir, config, unit) = setup();
        let extractor = FixedExtractor(ExtractedDocument::default());

        let err = extract_unit(&config, &unit, &extractor, None, true).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DomainError>(),
            Some(DomainError::MissingArtifact { kind: "PDF", .. })
        ));
    }

    #[test]
    fn given_fenced_output_when_generating_then_writes_normalized_card_file() {
        // Arrange
        let (_dir, config, unit) = setup();
        let layout = config.layout();
        write(&layout.markdown_path("unit_1"), "# Unit 1\n\nBayes rule.");
        let generator = MockCardGenerator::builder()
            .with_failure(GenerationError::Timeout)
            .with_response("```\nHere are your cards:\n#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\nQ1\tA1\tbasics\nbroken line\n```")
            .build();

        // Act
        let summary = generate_unit(&config, &unit, &generator).unwrap();

        // Assert
        assert_eq!(generator.calls(), 2);
        assert_eq!(summary.cards, 1);
        assert_eq!(summary.dropped_lines, 1);
        let written = fs::read_to_string(&summary.output).unwrap();
        assert!(written.ends_with("Q1\tA1\tunit_1 basics\n"));
        let request = generator.last_request().unwrap();
        assert!(request.prompt.contains("Bayes rule."));
        assert_eq!(request.system.as_deref(), Some(GENERATION_SYSTEM));
    }

    #[test]
    fn given_no_markdown_when_generating_then_generator_not_called() {
        let (_dir, config, unit) = setup();
        let generator = MockCardGenerator::builder().with_response("x").build();

        let err = generate_unit(&config, &unit, &generator).unwrap_err();

        assert!(err.downcast_ref::<DomainError>().is_some());
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn given_unreadable_markdown_when_generating_then_read_error_not_missing() {
        let (_dir, config, unit) = setup();
        let path = config.layout().markdown_path("unit_1");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0x66, 0xff, 0xfe, 0x0a]).unwrap();
        let generator = MockCardGenerator::builder().with_response("x").build();

        let err = generate_unit(&config, &unit, &generator).unwrap_err();

        assert!(err.downcast_ref::<DomainError>().is_none());
        assert_eq!(
            err.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::InvalidData)
        );
        assert!(format!("{:#}", err).contains("markdown"));
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn given_card_file_path_is_directory_when_validating_then_read_error_not_missing() {
        let (_dir, config, unit) = setup();
        fs::create_dir_all(config.layout().card_file_path("unit_1")).unwrap();

        let err = validate_unit(&config, &unit).unwrap_err();

        assert!(err.downcast_ref::<DomainError>().is_none());
        assert!(err.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn given_markdown_when_analyzing_then_prompt_measured_against_window() {
        let (_dir, config, unit) = setup();
        write(&config.layout().markdown_path("unit_1"), "# Unit 1\n\nBayes rule.");

        let roomy = analyze_unit(&config, &unit, 100_000).unwrap();
        let cramped = analyze_unit(&config, &unit, 100).unwrap();

        assert_eq!(roomy.fit(), ContextFit::Ok);
        assert!(!roomy.truncated);
        assert_eq!(roomy.output_reserve, 5 * OUTPUT_TOKENS_PER_CARD);
        assert_eq!(cramped.fit(), ContextFit::Overflow);
        assert_eq!(roomy.total(), cramped.total());
    }

    #[test]
    fn given_oversized_markdown_when_analyzing_then_reports_truncation() {
        let (_dir, config, unit) = setup();
        let markdown = "word ".repeat(PROMPT_CONTENT_LIMIT);
        write(&config.layout().markdown_path("unit_1"), &markdown);

        let usage = analyze_unit(&config, &unit, 8192).unwrap();

        assert!(usage.truncated);
        assert!(usage.prompt_tokens < markdown.len() / CHARS_PER_TOKEN);
    }

    #[test]
    fn given_card_file_when_packaging_then_writes_archive() {
        let (_dir, config, unit) = setup();
        let layout = config.layout();
        write(
            &layout.card_file_path("unit_1"),
            "#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\nQ\tA\tunit_1\n",
        );

        let summary = package_unit(&config, &unit, false).unwrap();

        assert_eq!(summary.cards, 1);
        assert!(summary.output.is_file());
        assert_eq!(summary.output, layout.archive_path("unit_1"));
    }

    #[test]
    fn given_defects_and_strict_when_packaging_then_validation_failed_and_no_archive() {
        let (_dir, config, unit) = setup();
        let layout = config.layout();
        write(
            &layout.card_file_path("unit_1"),
            "#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\n<b>Q\tA\tunit_1\n",
        );

        let err = package_unit(&config, &unit, true).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::ValidationFailed { defects: 1, .. })
        ));
        assert!(!layout.archive_path("unit_1").exists());
    }
}
