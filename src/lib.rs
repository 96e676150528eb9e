// src/lib.rs
pub mod application;
pub mod cli;
pub mod constants;
pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod util;

use crate::application::card_formatter::card_statistics;
use crate::application::context_budget::DEFAULT_CONTEXT_LENGTH;
use crate::application::pipeline::{
    analyze_unit, extract_unit, generate_unit, package_unit, run_batch, validate_unit,
    BatchReport,
};
use crate::application::{unit_status, ContextFit, ImageCaptioner};
use crate::cli::args::{Args, Command};
use crate::domain::{DomainError, UnitSpec};
use crate::infrastructure::{
    create_generator, Config, OllamaGenerator, OllamaVision, TextPdfExtractor,
};
use anyhow::{Context, Result};
use ports::ConsolePresenter;
use std::path::Path;
use tracing::{debug, info, warn};

pub fn run(args: Args) -> Result<()> {
    debug!(?args, "Starting flashbang with arguments");

    let load_config = || Config::load_or_default(&args.config);
    let presenter = ConsolePresenter::new();

    match args.command {
        Command::Init { force } => init_config(&args.config, force),
        Command::Extract {
            unit,
            no_images,
            no_describe,
        } => {
            let config = load_config()?;
            let units = select_units(&config, unit.as_deref())?;
            let with_images = config.processing.extract_images && !no_images;
            let vision = if with_images && !no_describe && config.vision.enabled {
                connect_vision(&config)
            } else {
                None
            };
            let captioner = vision.as_ref().map(|v| v as &dyn ImageCaptioner);
            let mut extractor = TextPdfExtractor::new();
            if with_images {
                extractor = extractor.with_images(
                    &config.layout().images_dir,
                    config.processing.min_image_width,
                    config.processing.min_image_height,
                );
            }

            let report = run_batch(&units, false, |u| {
                extract_unit(&config, u, &extractor, captioner, with_images)
            });
            print!("{}", presenter.render_batch(&report, |s| presenter.render_extract(s)));
            finish(&report)
        }
        Command::Generate { unit, provider } => {
            let config = load_config()?;
            let units = select_units(&config, unit.as_deref())?;
            let provider = provider
                .map(|p| p.as_str())
                .unwrap_or(config.generation.provider.as_str());
            let generator = create_generator(&config.generation, provider)?;
            generator
                .check_availability()
                .with_context(|| format!("Provider {} is not ready", generator.provider_info()))?;

            let report = run_batch(&units, false, |u| generate_unit(&config, u, &generator));
            print!("{}", presenter.render_batch(&report, |s| presenter.render_generate(s)));
            finish(&report)
        }
        Command::Analyze {
            unit,
            context_length,
        } => {
            let config = load_config()?;
            let units = select_units(&config, unit.as_deref())?;
            let context_length = match context_length {
                Some(tokens) => tokens,
                None => model_context_length(&config),
            };

            let report = run_batch(&units, false, |u| analyze_unit(&config, u, context_length));
            print!("{}", presenter.render_batch(&report, |u| presenter.render_context(u)));
            let overflowing = report
                .outcomes
                .iter()
                .filter(|o| matches!(&o.result, Ok(usage) if usage.fit() == ContextFit::Overflow))
                .count();
            if overflowing > 0 {
                anyhow::bail!("{} unit(s) exceed the context window", overflowing);
            }
            finish(&report)
        }
        Command::Validate { unit } => {
            let config = load_config()?;
            let unit = find_unit(&config, &unit)?;
            let validation = validate_unit(&config, &unit)?;
            print!("{}", presenter.render_validation(&validation));
            if !validation.report.is_clean() {
                anyhow::bail!(
                    "{} defect(s) in {}",
                    validation.report.defect_count(),
                    validation.card_file.display()
                );
            }
            Ok(())
        }
        Command::Package {
            unit,
            all,
            strict,
            stop_on_error,
        } => {
            let config = load_config()?;
            let units = if all {
                let layout = config.layout();
                config
                    .all_units()
                    .into_iter()
                    .filter(|u| unit_status(u, &layout).cards.present)
                    .collect()
            } else {
                select_units(&config, unit.as_deref())?
            };
            if units.is_empty() {
                warn!("No units with card files to package");
            }
            let strict = strict || config.validation.strict;

            info!(units = units.len(), strict, "Packaging");
            let report = run_batch(&units, stop_on_error, |u| package_unit(&config, u, strict));
            print!("{}", presenter.render_batch(&report, |s| presenter.render_package(s)));
            finish(&report)
        }
        Command::List { detailed } => {
            let config = load_config()?;
            let layout = config.layout();
            let units: Vec<_> = config
                .all_units()
                .into_iter()
                .map(|u| {
                    let status = unit_status(&u, &layout);
                    (u, status)
                })
                .collect();
            print!("{}", presenter.render_units(&units, detailed));
            Ok(())
        }
        Command::Inspect { unit } => {
            let config = load_config()?;
            let unit = find_unit(&config, &unit)?;
            let validation = validate_unit(&config, &unit)?;
            let stats = card_statistics(&validation.records);
            print!(
                "{}",
                presenter.render_cards(&unit.unit_name, &validation.records, &stats)
            );
            Ok(())
        }
        Command::Config { show, validate } => {
            let config = load_config()?;
            if show || !validate {
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to render configuration")?
                );
            }
            if validate {
                let problems = config.validate();
                if !problems.is_empty() {
                    for problem in &problems {
                        println!("- {}", problem);
                    }
                    anyhow::bail!("{} configuration problem(s)", problems.len());
                }
                println!("Configuration OK");
            }
            Ok(())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }
    let config = Config::create_default(path)?;
    let layout = config.layout();
    for dir in [
        &layout.pdf_dir,
        &layout.markdown_dir,
        &layout.images_dir,
        &layout.anki_dir,
        &layout.apkg_dir,
        &layout.metadata_dir,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    println!("Created {}", path.display());
    Ok(())
}

/// One named unit, or every known unit when no name is given.
pub fn select_units(config: &Config, unit: Option<&str>) -> Result<Vec<UnitSpec>> {
    match unit {
        Some(name) => Ok(vec![find_unit(config, name)?]),
        None => Ok(config.all_units()),
    }
}

fn find_unit(config: &Config, name: &str) -> Result<UnitSpec> {
    config
        .unit_by_name(name)
        .ok_or_else(|| DomainError::UnitNotFound(name.to_string()).into())
}

fn connect_vision(config: &Config) -> Option<OllamaVision> {
    let context = format!("{} lecture slides", config.subject.field);
    let vision = match OllamaVision::new(&config.vision, &context) {
        Ok(vision) => vision,
        Err(e) => {
            warn!(error = %e, "Vision client unavailable, images will not be described");
            return None;
        }
    };
    match vision.check_availability() {
        Ok(()) => {
            info!(model = vision.model(), "Describing images");
            Some(vision)
        }
        Err(e) => {
            warn!(error = %e, "Vision model unavailable, images will not be described");
            None
        }
    }
}

/// Context window of the configured Ollama model, or the default when it cannot be asked.
fn model_context_length(config: &Config) -> usize {
    let reported = OllamaGenerator::new(&config.generation.ollama, config.generation.timeout_secs)
        .and_then(|generator| generator.context_length());
    match reported {
        Ok(Some(tokens)) => {
            info!(tokens, model = %config.generation.ollama.model, "Model context window");
            tokens
        }
        Ok(None) => {
            warn!(default = DEFAULT_CONTEXT_LENGTH, "Model reports no context window");
            DEFAULT_CONTEXT_LENGTH
        }
        Err(e) => {
            warn!(error = %e, default = DEFAULT_CONTEXT_LENGTH, "Cannot query model context window");
            DEFAULT_CONTEXT_LENGTH
        }
    }
}

fn finish<T>(report: &BatchReport<T>) -> Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} unit(s) failed, {} skipped",
            report.failed(),
            report.skipped
        ))
    }
}
