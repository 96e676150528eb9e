// src/ports/console.rs
use crate::application::card_formatter::CardStatistics;
use crate::application::pipeline::{BatchReport, ExtractSummary, GenerateSummary, UnitValidation};
use crate::application::{ContextUsage, PackageSummary};
use crate::domain::{CardRecord, StatusSnapshot, UnitSpec};
use crate::util::text::extract_first_line;
use std::fmt::Write;

const PREVIEW_WIDTH: usize = 60;

/// Plain-text rendering of pipeline results for the terminal.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }

    pub fn render_units(&self, units: &[(UnitSpec, StatusSnapshot)], detailed: bool) -> String {
        if units.is_empty() {
            return "No units found. Add PDFs to the PDF directory or configure [units].\n"
                .to_string();
        }

        let width = units
            .iter()
            .map(|(spec, _)| spec.unit_name.len())
            .max()
            .unwrap_or(0)
            .max("UNIT".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:<12}  {:>6}  PDF", "UNIT", "STAGE", "TARGET");
        for (spec, status) in units {
            let _ = writeln!(
                out,
                "{:<width$}  {:<12}  {:>6}  {}",
                spec.unit_name,
                status.stage().to_string(),
                spec.target_cards,
                spec.pdf_filename
            );
            if detailed {
                let _ = writeln!(out, "    source: {}", spec.source);
                let _ = writeln!(out, "    tags: {}", spec.tags.join(" "));
                for (label, artifact) in [
                    ("pdf", &status.source),
                    ("markdown", &status.markdown),
                    ("cards", &status.cards),
                    ("apkg", &status.archive),
                ] {
                    let mark = if artifact.present { "x" } else { " " };
                    let _ = writeln!(out, "    [{}] {:<8} {}", mark, label, artifact.path.display());
                }
            }
        }
        let _ = writeln!(out, "\n{} unit(s)", units.len());
        out
    }

    pub fn render_validation(&self, validation: &UnitValidation) -> String {
        let report = &validation.report;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}: {} card(s), {} defect(s)",
            validation.unit_name,
            report.record_count(),
            report.defect_count()
        );
        for (idx, defect) in report.findings() {
            let front = validation
                .records
                .get(idx)
                .map(|r| preview(&extract_first_line(r.front())))
                .unwrap_or_default();
            let _ = writeln!(out, "  card {} ({}): {}", idx + 1, front, defect);
        }
        if report.is_clean() {
            out.push_str("  all cards pass\n");
        }
        out
    }

    pub fn render_extract(&self, summary: &ExtractSummary) -> String {
        format!(
            "{}: {} page(s), {} image(s), {} described -> {}\n",
            summary.unit_name,
            summary.pages,
            summary.images,
            summary.described,
            summary.markdown.display()
        )
    }

    pub fn render_generate(&self, summary: &GenerateSummary) -> String {
        let mut line = format!(
            "{}: {} card(s) from {} -> {}",
            summary.unit_name,
            summary.cards,
            summary.provider,
            summary.output.display()
        );
        if summary.dropped_lines > 0 {
            let _ = write!(line, " ({} malformed line(s) dropped)", summary.dropped_lines);
        }
        if summary.defects > 0 {
            let _ = write!(line, " [{} defect(s), run validate]", summary.defects);
        }
        line.push('\n');
        line
    }

    pub fn render_package(&self, summary: &PackageSummary) -> String {
        format!(
            "{}: '{}' with {} card(s), {} media file(s) -> {}\n",
            summary.unit_name,
            summary.deck_name,
            summary.cards,
            summary.media,
            summary.output.display()
        )
    }

    pub fn render_context(&self, usage: &ContextUsage) -> String {
        let mut out = format!(
            "{}: {} prompt + {} reserve = {} / {} tokens ({:.0}%) {}\n",
            usage.unit_name,
            usage.prompt_tokens,
            usage.output_reserve,
            usage.total(),
            usage.context_length,
            usage.utilization_percent(),
            usage.fit()
        );
        if usage.overflow_tokens() > 0 {
            let _ = writeln!(out, "  over by {} tokens", usage.overflow_tokens());
        }
        if usage.truncated {
            out.push_str("  content is truncated to fit the prompt limit\n");
        }
        out
    }

    /// Per-unit lines followed by a totals line.
    pub fn render_batch<T>(&self, report: &BatchReport<T>, render: impl Fn(&T) -> String) -> String {
        let mut out = String::new();
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(value) => out.push_str(&render(value)),
                Err(e) => {
                    let _ = writeln!(out, "{}: FAILED: {:#}", outcome.unit_name, e);
                }
            }
        }
        let _ = write!(
            out,
            "\n{} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        if report.skipped > 0 {
            let _ = write!(out, ", {} skipped", report.skipped);
        }
        out.push('\n');
        out
    }

    pub fn render_cards(&self, unit_name: &str, records: &[CardRecord], stats: &CardStatistics) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {} card(s)\n", unit_name, stats.total_cards);
        for (idx, record) in records.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>4}  {}  [{}]",
                idx + 1,
                preview(&extract_first_line(record.front())),
                record.tags().join(" ")
            );
        }
        let _ = writeln!(out, "\ncards with media: {}", stats.cards_with_media);
        let _ = writeln!(
            out,
            "average length: front {:.0}, back {:.0}",
            stats.avg_front_length, stats.avg_back_length
        );
        if !stats.tags.is_empty() {
            let tags: Vec<String> = stats
                .tags
                .iter()
                .map(|(tag, count)| format!("{} ({})", tag, count))
                .collect();
            let _ = writeln!(out, "tags: {}", tags.join(", "));
        }
        out
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_WIDTH {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_WIDTH - 3).collect();
        format!("{}...", cut)
    }
}
