// src/application/card_formatter.rs
use crate::constants::{CARD_COLUMNS, CARD_FILE_HEADER, FIELD_SEPARATOR};
use crate::domain::CardRecord;
use crate::infrastructure::media::extract_media_references;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCards {
    /// Card file contents, header included.
    pub text: String,
    pub records: usize,
    /// Lines discarded for having the wrong column count or an empty field.
    pub dropped_lines: usize,
}

/// Clean up raw model output into a well-formed card file.
///
/// Model output often arrives wrapped in a code fence, with chatter before the header,
/// or with the header missing entirely. Every surviving record gets `unit_tag` as its
/// first tag, and duplicate tags are removed keeping first occurrence.
pub fn normalize_generated(raw: &str, unit_tag: &str) -> NormalizedCards {
    let body = strip_code_fence(raw);
    let lines: Vec<&str> = body
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let start = lines
        .iter()
        .position(|l| l.trim_end() == CARD_FILE_HEADER[0])
        .unwrap_or(0);
    if start > 0 {
        debug!(lines = start, "Dropping preamble before header");
    }

    let mut records = Vec::new();
    let mut dropped_lines = 0;

    for line in &lines[start..] {
        // Trailing tabs delimit an empty tags column
        let trimmed = line.trim_end_matches(|c: char| c.is_whitespace() && c != '\t');
        if trimmed.trim().is_empty() || is_header_line(trimmed) {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(FIELD_SEPARATOR).collect();
        if parts.len() != CARD_COLUMNS {
            warn!(
                columns = parts.len(),
                line = %preview(trimmed),
                "Skipping malformed line"
            );
            dropped_lines += 1;
            continue;
        }

        let front = parts[0].trim();
        let back = parts[1].trim();
        if front.is_empty() || back.is_empty() {
            warn!(line = %preview(trimmed), "Skipping line with empty field");
            dropped_lines += 1;
            continue;
        }

        let tags = normalize_tags(parts[2], unit_tag);
        records.push(format!("{}\t{}\t{}", front, back, tags.join(" ")));
    }

    let mut text = CARD_FILE_HEADER.join("\n");
    text.push('\n');
    for record in &records {
        text.push_str(record);
        text.push('\n');
    }

    NormalizedCards {
        text,
        records: records.len(),
        dropped_lines,
    }
}

/// `unit_tag` first, then the remaining tags in order with duplicates removed.
pub fn normalize_tags(tags: &str, unit_tag: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for tag in std::iter::once(unit_tag).chain(tags.split_whitespace()) {
        if !tag.is_empty() && !result.iter().any(|t| t == tag) {
            result.push(tag.to_string());
        }
    }
    result
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Drop the opening fence line (it may carry a language hint)
    let without_open = trimmed.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
}

fn is_header_line(line: &str) -> bool {
    (line.starts_with('#') && !line.contains(FIELD_SEPARATOR)) || line == CARD_FILE_HEADER[3]
}

fn preview(line: &str) -> String {
    line.chars().take(50).collect()
}

/// Summary numbers for a set of cards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CardStatistics {
    pub total_cards: usize,
    pub cards_with_media: usize,
    pub avg_front_length: f64,
    pub avg_back_length: f64,
    /// Tag usage counts, sorted by tag.
    pub tags: BTreeMap<String, usize>,
}

pub fn card_statistics(records: &[CardRecord]) -> CardStatistics {
    if records.is_empty() {
        return CardStatistics::default();
    }

    let mut tags = BTreeMap::new();
    for tag in records.iter().flat_map(|r| r.tags()) {
        *tags.entry(tag.clone()).or_insert(0) += 1;
    }

    let count = records.len() as f64;
    CardStatistics {
        total_cards: records.len(),
        cards_with_media: records
            .iter()
            .filter(|r| {
                !extract_media_references(r.front()).is_empty()
                    || !extract_media_references(r.back()).is_empty()
            })
            .count(),
        avg_front_length: records.iter().map(|r| r.front().chars().count()).sum::<usize>() as f64
            / count,
        avg_back_length: records.iter().map(|r| r.back().chars().count()).sum::<usize>() as f64
            / count,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::card_parser::parse_card_text;

    const HEADER: &str = "#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\n";

    #[test]
    fn given_fenced_output_with_preamble_when_normalizing_then_clean_file() {
        // Arrange
        let raw = "```tsv\nHere are your cards:\n#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\nQ1\tA1\tgraphs\n```\n";

        // Act
        let normalized = normalize_generated(raw, "unit_1");

        // Assert
        assert_eq!(normalized.text, format!("{}Q1\tA1\tunit_1 graphs\n", HEADER));
        assert_eq!(normalized.records, 1);
        assert_eq!(normalized.dropped_lines, 0);
    }

    #[test]
    fn given_missing_header_when_normalizing_then_prepends_it() {
        let raw = "Q1\tA1\tt\nQ2\tA2\tt";

        let normalized = normalize_generated(raw, "unit_2");

        assert!(normalized.text.starts_with(HEADER));
        assert_eq!(normalized.records, 2);
        assert!(parse_card_text(&normalized.text).is_ok());
    }

    #[test]
    fn given_malformed_lines_when_normalizing_then_drops_and_counts_them() {
        let raw = format!(
            "{}Q1\tA1\tt\nonly two\tcolumns\nfour\tcol\tumns\there\n\tempty front\tt\nQ2\tA2\tt\n",
            HEADER
        );

        let normalized = normalize_generated(&raw, "unit_1");

        assert_eq!(normalized.records, 2);
        assert_eq!(normalized.dropped_lines, 3);
        let records = parse_card_text(&normalized.text).unwrap();
        assert_eq!(records[1].front(), "Q2");
    }

    #[test]
    fn given_untrimmed_fields_when_normalizing_then_trims_them() {
        let raw = format!("{}  Q1 \t A1  \t  a  b \n", HEADER);

        let normalized = normalize_generated(&raw, "unit_1");

        assert!(normalized.text.ends_with("Q1\tA1\tunit_1 a b\n"));
    }

    #[test]
    fn given_empty_tags_column_when_normalizing_then_unit_tag_added() {
        let raw = format!("{}Q1\tA1\t\n", HEADER);

        let normalized = normalize_generated(&raw, "unit_3");

        assert_eq!(normalized.records, 1);
        assert!(normalized.text.ends_with("Q1\tA1\tunit_3\n"));
    }

    #[test]
    fn given_duplicate_and_misplaced_unit_tag_when_normalizing_tags_then_unit_tag_first_once() {
        assert_eq!(
            normalize_tags("graphs unit_1 dags graphs", "unit_1"),
            vec!["unit_1", "graphs", "dags"]
        );
        assert_eq!(normalize_tags("", "unit_1"), vec!["unit_1"]);
    }

    #[test]
    fn given_records_when_computing_statistics_then_counts_tags_and_media() {
        let records = vec![
            CardRecord::new("Q1", "Answer", vec!["a".to_string(), "b".to_string()]),
            CardRecord::new(r#"<img src="x.png">"#, "A2", vec!["a".to_string()]),
        ];

        let stats = card_statistics(&records);

        assert_eq!(stats.total_cards, 2);
        assert_eq!(stats.cards_with_media, 1);
        assert_eq!(stats.tags["a"], 2);
        assert_eq!(stats.tags["b"], 1);
        assert!((stats.avg_back_length - 4.0).abs() < f64::EPSILON);
    }
}
