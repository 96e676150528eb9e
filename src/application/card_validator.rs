use crate::application::MediaStore;
use crate::domain::error::MarkupProblem;
use crate::domain::{CardField, CardRecord, Defect};
use crate::infrastructure::media::extract_media_references;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, instrument};

lazy_static! {
    static ref TAG_REGEX: Regex =
        Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)\b[^<>]*?(/?)>").expect("Failed to compile tag regex");
    // MathJax spans may contain '<' and '>' that are not markup
    static ref MATH_REGEX: Regex =
        Regex::new(r"(?s)\\\(.*?\\\)|\\\[.*?\\\]").expect("Failed to compile math regex");
}

/// Tags that must be closed within the same field. Void elements (`br`, `img`, `hr`)
/// and anything unknown are ignored.
const CLOSEABLE_TAGS: &[&str] = &[
    "a", "b", "blockquote", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i", "li",
    "mark", "ol", "p", "pre", "s", "small", "span", "strong", "sub", "sup", "table", "tbody",
    "td", "th", "thead", "tr", "u", "ul",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationOptions {
    /// Accept non-ASCII letters and digits in tag tokens.
    pub allow_unicode_tags: bool,
}

/// Outcome for one record. Records are never dropped from a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Pass,
    Fail(Vec<Defect>),
}

impl RecordStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, RecordStatus::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    statuses: Vec<RecordStatus>,
}

impl ValidationReport {
    pub fn statuses(&self) -> &[RecordStatus] {
        &self.statuses
    }

    pub fn is_clean(&self) -> bool {
        self.statuses.iter().all(RecordStatus::is_pass)
    }

    pub fn record_count(&self) -> usize {
        self.statuses.len()
    }

    pub fn defect_count(&self) -> usize {
        self.findings().count()
    }

    /// Every defect with the zero-based index of the record it belongs to.
    pub fn findings(&self) -> impl Iterator<Item = (usize, &Defect)> {
        self.statuses
            .iter()
            .enumerate()
            .flat_map(|(idx, status)| match status {
                RecordStatus::Pass => [].iter(),
                RecordStatus::Fail(defects) => defects.iter(),
            }
            .map(move |d| (idx, d)))
    }

    pub fn defects_for(&self, index: usize) -> &[Defect] {
        match self.statuses.get(index) {
            Some(RecordStatus::Fail(defects)) => defects,
            _ => &[],
        }
    }
}

/// Advisory checks over parsed records: markup balance, media existence, tag charset.
pub struct CardValidator<M: MediaStore> {
    media: M,
    options: ValidationOptions,
}

impl<M: MediaStore> CardValidator<M> {
    pub fn new(media: M, options: ValidationOptions) -> Self {
        Self { media, options }
    }

    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub fn validate(&self, records: &[CardRecord]) -> ValidationReport {
        let statuses: Vec<RecordStatus> = records
            .iter()
            .map(|record| {
                let defects = self.check_record(record);
                if defects.is_empty() {
                    RecordStatus::Pass
                } else {
                    RecordStatus::Fail(defects)
                }
            })
            .collect();

        let report = ValidationReport { statuses };
        debug!(defects = report.defect_count(), "Validation finished");
        report
    }

    fn check_record(&self, record: &CardRecord) -> Vec<Defect> {
        let mut defects = Vec::new();

        for (field, text) in [(CardField::Front, record.front()), (CardField::Back, record.back())] {
            defects.extend(check_markup(text, field));
            for filename in extract_media_references(text) {
                if !self.media.contains(&filename) {
                    defects.push(Defect::MissingMedia { filename, field });
                }
            }
        }

        for tag in record.tags() {
            if !is_valid_tag(tag, self.options.allow_unicode_tags) {
                defects.push(Defect::InvalidTag { tag: tag.clone() });
            }
        }

        defects
    }
}

pub fn is_valid_tag(tag: &str, allow_unicode: bool) -> bool {
    !tag.is_empty()
        && tag.chars().all(|c| {
            c == '-'
                || c == '_'
                || c.is_ascii_alphanumeric()
                || (allow_unicode && c.is_alphanumeric())
        })
}

/// Tag-stack balance check for a single field.
pub fn check_markup(text: &str, field: CardField) -> Vec<Defect> {
    let without_math = MATH_REGEX.replace_all(text, " ");
    let mut stack: Vec<String> = Vec::new();
    let mut defects = Vec::new();

    for cap in TAG_REGEX.captures_iter(&without_math) {
        let closing = !cap[1].is_empty();
        let self_closing = !cap[3].is_empty();
        let name = cap[2].to_ascii_lowercase();

        if self_closing || !CLOSEABLE_TAGS.contains(&name.as_str()) {
            continue;
        }

        if !closing {
            stack.push(name);
        } else if stack.last() == Some(&name) {
            stack.pop();
        } else if let Some(pos) = stack.iter().rposition(|open| *open == name) {
            // Everything opened after the match was left unclosed
            for unclosed in stack.drain(pos + 1..) {
                defects.push(Defect::UnbalancedMarkup {
                    tag: unclosed,
                    field,
                    problem: MarkupProblem::Unclosed,
                });
            }
            stack.pop();
        } else {
            defects.push(Defect::UnbalancedMarkup {
                tag: name,
                field,
                problem: MarkupProblem::UnexpectedClose,
            });
        }
    }

    defects.extend(stack.into_iter().map(|tag| Defect::UnbalancedMarkup {
        tag,
        field,
        problem: MarkupProblem::Unclosed,
    }));
    defects
}
