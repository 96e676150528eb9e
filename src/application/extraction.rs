// src/application/extraction.rs
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// An image pulled out of a PDF and written to the images directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImage {
    pub filename: String,
    /// 1-based page number.
    pub page: u32,
    pub bbox: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedDocument {
    /// Text per page, in page order.
    pub pages: Vec<String>,
    pub images: Vec<ExtractedImage>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_text(&self, page: u32) -> &str {
        page.checked_sub(1)
            .and_then(|idx| self.pages.get(idx as usize))
            .map(String::as_str)
            .unwrap_or("")
    }
}

pub trait PdfExtractor {
    /// Page text plus any images the extractor wrote out for `unit_name`.
    fn extract(&self, pdf: &Path, unit_name: &str) -> Result<ExtractedDocument>;
}

/// Produces a short description of an image. Failure is never fatal: `None` means
/// the image simply goes without a caption.
pub trait ImageCaptioner {
    fn describe(&self, image: &Path, page: u32, context: &str) -> Option<String>;
}

/// Markdown document for one unit, with captions keyed by image filename.
pub fn render_unit_markdown(
    unit_name: &str,
    doc: &ExtractedDocument,
    captions: &BTreeMap<String, String>,
) -> String {
    let title = unit_name
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut parts = vec![
        format!("# {}\n", title),
        format!(
            "> **Pages:** {} | **Images:** {}\n",
            doc.page_count(),
            doc.images.len()
        ),
    ];

    for (idx, text) in doc.pages.iter().enumerate() {
        let page = idx as u32 + 1;
        let page_images: Vec<&ExtractedImage> =
            doc.images.iter().filter(|img| img.page == page).collect();
        if text.trim().is_empty() && page_images.is_empty() {
            continue;
        }

        let mut section = format!("## Page {}\n\n{}", page, tidy_text(text));
        for img in page_images {
            let alt = captions
                .get(&img.filename)
                .map(String::as_str)
                .unwrap_or(&img.filename);
            section.push_str(&format!("\n\n![{}](../images/{})", alt, img.filename));
        }
        parts.push(section);
    }

    if !doc.images.is_empty() {
        let mut refs = String::from("## Image References\n");
        for img in &doc.images {
            refs.push_str(&format!(
                "\n- [{}](../images/{}) - Page {}",
                img.filename, img.filename, img.page
            ));
            if let Some(caption) = captions.get(&img.filename) {
                refs.push_str(&format!("\n  - {}", caption));
            }
        }
        parts.push(refs);
    }

    let mut markdown = parts.join("\n\n");
    markdown.push('\n');
    markdown
}

/// Collapse runs of blank lines and inline whitespace.
fn tidy_text(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(collapsed);
            blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_pages_and_images_when_rendering_then_sections_in_order() {
        // Arrange
        let doc = ExtractedDocument {
            pages: vec!["Intro   text\n\n\n\nmore".to_string(), "".to_string(), "Third".to_string()],
            images: vec![ExtractedImage {
                filename: "unit_1_page03_img01.png".to_string(),
                page: 3,
                bbox: None,
            }],
        };
        let mut captions = BTreeMap::new();
        captions.insert("unit_1_page03_img01.png".to_string(), "A DAG".to_string());

        // Act
        let md = render_unit_markdown("unit_1_basics", &doc, &captions);

        // Assert
        assert!(md.starts_with("# Unit 1 Basics\n"));
        assert!(md.contains("> **Pages:** 3 | **Images:** 1"));
        assert!(md.contains("## Page 1\n\nIntro text\n\nmore"));
        assert!(!md.contains("## Page 2"));
        assert!(md.contains("## Page 3\n\nThird\n\n![A DAG](../images/unit_1_page03_img01.png)"));
        assert!(md.contains("## Image References"));
        assert!(md.contains("  - A DAG"));
    }

    #[test]
    fn given_no_images_when_rendering_then_no_reference_section() {
        let doc = ExtractedDocument {
            pages: vec!["Only text".to_string()],
            images: vec![],
        };

        let md = render_unit_markdown("unit_2", &doc, &BTreeMap::new());

        assert!(!md.contains("## Image References"));
        assert!(md.ends_with("Only text\n"));
    }

    #[test]
    fn given_page_number_when_reading_text_then_one_based() {
        let doc = ExtractedDocument {
            pages: vec!["first".to_string(), "second".to_string()],
            images: vec![],
        };

        assert_eq!(doc.page_text(1), "first");
        assert_eq!(doc.page_text(2), "second");
        assert_eq!(doc.page_text(0), "");
        assert_eq!(doc.page_text(3), "");
    }
}
