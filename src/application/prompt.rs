// src/application/prompt.rs
use crate::constants::{CARD_FILE_HEADER, PROMPT_CONTENT_LIMIT};
use crate::infrastructure::config::{CardDistribution, Config, ExampleCard};
use std::fmt::Write;

const FALLBACK_CONTEXT: &str = "You are generating educational flashcards from lecture materials.";

/// Everything the prompt depends on besides the unit content itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub system_context: String,
    pub quality_focus: Vec<String>,
    pub distribution: CardDistribution,
    pub example_cards: Vec<ExampleCard>,
}

impl GenerationContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_context: config.system_context(),
            quality_focus: config.prompts.card_quality_focus.clone(),
            distribution: config.card_distribution.clone(),
            example_cards: config.prompts.example_cards.clone(),
        }
    }
}

/// An image the model may reference from card fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageManifestEntry {
    pub filename: String,
    pub page: u32,
    pub kind: String,
    pub description: String,
}

pub fn build_generation_prompt(
    ctx: &GenerationContext,
    markdown: &str,
    target_cards: u32,
    images: &[ImageManifestEntry],
) -> String {
    let context = if ctx.system_context.trim().is_empty() {
        FALLBACK_CONTEXT
    } else {
        ctx.system_context.as_str()
    };

    let mut prompt = String::new();
    // Writing into a String cannot fail
    let _ = write!(
        prompt,
        "{context}\n\nGenerate approximately {target_cards} Anki flashcards from the following lecture content.\n\n# Content Source\n\n{}\n",
        truncate_chars(markdown, PROMPT_CONTENT_LIMIT)
    );

    if !images.is_empty() {
        prompt.push_str("\n## Available Images\n\n");
        for img in images {
            let _ = writeln!(
                prompt,
                "- **{}** (Page {}, Type: {})\n  Description: {}\n",
                img.filename, img.page, img.kind, img.description
            );
        }
    }

    let _ = write!(
        prompt,
        r#"
# Output Format Requirements

Generate a tab-separated text file with these exact headers:
```
{header}
```

Each flashcard row should have:
- **Front**: The question (use <br> for line breaks, not \n)
- **Back**: The answer with explanation (use <br> for line breaks, not \n)
- **Tags**: Space-separated tags (e.g., "core-topics methods")

# Formatting Guidelines

1. **MathJax**: Use `\(...\)` for inline math, `\[...\]` for display math
2. **HTML**: Use `<strong>` for emphasis, `<br>` for line breaks, `<ul>` and `<li>` for lists
3. **Images**: Reference images using `<img src="filename.png" style="max-width:500px;">`
   - **IMPORTANT**: Place images in the FRONT (question), not the BACK (answer)
   - The question should ask about the diagram
   - The answer explains without repeating the image
4. **No tabs in content**: Use spaces or `<br>` instead of tab characters

# Card Quality Guidelines

{quality}
# Card Type Distribution

Generate approximately:
{distribution}

# Example Cards

{examples}
# Your Task

Generate exactly {target_cards} high-quality flashcards following these guidelines. Start with the required headers, then output one flashcard per line with tab-separated columns.

IMPORTANT:
- Do not include any explanatory text before or after the flashcards
- Start directly with the headers
- Use actual TAB characters to separate columns (not spaces)
- Each card should be on a single line (use <br> for line breaks within fields)
"#,
        header = CARD_FILE_HEADER.join("\n"),
        quality = format_quality_guidelines(&ctx.quality_focus),
        distribution = format_distribution(&ctx.distribution),
        examples = format_example_cards(&ctx.example_cards),
    );

    prompt
}

/// At most `limit` characters, cut on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn format_quality_guidelines(focus: &[String]) -> String {
    let mut out = String::from("Create cards that:\n");
    for (i, guideline) in focus.iter().enumerate() {
        let _ = writeln!(out, "{}. **{}**", i + 1, guideline);
    }
    out
}

fn percent(share: f64) -> u32 {
    (share * 100.0).round() as u32
}

fn format_distribution(d: &CardDistribution) -> String {
    [
        (d.conceptual, "Conceptual Understanding (Why does X work? What's the intuition?)"),
        (d.worked_examples, "Simple Worked Examples (Tiny scenarios, obvious answers)"),
        (d.algorithm, "Algorithm Comprehension (What does this step do? Why avoid problem X?)"),
        (d.pattern_recognition, "Pattern Recognition (Identify reasoning patterns, independence structures)"),
        (d.visual, "Visual/Diagram-Based (with images in the question)"),
    ]
    .iter()
    .map(|(share, label)| format!("- {}% {}", percent(*share), label))
    .collect::<Vec<_>>()
    .join("\n")
}

fn format_example_cards(examples: &[ExampleCard]) -> String {
    let mut out = String::new();
    for (i, example) in examples.iter().enumerate() {
        let _ = write!(
            out,
            "**Example {}:**\n```\nFront: {}\nBack: {}\nTags: {}\n```\n\n",
            i + 1,
            example.front,
            example.back,
            example.tags
        );
    }
    out
}
