use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLOCK_TAG_REGEX: Regex =
        Regex::new(r"</?(p|div|br|li|h[1-6])[^>]*>").expect("Failed to compile block tag regex");
    static ref ANY_TAG_REGEX: Regex =
        Regex::new(r"<[^>]+>").expect("Failed to compile tag regex");
    static ref MEDIA_REGEX: Regex = Regex::new(r#"(?i)<img[^>]+src=["']?([^"'>]+)["']?[^>]*>|\[sound:([^\]]+)\]"#)
        .expect("Failed to compile media regex");
}

/// Extract the first line of plain text from HTML content.
///
/// This function:
/// 1. Decodes HTML entities (e.g., &amp; → &)
/// 2. Removes all HTML tags
/// 3. Extracts the first non-empty line
/// 4. Trims whitespace
///
/// # Examples
///
/// ```
/// use flashbang::util::text::extract_first_line;
///
/// let html = "<p>What is a Tree?</p><p>Second line</p>";
/// let first_line = extract_first_line(html);
/// assert_eq!(first_line, "What is a Tree?");
/// ```
pub fn extract_first_line(html: &str) -> String {
    let decoded = decode_html_entities(html).to_string();

    // Replace block-level HTML tags with newlines to preserve line breaks
    let with_newlines = BLOCK_TAG_REGEX.replace_all(&decoded, "\n").into_owned();
    let no_tags = ANY_TAG_REGEX.replace_all(&with_newlines, "").into_owned();

    no_tags
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Plain text of a field the way Anki computes sort fields and checksums:
/// media references become their filename, tags are dropped, entities decoded.
pub fn strip_html_media(html: &str) -> String {
    let with_media = MEDIA_REGEX.replace_all(html, |caps: &regex::Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| format!(" {} ", m.as_str()))
            .unwrap_or_default()
    });
    let no_tags = ANY_TAG_REGEX.replace_all(&with_media, "");
    decode_html_entities(&no_tags).trim().to_string()
}
