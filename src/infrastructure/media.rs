use crate::application::MediaStore;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

lazy_static! {
    // Match HTML img tags: <img src="path"> or <img src='path'>
    static ref HTML_IMAGE_REGEX: Regex =
        Regex::new(r#"(?i)<img\s[^>]*?src\s*=\s*["']([^"']+)["'][^>]*>"#)
            .expect("Failed to compile HTML image regex");

    // Match Anki sound references: [sound:file.mp3]
    static ref SOUND_REGEX: Regex =
        Regex::new(r"\[sound:([^\]]+)\]").expect("Failed to compile sound regex");

    static ref IMG_SRC_REGEX: Regex =
        Regex::new(r#"(?i)(<img\s[^>]*?src\s*=\s*)(["'])([^"']+)["']"#)
            .expect("Failed to compile img src regex");
}

/// Extract local media filenames referenced from card HTML, in order of appearance.
///
/// Paths are reduced to their final component (`../images/x.png` → `x.png`), since all
/// media lives flat in one directory. Remote and inline data URLs are skipped.
pub fn extract_media_references(html: &str) -> Vec<String> {
    let mut refs: Vec<(usize, String)> = Vec::new();

    for cap in HTML_IMAGE_REGEX.captures_iter(html) {
        if let Some(m) = cap.get(1) {
            if is_local(m.as_str()) {
                refs.push((m.start(), media_filename(m.as_str())));
            }
        }
    }

    for cap in SOUND_REGEX.captures_iter(html) {
        if let Some(m) = cap.get(1) {
            if is_local(m.as_str()) {
                refs.push((m.start(), media_filename(m.as_str())));
            }
        }
    }

    refs.sort_by_key(|(pos, _)| *pos);
    refs.into_iter().map(|(_, name)| name).collect()
}

/// Rewrite every local `<img src>` and `[sound:]` reference to the bare filename used
/// inside the archive.
pub fn rewrite_media_paths(html: &str) -> String {
    let images = IMG_SRC_REGEX.replace_all(html, |caps: &Captures| {
        let src = &caps[3];
        if is_local(src) {
            format!("{}\"{}\"", &caps[1], media_filename(src))
        } else {
            caps[0].to_string()
        }
    });
    SOUND_REGEX
        .replace_all(&images, |caps: &Captures| {
            let src = &caps[1];
            if is_local(src) {
                format!("[sound:{}]", media_filename(src))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

pub fn media_filename(path: &str) -> String {
    path.trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

fn is_local(path: &str) -> bool {
    let lower = path.trim().to_ascii_lowercase();
    !(lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:"))
}

/// Flat directory of extracted images, the media store used for validation and packaging.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    root: PathBuf,
}

impl ImageDirectory {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> Option<PathBuf> {
        // Refuse anything that would escape the directory
        if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
            return None;
        }
        Some(self.root.join(filename))
    }
}

impl MediaStore for ImageDirectory {
    fn contains(&self, filename: &str) -> bool {
        let found = self.path_for(filename).is_some_and(|p| p.is_file());
        trace!(filename, found, "Media lookup");
        found
    }

    fn read(&self, filename: &str) -> io::Result<Vec<u8>> {
        let path = self.path_for(filename).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid media filename '{}'", filename),
            )
        })?;
        std::fs::read(path)
    }
}
