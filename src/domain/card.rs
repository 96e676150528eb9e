use serde::Serialize;

/// One front/back/tags triple parsed from a generated card file.
///
/// Records are never mutated after parsing; the packager consumes them by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRecord {
    front: String,
    back: String,
    tags: Vec<String>,
}

impl CardRecord {
    pub fn new(front: impl Into<String>, back: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            tags,
        }
    }

    pub fn front(&self) -> &str {
        &self.front
    }

    pub fn back(&self) -> &str {
        &self.back
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Tags in their serialized, whitespace-separated form.
    pub fn tags_field(&self) -> String {
        self.tags.join(" ")
    }
}
