use crate::domain::PackagedNote;
use std::collections::BTreeMap;
use std::fmt;

/// Binary content of a file referenced from card HTML.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Everything that ends up in one unit's archive.
///
/// `notes` keep import order; `media` is keyed by filename so each asset appears once
/// and iteration order does not depend on reference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub unit_name: String,
    pub deck_id: i64,
    pub deck_name: String,
    pub notes: Vec<PackagedNote>,
    pub media: BTreeMap<String, MediaAsset>,
}

impl Deck {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn media_count(&self) -> usize {
        self.media.len()
    }
}
