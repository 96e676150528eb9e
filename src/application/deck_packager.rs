// src/application/deck_packager.rs
use crate::application::MediaStore;
use crate::constants::{
    ARCHIVE_SUFFIX, DEFAULT_MODEL_ID, DEFAULT_MODEL_NAME, DEFAULT_MODIFIED_AT,
    MAX_NOTES_PER_UNIT, NOTE_ID_BASE, UNIT_ID_SLOTS,
};
use crate::domain::{CardRecord, Deck, MediaAsset, PackageError, PackagedNote};
use crate::infrastructure::apkg::write_apkg;
use crate::infrastructure::media::{extract_media_references, rewrite_media_paths};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Alphabet genanki uses for note guids.
const GUID_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

const DECK_ID_BASE: i64 = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    pub deck_name: String,
    pub model_name: String,
    pub model_id: i64,
    /// Seconds since the epoch written as the note and card modification time.
    pub modified_at: i64,
}

impl PackageOptions {
    pub fn new(deck_name: impl Into<String>) -> Self {
        Self {
            deck_name: deck_name.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_id: DEFAULT_MODEL_ID,
            modified_at: DEFAULT_MODIFIED_AT,
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, id: i64) -> Self {
        self.model_name = name.into();
        self.model_id = id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub unit_name: String,
    pub deck_name: String,
    pub deck_id: i64,
    pub cards: usize,
    pub media: usize,
    pub output: PathBuf,
}

/// Turns parsed records into an `.apkg` archive.
///
/// Identity is positional: the record at index `i` of unit `u` always gets the same
/// note id and guid. Re-importing a regenerated unit updates the notes in place, but
/// reordering records in the card file remaps which note each position refers to.
pub struct DeckPackager<M: MediaStore> {
    media: M,
}

impl<M: MediaStore> DeckPackager<M> {
    pub fn new(media: M) -> Self {
        Self { media }
    }

    /// Assign ids, resolve media and assemble the deck. Nothing is written.
    #[instrument(level = "debug", skip(self, records, options), fields(records = records.len()))]
    pub fn build_deck(
        &self,
        unit_name: &str,
        records: &[CardRecord],
        options: &PackageOptions,
    ) -> Result<Deck, PackageError> {
        if records.is_empty() {
            return Err(PackageError::EmptyDeck(unit_name.to_string()));
        }
        if records.len() > MAX_NOTES_PER_UNIT {
            return Err(PackageError::TooManyRecords {
                unit: unit_name.to_string(),
                count: records.len(),
                max: MAX_NOTES_PER_UNIT,
            });
        }

        let media = self.collect_media(unit_name, records)?;

        let notes = records
            .iter()
            .enumerate()
            .map(|(position, record)| PackagedNote {
                id: note_id(unit_name, position),
                guid: note_guid(unit_name, position),
                position,
                front: rewrite_media_paths(record.front()),
                back: rewrite_media_paths(record.back()),
                tags: record.tags().to_vec(),
            })
            .collect();

        Ok(Deck {
            unit_name: unit_name.to_string(),
            deck_id: deck_id(unit_name),
            deck_name: options.deck_name.clone(),
            notes,
            media,
        })
    }

    /// Build the deck and write it to `<apkg_dir>/<unit>_anki.apkg`.
    ///
    /// The archive is assembled in a temporary file next to the target and renamed into
    /// place only once complete, so a failure never leaves a partial file behind.
    #[instrument(level = "debug", skip(self, records, options))]
    pub fn package_to(
        &self,
        unit_name: &str,
        records: &[CardRecord],
        options: &PackageOptions,
        apkg_dir: &Path,
    ) -> Result<PackageSummary, PackageError> {
        let deck = self.build_deck(unit_name, records, options)?;

        fs::create_dir_all(apkg_dir)?;
        let output = archive_path(apkg_dir, unit_name);

        let tmp = tempfile::NamedTempFile::new_in(apkg_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            write_apkg(&deck, options, &mut writer)?;
            writer.flush()?;
        }
        tmp.persist(&output).map_err(|e| PackageError::Io(e.error))?;

        info!(
            unit = unit_name,
            cards = deck.note_count(),
            media = deck.media_count(),
            output = %output.display(),
            "Packaged deck"
        );
        Ok(PackageSummary {
            unit_name: deck.unit_name,
            deck_name: deck.deck_name,
            deck_id: deck.deck_id,
            cards: deck.notes.len(),
            media: deck.media.len(),
            output,
        })
    }

    fn collect_media(
        &self,
        unit_name: &str,
        records: &[CardRecord],
    ) -> Result<BTreeMap<String, MediaAsset>, PackageError> {
        let mut media = BTreeMap::new();
        let mut missing: Vec<String> = Vec::new();

        let references = records
            .iter()
            .flat_map(|r| [r.front(), r.back()])
            .flat_map(extract_media_references);

        for filename in references {
            if media.contains_key(&filename) || missing.contains(&filename) {
                continue;
            }
            match self.media.read(&filename) {
                Ok(bytes) => {
                    debug!(%filename, len = bytes.len(), "Bundling media");
                    media.insert(filename.clone(), MediaAsset { filename, bytes });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound || !self.media.contains(&filename) => {
                    missing.push(filename);
                }
                Err(e) => return Err(PackageError::Io(e)),
            }
        }

        if !missing.is_empty() {
            return Err(PackageError::UnresolvedMedia {
                unit: unit_name.to_string(),
                missing,
            });
        }
        Ok(media)
    }
}

fn archive_path(apkg_dir: &Path, unit_name: &str) -> PathBuf {
    apkg_dir.join(format!("{}{}", unit_name, ARCHIVE_SUFFIX))
}

fn unit_hash(unit_name: &str) -> u64 {
    let digest = Sha256::digest(unit_name.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Stable note id for the record at `position` (zero-based) in `unit_name`.
pub fn note_id(unit_name: &str, position: usize) -> i64 {
    let slot = (unit_hash(unit_name) % UNIT_ID_SLOTS) as i64;
    NOTE_ID_BASE + slot * MAX_NOTES_PER_UNIT as i64 + position as i64
}

pub fn deck_id(unit_name: &str) -> i64 {
    DECK_ID_BASE + (unit_hash(unit_name) % DECK_ID_BASE as u64) as i64
}

/// Base91 guid derived from the unit name and position, in genanki's alphabet.
pub fn note_guid(unit_name: &str, position: usize) -> String {
    let digest = Sha256::digest(format!("{}__{}", unit_name, position).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let mut value = u64::from_be_bytes(head);

    let base = GUID_ALPHABET.len() as u64;
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(GUID_ALPHABET[(value % base) as usize] as char);
        value /= base;
    }
    if digits.is_empty() {
        digits.push(GUID_ALPHABET[0] as char);
    }
    digits.iter().rev().collect()
}
