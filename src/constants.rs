// src/constants.rs
//
// Application-wide constants: card file format, archive identifiers, output naming.

/// The exact four header lines every generated card file starts with.
///
/// Used in: `application/card_parser.rs`, `application/card_formatter.rs`
pub const CARD_FILE_HEADER: [&str; 4] = [
    "#separator:tab",
    "#html:true",
    "#tags column:3",
    "Front\tBack\tTags",
];

pub const FIELD_SEPARATOR: char = '\t';

/// Number of columns in a card record: front, back, tags.
pub const CARD_COLUMNS: usize = 3;

/// Base of the note id space. Keeps ids in the millisecond-timestamp range Anki expects.
///
/// Used in: `application/deck_packager.rs`
pub const NOTE_ID_BASE: i64 = 1_000_000_000_000;

/// Number of distinct unit slots in the note id space.
pub const UNIT_ID_SLOTS: u64 = 10_000_000;

/// Positions reserved per unit. A unit with more records cannot be packaged.
pub const MAX_NOTES_PER_UNIT: usize = 100_000;

/// Shared note type id so every unit deck uses the same model on import.
pub const DEFAULT_MODEL_ID: i64 = 1_894_532_617;

pub const DEFAULT_MODEL_NAME: &str = "Anki Flashcards";

/// Modification stamp (seconds) written into every note, card, deck and model.
///
/// Fixed so an archive depends only on its records and media.
pub const DEFAULT_MODIFIED_AT: i64 = 1_700_000_000;

/// Collection creation stamp written into `col.crt`.
pub const COLLECTION_CREATED_AT: i64 = 1_411_124_400;

/// Characters of extracted markdown handed to the generation prompt.
///
/// Used in: `application/prompt.rs`
pub const PROMPT_CONTENT_LIMIT: usize = 20_000;

pub const CARD_FILE_SUFFIX: &str = "_anki.txt";
pub const ARCHIVE_SUFFIX: &str = "_anki.apkg";
pub const METADATA_FILE: &str = "image_descriptions.json";
pub const DEFAULT_CONFIG_FILE: &str = "flashbang.toml";
