// src/infrastructure/apkg.rs
//
// Legacy Anki package (schema 11): a zip holding a SQLite collection, a JSON media
// manifest and the media files named "0".."n-1".
use crate::application::deck_packager::PackageOptions;
use crate::constants::COLLECTION_CREATED_AT;
use crate::domain::{Deck, PackageError, PackagedNote};
use crate::util::text::strip_html_media;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const COLLECTION_ENTRY: &str = "collection.anki2";
pub const MEDIA_ENTRY: &str = "media";

const FIELD_JOINER: char = '\x1f';
const DEFAULT_DECK_ID: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld integer not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE revlog (
    id integer primary key,
    cid integer not null,
    usn integer not null,
    ease integer not null,
    ivl integer not null,
    lastIvl integer not null,
    factor integer not null,
    time integer not null,
    type integer not null
);
CREATE TABLE graves (
    usn integer not null,
    oid integer not null,
    type integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

const QUESTION_FORMAT: &str = r#"<div class="front">{{Front}}</div>"#;
const ANSWER_FORMAT: &str = r#"<div class="front">{{Front}}</div>
<hr id="answer">
<div class="back">{{Back}}</div>
<div class="tags">{{Tags}}</div>"#;

const CARD_CSS: &str = r#".card {
    font-family: arial, sans-serif;
    font-size: 20px;
    text-align: left;
    color: black;
    background-color: white;
    padding: 20px;
}

.front {
    margin-bottom: 10px;
    font-weight: normal;
    text-align: center;
}

.back {
    margin-top: 10px;
    text-align: center;
}

.tags {
    margin-top: 20px;
    font-size: 12px;
    color: #888;
    font-style: italic;
    text-align: left;
}

img {
    max-width: 100%;
    height: auto;
    display: block;
    margin: 10px auto;
}

.MathJax {
    font-size: 1em;
}

code {
    background-color: #f4f4f4;
    padding: 2px 6px;
    border-radius: 3px;
    font-family: monospace;
}

pre {
    background-color: #f4f4f4;
    padding: 10px;
    border-radius: 5px;
    overflow-x: auto;
}

ul, ol {
    margin-left: 20px;
}

li {
    margin: 5px 0;
}

hr#answer {
    margin: 15px 0;
    border: none;
    border-top: 2px solid #ccc;
}
"#;

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";
const LATEX_POST: &str = "\\end{document}";

/// Contents of an archive as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveContents {
    pub deck_names: Vec<String>,
    pub model_names: Vec<String>,
    /// Ordered by position in the deck.
    pub notes: Vec<PackagedNote>,
    /// Media bytes keyed by the filename recorded in the manifest.
    pub media: BTreeMap<String, Vec<u8>>,
}

/// Serialize a deck into an `.apkg` container.
///
/// Every entry carries a fixed timestamp and mode, and the SQLite file is built by the
/// same statement sequence each time, so identical inputs produce identical bytes.
#[instrument(level = "debug", skip_all, fields(unit = %deck.unit_name))]
pub fn write_apkg<W: Write + Seek>(
    deck: &Deck,
    options: &PackageOptions,
    writer: W,
) -> Result<(), PackageError> {
    let workdir = tempfile::tempdir()?;
    let db_path = workdir.path().join(COLLECTION_ENTRY);
    build_collection(&db_path, deck, options)?;
    let collection = fs::read(&db_path)?;

    let entry_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(writer);
    zip.start_file(COLLECTION_ENTRY, entry_options)?;
    zip.write_all(&collection)?;

    let manifest: Map<String, Value> = deck
        .media
        .keys()
        .enumerate()
        .map(|(idx, filename)| (idx.to_string(), Value::String(filename.clone())))
        .collect();
    zip.start_file(MEDIA_ENTRY, entry_options)?;
    zip.write_all(serde_json::to_string(&manifest)?.as_bytes())?;

    for (idx, asset) in deck.media.values().enumerate() {
        zip.start_file(idx.to_string(), entry_options)?;
        zip.write_all(&asset.bytes)?;
    }

    zip.finish()?;
    debug!(
        notes = deck.note_count(),
        media = deck.media_count(),
        "Archive written"
    );
    Ok(())
}

fn build_collection(path: &Path, deck: &Deck, options: &PackageOptions) -> Result<(), PackageError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?3, 11, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')",
        params![
            COLLECTION_CREATED_AT,
            options.modified_at * 1000,
            options.modified_at * 1000,
            collection_conf(deck).to_string(),
            models_json(deck, options).to_string(),
            decks_json(deck, options).to_string(),
            deck_config_json().to_string(),
        ],
    )?;

    {
        let mut insert_note = tx.prepare(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
             VALUES (?1, ?2, ?3, ?4, -1, ?5, ?6, ?7, ?8, 0, '')",
        )?;
        let mut insert_card = tx.prepare(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                reps, lapses, left, odue, odid, flags, data)
             VALUES (?1, ?1, ?2, 0, ?3, -1, 0, 0, ?4, 0, 0, 0, 0, 0, 0, 0, 0, '')",
        )?;

        for note in &deck.notes {
            let sort_field = strip_html_media(&note.front);
            insert_note.execute(params![
                note.id,
                note.guid,
                options.model_id,
                options.modified_at,
                tags_column(&note.tags),
                join_fields(note),
                sort_field,
                field_checksum(&sort_field),
            ])?;
            insert_card.execute(params![
                note.id,
                deck.deck_id,
                options.modified_at,
                note.position as i64,
            ])?;
        }
    }
    tx.commit()?;

    conn.close().map_err(|(_, e)| e)?;
    Ok(())
}

fn join_fields(note: &PackagedNote) -> String {
    [note.front.as_str(), note.back.as_str(), &note.tags.join(" ")].join(&FIELD_JOINER.to_string())
}

/// Anki stores tags space-padded so `like '% tag %'` searches work.
fn tags_column(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" {} ", tags.join(" "))
    }
}

/// First 8 hex digits of the SHA-1 of the sort field, as Anki uses for duplicate checks.
pub fn field_checksum(text: &str) -> i64 {
    let digest = Sha1::digest(text.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn collection_conf(deck: &Deck) -> Value {
    json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "curDeck": deck.deck_id,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": null,
        "nextPos": deck.notes.len() + 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true
    })
}

fn models_json(deck: &Deck, options: &PackageOptions) -> Value {
    let field = |name: &str, ord: u32| {
        json!({
            "name": name,
            "ord": ord,
            "sticky": false,
            "rtl": false,
            "font": "Arial",
            "size": 20,
            "media": []
        })
    };

    let model = json!({
        "id": options.model_id,
        "name": options.model_name,
        "type": 0,
        "mod": options.modified_at,
        "usn": -1,
        "sortf": 0,
        "did": deck.deck_id,
        "tmpls": [{
            "name": "Card 1",
            "ord": 0,
            "qfmt": QUESTION_FORMAT,
            "afmt": ANSWER_FORMAT,
            "did": null,
            "bqfmt": "",
            "bafmt": ""
        }],
        "flds": [field("Front", 0), field("Back", 1), field("Tags", 2)],
        "css": CARD_CSS,
        "latexPre": LATEX_PRE,
        "latexPost": LATEX_POST,
        "latexsvg": false,
        "req": [[0, "any", [0]]],
        "tags": [],
        "vers": []
    });

    let mut models = Map::new();
    models.insert(options.model_id.to_string(), model);
    Value::Object(models)
}

fn deck_json(id: i64, name: &str, modified_at: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "mod": modified_at,
        "usn": -1,
        "lrnToday": [0, 0],
        "revToday": [0, 0],
        "newToday": [0, 0],
        "timeToday": [0, 0],
        "collapsed": false,
        "browserCollapsed": false,
        "desc": "",
        "dyn": 0,
        "conf": 1,
        "extendNew": 0,
        "extendRev": 0
    })
}

fn decks_json(deck: &Deck, options: &PackageOptions) -> Value {
    let mut decks = Map::new();
    decks.insert(
        DEFAULT_DECK_ID.to_string(),
        deck_json(DEFAULT_DECK_ID, "Default", 0),
    );
    decks.insert(
        deck.deck_id.to_string(),
        deck_json(deck.deck_id, &deck.deck_name, options.modified_at),
    );
    Value::Object(decks)
}

fn deck_config_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "bury": true,
                "delays": [1.0, 10.0],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "lapse": {
                "delays": [10.0],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0.0
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1.0,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}

/// Read notes and media back out of an `.apkg` file.
#[instrument(level = "debug")]
pub fn read_archive(path: &Path) -> Result<ArchiveContents, PackageError> {
    let file = fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let workdir = tempfile::tempdir()?;
    let db_path = workdir.path().join(COLLECTION_ENTRY);
    {
        let mut entry = archive.by_name(COLLECTION_ENTRY)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        fs::write(&db_path, bytes)?;
    }

    let manifest: BTreeMap<String, String> = {
        let mut entry = archive.by_name(MEDIA_ENTRY)?;
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        serde_json::from_str(&text)?
    };

    let mut media = BTreeMap::new();
    for (index, filename) in manifest {
        let mut entry = archive.by_name(&index)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        media.insert(filename, bytes);
    }

    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let (models, decks): (String, String) =
        conn.query_row("SELECT models, decks FROM col WHERE id = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    let mut stmt = conn.prepare(
        "SELECT n.id, n.guid, n.flds, c.due
         FROM notes n JOIN cards c ON c.nid = n.id
         ORDER BY c.due, n.id",
    )?;
    let notes = stmt
        .query_map([], |row| {
            let flds: String = row.get(2)?;
            let due: i64 = row.get(3)?;
            Ok(split_fields(row.get(0)?, row.get(1)?, &flds, due))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ArchiveContents {
        deck_names: names_in(&decks)?,
        model_names: names_in(&models)?,
        notes,
        media,
    })
}

fn split_fields(id: i64, guid: String, flds: &str, due: i64) -> PackagedNote {
    let mut fields = flds.split(FIELD_JOINER);
    let front = fields.next().unwrap_or_default().to_string();
    let back = fields.next().unwrap_or_default().to_string();
    let tags = fields
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    PackagedNote {
        id,
        guid,
        position: usize::try_from(due).unwrap_or_default(),
        front,
        back,
        tags,
    }
}

fn names_in(json_text: &str) -> Result<Vec<String>, PackageError> {
    let value: BTreeMap<String, Value> = serde_json::from_str(json_text)?;
    Ok(value
        .values()
        .filter_map(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
        .collect())
}
