mod helpers;

use anyhow::Result;
use flashbang::application::pipeline::package_unit;
use flashbang::domain::{CardParseError, PackageError};
use flashbang::infrastructure::apkg::read_archive;
use helpers::TestWorkspace;
use std::collections::BTreeSet;
use std::fs;
use std::time::{Duration, SystemTime};

fn tag_set(tags: &[String]) -> BTreeSet<String> {
    tags.iter().cloned().collect()
}

#[test]
fn given_example_card_file_when_packaging_then_one_note_and_no_media() -> Result<()> {
    // Arrange
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 1.pdf")?;
    ws.reload()?;
    ws.add_raw_card_file(
        "unit_1",
        "#separator:tab\n#html:true\n#tags column:3\nWhy is X true?\tBecause Y.\ttopicA topicB\n",
    )?;

    // Act
    let summary = package_unit(&ws.config, &ws.unit("unit_1"), true)?;

    // Assert
    assert_eq!(summary.cards, 1);
    assert_eq!(summary.media, 0);
    let contents = read_archive(&summary.output)?;
    assert_eq!(contents.notes.len(), 1);
    assert_eq!(contents.notes[0].front, "Why is X true?");
    assert_eq!(contents.notes[0].back, "Because Y.");
    assert_eq!(contents.notes[0].tags, vec!["topicA", "topicB"]);
    assert!(contents.media.is_empty());
    Ok(())
}

#[test]
fn given_records_with_media_when_packaging_then_archive_round_trips() -> Result<()> {
    // Arrange
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 2.pdf")?;
    ws.reload()?;
    ws.add_image("dag.png", b"dag-bytes")?;
    ws.add_card_file(
        "unit_2",
        "What does <img src=\"../images/dag.png\"> show?\tA DAG\tunit_2 graphs\n\
         Define \\(P(A|B)\\)\t<strong>Conditional</strong> probability\tunit_2 probability basics\n\
         Third\tCard\tunit_2\n",
    )?;

    // Act
    let summary = package_unit(&ws.config, &ws.unit("unit_2"), false)?;
    let contents = read_archive(&summary.output)?;

    // Assert
    assert_eq!(contents.notes.len(), 3);
    assert_eq!(contents.notes[0].front, "What does <img src=\"dag.png\"> show?");
    assert_eq!(contents.notes[1].front, "Define \\(P(A|B)\\)");
    assert_eq!(contents.notes[1].back, "<strong>Conditional</strong> probability");
    assert_eq!(
        tag_set(&contents.notes[1].tags),
        ["unit_2", "probability", "basics"]
            .iter()
            .map(|s| s.to_string())
            .collect::<BTreeSet<String>>()
    );
    assert_eq!(contents.notes[2].front, "Third");
    assert_eq!(contents.media.get("dag.png").map(Vec::as_slice), Some(&b"dag-bytes"[..]));
    assert!(contents.deck_names.contains(&"Flashcards - Unit 2".to_string()));
    Ok(())
}

#[test]
fn given_same_inputs_when_packaging_twice_then_archives_byte_identical() -> Result<()> {
    // Arrange
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 3.pdf")?;
    ws.reload()?;
    ws.add_image("plot.png", b"plot")?;
    ws.add_card_file("unit_3", "<img src=\"plot.png\">\tA plot\tunit_3\nQ\tA\tunit_3\n")?;
    let unit = ws.unit("unit_3");

    // Act
    let first = package_unit(&ws.config, &unit, false)?;
    let first_bytes = fs::read(&first.output)?;
    let second = package_unit(&ws.config, &unit, false)?;
    let second_bytes = fs::read(&second.output)?;

    // Assert
    assert_eq!(first.output, second.output);
    assert_eq!(first_bytes, second_bytes);
    Ok(())
}

#[test]
fn given_touched_card_file_when_repackaging_then_archive_unchanged() -> Result<()> {
    // Arrange
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 3.pdf")?;
    ws.reload()?;
    let card_file = ws.add_card_file("unit_3", "Why is X true?\tBecause Y.\ttopicA topicB\n")?;
    let unit = ws.unit("unit_3");
    let first = package_unit(&ws.config, &unit, false)?;
    let first_bytes = fs::read(&first.output)?;

    // Act
    fs::File::options()
        .write(true)
        .open(&card_file)?
        .set_modified(SystemTime::now() + Duration::from_secs(3600))?;
    let second = package_unit(&ws.config, &unit, false)?;

    // Assert
    assert_eq!(first_bytes, fs::read(&second.output)?);
    Ok(())
}

#[test]
fn given_shared_image_when_packaging_then_bundled_once() -> Result<()> {
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 4.pdf")?;
    ws.reload()?;
    ws.add_image("shared.png", b"shared")?;
    let body: String = (0..5)
        .map(|i| format!("Card {} <img src=\"shared.png\">\tAnswer {}\tunit_4\n", i, i))
        .collect();
    ws.add_card_file("unit_4", &body)?;

    let summary = package_unit(&ws.config, &ws.unit("unit_4"), false)?;

    assert_eq!(summary.media, 1);
    let contents = read_archive(&summary.output)?;
    assert_eq!(contents.media.len(), 1);
    assert_eq!(contents.notes.len(), 5);
    Ok(())
}

#[test]
fn given_missing_image_when_packaging_then_unresolved_media_and_no_archive() -> Result<()> {
    // Arrange
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 5.pdf")?;
    ws.reload()?;
    ws.add_card_file(
        "unit_5",
        "See <img src=\"diagram_x.png\">\tA\tunit_5\nAnd <img src=\"diagram_y.png\">\tB\tunit_5\n",
    )?;

    // Act
    let err = package_unit(&ws.config, &ws.unit("unit_5"), false).unwrap_err();

    // Assert
    match err.downcast_ref::<PackageError>() {
        Some(PackageError::UnresolvedMedia { unit, missing }) => {
            assert_eq!(unit, "unit_5");
            assert_eq!(missing, &vec!["diagram_x.png".to_string(), "diagram_y.png".to_string()]);
        }
        other => panic!("Expected UnresolvedMedia, got {:?}", other),
    }
    assert!(!ws.archive_path("unit_5").exists());
    assert!(ws.apkg_entries()?.is_empty(), "No temporary files may be left behind");
    Ok(())
}

#[test]
fn given_malformed_line_when_packaging_then_parse_error_and_no_archive() -> Result<()> {
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 6.pdf")?;
    ws.reload()?;
    ws.add_card_file("unit_6", "Q1\tA1\tunit_6\nQ2 without tabs\n")?;

    let err = package_unit(&ws.config, &ws.unit("unit_6"), false).unwrap_err();

    assert_eq!(
        err.downcast_ref::<CardParseError>(),
        Some(&CardParseError::ColumnCountMismatch { line: 6, found: 1 })
    );
    assert!(!ws.archive_path("unit_6").exists());
    Ok(())
}

#[test]
fn given_only_header_when_packaging_then_empty_deck() -> Result<()> {
    let mut ws = TestWorkspace::new()?;
    ws.add_pdf("Unit 7.pdf")?;
    ws.reload()?;
    ws.add_card_file("unit_7", "")?;

    let err = package_unit(&ws.config, &ws.unit("unit_7"), false).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PackageError>(),
        Some(PackageError::EmptyDeck(_))
    ));
    Ok(())
}
