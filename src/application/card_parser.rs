use crate::constants::{CARD_COLUMNS, CARD_FILE_HEADER, FIELD_SEPARATOR};
use crate::domain::{CardField, CardParseError, CardRecord};
use tracing::{debug, instrument};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// `#`-prefixed lines at the top of the header; the column row after them may be omitted.
const DIRECTIVE_LINES: usize = 3;

/// Parse the raw bytes of a generated card file.
///
/// The file must start with the three `#` header directives, optionally followed by the
/// `Front<TAB>Back<TAB>Tags` column row, and then one tab-separated
/// `front<TAB>back<TAB>tags` record per non-empty line. Any error rejects the whole
/// file: either every record is returned or none.
#[instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
pub fn parse_card_bytes(bytes: &[u8]) -> Result<Vec<CardRecord>, CardParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let offset = e.valid_up_to();
        let line = bytes[..offset].iter().filter(|b| **b == b'\n').count() + 1;
        CardParseError::EncodingError {
            line,
            byte_offset: offset,
        }
    })?;
    parse_card_text(text)
}

/// Parse an already decoded card file.
pub fn parse_card_text(text: &str) -> Result<Vec<CardRecord>, CardParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .enumerate()
        .peekable();

    for (idx, expected) in CARD_FILE_HEADER[..DIRECTIVE_LINES].iter().copied().enumerate() {
        let found = lines.next().map(|(_, l)| l).unwrap_or("");
        if found.trim_end() != expected {
            return Err(CardParseError::MalformedHeader {
                line: idx + 1,
                expected,
                found: found.to_string(),
            });
        }
    }
    // The column row is optional
    if lines
        .peek()
        .is_some_and(|(_, l)| l.trim_end() == CARD_FILE_HEADER[DIRECTIVE_LINES])
    {
        lines.next();
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record_line(line, idx + 1)?);
    }

    debug!(count = records.len(), "Parsed card records");
    Ok(records)
}

fn parse_record_line(line: &str, line_no: usize) -> Result<CardRecord, CardParseError> {
    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if parts.len() != CARD_COLUMNS {
        return Err(CardParseError::ColumnCountMismatch {
            line: line_no,
            found: parts.len(),
        });
    }

    let front = parts[0].trim();
    let back = parts[1].trim();
    if front.is_empty() {
        return Err(CardParseError::EmptyField {
            line: line_no,
            field: CardField::Front,
        });
    }
    if back.is_empty() {
        return Err(CardParseError::EmptyField {
            line: line_no,
            field: CardField::Back,
        });
    }

    let tags = parts[2].split_whitespace().map(str::to_string).collect();
    Ok(CardRecord::new(front, back, tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\n";

    #[test]
    fn given_single_card_when_parsing_then_returns_record() {
        // Arrange
        let input = format!("{}Why is X true?\tBecause Y.\ttopicA topicB\n", HEADER);

        // Act
        let records = parse_card_text(&input).unwrap();

        // Assert
        assert_eq!(
            records,
            vec![CardRecord::new(
                "Why is X true?",
                "Because Y.",
                vec!["topicA".to_string(), "topicB".to_string()]
            )]
        );
    }

    #[test]
    fn given_blank_lines_when_parsing_then_skips_them_and_keeps_order() {
        let input = format!("{}Q1\tA1\tt\n\n   \nQ2\tA2\tt\n", HEADER);

        let records = parse_card_text(&input).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].front(), "Q1");
        assert_eq!(records[1].front(), "Q2");
    }

    #[test]
    fn given_crlf_line_endings_when_parsing_then_accepts_file() {
        let input = "#separator:tab\r\n#html:true\r\n#tags column:3\r\nFront\tBack\tTags\r\nQ\tA\tt1\r\n";

        let records = parse_card_text(input).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags(), &["t1"]);
    }

    #[test]
    fn given_two_columns_when_parsing_then_fails_with_line_number() {
        // Arrange: second record on line 6 lacks the tags column
        let input = format!("{}Q1\tA1\tt\nQ2\tA2\n", HEADER);

        // Act
        let result = parse_card_text(&input);

        // Assert
        assert_eq!(
            result,
            Err(CardParseError::ColumnCountMismatch { line: 6, found: 2 })
        );
    }

    #[test]
    fn given_extra_tab_when_parsing_then_fails() {
        let input = format!("{}Q\tA\tt\textra\n", HEADER);

        let result = parse_card_text(&input);

        assert_eq!(
            result,
            Err(CardParseError::ColumnCountMismatch { line: 5, found: 4 })
        );
    }

    #[test]
    fn given_no_column_row_when_parsing_then_line_numbers_count_from_file_start() {
        let input = "#separator:tab\n#html:true\n#tags column:3\nWhy is X true?\tBecause Y.\ttopicA topicB\nQ\tA\n";

        let result = parse_card_text(input);

        assert_eq!(
            result,
            Err(CardParseError::ColumnCountMismatch { line: 5, found: 2 })
        );
    }

    #[test]
    fn given_misspelled_directive_when_parsing_then_malformed_header() {
        let input = "#separator:tab\n#html:false\n#tags column:3\nQ\tA\tt\n";

        let result = parse_card_text(input);

        match result {
            Err(CardParseError::MalformedHeader { line, found, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(found, "#html:false");
            }
            other => panic!("Expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn given_other_separator_when_parsing_then_malformed_header() {
        let input = "#separator:comma\n#html:true\n#tags column:3\nFront,Back,Tags\n";

        let result = parse_card_text(input);

        assert!(matches!(
            result,
            Err(CardParseError::MalformedHeader { line: 1, .. })
        ));
    }

    #[test]
    fn given_truncated_header_when_parsing_then_malformed_header() {
        let result = parse_card_text("#separator:tab\n#html:true");

        assert!(matches!(
            result,
            Err(CardParseError::MalformedHeader { line: 3, .. })
        ));
    }

    #[test]
    fn given_empty_back_when_parsing_then_empty_field_error() {
        let input = format!("{}Question\t  \ttag\n", HEADER);

        let result = parse_card_text(&input);

        assert_eq!(
            result,
            Err(CardParseError::EmptyField {
                line: 5,
                field: CardField::Back
            })
        );
    }

    #[test]
    fn given_empty_tags_when_parsing_then_record_has_no_tags() {
        let input = format!("{}Q\tA\t\n", HEADER);

        let records = parse_card_text(&input).unwrap();

        assert!(records[0].tags().is_empty());
    }

    #[test]
    fn given_invalid_utf8_when_parsing_bytes_then_encoding_error() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"Q\t\xff\xfe\tt\n");

        let result = parse_card_bytes(&bytes);

        assert_eq!(
            result,
            Err(CardParseError::EncodingError {
                line: 5,
                byte_offset: HEADER.len() + 2
            })
        );
    }

    #[test]
    fn given_bom_and_unicode_when_parsing_bytes_then_decodes() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(HEADER.as_bytes());
        bytes.extend_from_slice("Was ist \\(\\sigma\\)?\tStandardabweichung – σ\tstatistik\n".as_bytes());

        let records = parse_card_bytes(&bytes).unwrap();

        assert_eq!(records[0].back(), "Standardabweichung – σ");
    }
}
