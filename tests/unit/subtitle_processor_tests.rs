/*!
 * Tests for SRT parsing and rendering
 */

use subflow::artifacts::{Placeholder, PROCESSING_MESSAGE};
use subflow::subtitle_processor::{parse_srt, render_placeholder, render_srt};

use crate::common;

#[test]
fn test_parseSrt_withCrlfAndBom_shouldParseEveryCue() {
    let document = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nFirst\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nSecond\r\nline\r\n";

    let cues = parse_srt(document).unwrap();

    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].counter, "1");
    assert_eq!(cues[1].text, "Second\nline");
    assert_eq!(cues[1].global_index, 1);
}

#[test]
fn test_parseSrt_withIncompleteBlocks_shouldKeepIndexesContiguous() {
    let document = "1\n00:00:01,000 --> 00:00:02,000\nKept\n\n2\n00:00:03,000 --> 00:00:04,000\n\n3\nnot a timecode only\n\n4\n00:00:05,000 --> 00:00:06,000\nAlso kept\n";

    let cues = parse_srt(document).unwrap();

    let indexes: Vec<usize> = cues.iter().map(|c| c.global_index).collect();
    assert_eq!(indexes, (0..cues.len()).collect::<Vec<_>>());
    assert_eq!(cues.first().unwrap().text, "Kept");
    assert_eq!(cues.last().unwrap().text, "Also kept");
}

#[test]
fn test_parseSrt_withNoCues_shouldFail() {
    assert!(parse_srt("").is_err());
    assert!(parse_srt("just some words").is_err());
}

#[test]
fn test_renderSrt_shouldReproduceParsedDocument() {
    let document = common::srt_document(5);
    let cues = parse_srt(&document).unwrap();

    let rendered = render_srt(&cues);

    assert_eq!(parse_srt(&rendered).unwrap(), cues);
    assert!(rendered.starts_with("1\n00:00:00,000 --> 00:00:02,500\nLine 0\n\n2\n"));
}

#[test]
fn test_renderPlaceholder_shouldBeOneCueDocument() {
    let placeholder = Placeholder::Processing.render();

    assert_eq!(placeholder, render_placeholder(PROCESSING_MESSAGE));
    let cues = parse_srt(&placeholder).unwrap();
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].timecode, "00:00:01,000 --> 00:10:50,000");
    assert_eq!(cues[0].text, PROCESSING_MESSAGE);
}
