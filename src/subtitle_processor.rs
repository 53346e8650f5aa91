use std::fmt;
use regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use log::{debug, warn};

use crate::errors::PipelineError;

// @module: SRT cue model, parsing and rendering

// @const: SRT timecode line regex
static TIMECODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}").unwrap()
});

// @const: Timecode of the one-cue placeholder document
pub const PLACEHOLDER_TIMECODE: &str = "00:00:01,000 --> 00:10:50,000";

// @struct: Single subtitle cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    // @field: Position in the source document, the only reassembly key
    #[serde(rename = "index")]
    pub global_index: usize,

    // @field: Display counter label as written in the source
    pub counter: String,

    // @field: Timecode line as written in the source
    pub timecode: String,

    // @field: Text, possibly multi-line
    pub text: String,
}

impl Cue {
    pub fn new(global_index: usize, counter: impl Into<String>, timecode: impl Into<String>, text: impl Into<String>) -> Self {
        Cue {
            global_index,
            counter: counter.into(),
            timecode: timecode.into(),
            text: text.into(),
        }
    }

    /// Same cue with its text replaced
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Cue {
            text: text.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.counter)?;
        writeln!(f, "{}", self.timecode)?;
        write!(f, "{}", self.text)
    }
}

/// Whether a line looks like an SRT timecode range
pub fn is_timecode(line: &str) -> bool {
    TIMECODE_REGEX.is_match(line.trim())
}

// @state: Which line of a cue block comes next
#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockState {
    Counter,
    Timecode,
    Text,
}

/// Parse an SRT document into cues, assigning global indexes 0, 1, 2, ...
///
/// A blank line closes the current block. Inside a block the first line is
/// the counter, the second the timecode and the rest is text. A block that
/// starts directly with a timecode gets a synthetic counter. Blocks without
/// a timecode or without text are dropped, so indexes stay contiguous.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>, PipelineError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut cues: Vec<Cue> = Vec::new();
    let mut state = BlockState::Counter;
    let mut counter = String::new();
    let mut timecode = String::new();
    let mut text_lines: Vec<&str> = Vec::new();
    let mut dropped = 0usize;

    let mut close_block = |counter: &mut String, timecode: &mut String, text_lines: &mut Vec<&str>, cues: &mut Vec<Cue>| {
        if !counter.is_empty() || !timecode.is_empty() || !text_lines.is_empty() {
            if timecode.is_empty() || text_lines.is_empty() {
                dropped += 1;
            } else {
                let index = cues.len();
                cues.push(Cue::new(index, counter.as_str(), timecode.as_str(), text_lines.join("\n")));
            }
        }
        counter.clear();
        timecode.clear();
        text_lines.clear();
    };

    for raw_line in content.lines() {
        let line = raw_line.trim_end_matches('\r');

        if line.trim().is_empty() {
            close_block(&mut counter, &mut timecode, &mut text_lines, &mut cues);
            state = BlockState::Counter;
            continue;
        }

        match state {
            BlockState::Counter => {
                if is_timecode(line) {
                    counter = (cues.len() + 1).to_string();
                    timecode = line.trim().to_string();
                    state = BlockState::Text;
                } else {
                    counter = line.trim().to_string();
                    state = BlockState::Timecode;
                }
            }
            BlockState::Timecode => {
                timecode = line.trim().to_string();
                state = BlockState::Text;
            }
            BlockState::Text => text_lines.push(line),
        }
    }
    close_block(&mut counter, &mut timecode, &mut text_lines, &mut cues);

    if dropped > 0 {
        warn!("Dropped {} incomplete subtitle blocks", dropped);
    }

    if cues.is_empty() {
        return Err(PipelineError::Parse(
            "No valid subtitle entries were found in the SRT content".to_string(),
        ));
    }

    debug!("Parsed {} subtitle cues", cues.len());
    Ok(cues)
}

/// Render cues in the order given: counter, timecode, text and a blank separator
pub fn render_srt(cues: &[Cue]) -> String {
    let mut lines: Vec<&str> = Vec::with_capacity(cues.len() * 4);
    for cue in cues {
        lines.push(&cue.counter);
        lines.push(&cue.timecode);
        lines.push(&cue.text);
        lines.push("");
    }
    lines.join("\n")
}

/// One-cue document shown while a job is running or after it failed
pub fn render_placeholder(message: &str) -> String {
    format!("1\n{}\n{}\n", PLACEHOLDER_TIMECODE, message)
}
