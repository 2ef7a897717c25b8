//! Line tokenizer for the action protocol.
//!
//! Content blocks are opaque: once a `<<<` line is seen, every line is
//! [`Token::Plain`] (or [`Token::BatchSeparator`]) until a column-0 `>>>`.
//! This is the only place that rule is applied; repair passes share it
//! through [`BlockScanner`].

use crate::markers::{self, is_batch_separator, is_close_marker, is_open_marker};
use crate::types::{VitalKey, Vitals};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// BlockScanner
// ---------------------------------------------------------------------------

/// Where a line sits relative to content blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// Grammar applies.
    Outside,
    /// `<<<` that opens a block.
    Open,
    /// Opaque block content.
    Inside,
    /// Column-0 `>>>` that closes the open block.
    Close,
}

#[derive(Debug, Default)]
pub struct BlockScanner {
    in_content: bool,
}

impl BlockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, line: &str) -> LineRole {
        if self.in_content {
            if is_close_marker(line) {
                self.in_content = false;
                LineRole::Close
            } else {
                LineRole::Inside
            }
        } else if is_open_marker(line) {
            self.in_content = true;
            LineRole::Open
        } else {
            LineRole::Outside
        }
    }

    pub fn in_content(&self) -> bool {
        self.in_content
    }
}

// ---------------------------------------------------------------------------
// Vitals lines
// ---------------------------------------------------------------------------

const NUM: &str = r"(\d+(?:\.\d+)?|\.\d+)";

static VITALS_LINE_RE: OnceLock<Regex> = OnceLock::new();
static VITALS_ITEM_RE: OnceLock<Regex> = OnceLock::new();

fn vitals_line_re() -> &'static Regex {
    VITALS_LINE_RE.get_or_init(|| {
        Regex::new(&format!(r"^(?:::\s*[csmfCSMF]\s*{NUM}%?[\s,|]*)+$")).unwrap()
    })
}

pub(crate) fn vitals_item_re() -> &'static Regex {
    VITALS_ITEM_RE.get_or_init(|| Regex::new(&format!(r"::\s*([csmfCSMF])\s*{NUM}(%?)")).unwrap())
}

/// Interpret a vital value. Percent-suffixed values, and bare values above 1,
/// are divided by 100.
pub fn vital_value(num: &str, percent: bool) -> Option<f64> {
    let v: f64 = num.parse().ok()?;
    if percent || v > 1.0 {
        Some(v / 100.0)
    } else {
        Some(v)
    }
}

/// Parse a line made only of compact vitals tokens (`::c0.9 ::s0.8 ...`).
/// Returns `None` for anything else, including action lines.
pub fn parse_vitals_line(line: &str) -> Option<Vitals> {
    let line = line.trim();
    if !vitals_line_re().is_match(line) {
        return None;
    }
    let mut vitals = Vitals::default();
    for cap in vitals_item_re().captures_iter(line) {
        let key = cap[1].chars().next().and_then(VitalKey::from_code)?;
        let value = vital_value(&cap[2], !cap[3].is_empty())?;
        vitals.set(key, value);
    }
    Some(vitals)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Text after `>>`, trimmed.
    Thought(&'a str),
    Vitals(Vitals),
    /// Text after `::`, trimmed.
    Action(&'a str),
    ContentOpen,
    ContentClose,
    /// `%%%` inside a content block.
    BatchSeparator,
    Question(&'a str),
    Error(&'a str),
    /// Content line, or a line outside content the grammar does not claim.
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line<'a> {
    /// 1-based.
    pub number: usize,
    pub raw: &'a str,
    pub token: Token<'a>,
}

pub fn tokenize(text: &str) -> Vec<Line<'_>> {
    let mut scanner = BlockScanner::new();
    text.lines()
        .enumerate()
        .map(|(i, raw)| {
            let token = match scanner.step(raw) {
                LineRole::Open => Token::ContentOpen,
                LineRole::Close => Token::ContentClose,
                LineRole::Inside if is_batch_separator(raw) => Token::BatchSeparator,
                LineRole::Inside => Token::Plain,
                LineRole::Outside => classify(raw),
            };
            Line {
                number: i + 1,
                raw,
                token,
            }
        })
        .collect()
}

/// Classify a line that is outside any content block.
fn classify(raw: &str) -> Token<'_> {
    if is_close_marker(raw) {
        return Token::ContentClose;
    }
    let t = raw.trim();
    if t == markers::CONTENT_CLOSE {
        // Indented close marker with nothing open.
        return Token::Plain;
    }
    if let Some(rest) = t.strip_prefix(markers::THOUGHT) {
        Token::Thought(rest.trim())
    } else if let Some(rest) = t.strip_prefix(markers::ACTION) {
        match parse_vitals_line(t) {
            Some(v) => Token::Vitals(v),
            None => Token::Action(rest.trim()),
        }
    } else if let Some(rest) = t.strip_prefix(markers::QUESTION) {
        Token::Question(rest.trim())
    } else if let Some(rest) = t.strip_prefix(markers::ERROR) {
        Token::Error(rest.trim())
    } else {
        Token::Plain
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
