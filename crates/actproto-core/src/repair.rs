//! Text-level repairs for common model malformations.
//!
//! Each pass is a deterministic string transform. Passes run in a fixed
//! order and the whole sequence is idempotent: `repair(repair(x)) ==
//! repair(x)`. Content-block interiors are never rewritten, except that
//! batch separators inside a batch block are normalized to exactly `%%%`.

use crate::config::ProtocolConfig;
use crate::markers::{self, is_batch_separator, is_fence};
use crate::params::parse_action_header;
use crate::render::format_vital;
use crate::token::{vital_value, BlockScanner, LineRole};
use crate::types::VitalKey;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RepairPass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPass {
    Fences,
    MarkerPrefixes,
    Vitals,
    Delimiters,
    Indentation,
    UnclosedBlocks,
}

impl RepairPass {
    /// Execution order.
    pub fn all() -> &'static [RepairPass] {
        &[
            RepairPass::Fences,
            RepairPass::MarkerPrefixes,
            RepairPass::Vitals,
            RepairPass::Delimiters,
            RepairPass::Indentation,
            RepairPass::UnclosedBlocks,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepairPass::Fences => "fences",
            RepairPass::MarkerPrefixes => "marker_prefixes",
            RepairPass::Vitals => "vitals",
            RepairPass::Delimiters => "delimiters",
            RepairPass::Indentation => "indentation",
            RepairPass::UnclosedBlocks => "unclosed_blocks",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            RepairPass::Fences => "converted code fences to content blocks",
            RepairPass::MarkerPrefixes => "added missing action markers",
            RepairPass::Vitals => "normalized vitals syntax",
            RepairPass::Delimiters => "normalized block delimiters",
            RepairPass::Indentation => "stripped indentation from marker lines",
            RepairPass::UnclosedBlocks => "closed unterminated content block",
        }
    }
}

impl fmt::Display for RepairPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Line buffer helpers
// ---------------------------------------------------------------------------

struct Lines {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Lines {
    fn split(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    fn join(self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Rewrite lines outside content blocks; block lines pass through.
    fn map_outside(self, mut f: impl FnMut(&str) -> Option<String>) -> Self {
        let mut scanner = BlockScanner::new();
        let lines = self
            .lines
            .into_iter()
            .map(|line| match scanner.step(&line) {
                LineRole::Outside => f(&line).unwrap_or(line),
                _ => line,
            })
            .collect();
        Self {
            lines,
            trailing_newline: self.trailing_newline,
        }
    }
}

fn has_marker_prefix(t: &str) -> bool {
    [
        markers::THOUGHT,
        markers::ACTION,
        markers::CONTENT_OPEN,
        markers::CONTENT_CLOSE,
        markers::QUESTION,
        markers::ERROR,
        markers::BATCH_SEPARATOR,
        markers::FRONTMATTER,
    ]
    .iter()
    .any(|m| t.starts_with(m))
}

fn is_batch_action_line(t: &str) -> bool {
    t.strip_prefix(markers::ACTION)
        .and_then(|rest| parse_action_header(rest, ""))
        .is_some_and(|h| h.kind == markers::BATCH_VERB)
}

// ---------------------------------------------------------------------------
// Vitals grammar
// ---------------------------------------------------------------------------

const NUM: &str = r"(?:\d+(?:\.\d+)?|\.\d+)";

static VITALS_CANDIDATE_RE: OnceLock<Regex> = OnceLock::new();
static VITALS_PART_RE: OnceLock<Regex> = OnceLock::new();

fn vitals_part_pattern() -> String {
    format!(
        r"(?:(?i:(?P<name>confidence|safety|memory|focus))\s*[:=]\s*(?P<nval>{NUM})\s*(?P<npct>%)?|(?:::|#)\s*(?P<code>[csmfCSMF])\s*(?P<cval>{NUM})\s*(?P<cpct>%)?)"
    )
}

fn vitals_candidate_re() -> &'static Regex {
    VITALS_CANDIDATE_RE.get_or_init(|| {
        let part = vitals_part_pattern();
        Regex::new(&format!(r"^(?:{part}[\s,;|]*)+$")).unwrap()
    })
}

fn vitals_part_re() -> &'static Regex {
    VITALS_PART_RE.get_or_init(|| Regex::new(&vitals_part_pattern()).unwrap())
}

/// Rewrite a vitals line in any accepted form to canonical `::c0.9 ::s0.8`.
pub(crate) fn normalize_vitals(t: &str) -> Option<String> {
    if !vitals_candidate_re().is_match(t) {
        return None;
    }
    let mut parts = Vec::new();
    for cap in vitals_part_re().captures_iter(t) {
        let (key, num, pct) = if let Some(name) = cap.name("name") {
            let key: VitalKey = name.as_str().parse().ok()?;
            (key, cap.name("nval")?.as_str(), cap.name("npct").is_some())
        } else {
            let code = cap.name("code")?.as_str().chars().next()?;
            (
                VitalKey::from_code(code)?,
                cap.name("cval")?.as_str(),
                cap.name("cpct").is_some(),
            )
        };
        let scaled = pct || num.parse::<f64>().ok()? > 1.0;
        let rendered = if scaled {
            format_vital(vital_value(num, pct)?.clamp(0.0, 1.0))
        } else {
            num.to_string()
        };
        parts.push(format!("{}{}{}", markers::ACTION, key.code(), rendered));
    }
    Some(parts.join(" "))
}

// ---------------------------------------------------------------------------
// AutoRepair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AutoRepair {
    config: ProtocolConfig,
}

impl AutoRepair {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn repair(&self, text: &str) -> String {
        self.repair_report(text).0
    }

    /// Repaired text plus the passes that changed something.
    pub fn repair_report(&self, text: &str) -> (String, Vec<RepairPass>) {
        let mut current = text.to_string();
        let mut fired = Vec::new();
        for pass in RepairPass::all() {
            let next = self.apply(*pass, &current);
            if next != current {
                fired.push(*pass);
                current = next;
            }
        }
        (current, fired)
    }

    pub fn apply(&self, pass: RepairPass, text: &str) -> String {
        let lines = Lines::split(text);
        let lines = match pass {
            RepairPass::Fences => convert_fences(lines),
            RepairPass::MarkerPrefixes => lines.map_outside(|l| self.complete_prefix(l)),
            RepairPass::Vitals => lines.map_outside(|l| normalize_vitals(l.trim())),
            RepairPass::Delimiters => normalize_delimiters(lines),
            RepairPass::Indentation => lines.map_outside(|l| {
                let t = l.trim();
                (has_marker_prefix(t) && t != l).then(|| t.to_string())
            }),
            RepairPass::UnclosedBlocks => close_blocks(lines),
        };
        lines.join()
    }

    fn complete_prefix(&self, line: &str) -> Option<String> {
        let t = line.trim();
        if t.is_empty() || has_marker_prefix(t) {
            return None;
        }
        if let Some(rest) = t.strip_prefix(markers::LEGACY_ACTION) {
            if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                return None;
            }
            parse_action_header(rest, "")?;
            return Some(format!("{}{}", markers::ACTION, rest.trim_end()));
        }
        let word_end = t
            .find(|c: char| c.is_whitespace() || c == '@')
            .unwrap_or(t.len());
        let word = &t[..word_end];
        if !self.config.is_known_verb(word) {
            return None;
        }
        let rest = t[word_end..].trim_start();
        let rest = rest.strip_prefix('@').unwrap_or(rest).trim();
        let verb = word.to_ascii_lowercase();
        Some(if rest.is_empty() {
            format!("{}{}", markers::ACTION, verb)
        } else {
            format!("{}{} @{}", markers::ACTION, verb, rest)
        })
    }
}

// ---------------------------------------------------------------------------
// Passes without configuration
// ---------------------------------------------------------------------------

fn convert_fences(input: Lines) -> Lines {
    let mut out = Vec::with_capacity(input.lines.len());
    let mut scanner = BlockScanner::new();
    let lines = &input.lines;
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if !scanner.in_content() && is_fence(line) {
            let close = lines[i + 1..]
                .iter()
                .position(|l| l.trim() == markers::FENCE)
                .map(|p| i + 1 + p);
            let end = close.unwrap_or(lines.len());
            let mut captured: Vec<String> = lines[i + 1..end].to_vec();
            if captured.last().is_some_and(|l| l.trim().is_empty()) {
                captured.pop();
            }
            out.push(markers::CONTENT_OPEN.to_string());
            out.extend(captured);
            if close.is_some() {
                out.push(markers::CONTENT_CLOSE.to_string());
            }
            i = end + 1;
            continue;
        }
        scanner.step(line);
        out.push(line.clone());
        i += 1;
    }
    Lines {
        lines: out,
        trailing_newline: input.trailing_newline,
    }
}

fn normalize_delimiters(input: Lines) -> Lines {
    let mut scanner = BlockScanner::new();
    let mut pending_batch = false;
    let mut in_batch = false;
    let lines = input
        .lines
        .into_iter()
        .map(|line| {
            let line = if !scanner.in_content() && is_fence(&line) {
                markers::CONTENT_OPEN.to_string()
            } else {
                line
            };
            match scanner.step(&line) {
                LineRole::Outside => {
                    let t = line.trim();
                    if t.starts_with(markers::ACTION) {
                        pending_batch = is_batch_action_line(t);
                    }
                    line
                }
                LineRole::Open => {
                    in_batch = pending_batch;
                    pending_batch = false;
                    markers::CONTENT_OPEN.to_string()
                }
                LineRole::Inside if in_batch && is_batch_separator(&line) => {
                    markers::BATCH_SEPARATOR.to_string()
                }
                LineRole::Inside => line,
                LineRole::Close => {
                    in_batch = false;
                    markers::CONTENT_CLOSE.to_string()
                }
            }
        })
        .collect();
    Lines {
        lines,
        trailing_newline: input.trailing_newline,
    }
}

fn close_blocks(mut input: Lines) -> Lines {
    let mut scanner = BlockScanner::new();
    for line in &input.lines {
        scanner.step(line);
    }
    if scanner.in_content() {
        input.lines.push(markers::CONTENT_CLOSE.to_string());
    }
    input
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
