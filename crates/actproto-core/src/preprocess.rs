//! Strip conversational preamble and an outer code fence.

use crate::markers::{self, is_fence, starts_with_marker};
use regex::Regex;
use std::sync::OnceLock;

static OUTER_FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn outer_fence_re() -> &'static Regex {
    OUTER_FENCE_RE.get_or_init(|| Regex::new(r"(?s)^```[\w+-]*[ \t]*\r?\n(.*)\r?\n```$").unwrap())
}

/// A correction applied by [`preprocess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// Lines dropped before the first marker.
    Preamble { lines: usize },
    /// The whole response was wrapped in one fenced block.
    OuterFence,
    /// First line opened a fence and last line closed one; both stripped.
    PartialOuterFence,
}

impl Correction {
    pub fn describe(&self) -> String {
        match self {
            Correction::Preamble { lines } => {
                format!("removed conversational preamble ({lines} line(s))")
            }
            Correction::OuterFence => "unwrapped outer code fence".to_string(),
            Correction::PartialOuterFence => {
                "unwrapped outer code fence (first and last line only)".to_string()
            }
        }
    }
}

/// Returns the cleaned text and the corrections that fired.
pub fn preprocess(text: &str) -> (String, Vec<Correction>) {
    let mut corrections = Vec::new();
    let text = strip_preamble(text, &mut corrections);
    let text = unwrap_outer_fence(&text, &mut corrections);
    (text, corrections)
}

fn strip_preamble(text: &str, corrections: &mut Vec<Correction>) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let Some(first_marker) = lines.iter().position(|l| starts_with_marker(l)) else {
        return text.to_string();
    };
    // Keep a fence that directly wraps the protocol so it can be unwrapped.
    let start = match lines[..first_marker]
        .iter()
        .rposition(|l| !l.trim().is_empty())
    {
        Some(prev) if is_fence(lines[prev]) => prev,
        _ => first_marker,
    };
    if start == 0 {
        return text.to_string();
    }
    let dropped = &lines[..start];
    if dropped.iter().any(|l| !l.trim().is_empty()) {
        corrections.push(Correction::Preamble {
            lines: dropped.len(),
        });
    }
    let mut out = lines[start..].join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn unwrap_outer_fence(text: &str, corrections: &mut Vec<Correction>) -> String {
    let trimmed = text.trim();
    if let Some(cap) = outer_fence_re().captures(trimmed) {
        let inner = &cap[1];
        if inner.lines().any(starts_with_marker) && !inner.lines().any(is_fence) {
            corrections.push(Correction::OuterFence);
            return inner.to_string();
        }
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() >= 2
        && is_fence(lines[0])
        && lines[lines.len() - 1].trim() == markers::FENCE
        && lines[1..lines.len() - 1].iter().any(|l| starts_with_marker(l))
    {
        corrections.push(Correction::PartialOuterFence);
        return lines[1..lines.len() - 1].join("\n");
    }
    text.to_string()
}
