//! Rewrite Markdown or plain prose into the action protocol.
//!
//! Runs first. Text that already speaks the protocol passes through
//! untouched; Markdown becomes thoughts plus one `create_file` per fenced
//! block; anything else non-empty becomes a single `response`.

use crate::config::ProtocolConfig;
use crate::markers::{self, is_fence};
use crate::render::vitals_line;
use crate::repair::normalize_vitals;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Preceding lines searched for a filename hint.
const LOOKBACK_LINES: usize = 3;

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static MARKDOWN_RE: OnceLock<Regex> = OnceLock::new();
static FILENAME_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap())
}

fn markdown_re() -> &'static Regex {
    MARKDOWN_RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:\s{0,3}#{1,6}\s+\S|\s*```|\s*[-*+]\s+\S|\s*\d+[.)]\s+\S)").unwrap()
    })
}

fn filename_re() -> &'static Regex {
    FILENAME_RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_][\w./-]*\.([A-Za-z0-9]{1,6})\b").unwrap())
}

// ---------------------------------------------------------------------------
// Marker detection
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MarkerCensus {
    thought: bool,
    action: bool,
    open: bool,
    close: bool,
}

impl MarkerCensus {
    fn take(text: &str) -> Self {
        let mut c = MarkerCensus::default();
        for line in text.lines() {
            let t = line.trim();
            if t == markers::CONTENT_CLOSE {
                c.close = true;
            } else if t == markers::CONTENT_OPEN {
                c.open = true;
            } else if t.starts_with(markers::THOUGHT) {
                c.thought = true;
            } else if t.starts_with(markers::ACTION) {
                c.action = true;
            }
        }
        c
    }

    fn distinct(&self) -> usize {
        [self.thought, self.action, self.open, self.close]
            .iter()
            .filter(|b| **b)
            .count()
    }

    /// Broader than "two distinct kinds": a lone action line or content
    /// opener also counts, so `::finish` or an unclosed `<<<` is not
    /// rewrapped as prose.
    fn is_protocol(&self) -> bool {
        self.distinct() >= 2 || self.action || self.open
    }
}

/// True if `text` already uses the action protocol.
pub fn is_protocol_format(text: &str) -> bool {
    MarkerCensus::take(text).is_protocol()
}

/// True if `text` has ATX headers, fenced code, or list items.
pub fn looks_like_markdown(text: &str) -> bool {
    markdown_re().is_match(text)
}

// ---------------------------------------------------------------------------
// MarkdownConverter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    config: ProtocolConfig,
}

impl MarkdownConverter {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Returns the (possibly rewritten) text and whether it was converted.
    pub fn convert(&self, text: &str) -> (String, bool) {
        self.convert_at(text, Utc::now())
    }

    /// As [`convert`](Self::convert), with `now` used for fallback filenames.
    pub fn convert_at(&self, text: &str, now: DateTime<Utc>) -> (String, bool) {
        if text.trim().is_empty() {
            return (text.to_string(), false);
        }
        let census = MarkerCensus::take(text);
        if census.is_protocol() {
            return (text.to_string(), false);
        }
        if looks_like_markdown(text) {
            return (self.convert_markdown(text, now), true);
        }
        if census.distinct() == 0 {
            return (self.wrap_prose(text), true);
        }
        (text.to_string(), false)
    }

    fn convert_markdown(&self, text: &str, now: DateTime<Utc>) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let mut thoughts: Vec<String> = Vec::new();
        let mut blocks: Vec<String> = Vec::new();
        let mut used_names: HashSet<String> = HashSet::new();
        let mut stated_vitals: Vec<String> = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if is_fence(line) {
                let lang = line.trim_start()[markers::FENCE.len()..]
                    .split_whitespace()
                    .next()
                    .unwrap_or("");
                let close = lines[i + 1..]
                    .iter()
                    .position(|l| l.trim() == markers::FENCE)
                    .map(|p| i + 1 + p);
                let body_end = close.unwrap_or(lines.len());
                let name = self.infer_filename(&lines[..i], lang, now, &mut used_names);
                let mut block = vec![
                    format!("{}{} @{}", markers::ACTION, markers::CREATE_FILE_VERB, name),
                    markers::CONTENT_OPEN.to_string(),
                ];
                block.extend(lines[i + 1..body_end].iter().map(|l| l.to_string()));
                block.push(markers::CONTENT_CLOSE.to_string());
                blocks.push(block.join("\n"));
                i = body_end + 1;
                continue;
            }
            if let Some(canonical) = normalize_vitals(line.trim()) {
                stated_vitals.push(canonical);
            } else if let Some(cap) = header_re().captures(line) {
                thoughts.push(cap[1].to_string());
            } else if let Some(rest) = line.trim().strip_prefix(markers::THOUGHT) {
                thoughts.push(rest.trim().to_string());
            } else if !line.trim().is_empty() {
                thoughts.push(line.trim().to_string());
            }
            i += 1;
        }

        // Vitals the model stated itself replace the configured defaults.
        let vitals = if stated_vitals.is_empty() {
            vitals_line(&self.config.markdown_vitals).into_iter().collect()
        } else {
            stated_vitals
        };

        let mut out: Vec<String> = Vec::new();
        if blocks.is_empty() {
            // Without code blocks the prose is the answer; keep only the
            // headers as reasoning so the text is not duplicated.
            for cap in lines.iter().filter_map(|l| header_re().captures(l)) {
                out.push(format!("{} {}", markers::THOUGHT, &cap[1]));
            }
            out.extend(vitals);
            out.push(response_block(text));
            return out.join("\n");
        }

        let mut thoughts = thoughts.into_iter();
        if let Some(first) = thoughts.next() {
            out.push(format!("{} {}", markers::THOUGHT, first));
        }
        out.extend(vitals);
        out.extend(thoughts.map(|t| format!("{} {}", markers::THOUGHT, t)));
        out.extend(blocks);
        out.join("\n")
    }

    fn wrap_prose(&self, text: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        out.extend(vitals_line(&self.config.prose_vitals));
        out.push(response_block(text));
        out.join("\n")
    }

    /// Name for a fenced block, from the lines preceding it.
    ///
    /// An explicit filename with a known extension wins; then the first
    /// configured keyword found in the window; then a timestamp.
    fn infer_filename(
        &self,
        before: &[&str],
        lang: &str,
        now: DateTime<Utc>,
        used: &mut HashSet<String>,
    ) -> String {
        let window: Vec<&str> = before
            .iter()
            .rev()
            .filter(|l| !l.trim().is_empty() && !is_fence(l))
            .take(LOOKBACK_LINES)
            .copied()
            .collect();
        let ext = self.config.extension_for(lang);

        let explicit = window.iter().find_map(|line| {
            filename_re()
                .captures_iter(line)
                .find(|cap| {
                    let found = cap[1].to_ascii_lowercase();
                    found == ext || self.config.extensions.values().any(|e| *e == found)
                })
                .map(|cap| cap[0].trim_end_matches('.').to_string())
        });

        let base = explicit.unwrap_or_else(|| {
            let haystack = window.join(" ").to_ascii_lowercase();
            let words: Vec<&str> = haystack
                .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .filter(|w| !w.is_empty())
                .collect();
            let stem = self
                .config
                .filename_keywords
                .iter()
                .find(|kw| {
                    let k = kw.keyword.to_ascii_lowercase();
                    words.iter().any(|w| w.starts_with(&k))
                })
                .map(|kw| kw.stem.clone())
                .unwrap_or_else(|| format!("file_{}", now.format("%Y%m%d_%H%M%S")));
            format!("{stem}.{ext}")
        });

        unique_name(base, used)
    }
}

fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let (stem, ext) = match base.rfind('.') {
        Some(dot) => (&base[..dot], &base[dot..]),
        None => (base.as_str(), ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn response_block(text: &str) -> String {
    let body: Vec<&str> = text
        .trim_end()
        .lines()
        .skip_while(|l| l.trim().is_empty())
        .collect();
    format!(
        "{}{}\n{}\n{}\n{}",
        markers::ACTION,
        markers::RESPONSE_VERB,
        markers::CONTENT_OPEN,
        body.join("\n"),
        markers::CONTENT_CLOSE
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn converter() -> MarkdownConverter {
        MarkdownConverter::new(&ProtocolConfig::default())
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn protocol_text_passes_through() {
        let text = ">> thinking\n::read_file @a.py";
        assert_eq!(converter().convert(text), (text.to_string(), false));
        // A single action line is already protocol.
        assert!(!converter().convert("::finish").1);
        // So is a bare content opener.
        assert!(!converter().convert("<<<\nunclosed").1);
        assert!(is_protocol_format(">> a\n>>>"));
        assert!(!is_protocol_format(">> a\n>> b"));
    }

    #[test]
    fn empty_text_unchanged() {
        assert_eq!(converter().convert("  \n"), ("  \n".to_string(), false));
    }

    #[test]
    fn plain_prose_becomes_response() {
        let (out, converted) = converter().convert("The answer is 42.");
        assert!(converted);
        assert_eq!(
            out,
            "::c0.5 ::s0.9 ::m0.5 ::f0.5\n::response\n<<<\nThe answer is 42.\n>>>"
        );
    }

    #[test]
    fn markdown_code_block_becomes_create_file() {
        let text = "# Login flow\nHere is the auth handler:\n```python\ndef login():\n    pass\n```\n";
        let (out, converted) = converter().convert_at(text, at());
        assert!(converted);
        assert_eq!(
            out,
            ">> Login flow\n::c0.7 ::s0.8 ::m0.7 ::f0.8\n>> Here is the auth handler:\n\
             ::create_file @auth.py\n<<<\ndef login():\n    pass\n>>>"
        );
    }

    #[test]
    fn explicit_filename_wins_over_keyword() {
        let text = "Update `src/server/app.rs` like so:\n```rust\nfn main() {}\n```";
        let (out, _) = converter().convert_at(text, at());
        assert!(out.contains("::create_file @src/server/app.rs"));
    }

    #[test]
    fn timestamp_fallback_and_dedupe() {
        let text = "```go\nA\n```\n```go\nB\n```";
        let (out, _) = converter().convert_at(text, at());
        assert!(out.contains("::create_file @file_20260301_123005.go"));
        assert!(out.contains("::create_file @file_20260301_123005_2.go"));
    }

    #[test]
    fn unknown_language_gets_txt() {
        let text = "config below\n```\nkey=1\n```";
        let (out, _) = converter().convert_at(text, at());
        assert!(out.contains("::create_file @config.txt"));
    }

    #[test]
    fn markdown_without_code_is_a_response() {
        let text = "## Summary\n- first point\n- second point";
        let (out, converted) = converter().convert(text);
        assert!(converted);
        assert!(out.starts_with(">> Summary\n::c0.7"));
        assert!(out.ends_with("::response\n<<<\n## Summary\n- first point\n- second point\n>>>"));
    }

    #[test]
    fn unclosed_fence_takes_rest() {
        let text = "test it\n```python\nassert x";
        let (out, _) = converter().convert_at(text, at());
        assert!(out.ends_with("::create_file @test.py\n<<<\nassert x\n>>>"));
    }

    #[test]
    fn stated_vitals_replace_defaults() {
        let text = "# Plan\nConfidence: 90%\nHere is the auth code:\n```python\nx = 1\n```";
        let (out, converted) = converter().convert_at(text, at());
        assert!(converted);
        assert_eq!(
            out,
            ">> Plan\n::c0.9\n>> Here is the auth code:\n::create_file @auth.py\n<<<\nx = 1\n>>>"
        );

        let (out, _) = converter().convert("## Notes\nsafety=80%, focus: 0.6\n- done");
        assert!(out.starts_with(">> Notes\n::s0.8 ::f0.6\n::response"));
        assert!(!out.contains("::c0.7"));
    }

    #[test]
    fn language_tag_lookup_goes_through_config() {
        let mut config = ProtocolConfig::default();
        config.extensions.insert("zig".into(), "zig".into());
        let text = "helper below\n```Zig\nconst x = 1;\n```";
        let (out, _) = MarkdownConverter::new(&config).convert_at(text, at());
        assert!(out.contains("::create_file @helpers.zig"));
    }

    #[test]
    fn lone_thought_without_markdown_is_unchanged() {
        let (out, converted) = converter().convert(">> just musing");
        assert!(!converted);
        assert_eq!(out, ">> just musing");
    }
}
