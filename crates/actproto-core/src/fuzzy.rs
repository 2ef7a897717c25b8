//! Tolerant fallback parser.
//!
//! Every field is extracted independently so a malformation in one part of
//! the text cannot hide structure elsewhere. Actions found without explicit
//! `<<<`/`>>>` delimiters carry lower confidence, and the overall confidence
//! is penalized accordingly.

use crate::batch::split_batch;
use crate::config::{FuzzyConfig, ProtocolConfig};
use crate::markers::{self, is_close_marker, is_open_marker, starts_with_marker};
use crate::params::{extract_frontmatter, parse_action_header, ActionHeader};
use crate::token::{parse_vitals_line, vital_value, BlockScanner, LineRole};
use crate::types::{Action, ParseMode, ParseResult, VitalKey, Vitals};
use regex::Regex;
use std::sync::OnceLock;

static VITAL_SEARCH_RES: OnceLock<Vec<(VitalKey, Regex)>> = OnceLock::new();

/// One unanchored pattern per key, accepting `::c0.9` and `confidence: 90%`.
fn vital_search_res() -> &'static [(VitalKey, Regex)] {
    VITAL_SEARCH_RES.get_or_init(|| {
        VitalKey::all()
            .iter()
            .map(|key| {
                let pattern = format!(
                    r"(?i)(?:::\s*{}|\b{}\s*[:=])\s*(\d+(?:\.\d+)?|\.\d+)\s*(%)?",
                    key.code(),
                    key.as_str()
                );
                (*key, Regex::new(&pattern).unwrap())
            })
            .collect()
    })
}

/// Parse with the default configuration.
pub fn fuzzy_parse(text: &str) -> ParseResult {
    FuzzyParser::new(&ProtocolConfig::default()).parse(text)
}

#[derive(Debug, Clone)]
pub struct FuzzyParser {
    run_verb: String,
    knobs: FuzzyConfig,
}

impl FuzzyParser {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            run_verb: config.run_verb.clone(),
            knobs: config.fuzzy.clone(),
        }
    }

    pub fn parse(&self, text: &str) -> ParseResult {
        let mut result = ParseResult::new(text, ParseMode::Fuzzy);
        collect_line_fields(text, &mut result);
        result.vitals = search_vitals(text);
        self.collect_actions(text, &mut result);

        if result.actions.len() > 1 {
            result.is_batch = true;
        }
        result.confidence = self.overall_confidence(&result.actions);
        tracing::debug!(
            actions = result.actions.len(),
            confidence = result.confidence,
            "fuzzy parse finished"
        );
        result
    }

    fn overall_confidence(&self, actions: &[Action]) -> f64 {
        let mut confidence = 1.0;
        if actions.is_empty() {
            confidence *= self.knobs.no_action_penalty;
        }
        let low = actions
            .iter()
            .filter(|a| a.confidence < self.knobs.low_confidence_threshold)
            .count();
        confidence *= self.knobs.low_confidence_penalty.powi(low as i32);
        confidence.clamp(0.0, 1.0)
    }

    fn collect_actions(&self, text: &str, result: &mut ParseResult) {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let t = lines[i].trim();

            if is_open_marker(t) {
                let (body, next) = take_block(&lines, i + 1);
                let action = Action::new(markers::RESPONSE_VERB);
                self.attach(result, action, Some(body), self.knobs.explicit_confidence);
                i = next;
                continue;
            }

            let header = t
                .strip_prefix(markers::ACTION)
                .filter(|_| parse_vitals_line(t).is_none())
                .and_then(|rest| parse_action_header(rest, &self.run_verb));
            let Some(header) = header else {
                i += 1;
                continue;
            };
            let action = action_from(header);

            let next_nonblank = (i + 1..lines.len()).find(|&j| !lines[j].trim().is_empty());
            if let Some(j) = next_nonblank.filter(|&j| is_open_marker(lines[j])) {
                let (body, next) = take_block(&lines, j + 1);
                self.attach(result, action, Some(body), self.knobs.explicit_confidence);
                i = next;
                continue;
            }

            let end = (i + 1..lines.len())
                .find(|&j| starts_with_marker(lines[j]) || is_close_marker(lines[j]))
                .unwrap_or(lines.len());
            let body = trim_blank_edges(&lines[i + 1..end]);
            if body.is_empty() {
                self.attach(result, action, None, self.knobs.explicit_confidence);
            } else {
                self.attach(result, action, Some(body), self.knobs.implicit_confidence);
            }
            i = end;
        }
    }

    fn attach(
        &self,
        result: &mut ParseResult,
        mut action: Action,
        body: Option<String>,
        confidence: f64,
    ) {
        if action.is_batch() {
            result.is_batch = true;
            let Some(body) = body else {
                return;
            };
            for mut sub in split_batch(&body, &self.run_verb) {
                sub.confidence = confidence;
                result.actions.push(sub);
            }
            return;
        }

        action.confidence = confidence;
        if let Some(body) = body {
            match extract_frontmatter(&body) {
                Some((fm, rest)) => {
                    action.parameters.extend(fm);
                    action.content = Some(rest);
                }
                None => action.content = Some(body),
            }
        }
        result.actions.push(action);
    }
}

fn action_from(header: ActionHeader) -> Action {
    let mut action = Action::new(header.kind);
    action.target = header.target;
    action.parameters = header.parameters;
    action.depends_on = header.depends_on;
    action
}

/// Content from `start` up to a column-0 close marker, or to end of input.
fn take_block(lines: &[&str], start: usize) -> (String, usize) {
    let start = start.min(lines.len());
    match lines[start..].iter().position(|l| is_close_marker(l)) {
        Some(p) => (lines[start..start + p].join("\n"), start + p + 1),
        None => (lines[start..].join("\n"), lines.len()),
    }
}

fn trim_blank_edges(lines: &[&str]) -> String {
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    lines[first..=last].join("\n")
}

/// Thoughts, questions and errors, one entry per line, outside content.
fn collect_line_fields(text: &str, result: &mut ParseResult) {
    let mut scanner = BlockScanner::new();
    for line in text.lines() {
        if scanner.step(line) != LineRole::Outside {
            continue;
        }
        let t = line.trim();
        if t == markers::CONTENT_CLOSE {
            continue;
        }
        let (field, rest) = if let Some(rest) = t.strip_prefix(markers::THOUGHT) {
            (&mut result.thoughts, rest)
        } else if let Some(rest) = t.strip_prefix(markers::QUESTION) {
            (&mut result.questions, rest)
        } else if let Some(rest) = t.strip_prefix(markers::ERROR) {
            (&mut result.errors, rest)
        } else {
            continue;
        };
        let rest = rest.trim();
        if !rest.is_empty() {
            field.push(rest.to_string());
        }
    }
}

fn search_vitals(text: &str) -> Vitals {
    let mut vitals = Vitals::default();
    for (key, re) in vital_search_res() {
        let last = re
            .captures_iter(text)
            .filter_map(|cap| vital_value(&cap[1], cap.get(2).is_some()))
            .last();
        if let Some(value) = last {
            vitals.set(*key, value);
        }
    }
    vitals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_block_outranks_implicit_content() {
        let explicit = fuzzy_parse("::create_file @a.py\n<<<\nprint(1)\n>>>");
        let implicit = fuzzy_parse("::create_file @a.py\nprint(1)");
        assert_eq!(explicit.actions[0].content, implicit.actions[0].content);
        assert!(explicit.actions[0].confidence > implicit.actions[0].confidence);
        assert_eq!(explicit.actions[0].confidence, 0.95);
        assert_eq!(implicit.actions[0].confidence, 0.7);
    }

    #[test]
    fn implicit_content_stops_at_next_marker() {
        let r = fuzzy_parse("::create_file @a.py\nline one\n\nline two\n\n::finish\n>> done");
        assert_eq!(r.actions.len(), 2);
        assert_eq!(r.actions[0].content.as_deref(), Some("line one\n\nline two"));
        assert_eq!(r.actions[1].kind, "finish");
        assert_eq!(r.actions[1].content, None);
        assert_eq!(r.thoughts, vec!["done"]);
    }

    #[test]
    fn unclosed_block_runs_to_end() {
        let r = fuzzy_parse("::response\n<<<\nhello\nworld");
        assert_eq!(r.actions[0].content.as_deref(), Some("hello\nworld"));
        assert_eq!(r.actions[0].confidence, 0.95);
    }

    #[test]
    fn vitals_found_anywhere_last_wins() {
        let r = fuzzy_parse("I am ::c0.4 sure.\nconfidence: 90%\nSafety=0.8 then ::s 0.6");
        assert_eq!(r.vitals.confidence, Some(0.9));
        assert_eq!(r.vitals.safety, Some(0.6));
        assert_eq!(r.vitals.memory, None);
    }

    #[test]
    fn create_file_is_not_a_vital() {
        let r = fuzzy_parse("::create_file @c1.py");
        assert_eq!(r.vitals.confidence, None);
    }

    #[test]
    fn batch_expanded_with_block_confidence() {
        let r = fuzzy_parse("::execute_batch\n<<<\ncreate_file @a.py\nA\n%%%\ncreate_file @b.py\nB");
        assert!(r.is_batch);
        assert_eq!(r.actions.len(), 2);
        assert!(r.actions.iter().all(|a| a.confidence == 0.95));
    }

    #[test]
    fn no_actions_halves_confidence() {
        let r = fuzzy_parse(">> only thinking\n?anything else");
        assert!(r.actions.is_empty());
        assert_eq!(r.confidence, 0.5);
        assert_eq!(r.questions, vec!["anything else"]);
        assert_eq!(r.mode, ParseMode::Fuzzy);
    }

    #[test]
    fn low_confidence_actions_penalize() {
        let r = fuzzy_parse("::create_file @a.py\nA\n::create_file @b.py\nB");
        assert_eq!(r.actions.len(), 2);
        assert!((r.confidence - 0.64).abs() < 1e-9);
    }

    #[test]
    fn markers_inside_blocks_are_not_fields() {
        let r = fuzzy_parse("::create_file @x.md\n<<<\n>> quoted\n?faq\n>>>\n!real error");
        assert!(r.thoughts.is_empty());
        assert!(r.questions.is_empty());
        assert_eq!(r.errors, vec!["real error"]);
    }

    #[test]
    fn garbage_does_not_panic() {
        for text in ["", "\u{0}\u{1}\u{fffd}", "```\n```\n```", ":: ::\n<<<\n<<<", "%%%\n>>>\n@"] {
            let r = fuzzy_parse(text);
            assert!((0.0..=1.0).contains(&r.confidence));
        }
    }
}
