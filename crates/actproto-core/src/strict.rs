//! Strict single-pass parser over the token stream.

use crate::batch::split_batch;
use crate::config::ProtocolConfig;
use crate::markers::{BATCH_VERB, RESPONSE_VERB};
use crate::params::{extract_frontmatter, parse_action_header};
use crate::token::{tokenize, Token};
use crate::types::{Action, ParseMode, ParseResult};

/// Strict parsing either succeeds or names why the fuzzy parser should run.
#[derive(Debug, Clone, PartialEq)]
pub enum StrictOutcome {
    Success(ParseResult),
    NeedsFallback(String),
}

impl StrictOutcome {
    pub fn into_result(self) -> Option<ParseResult> {
        match self {
            StrictOutcome::Success(r) => Some(r),
            StrictOutcome::NeedsFallback(_) => None,
        }
    }
}

/// Parse with the default configuration.
pub fn strict_parse(text: &str) -> StrictOutcome {
    StrictParser::new(&ProtocolConfig::default()).parse(text)
}

#[derive(Debug, Clone)]
pub struct StrictParser {
    run_verb: String,
}

struct OpenBlock<'a> {
    line: usize,
    lines: Vec<&'a str>,
}

struct State<'a> {
    result: ParseResult,
    pending: Option<Action>,
    block: Option<OpenBlock<'a>>,
    /// True while consecutive thought lines should be joined.
    in_thought_run: bool,
    saw_text: bool,
}

impl StrictParser {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            run_verb: config.run_verb.clone(),
        }
    }

    pub fn parse(&self, text: &str) -> StrictOutcome {
        let mut st = State {
            result: ParseResult::new(text, ParseMode::Strict),
            pending: None,
            block: None,
            in_thought_run: false,
            saw_text: false,
        };

        for line in tokenize(text) {
            if !line.raw.trim().is_empty() {
                st.saw_text = true;
            }
            if st.block.is_some() {
                if line.token == Token::ContentClose {
                    self.close_block(&mut st);
                } else if let Some(block) = st.block.as_mut() {
                    block.lines.push(line.raw);
                }
                continue;
            }

            match line.token {
                Token::ContentOpen => {
                    if st.pending.is_none() {
                        st.pending = Some(Action::new(RESPONSE_VERB));
                    }
                    st.block = Some(OpenBlock {
                        line: line.number,
                        lines: Vec::new(),
                    });
                    st.in_thought_run = false;
                }
                Token::ContentClose => {
                    st.result
                        .warnings
                        .push(format!("line {}: ignored orphan close marker", line.number));
                }
                Token::Thought(t) => {
                    if t.is_empty() {
                        continue;
                    }
                    match st.result.thoughts.last_mut() {
                        Some(last) if st.in_thought_run => {
                            last.push('\n');
                            last.push_str(t);
                        }
                        _ => st.result.thoughts.push(t.to_string()),
                    }
                    st.in_thought_run = true;
                }
                Token::Vitals(v) => {
                    st.result.vitals.merge(&v);
                    st.in_thought_run = false;
                }
                Token::Action(rest) => {
                    flush_pending(&mut st);
                    st.in_thought_run = false;
                    match parse_action_header(rest, &self.run_verb) {
                        Some(h) => {
                            if h.kind == BATCH_VERB {
                                st.result.is_batch = true;
                            }
                            let mut action = Action::new(h.kind);
                            action.target = h.target;
                            action.parameters = h.parameters;
                            action.depends_on = h.depends_on;
                            st.pending = Some(action);
                        }
                        None => st.result.warnings.push(format!(
                            "line {}: skipped malformed action line",
                            line.number
                        )),
                    }
                }
                Token::Question(q) => {
                    st.result.questions.push(q.to_string());
                    st.in_thought_run = false;
                }
                Token::Error(e) => {
                    st.result.errors.push(e.to_string());
                    st.in_thought_run = false;
                }
                Token::Plain | Token::BatchSeparator => {
                    if !line.raw.trim().is_empty() {
                        st.in_thought_run = false;
                    }
                }
            }
        }

        if let Some(block) = &st.block {
            return StrictOutcome::NeedsFallback(format!(
                "unclosed content block opened at line {}",
                block.line
            ));
        }
        flush_pending(&mut st);

        let mut result = st.result;
        if st.saw_text && !result.has_structure() {
            return StrictOutcome::NeedsFallback("no protocol structure found".to_string());
        }
        if result.actions.len() > 1 {
            result.is_batch = true;
        }
        tracing::debug!(
            actions = result.actions.len(),
            thoughts = result.thoughts.len(),
            "strict parse succeeded"
        );
        StrictOutcome::Success(result)
    }

    fn close_block(&self, st: &mut State<'_>) {
        let Some(block) = st.block.take() else {
            return;
        };
        let Some(mut action) = st.pending.take() else {
            return;
        };
        let body = block.lines.join("\n");
        if action.is_batch() {
            st.result.is_batch = true;
            st.result.actions.extend(split_batch(&body, &self.run_verb));
            return;
        }
        match extract_frontmatter(&body) {
            Some((fm, rest)) => {
                action.parameters.extend(fm);
                action.content = Some(rest);
            }
            None => action.content = Some(body),
        }
        st.result.actions.push(action);
    }
}

/// Push a pending action that never received a content block. A batch
/// declaration without content yields nothing.
fn flush_pending(st: &mut State<'_>) {
    if let Some(action) = st.pending.take() {
        if !action.is_batch() {
            st.result.actions.push(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(text: &str) -> ParseResult {
        match strict_parse(text) {
            StrictOutcome::Success(r) => r,
            StrictOutcome::NeedsFallback(reason) => panic!("fallback: {reason}"),
        }
    }

    #[test]
    fn parses_full_turn() {
        let r = ok(">> Read the file first.\n>> Then patch it.\n::c0.9 ::s0.8 ::m0.7 ::f0.9\n::read_file @src/lib.rs\n?Which branch?\n!lint failed");
        assert_eq!(r.thoughts, vec!["Read the file first.\nThen patch it."]);
        assert_eq!(r.vitals.confidence, Some(0.9));
        assert_eq!(r.vitals.focus, Some(0.9));
        assert_eq!(r.actions.len(), 1);
        assert_eq!(r.actions[0].kind, "read_file");
        assert_eq!(r.actions[0].target.as_deref(), Some("src/lib.rs"));
        assert_eq!(r.questions, vec!["Which branch?"]);
        assert_eq!(r.errors, vec!["lint failed"]);
        assert!(!r.is_batch);
        assert_eq!(r.mode, ParseMode::Strict);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn blank_lines_do_not_break_thought_run() {
        let r = ok(">> one\n\n>> two\n::finish\n>> three");
        assert_eq!(r.thoughts, vec!["one\ntwo", "three"]);
        assert_eq!(r.reasoning(), "one\ntwo\nthree");
    }

    #[test]
    fn content_block_attaches_to_action() {
        let r = ok("::create_file @a.py\n<<<\ndef f():\n    return 1\n>>>");
        assert_eq!(r.actions[0].content.as_deref(), Some("def f():\n    return 1"));
    }

    #[test]
    fn indented_close_marker_is_content() {
        let r = ok("::create_file @doc.py\n<<<\n   >>> x\nmore\n>>>");
        assert_eq!(r.actions[0].content.as_deref(), Some("   >>> x\nmore"));
    }

    #[test]
    fn markers_inside_content_are_opaque() {
        let r = ok("::create_file @p.md\n<<<\n>> not a thought\n::not_an_action\n<<<\n>>>");
        assert!(r.thoughts.is_empty());
        assert_eq!(r.actions.len(), 1);
        assert_eq!(
            r.actions[0].content.as_deref(),
            Some(">> not a thought\n::not_an_action\n<<<")
        );
    }

    #[test]
    fn open_without_action_synthesizes_response() {
        let r = ok("<<<\nhello there\n>>>");
        assert_eq!(r.actions[0].kind, "response");
        assert_eq!(r.actions[0].content.as_deref(), Some("hello there"));
    }

    #[test]
    fn batch_expansion() {
        let r = ok("::execute_batch\n<<<\ncreate_file @a.py\nCODE_A\n%%%\ncreate_file @b.py\nCODE_B\n>>>");
        assert!(r.is_batch);
        assert_eq!(r.actions.len(), 2);
        assert!(r.actions.iter().all(|a| a.kind == "create_file"));
        assert_eq!(r.actions[0].target.as_deref(), Some("a.py"));
        assert_eq!(r.actions[1].target.as_deref(), Some("b.py"));
        assert_eq!(r.actions[1].content.as_deref(), Some("CODE_B"));
    }

    #[test]
    fn frontmatter_overrides_inline_params() {
        let r = ok("::edit_file @src/a.rs anchors=old\n<<<\n---\nanchors: \"1:a 2:b\"\n---\nBODY\n>>>");
        let a = &r.actions[0];
        assert_eq!(a.param("anchors"), Some("1:a 2:b"));
        assert_eq!(a.content.as_deref(), Some("BODY"));
    }

    #[test]
    fn contentless_actions_in_order() {
        let r = ok("::read_file @a.py\n::read_file @b.py > a.py\n::finish");
        let kinds: Vec<_> = r.actions.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, vec!["read_file", "read_file", "finish"]);
        assert_eq!(r.actions[1].depends_on.as_deref(), Some("a.py"));
        assert!(r.is_batch);
    }

    #[test]
    fn orphan_close_and_malformed_action_warn() {
        let r = ok(">>>\n::123\n::finish");
        assert_eq!(r.actions.len(), 1);
        assert_eq!(
            r.warnings,
            vec![
                "line 1: ignored orphan close marker",
                "line 2: skipped malformed action line"
            ]
        );
    }

    #[test]
    fn pure_response_turn_is_success() {
        let r = ok(">> nothing to do");
        assert!(r.actions.is_empty());
        let r = ok("");
        assert!(!r.has_structure());
    }

    #[test]
    fn unclosed_block_needs_fallback() {
        let out = strict_parse("::response\n<<<\nhello");
        assert_eq!(
            out,
            StrictOutcome::NeedsFallback("unclosed content block opened at line 2".to_string())
        );
    }

    #[test]
    fn prose_needs_fallback() {
        assert!(strict_parse("just some words").into_result().is_none());
    }

    #[test]
    fn rendered_action_reparses_equal() {
        let mut action = Action::new("create_file");
        action.target = Some("src/main.rs".to_string());
        action.content = Some("fn main() {\n    // >>> not a closer\n   >>>\n}".to_string());
        let r = ok(&action.to_protocol());
        assert_eq!(r.actions.len(), 1);
        let back = &r.actions[0];
        assert_eq!(back.kind, action.kind);
        assert_eq!(back.target, action.target);
        assert_eq!(back.content, action.content);
    }

    #[test]
    fn frontmatter_shaped_content_reparses_equal() {
        for content in ["---\n---\n::a", "---\nkey: v\n---\nbody"] {
            let mut action = Action::new("create_file");
            action.target = Some("doc.md".to_string());
            action.content = Some(content.to_string());
            let r = ok(&action.to_protocol());
            assert_eq!(r.actions[0].content.as_deref(), Some(content));
            assert!(r.actions[0].parameters.is_empty());
        }
    }
}
