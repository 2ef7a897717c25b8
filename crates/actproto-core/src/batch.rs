use crate::markers::{self, is_batch_separator};
use crate::params::{extract_frontmatter, parse_action_header};
use crate::types::Action;

/// Confidence assigned to every action split out of an explicit batch block.
pub const BATCH_CONFIDENCE: f64 = 0.95;

/// Split the content of an `execute_batch` block into sub-actions.
///
/// Segments are separated by a line that is exactly `%%%` (surrounding
/// whitespace allowed). In each segment the first non-blank line is the
/// header (`verb @path`, `verb rest`, or a bare `verb`, with an optional `::`
/// prefix) and the remaining lines are the body. Segments without a usable
/// verb are dropped.
pub fn split_batch(content: &str, run_verb: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    let mut segment: Vec<&str> = Vec::new();
    for line in content.lines() {
        if is_batch_separator(line) {
            actions.extend(parse_segment(&segment, run_verb));
            segment.clear();
        } else {
            segment.push(line);
        }
    }
    actions.extend(parse_segment(&segment, run_verb));
    actions
}

fn parse_segment(lines: &[&str], run_verb: &str) -> Option<Action> {
    let start = lines.iter().position(|l| !l.trim().is_empty())?;
    let end = lines.iter().rposition(|l| !l.trim().is_empty())?;
    let header_line = lines[start].trim();
    let header_line = header_line
        .strip_prefix(markers::ACTION)
        .unwrap_or(header_line);
    let header = parse_action_header(header_line, run_verb)?;
    if header.kind == markers::BATCH_VERB {
        // Nested batches are not expanded.
        return None;
    }

    let body = lines[start + 1..=end].join("\n");
    let mut action = Action::new(header.kind);
    action.target = header.target;
    action.parameters = header.parameters;
    action.depends_on = header.depends_on;
    action.confidence = BATCH_CONFIDENCE;

    if body.trim().is_empty() {
        return Some(action);
    }
    if action.kind == run_verb && action.target.is_none() {
        action.target = Some(body.trim().to_string());
        return Some(action);
    }
    match extract_frontmatter(&body) {
        Some((fm, rest)) => {
            action.parameters.extend(fm);
            action.content = Some(rest);
        }
        None => action.content = Some(body),
    }
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = "run_command";

    #[test]
    fn splits_two_files() {
        let actions = split_batch("create_file @a.py\nCODE_A\n%%%\ncreate_file @b.py\nCODE_B", RUN);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, "create_file");
        assert_eq!(actions[0].target.as_deref(), Some("a.py"));
        assert_eq!(actions[0].content.as_deref(), Some("CODE_A"));
        assert_eq!(actions[1].target.as_deref(), Some("b.py"));
        assert_eq!(actions[1].content.as_deref(), Some("CODE_B"));
        assert!(actions.iter().all(|a| a.confidence == BATCH_CONFIDENCE));
    }

    #[test]
    fn run_command_body_becomes_target() {
        let actions = split_batch("run_command\ncargo test\n%%%\nrun_command @ls -la", RUN);
        assert_eq!(actions[0].target.as_deref(), Some("cargo test"));
        assert_eq!(actions[0].content, None);
        assert_eq!(actions[1].target.as_deref(), Some("ls -la"));
    }

    #[test]
    fn skips_empty_and_verbless_segments() {
        let actions = split_batch("\n%%%\n\n%%%\n@orphan.py\nx\n%%%\nfinish", RUN);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, "finish");
    }

    #[test]
    fn separator_with_trailing_text_is_body() {
        let actions = split_batch("create_file @a.md\n%%% not a separator\nline", RUN);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].content.as_deref(),
            Some("%%% not a separator\nline")
        );
    }

    #[test]
    fn segment_inline_params_and_frontmatter() {
        let actions = split_batch(
            "::edit_file @src/a.rs anchors=old mode=x\n---\nanchors: new\n---\nBODY",
            RUN,
        );
        let a = &actions[0];
        assert_eq!(a.param("anchors"), Some("new"));
        assert_eq!(a.param("mode"), Some("x"));
        assert_eq!(a.content.as_deref(), Some("BODY"));
    }

    #[test]
    fn nested_batch_dropped() {
        assert!(split_batch("execute_batch\nfoo", RUN).is_empty());
    }
}
