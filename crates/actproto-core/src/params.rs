//! Action header, inline `key=value` parameter, and frontmatter extraction.

use crate::markers::FRONTMATTER;
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Inline parameters
// ---------------------------------------------------------------------------

static INLINE_PARAM_RE: OnceLock<Regex> = OnceLock::new();
static DEPENDENCY_RE: OnceLock<Regex> = OnceLock::new();

fn inline_param_re() -> &'static Regex {
    INLINE_PARAM_RE.get_or_init(|| {
        Regex::new(r#"(?:^|\s)([A-Za-z_][\w.-]*)=(?:"([^"]*)"|'([^']*)'|(\S*))"#).unwrap()
    })
}

fn dependency_re() -> &'static Regex {
    DEPENDENCY_RE.get_or_init(|| Regex::new(r"^(.*?)\s+>\s+(\S.*)$").unwrap())
}

/// Split `text` into the path before the first `key=value` token and the
/// parameters. Quotes are stripped from values; later keys win.
pub fn extract_inline_params(text: &str) -> (String, BTreeMap<String, String>) {
    let mut params = BTreeMap::new();
    let mut path_end = text.len();
    for (i, cap) in inline_param_re().captures_iter(text).enumerate() {
        if i == 0 {
            if let Some(m) = cap.get(0) {
                path_end = m.start();
            }
        }
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        params.insert(cap[1].to_string(), value.to_string());
    }
    (text[..path_end].trim().to_string(), params)
}

/// Split a `target > dependency` hint off a target.
pub fn split_dependency(target: &str) -> (String, Option<String>) {
    match dependency_re().captures(target) {
        Some(cap) => (cap[1].trim().to_string(), Some(cap[2].trim().to_string())),
        None => (target.trim().to_string(), None),
    }
}

// ---------------------------------------------------------------------------
// Action header
// ---------------------------------------------------------------------------

/// The parts of an action line (or batch segment first line) after the marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionHeader {
    pub kind: String,
    pub target: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub depends_on: Option<String>,
}

/// Parse `verb[ @target][ key=value...]`, `verb rest`, or a bare `verb`.
///
/// Returns `None` when the line does not start with a verb. The dependency
/// suffix is not split for `run_verb`, whose target is a shell command that
/// may contain `>` redirections.
pub fn parse_action_header(text: &str, run_verb: &str) -> Option<ActionHeader> {
    let text = text.trim();
    let verb_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .unwrap_or(text.len());
    let verb = &text[..verb_len];
    let first = verb.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let rest = &text[verb_len..];
    if !(rest.is_empty() || rest.starts_with('@') || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('@').unwrap_or(rest);

    let kind = verb.to_ascii_lowercase();
    let (path, parameters) = extract_inline_params(rest);
    let (target, depends_on) = if kind == run_verb {
        (path, None)
    } else {
        split_dependency(&path)
    };

    Some(ActionHeader {
        kind,
        target: (!target.is_empty()).then_some(target),
        parameters,
        depends_on,
    })
}

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

fn flat_mapping(yaml: &str) -> Option<BTreeMap<String, String>> {
    let value: Value = serde_yaml::from_str(yaml).ok()?;
    let mapping = match value {
        Value::Mapping(m) => m,
        Value::Null => return Some(BTreeMap::new()),
        _ => return None,
    };
    let mut out = BTreeMap::new();
    for (k, v) in &mapping {
        if matches!(k, Value::Null) {
            return None;
        }
        out.insert(scalar_to_string(k)?, scalar_to_string(v)?);
    }
    Some(out)
}

/// Split a leading `---` frontmatter block off `content`.
///
/// Returns the flat key/value mapping and the remaining body (leading blank
/// lines stripped). Returns `None`, leaving the caller to use `content`
/// unchanged, when there is no block, no closing delimiter, the YAML fails to
/// parse, or any value is nested.
pub fn extract_frontmatter(content: &str) -> Option<(BTreeMap<String, String>, String)> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty())?;
    if lines[start].trim_end() != FRONTMATTER {
        return None;
    }
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.trim_end() == FRONTMATTER)
        .map(|i| start + 1 + i)?;
    let params = flat_mapping(&lines[start + 1..end].join("\n"))?;
    let body: Vec<&str> = lines[end + 1..]
        .iter()
        .skip_while(|l| l.trim().is_empty())
        .copied()
        .collect();
    Some((params, body.join("\n")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_params_with_quotes() {
        let (path, params) =
            extract_inline_params(r#"src/a.py mode=append msg="two words" tag='x y'"#);
        assert_eq!(path, "src/a.py");
        assert_eq!(params["mode"], "append");
        assert_eq!(params["msg"], "two words");
        assert_eq!(params["tag"], "x y");
    }

    #[test]
    fn no_params_means_whole_text_is_path() {
        let (path, params) = extract_inline_params("  docs/read me.md ");
        assert_eq!(path, "docs/read me.md");
        assert!(params.is_empty());
    }

    #[test]
    fn later_inline_key_wins() {
        let (_, params) = extract_inline_params("a.py k=1 k=2");
        assert_eq!(params["k"], "2");
    }

    #[test]
    fn header_forms() {
        let h = parse_action_header("read_file @src/lib.rs", "run_command").unwrap();
        assert_eq!(h.kind, "read_file");
        assert_eq!(h.target.as_deref(), Some("src/lib.rs"));

        let h = parse_action_header("create_file@a.py", "run_command").unwrap();
        assert_eq!(h.target.as_deref(), Some("a.py"));

        let h = parse_action_header("Finish", "run_command").unwrap();
        assert_eq!(h.kind, "finish");
        assert_eq!(h.target, None);

        let h = parse_action_header("run_command cargo test --all", "run_command").unwrap();
        assert_eq!(h.target.as_deref(), Some("cargo test --all"));
    }

    #[test]
    fn header_dependency_suffix() {
        let h = parse_action_header("edit_file @b.py > a.py mode=x", "run_command").unwrap();
        assert_eq!(h.target.as_deref(), Some("b.py"));
        assert_eq!(h.depends_on.as_deref(), Some("a.py"));
        assert_eq!(h.parameters["mode"], "x");
    }

    #[test]
    fn run_verb_keeps_redirection() {
        let h = parse_action_header("run_command @echo hi > out.txt", "run_command").unwrap();
        assert_eq!(h.target.as_deref(), Some("echo hi > out.txt"));
        assert_eq!(h.depends_on, None);
    }

    #[test]
    fn header_rejects_non_verbs() {
        assert!(parse_action_header("", "run_command").is_none());
        assert!(parse_action_header("@a.py", "run_command").is_none());
        assert!(parse_action_header("9lives", "run_command").is_none());
        assert!(parse_action_header("read_file(a.py)", "run_command").is_none());
    }

    #[test]
    fn frontmatter_extracted() {
        let (params, body) =
            extract_frontmatter("\n---\nanchors: \"1:a 2:b\"\ncount: 3\n---\n\nBODY\nmore").unwrap();
        assert_eq!(params["anchors"], "1:a 2:b");
        assert_eq!(params["count"], "3");
        assert_eq!(body, "BODY\nmore");
    }

    #[test]
    fn frontmatter_absent_or_malformed() {
        assert!(extract_frontmatter("plain body").is_none());
        assert!(extract_frontmatter("---\nkey: value\nno close").is_none());
        assert!(extract_frontmatter("---\nkey: [1, 2]\n---\nbody").is_none());
        assert!(extract_frontmatter("---\nnested:\n  a: 1\n---\nbody").is_none());
        assert!(extract_frontmatter("---\njust a sentence\n---\nbody").is_none());
        assert!(extract_frontmatter("---\nkey: \"unterminated\n---\nbody").is_none());
    }

    #[test]
    fn empty_frontmatter_is_empty_mapping() {
        let (params, body) = extract_frontmatter("---\n---\nbody").unwrap();
        assert!(params.is_empty());
        assert_eq!(body, "body");
    }
}
