//! Serialize typed results back to canonical protocol text.

use crate::markers;
use crate::params::extract_frontmatter;
use crate::types::{Action, ParseResult, Vitals};

/// Format a vital value compactly: at most four decimals, at least one.
pub fn format_vital(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0');
    if s.ends_with('.') {
        format!("{s}0")
    } else {
        s.to_string()
    }
}

/// `::c0.9 ::s0.8 ...` for the specified keys, or `None` if none are set.
pub fn vitals_line(vitals: &Vitals) -> Option<String> {
    let parts: Vec<String> = vitals
        .entries()
        .into_iter()
        .map(|(k, v)| format!("{}{}{}", markers::ACTION, k.code(), format_vital(v)))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) {
        if value.contains('"') {
            format!("'{value}'")
        } else {
            format!("\"{value}\"")
        }
    } else {
        value.to_string()
    }
}

impl Action {
    /// Header line without content, e.g. `::edit_file @b.py > a.py mode=x`.
    pub fn header_line(&self) -> String {
        let mut line = format!("{}{}", markers::ACTION, self.kind);
        if let Some(target) = &self.target {
            line.push_str(" @");
            line.push_str(target);
        }
        if let Some(dep) = &self.depends_on {
            line.push_str(" > ");
            line.push_str(dep);
        }
        for (k, v) in &self.parameters {
            line.push(' ');
            line.push_str(k);
            line.push('=');
            line.push_str(&quote(v));
        }
        line
    }

    pub fn to_protocol(&self) -> String {
        let mut out = self.header_line();
        if let Some(content) = &self.content {
            out.push('\n');
            out.push_str(markers::CONTENT_OPEN);
            out.push('\n');
            // Content that itself opens with frontmatter would be consumed
            // as parameters on reparse; an empty block shields it.
            if extract_frontmatter(content).is_some() {
                out.push_str(markers::FRONTMATTER);
                out.push('\n');
                out.push_str(markers::FRONTMATTER);
                out.push('\n');
            }
            if !content.is_empty() {
                out.push_str(content);
                out.push('\n');
            }
            out.push_str(markers::CONTENT_CLOSE);
        }
        out
    }
}

impl ParseResult {
    /// Canonical protocol text for the whole result. Warnings, raw input and
    /// confidence are not part of the wire format and are omitted.
    pub fn to_protocol(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for thought in &self.thoughts {
            for line in thought.lines() {
                lines.push(format!("{} {}", markers::THOUGHT, line));
            }
        }
        if let Some(v) = vitals_line(&self.vitals) {
            lines.push(v);
        }
        for action in &self.actions {
            lines.push(action.to_protocol());
        }
        for q in &self.questions {
            lines.push(format!("{}{}", markers::QUESTION, q));
        }
        for e in &self.errors {
            lines.push(format!("{}{}", markers::ERROR, e));
        }
        lines.join("\n")
    }
}
