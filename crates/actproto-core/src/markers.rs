//! Wire-format symbols of the action protocol.
//!
//! These are bit-exact; changing any of them breaks compatibility with
//! prompts that teach the model this format.

/// `>> text`: reasoning line.
pub const THOUGHT: &str = ">>";

/// `::verb @target key=value`: action declaration. Also prefixes vitals.
pub const ACTION: &str = "::";

/// `<<<` alone on a line: opens a content block.
pub const CONTENT_OPEN: &str = "<<<";

/// `>>>` alone at column 0: closes a content block.
pub const CONTENT_CLOSE: &str = ">>>";

/// `%%%` alone on a line inside a batch content block.
pub const BATCH_SEPARATOR: &str = "%%%";

/// `---` delimits a frontmatter block at the top of a content block.
pub const FRONTMATTER: &str = "---";

/// `?text`: open question for the user.
pub const QUESTION: &str = "?";

/// `!text`: error reported by the model.
pub const ERROR: &str = "!";

/// Markdown code fence.
pub const FENCE: &str = "```";

/// Legacy alias for [`ACTION`].
pub const LEGACY_ACTION: &str = "$";

/// Verb whose content block is split into sub-actions on [`BATCH_SEPARATOR`].
pub const BATCH_VERB: &str = "execute_batch";

/// Verb synthesized for a content block with no preceding action line.
pub const RESPONSE_VERB: &str = "response";

/// Verb the markdown converter emits for each fenced code block.
pub const CREATE_FILE_VERB: &str = "create_file";

/// True if `line` is a column-0 close marker. Leading whitespace disqualifies
/// it; trailing whitespace is tolerated.
pub fn is_close_marker(line: &str) -> bool {
    line.trim_end() == CONTENT_CLOSE
}

/// True if `line` is an open marker, ignoring surrounding whitespace.
pub fn is_open_marker(line: &str) -> bool {
    line.trim() == CONTENT_OPEN
}

/// True if `line` is a batch separator. Surrounding whitespace is tolerated;
/// any other text on the line disqualifies it.
pub fn is_batch_separator(line: &str) -> bool {
    line.trim() == BATCH_SEPARATOR
}

/// True if `line` starts a Markdown code fence (after indentation).
pub fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// True if the stripped line starts with any protocol marker. Used by the
/// preprocessor and fuzzy lookahead to find where structure begins.
pub fn starts_with_marker(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with(THOUGHT) || t.starts_with(ACTION) || t.starts_with(CONTENT_OPEN)
}
