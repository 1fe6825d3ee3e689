//! Self-healing text passes for malformed backlog documents.
//!
//! Each pass is a pure function over the raw document: it returns the
//! rewritten text, or `None` when it had nothing to change. The store runs
//! them in [`REPAIR_PASSES`] order, re-parsing after every pass that fired.

use std::sync::OnceLock;

use regex::Regex;

/// A named repair pass.
pub struct RepairPass {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<String>,
}

/// Passes in the order they are attempted.
pub const REPAIR_PASSES: &[RepairPass] = &[
    RepairPass {
        name: "uncomment",
        apply: uncomment_all,
    },
    RepairPass {
        name: "inline_acceptance",
        apply: normalize_inline_acceptance,
    },
    RepairPass {
        name: "strip_fences",
        apply: strip_code_fences,
    },
];

fn comment_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)#\s?").expect("static regex"))
}

fn inline_acceptance() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)(-\s+)?acceptance:\s*(\S.*)$").expect("static regex")
    })
}

fn item_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*;\s*|\s+-\s+").expect("static regex"))
}

/// If every non-blank line is commented out, strip one `#` per line.
///
/// Indentation before the marker is kept, as is a single space after it.
pub fn uncomment_all(text: &str) -> Option<String> {
    let mut non_blank = text.lines().filter(|l| !l.trim().is_empty()).peekable();
    non_blank.peek()?;
    if !non_blank.all(|l| l.trim_start().starts_with('#')) {
        return None;
    }

    let out: Vec<String> = text
        .lines()
        .map(|line| comment_marker().replace(line, "$1").into_owned())
        .collect();
    Some(join_like(text, out))
}

/// Expand inline `acceptance` shorthand into a block list.
///
/// Handles `acceptance: - a`, `acceptance: a; b` and `acceptance: - a - b`.
/// Quoted and flow-style values are left alone.
pub fn normalize_inline_acceptance(text: &str) -> Option<String> {
    let mut changed = false;
    let mut out = Vec::new();

    for line in text.lines() {
        let Some(caps) = inline_acceptance().captures(line) else {
            out.push(line.to_string());
            continue;
        };

        let indent = &caps[1];
        let seq_marker = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let value = caps[3].trim_end();

        if value.starts_with(['"', '\'', '[', '{', '|', '>', '#']) {
            out.push(line.to_string());
            continue;
        }
        let leading_dash = value.starts_with("- ") || value == "-";
        if !leading_dash && !value.contains(';') && !value.contains(" - ") {
            out.push(line.to_string());
            continue;
        }

        let items: Vec<&str> = item_separator()
            .split(value.trim_start_matches('-'))
            .map(|item| item.trim_matches(|c: char| c == '-' || c == ';' || c.is_whitespace()))
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            out.push(line.to_string());
            continue;
        }

        // keys of a sequence entry (`- acceptance:`) sit past the dash
        let key_indent = format!("{indent}{}", " ".repeat(seq_marker.len()));
        out.push(format!("{indent}{seq_marker}acceptance:"));
        for item in items {
            out.push(format!("{key_indent}  - {}", yaml_scalar(item)));
        }
        changed = true;
    }

    changed.then(|| join_like(text, out))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*```\s*(yaml|yml)?\s*$").expect("static regex"))
}

/// Drop markdown code-fence lines wrapped around the document.
pub fn strip_code_fences(text: &str) -> Option<String> {
    let kept: Vec<String> = text
        .lines()
        .filter(|line| !code_fence().is_match(line))
        .map(str::to_string)
        .collect();
    if kept.len() == text.lines().count() {
        return None;
    }
    Some(join_like(text, kept))
}

/// Quote an item when it would not survive as a plain scalar.
fn yaml_scalar(item: &str) -> String {
    let needs_quotes = item.contains(": ")
        || item.ends_with(':')
        || item.contains(" #")
        || item.starts_with([
            '\'', '"', '[', ']', '{', '}', '&', '*', '!', '|', '>', '%', '@', '`', ',', '?',
        ]);
    if needs_quotes {
        format!("'{}'", item.replace('\'', "''"))
    } else {
        item.to_string()
    }
}

fn join_like(original: &str, lines: Vec<String>) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
