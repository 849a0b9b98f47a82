//! Response sanitizing: strip prompt artefacts the model echoes back.
//!
//! Even with explicit negative rules in the prompt, models occasionally
//! return the `[START]`/`[END]` markers, a `RULES:` header, a
//! `<translation>` wrapper or a leading `...` when they continue a sentence
//! from the previous page. [`sanitize`] runs an ordered list of pure
//! `&str → String` rules over the raw output.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the line-anchored label rules see
//! `\n` only; fences are stripped before markers so a fenced reply is
//! unwrapped in one pass; the ellipsis rule runs after the final trim
//! because it only looks at the very first characters.
//!
//! Every rule only deletes text, so the whole pass is repeated until the
//! output stops changing. That makes `sanitize` idempotent even when
//! removing one artefact exposes another (`"... [START] ..."`).

use once_cell::sync::Lazy;
use regex::Regex;

type Rule = fn(&str) -> String;

/// Applied in this order on every pass.
const RULES: &[Rule] = &[
    normalise_line_endings,
    remove_invisible_chars,
    strip_code_fences,
    remove_markers,
    remove_wrapper_tags,
    remove_label_lines,
    remove_label_prefix,
    collapse_blank_lines,
    trim,
    strip_leading_ellipsis,
];

/// Clean raw backend output into display text. Total and idempotent.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = RULES.iter().fold(current.clone(), |s, rule| rule(&s));
        if next == current {
            return next;
        }
        current = next;
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 4: Remove page markers ──────────────────────────────────────────────

static RE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*(?:start|end)(?:\s+of\s+(?:page|text|translation))?\s*\]").unwrap()
});

fn remove_markers(input: &str) -> String {
    RE_MARKERS.replace_all(input, "").into_owned()
}

// ── Rule 5: Remove wrapper tags ──────────────────────────────────────────────

static RE_WRAPPER_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?\s*(?:translation|translated_text|output|text)\s*>").unwrap()
});

fn remove_wrapper_tags(input: &str) -> String {
    RE_WRAPPER_TAGS.replace_all(input, "").into_owned()
}

// ── Rule 6: Remove instruction label lines ───────────────────────────────────
//
// Whole lines that are nothing but a section label from the prompt
// (`RULES:`, `TERMINOLOGY:`, `PAGE 3 TO TRANSLATE:`) or a numbered rule
// echoed back verbatim.

static RE_LABEL_LINES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:rules|terminology|translation|translated text|page \d+ to translate|context from the previous page[^\n]*)[ \t]*:[ \t]*(?:\n|$)",
    )
    .unwrap()
});

static RE_ECHOED_RULES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*\d+\.[ \t]*(?:output only the translation|never repeat these instructions|never include the original text|do not add comments|keep paragraph breaks|write the whole reply in)[^\n]*(?:\n|$)",
    )
    .unwrap()
});

fn remove_label_lines(input: &str) -> String {
    let s = RE_LABEL_LINES.replace_all(input, "");
    RE_ECHOED_RULES.replace_all(&s, "").into_owned()
}

// ── Rule 7: Remove a leading "Translation:" label ────────────────────────────

static RE_LABEL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:translation|translated text)\s*:[ \t]*").unwrap());

fn remove_label_prefix(input: &str) -> String {
    RE_LABEL_PREFIX.replace(input, "").into_owned()
}

// ── Rule 8: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

// ── Rule 9: Trim ─────────────────────────────────────────────────────────────

fn trim(input: &str) -> String {
    input.trim().to_string()
}

// ── Rule 10: Drop a leading ellipsis ─────────────────────────────────────────

static RE_LEADING_ELLIPSIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\.{3,}|…)+\s*").unwrap());

fn strip_leading_ellipsis(input: &str) -> String {
    RE_LEADING_ELLIPSIS.replace(input, "").trim().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
