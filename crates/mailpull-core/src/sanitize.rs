//! Filesystem-safe names for message folders and attachment files.
//!
//! Names produced here are portable: the invalid character set and the
//! reserved device names are the Windows ones, which are a superset of what
//! Unix filesystems reject.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Default maximum length (in characters) of a sanitized folder segment.
pub const DEFAULT_FOLDER_NAME_LEN: usize = 80;

/// Default maximum length (in characters) of a sanitized file name.
pub const DEFAULT_FILE_NAME_LEN: usize = 120;

/// Substituted when nothing usable is left after sanitizing.
pub const EMPTY_NAME_PLACEHOLDER: &str = "(no subject)";

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const INVALID_CHARS: [char; 9] = ['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

/// Turns arbitrary text into a single safe path segment.
///
/// Diacritics are stripped, invalid characters become `_`, whitespace runs
/// collapse to one space, leading/trailing dots and spaces are trimmed,
/// reserved device names get a trailing `_`, and an empty result becomes
/// [`EMPTY_NAME_PLACEHOLDER`]. The result is at most `max_len` characters.
#[must_use]
pub fn sanitize_folder_name(input: &str, max_len: usize) -> String {
    sanitize_segment(input, max_len).unwrap_or_else(|| placeholder(max_len))
}

/// Like [`sanitize_folder_name`] but returns `None` instead of the
/// placeholder when nothing usable is left.
#[must_use]
pub fn sanitize_segment(input: &str, max_len: usize) -> Option<String> {
    let max_len = max_len.max(1);
    let cleaned = strip_diacritics(input);
    let name = truncate(&normalize_segment(&cleaned), max_len);
    let name = trim_dots_and_spaces(&name);
    (!name.is_empty()).then(|| escape_reserved(name, max_len))
}

/// Like [`sanitize_folder_name`] but keeps the file extension.
///
/// Only the base name is sanitized and truncated; the extension is
/// re-appended as-is, so the result can exceed `max_len` when the extension
/// alone is that long.
#[must_use]
pub fn sanitize_file_name(input: &str, max_len: usize) -> String {
    let cleaned = strip_diacritics(input);
    let (base, ext) = split_extension(&cleaned);

    let mut base = normalize_segment(base);
    if base.is_empty() {
        base = EMPTY_NAME_PLACEHOLDER.to_string();
    }
    let allowed = max_len.saturating_sub(ext.chars().count()).max(1);
    let base = truncate(&base, allowed);
    let base = match trim_dots_and_spaces(&base) {
        "" => base.clone(),
        trimmed => escape_reserved(trimmed, allowed),
    };
    let name = format!("{base}{ext}");

    match trim_dots_and_spaces(&name) {
        "" => placeholder(max_len),
        trimmed => trimmed.to_string(),
    }
}

/// Returns true if `c` may not appear in a portable file name.
#[must_use]
pub fn is_invalid_char(c: char) -> bool {
    c.is_control() || INVALID_CHARS.contains(&c)
}

fn strip_diacritics(input: &str) -> String {
    input
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

fn normalize_segment(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if is_invalid_char(c) { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    trim_dots_and_spaces(&collapsed).to_string()
}

/// Appends `_` to reserved device names, replacing the last character when
/// the name is already `max_len` long.
fn escape_reserved(name: &str, max_len: usize) -> String {
    if !RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return name.to_string();
    }
    let mut escaped = if name.chars().count() < max_len {
        name.to_string()
    } else {
        truncate(name, max_len.saturating_sub(1))
    };
    escaped.push('_');
    escaped
}

/// Splits `name` into base and `.ext`.
///
/// A dot at position zero (dotfiles) or a trailing dot is not an extension,
/// and neither is a suffix containing whitespace or invalid characters.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            let ext = &name[idx..];
            let usable = ext[1..]
                .chars()
                .all(|c| !is_invalid_char(c) && !c.is_whitespace() && c != '.');
            if usable { (&name[..idx], ext) } else { (name, "") }
        }
        _ => (name, ""),
    }
}

fn trim_dots_and_spaces(input: &str) -> &str {
    input.trim_matches(|c| c == ' ' || c == '.')
}

fn truncate(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

fn placeholder(max_len: usize) -> String {
    trim_dots_and_spaces(&truncate(EMPTY_NAME_PLACEHOLDER, max_len.max(1))).to_string()
}
