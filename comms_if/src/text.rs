//! # Text helpers
//!
//! The payloads on the bus are flat comma separated strings. Values may be quoted with `'` or `"`
//! so that they can themselves contain the separator, as in `spd_gains='0.5,0.2,0'`.

/// Split `s` on `sep`, ignoring separators inside single or double quotes.
///
/// Empty segments (after trimming) are dropped. Quotes are kept in the output so that the caller
/// can decide how to interpret them, see [`unquote`].
pub fn split_quoted(s: &str, sep: char) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == sep => {
                push_segment(&mut segments, &current);
                current.clear();
            }
            None => current.push(c),
        }
    }
    push_segment(&mut segments, &current);

    segments
}

/// Remove one matching pair of surrounding quotes, if present, and trim whitespace.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in &['\'', '"'] {
        if s.len() >= 2 && s.starts_with(*q) && s.ends_with(*q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Remove one surrounding pair of curly braces, if present, and trim whitespace.
pub fn strip_braces(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix('{').unwrap_or(s);
    s.strip_suffix('}').unwrap_or(s)
}

fn push_segment(segments: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}
