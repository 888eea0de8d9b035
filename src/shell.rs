//! Shell quoting for command lines sent into the guest.

/// Escape single quotes within a string for use inside a single-quoted shell argument.
///
/// The caller is responsible for wrapping the result in single quotes.
fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Escape text for use between double quotes: `\`, `"`, `$` and `` ` ``
/// lose their special meaning, everything else is already literal there.
pub fn escape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_safe(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote a string for safe use as a single shell word.
///
/// Returns the string unchanged if every character is safe, otherwise wraps
/// it in single quotes. Empty strings become `''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe) {
        s.to_string()
    } else {
        format!("'{}'", escape_single_quotes(s))
    }
}

/// Quote each word and join them with spaces.
pub fn quote_command<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
