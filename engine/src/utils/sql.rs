//! SQL utility functions

use regex::Regex;

/// Quote an identifier with double quotes, doubling embedded quotes
///
/// Alias paths such as `organization.owner` stay a single identifier.
///
/// # Example
///
/// ```
/// use sift_engine::utils::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("organization.owner"), "\"organization.owner\"");
/// ```
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Translate a SQL LIKE pattern into an anchored regex
///
/// `%` matches any run of characters, `_` a single character and a backslash
/// escapes the next character.
pub fn like_to_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        out.push_str("(?i)");
    }
    out.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Translate a SQL LIKE pattern into an equivalent SQLite GLOB pattern
///
/// GLOB is case-sensitive where SQLite's LIKE folds ASCII case. GLOB
/// metacharacters that are literal in the LIKE pattern become one-character
/// classes (`*` becomes `[*]`).
pub fn like_to_glob(pattern: &str) -> String {
    fn literal(out: &mut String, c: char) {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            other => out.push(other),
        }
    }

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '\\' => {
                if let Some(next) = chars.next() {
                    literal(&mut out, next);
                }
            }
            other => literal(&mut out, other),
        }
    }
    out
}
