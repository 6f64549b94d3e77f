//! Platform Module
//!
//! Identifier and value quoting conventions of SQL Anywhere, used when SQL
//! text is assembled outside of parameter binding.

use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

/// Bytes written as `\xhh` inside a quoted value.
static CONTROL_BYTES: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?-u)[\x00-\x1F\x7F-\xFF]").expect("control byte pattern is valid"));

/// Separators of a SQL fragment.
static FRAGMENT_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.\s\W]").expect("fragment delimiter pattern is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Platform;

impl Platform {
    pub fn new() -> Self {
        Platform
    }

    pub fn name(&self) -> &'static str {
        "SqlAnywhere"
    }

    pub fn quote_identifier_symbol(&self) -> &'static str {
        "\""
    }

    /// `"name"`, with embedded double quotes backslash-escaped.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", escape_identifier(identifier))
    }

    /// `"owner"."table"."column"`
    pub fn quote_identifier_chain(&self, chain: &[&str]) -> String {
        let parts: Vec<String> = chain.iter().map(|part| escape_identifier(part)).collect();
        format!("\"{}\"", parts.join("\".\""))
    }

    pub fn quote_value_symbol(&self) -> &'static str {
        "'"
    }

    /// Quotes a literal: `'` and `\` are doubled, control and non-ASCII bytes
    /// become `\xhh`.
    pub fn quote_value(&self, value: &str) -> String {
        let doubled = value.replace('\'', "''").replace('\\', "\\\\");
        let escaped = CONTROL_BYTES.replace_all(doubled.as_bytes(), |caps: &regex::bytes::Captures| {
            format!("\\x{:02x}", caps[0][0]).into_bytes()
        });
        format!("'{}'", String::from_utf8_lossy(&escaped))
    }

    pub fn quote_trusted_value(&self, value: &str) -> String {
        self.quote_value(value)
    }

    /// Quoted values joined with `, `.
    pub fn quote_value_list(&self, values: &[&str]) -> String {
        values
            .iter()
            .map(|value| self.quote_value(value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn identifier_separator(&self) -> &'static str {
        "."
    }

    /// Quotes every identifier-like token of `fragment`.
    ///
    /// Spaces, dots, `*`, the `AS` keyword in any case and the given safe
    /// words (case-insensitive) are left as they are.
    pub fn quote_identifier_in_fragment(&self, fragment: &str, safe_words: &[&str]) -> String {
        let safe: Vec<String> = safe_words.iter().map(|w| w.to_lowercase()).collect();

        split_keeping_delimiters(fragment)
            .into_iter()
            .map(|part| {
                let untouched = matches!(part, " " | "." | "*")
                    || part.eq_ignore_ascii_case("as")
                    || safe.contains(&part.to_lowercase());
                if untouched {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect()
    }
}

fn escape_identifier(identifier: &str) -> String {
    identifier.replace('"', "\\\"")
}

/// Splits on single-character delimiters, keeping each delimiter as its own
/// part and dropping empty parts.
fn split_keeping_delimiters(fragment: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut last = 0;
    for delimiter in FRAGMENT_DELIMITER.find_iter(fragment) {
        if delimiter.start() > last {
            parts.push(&fragment[last..delimiter.start()]);
        }
        parts.push(delimiter.as_str());
        last = delimiter.end();
    }
    if last < fragment.len() {
        parts.push(&fragment[last..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        let platform = Platform::new();
        assert_eq!(platform.quote_identifier("users"), "\"users\"");
        assert_eq!(platform.quote_identifier("a\"b"), "\"a\\\"b\"");
        assert_eq!(
            platform.quote_identifier_chain(&["dba", "users", "id"]),
            "\"dba\".\"users\".\"id\""
        );
        assert_eq!(platform.quote_identifier_chain(&["users"]), "\"users\"");
    }

    #[test]
    fn test_quote_value() {
        let platform = Platform::new();
        assert_eq!(platform.quote_value("plain"), "'plain'");
        assert_eq!(platform.quote_value("O'Brien"), "'O''Brien'");
        assert_eq!(platform.quote_value("C:\\tmp"), "'C:\\\\tmp'");
        assert_eq!(platform.quote_value("a\nb\0"), "'a\\x0ab\\x00'");
        assert_eq!(platform.quote_value("é"), "'\\xc3\\xa9'");
        assert_eq!(platform.quote_trusted_value("x"), "'x'");
    }

    #[test]
    fn test_quote_value_list() {
        let platform = Platform::new();
        assert_eq!(platform.quote_value_list(&["a", "b'c"]), "'a', 'b''c'");
        assert_eq!(platform.quote_value_list(&[]), "");
    }

    #[test]
    fn test_quote_identifier_in_fragment() {
        let platform = Platform::new();
        assert_eq!(
            platform.quote_identifier_in_fragment("t.id AS user_id", &[]),
            "\"t\".\"id\" AS \"user_id\""
        );
        assert_eq!(platform.quote_identifier_in_fragment("t.*", &[]), "\"t\".*");
        assert_eq!(
            platform.quote_identifier_in_fragment("a as b", &[]),
            "\"a\" as \"b\""
        );
        assert_eq!(
            platform.quote_identifier_in_fragment("COUNT(id) DESC", &["count", "desc"]),
            "COUNT\"(\"\"id\"\")\" DESC"
        );
    }

    #[test]
    fn test_symbols() {
        let platform = Platform::new();
        assert_eq!(platform.name(), "SqlAnywhere");
        assert_eq!(platform.quote_identifier_symbol(), "\"");
        assert_eq!(platform.quote_value_symbol(), "'");
        assert_eq!(platform.identifier_separator(), ".");
    }
}
