//! Value filters used by the templates.

/// JSON string literal, which is also a valid double-quoted YAML scalar.
pub fn json_encode(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// POSIX shell quoting. Safe words pass through unchanged.
pub fn shell_quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

/// Indent every non-empty line of `block` by `spaces`.
pub fn indent(block: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    block
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_passes_safe_words() {
        assert_eq!(shell_quote("http://localhost:5005"), "http://localhost:5005");
        assert_eq!(shell_quote("LOG_LEVEL"), "LOG_LEVEL");
    }

    #[test]
    fn shell_quote_wraps_unsafe_values() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote("a;rm -rf /"), "'a;rm -rf /'");
    }

    #[test]
    fn json_encode_escapes_quotes() {
        assert_eq!(json_encode(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a: 1\n\nb: 2", 2), "  a: 1\n\n  b: 2");
    }
}
