//! Placeholder scanning: finds `{{name}}` tokens in free text.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// `{{` followed by a run of non-`}` characters followed by `}}`.
/// The body may contain `{` but never `}`.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("token pattern is valid"));

/// One occurrence of a placeholder in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan<'a> {
    /// The exact span as written, braces and inner whitespace included.
    pub raw: &'a str,
    /// The trimmed token name.
    pub name: &'a str,
    pub range: Range<usize>,
}

/// Returns every placeholder occurrence in `text`, in order of appearance.
///
/// Spans whose body is blank after trimming (`{{   }}`) are not tokens and are skipped.
pub fn scan_spans(text: &str) -> Vec<TokenSpan<'_>> {
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().trim();
            if name.is_empty() {
                return None;
            }
            Some(TokenSpan {
                raw: whole.as_str(),
                name,
                range: whole.range(),
            })
        })
        .collect()
}

/// Returns the distinct token names in `text`, first-seen order preserved.
pub fn scan(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    scan_spans(text)
        .into_iter()
        .filter(|span| seen.insert(span.name))
        .map(|span| span.name.to_string())
        .collect()
}

/// Total on any input; exposed so the merge engine shares the exact pattern.
pub(crate) fn token_regex() -> &'static Regex {
    &TOKEN_RE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_dedups_and_keeps_first_seen_order() {
        assert_eq!(scan("Hi {{a}}, {{b}}, {{a}} again"), vec!["a", "b"]);
    }

    #[test]
    fn test_scan_no_tokens() {
        assert!(scan("plain text, no tokens").is_empty());
    }

    #[test]
    fn test_scan_empty_input() {
        assert!(scan("").is_empty());
    }

    #[test]
    fn test_scan_trims_inner_whitespace() {
        assert_eq!(scan("{{ customerName }} and {{customerName}}"), vec!["customerName"]);
    }

    #[test]
    fn test_scan_is_case_sensitive() {
        assert_eq!(scan("{{Name}} {{name}}"), vec!["Name", "name"]);
    }

    #[test]
    fn test_scan_ignores_blank_body() {
        assert!(scan("{{   }} and {{}}").is_empty());
    }

    #[test]
    fn test_scan_malformed_braces_are_not_tokens() {
        assert_eq!(scan("{single} {{unclosed and closed}} }"), vec!["unclosed and closed"]);
        assert!(scan("{{open only").is_empty());
        assert!(scan("close only}}").is_empty());
    }

    #[test]
    fn test_scan_body_may_contain_open_brace() {
        assert_eq!(scan("{{{a}}"), vec!["{a"]);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let text = "Dear {{customerName}}, price {{price}} valid {{validDays}} days";
        assert_eq!(scan(text), scan(text));
    }

    #[test]
    fn test_scan_spans_keep_raw_text_and_ranges() {
        let text = "x {{ a }} y {{b}}";
        let spans = scan_spans(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].raw, "{{ a }}");
        assert_eq!(spans[0].name, "a");
        assert_eq!(&text[spans[0].range.clone()], "{{ a }}");
        assert_eq!(spans[1].raw, "{{b}}");
    }

    #[test]
    fn test_scan_handles_multiline_templates() {
        let text = "Hello {{customerName}}!\n\nI'm {{salesName}}.\n{{customerName}}";
        assert_eq!(scan(text), vec!["customerName", "salesName"]);
    }
}
