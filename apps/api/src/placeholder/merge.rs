//! Template merge engine: substitutes values for every token occurrence.
//!
//! One left-to-right pass over the text. Replacement values are never
//! re-scanned, so a value that itself contains `{{x}}` is emitted verbatim.

use std::collections::{BTreeMap, HashSet};

use regex::Captures;
use serde_json::{Map, Value};

use crate::placeholder::scanner::token_regex;
use crate::placeholder::schema::{label_for, FieldDescriptor};

/// Token name → caller-supplied value. Missing or empty entries are unresolved.
pub type ValueMap = BTreeMap<String, String>;

/// What to write in place of a token that has no value.
#[derive(Debug, Clone, Copy)]
pub enum FallbackPolicy<'a> {
    /// Leave the placeholder exactly as written. Used for live preview.
    KeepPlaceholder,
    /// Write `[Label]`, taking the label from the matching descriptor or
    /// deriving it from the token name. Used for customer-facing output.
    BracketLabel(&'a [FieldDescriptor]),
}

impl FallbackPolicy<'_> {
    fn resolve(&self, raw: &str, name: &str) -> String {
        match self {
            FallbackPolicy::KeepPlaceholder => raw.to_string(),
            FallbackPolicy::BracketLabel(fields) => {
                let label = fields
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| f.label.clone())
                    .unwrap_or_else(|| label_for(name));
                format!("[{label}]")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub text: String,
    /// Distinct token names that fell back, in first-seen order.
    pub unresolved: Vec<String>,
}

impl MergeResult {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Merges `values` into `text`, reporting which tokens were left unresolved.
pub fn merge_with_report(text: &str, values: &ValueMap, policy: FallbackPolicy<'_>) -> MergeResult {
    let mut unresolved = Vec::new();
    let mut seen = HashSet::new();

    let merged = token_regex().replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[0];
        let name = caps[1].trim();
        if name.is_empty() {
            return raw.to_string();
        }
        match values.get(name).filter(|v| !v.is_empty()) {
            Some(value) => value.clone(),
            None => {
                if seen.insert(name.to_string()) {
                    unresolved.push(name.to_string());
                }
                policy.resolve(raw, name)
            }
        }
    });

    MergeResult {
        text: merged.into_owned(),
        unresolved,
    }
}

/// Merges `values` into `text`.
pub fn merge(text: &str, values: &ValueMap, policy: FallbackPolicy<'_>) -> String {
    merge_with_report(text, values, policy).text
}

/// Flattens a loosely-typed JSON object from a request body into a `ValueMap`.
///
/// Strings pass through, numbers and booleans are stringified, arrays are
/// joined with `", "`, nulls are dropped.
pub fn values_from_json(object: &Map<String, Value>) -> ValueMap {
    object
        .iter()
        .filter_map(|(key, value)| json_to_text(value).map(|text| (key.clone(), text)))
        .collect()
}

fn json_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(json_to_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::scanner::scan;
    use crate::placeholder::schema::infer;

    fn values(pairs: &[(&str, &str)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merge_full_resolution() {
        let out = merge(
            "Hello {{name}}!",
            &values(&[("name", "Ann")]),
            FallbackPolicy::KeepPlaceholder,
        );
        assert_eq!(out, "Hello Ann!");
    }

    #[test]
    fn test_merge_partial_keeps_placeholder() {
        let out = merge(
            "{{a}} and {{b}}",
            &values(&[("a", "X")]),
            FallbackPolicy::KeepPlaceholder,
        );
        assert_eq!(out, "X and {{b}}");
    }

    #[test]
    fn test_merge_partial_bracket_uses_descriptor_label() {
        let mut fields = infer(&["a", "b"]);
        fields[1].label = "B Field".to_string();
        let out = merge(
            "{{a}} and {{b}}",
            &values(&[("a", "X")]),
            FallbackPolicy::BracketLabel(&fields),
        );
        assert_eq!(out, "X and [B Field]");
    }

    #[test]
    fn test_merge_bracket_derives_label_without_descriptor() {
        let out = merge(
            "Dear {{customerName}}",
            &ValueMap::new(),
            FallbackPolicy::BracketLabel(&[]),
        );
        assert_eq!(out, "Dear [Customer Name]");
    }

    #[test]
    fn test_merge_replaces_every_occurrence() {
        let out = merge(
            "{{x}}-{{x}}-{{x}}",
            &values(&[("x", "Z")]),
            FallbackPolicy::KeepPlaceholder,
        );
        assert_eq!(out, "Z-Z-Z");
    }

    #[test]
    fn test_merge_empty_value_is_unresolved() {
        let result = merge_with_report(
            "{{a}}",
            &values(&[("a", "")]),
            FallbackPolicy::KeepPlaceholder,
        );
        assert_eq!(result.text, "{{a}}");
        assert_eq!(result.unresolved, vec!["a"]);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_merge_untrimmed_span_resolves_and_keeps_raw_on_fallback() {
        let v = values(&[("a", "1")]);
        assert_eq!(
            merge("{{ a }}|{{  b }}", &v, FallbackPolicy::KeepPlaceholder),
            "1|{{  b }}"
        );
    }

    #[test]
    fn test_merge_does_not_expand_values_recursively() {
        let v = values(&[("a", "{{b}}"), ("b", "nope")]);
        assert_eq!(merge("{{a}}", &v, FallbackPolicy::KeepPlaceholder), "{{b}}");
    }

    #[test]
    fn test_merge_leaves_text_outside_spans_untouched() {
        let text = "{single} price: $5 {{ }} }} {{";
        assert_eq!(
            merge(text, &ValueMap::new(), FallbackPolicy::BracketLabel(&[])),
            text
        );
    }

    #[test]
    fn test_merge_empty_template() {
        assert_eq!(merge("", &ValueMap::new(), FallbackPolicy::KeepPlaceholder), "");
    }

    #[test]
    fn test_merge_reports_each_unresolved_name_once() {
        let result = merge_with_report(
            "{{a}} {{b}} {{a}} {{c}}",
            &values(&[("c", "ok")]),
            FallbackPolicy::BracketLabel(&[]),
        );
        assert_eq!(result.text, "[A] [B] [A] ok");
        assert_eq!(result.unresolved, vec!["a", "b"]);
    }

    #[test]
    fn test_round_trip_resolves_every_token() {
        let template = "Dear {{customerName}},\nquote for {{propertyName}}: {{price}}.\n{{customerName}}";
        let tokens = scan(template);
        let v: ValueMap = tokens
            .iter()
            .map(|t| (t.clone(), format!("value of {t}")))
            .collect();

        let merged = merge(template, &v, FallbackPolicy::KeepPlaceholder);
        let remaining = scan(&merged);
        assert!(
            tokens.iter().all(|t| !remaining.contains(t)),
            "all tokens must be resolved, found {remaining:?}"
        );
    }

    #[test]
    fn test_values_from_json_flattens_types() {
        let body = serde_json::json!({
            "name": "Ann",
            "qty": 3,
            "paid": false,
            "items": ["a", "b"],
            "missing": null
        });
        let map = values_from_json(body.as_object().unwrap());
        assert_eq!(map.get("name").map(String::as_str), Some("Ann"));
        assert_eq!(map.get("qty").map(String::as_str), Some("3"));
        assert_eq!(map.get("paid").map(String::as_str), Some("false"));
        assert_eq!(map.get("items").map(String::as_str), Some("a, b"));
        assert!(!map.contains_key("missing"));
    }
}
