//! Field schema inference: turns token names into form field descriptors.
//!
//! Inference is pure: the same token list always yields the same descriptors.
//! Quote templates persist the inferred list and let users override `label`,
//! `type` and `required` afterwards; message templates always use the inferred
//! defaults.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Input widget used to collect a value for one token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Textarea,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldDescriptor {
    /// Descriptor with inferred defaults for `name`.
    pub fn inferred(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label_for(name),
            field_type: FieldType::Text,
            required: true,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
}

/// Derives a human label: `customerName` → `Customer Name`, `price` → `Price`.
///
/// A space goes before every internal ASCII uppercase letter, then the first
/// character is upper-cased.
pub fn label_for(name: &str) -> String {
    let mut spaced = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }

    let mut chars = spaced.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Builds one descriptor per token, in input order.
pub fn infer<S: AsRef<str>>(tokens: &[S]) -> Vec<FieldDescriptor> {
    tokens
        .iter()
        .map(|t| FieldDescriptor::inferred(t.as_ref()))
        .collect()
}

/// Re-infers a field list after a template's content changed.
///
/// Names present in both lists keep the caller's earlier edits; new names get
/// inferred defaults; names no longer in the template are dropped. Order
/// follows `inferred`.
pub fn reconcile(
    existing: &[FieldDescriptor],
    inferred: Vec<FieldDescriptor>,
) -> Vec<FieldDescriptor> {
    let previous: HashMap<&str, &FieldDescriptor> =
        existing.iter().map(|f| (f.name.as_str(), f)).collect();

    inferred
        .into_iter()
        .map(|field| match previous.get(field.name.as_str()) {
            Some(&kept) => kept.clone(),
            None => field,
        })
        .collect()
}

/// Validates a caller-edited field list before it is persisted.
pub fn validate_fields(fields: &[FieldDescriptor]) -> Result<(), String> {
    let mut names = HashSet::new();
    for (i, field) in fields.iter().enumerate() {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(format!("Field {}: name cannot be empty", i + 1));
        }
        if name != field.name {
            return Err(format!(
                "Field {}: name '{}' has surrounding whitespace",
                i + 1,
                field.name
            ));
        }
        if name.contains('{') || name.contains('}') {
            return Err(format!("Field {}: name '{name}' cannot contain braces", i + 1));
        }
        if field.label.trim().is_empty() {
            return Err(format!("Field {}: label cannot be empty", i + 1));
        }
        if !names.insert(name) {
            return Err(format!("Duplicate field name '{name}'"));
        }
    }
    Ok(())
}
