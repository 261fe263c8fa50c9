//! Message templates and messages saved from them.

pub mod saved;
pub mod templates;

use serde::{Deserialize, Serialize};

/// What a message generation writes for a token that has no value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Leave `{{name}}` in place.
    #[default]
    Keep,
    /// Write `[Label]`.
    Bracket,
}
