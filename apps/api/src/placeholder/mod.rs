// Placeholder engine shared by message templates and quote templates.
// scan → infer builds the form schema; merge resolves tokens for preview and export.
// Everything here is pure and total over strings: no I/O, no shared state.

pub mod merge;
pub mod scanner;
pub mod schema;

pub use merge::{merge, merge_with_report, values_from_json, FallbackPolicy, MergeResult, ValueMap};
pub use scanner::{scan, scan_spans};
pub use schema::{infer, label_for, reconcile, validate_fields, FieldDescriptor, FieldType};
