//! Categories and industries: two lookup tables with identical behaviour.
//!
//! One set of handlers serves both; the router attaches the table via an
//! `Extension<CatalogKind>` layer on each nested router.

pub mod handlers;

/// Which lookup table a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Categories,
    Industries,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Categories => "categories",
            CatalogKind::Industries => "industries",
        }
    }

    /// Column of `message_templates` that references this table by name.
    pub fn template_column(&self) -> &'static str {
        match self {
            CatalogKind::Categories => "category",
            CatalogKind::Industries => "industry",
        }
    }

    /// Singular noun for messages, capitalized.
    pub fn noun(&self) -> &'static str {
        match self {
            CatalogKind::Categories => "Category",
            CatalogKind::Industries => "Industry",
        }
    }
}

/// Lower-cases `name` and collapses whitespace runs into `-`.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Real Estate"), "real-estate");
        assert_eq!(slugify("  Follow   Up "), "follow-up");
        assert_eq!(slugify("E-commerce"), "e-commerce");
        assert_eq!(slugify("general"), "general");
    }

    #[test]
    fn test_slugify_blank_is_empty() {
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn test_kind_maps_to_template_column() {
        assert_eq!(CatalogKind::Categories.table(), "categories");
        assert_eq!(CatalogKind::Categories.template_column(), "category");
        assert_eq!(CatalogKind::Industries.table(), "industries");
        assert_eq!(CatalogKind::Industries.template_column(), "industry");
    }
}
