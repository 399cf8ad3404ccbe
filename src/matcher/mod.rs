pub mod literal;
pub mod semantic;
pub mod splitter;

use std::collections::BTreeMap;

use anyhow::Result;

use crate::db::{ProductRecord, QuarantineRow};

pub use literal::LiteralMatcher;
pub use semantic::SemanticMatcher;

/// A product that matched at least one banned word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedProduct {
    pub product_id: String,
    pub name: String,
    /// Empty when the product has no description.
    pub description: String,
}

impl FlaggedProduct {
    pub fn from_record(p: &ProductRecord) -> Self {
        Self {
            product_id: p.product_id.clone(),
            name: p.name.clone(),
            description: p.description.clone().unwrap_or_default(),
        }
    }

    /// The redacted form written to the quarantine table.
    pub fn to_quarantine_row(&self) -> QuarantineRow {
        QuarantineRow {
            product_id: self.product_id.clone(),
            description: self.description.clone(),
        }
    }
}

/// Flagged products keyed by product_id; a product is held at most once no
/// matter how many words or chunks matched it.
#[derive(Debug, Default, Clone)]
pub struct FlagSet {
    by_id: BTreeMap<String, FlaggedProduct>,
}

impl FlagSet {
    /// Returns false when the product was already flagged.
    pub fn insert(&mut self, product: FlaggedProduct) -> bool {
        if self.by_id.contains_key(&product.product_id) {
            return false;
        }
        self.by_id.insert(product.product_id.clone(), product);
        true
    }

    #[cfg(test)]
    pub fn contains(&self, product_id: &str) -> bool {
        self.by_id.contains_key(product_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlaggedProduct> {
        self.by_id.values()
    }
}

/// Decides which products contain banned content.
pub trait Matcher {
    fn name(&self) -> &'static str;

    fn flag(&self, products: &[ProductRecord], banned_words: &[String]) -> Result<FlagSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    Literal,
    Semantic,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flagged(id: &str) -> FlaggedProduct {
        FlaggedProduct {
            product_id: id.to_string(),
            name: format!("name {}", id),
            description: String::new(),
        }
    }

    #[test]
    fn flag_set_dedups_by_product_id() {
        let mut set = FlagSet::default();
        assert!(set.insert(flagged("B")));
        assert!(set.insert(flagged("A")));
        assert!(!set.insert(flagged("B")));
        assert_eq!(set.len(), 2);
        let ids: Vec<&str> = set.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn missing_description_becomes_empty() {
        let p = ProductRecord {
            product_id: "P".into(),
            name: "Thing".into(),
            description: None,
        };
        let f = FlaggedProduct::from_record(&p);
        assert_eq!(f.description, "");
        assert_eq!(f.to_quarantine_row().product_id, "P");
    }
}
