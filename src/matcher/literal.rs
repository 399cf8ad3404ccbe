use anyhow::Result;

use super::{FlagSet, FlaggedProduct, Matcher};
use crate::db::ProductRecord;

/// Case-insensitive substring containment of a banned word in name + description.
#[derive(Debug, Default)]
pub struct LiteralMatcher;

impl LiteralMatcher {
    /// The first banned word contained in the product text, if any.
    /// `banned` must already be lowercase.
    fn first_match<'a>(product: &ProductRecord, banned: &'a [String]) -> Option<&'a str> {
        let haystack = format!(
            "{} {}",
            product.name.to_lowercase(),
            product.description.as_deref().unwrap_or_default().to_lowercase()
        );
        banned
            .iter()
            .find(|w| haystack.contains(w.as_str()))
            .map(String::as_str)
    }
}

impl Matcher for LiteralMatcher {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn flag(&self, products: &[ProductRecord], banned_words: &[String]) -> Result<FlagSet> {
        let mut flagged = FlagSet::default();
        if banned_words.is_empty() {
            println!("\nSkipping banned words check as no banned words were loaded or found.");
            return Ok(flagged);
        }

        let banned: Vec<String> = banned_words.iter().map(|w| w.to_lowercase()).collect();
        println!("\nProcessing products for banned words...");
        for p in products {
            if let Some(word) = Self::first_match(p, &banned) {
                println!(
                    "  Product ID '{}' (Name: '{}') flagged due to banned word: '{}'.",
                    p.product_id, p.name, word
                );
                flagged.insert(FlaggedProduct::from_record(p));
            }
        }
        Ok(flagged)
    }
}
