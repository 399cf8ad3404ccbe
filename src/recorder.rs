use anyhow::{Context, Result};
use tracing::info;

use crate::db::{QuarantineOutcome, QuarantineRow, Store};
use crate::matcher::FlagSet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Write every flagged product to the quarantine table with its name redacted.
/// Products already quarantined are skipped. One transaction for the whole set.
pub async fn commit(store: &dyn Store, flagged: &FlagSet) -> Result<CommitReport> {
    let mut report = CommitReport::default();
    if flagged.is_empty() {
        return Ok(report);
    }

    println!(
        "\nAttempting to insert {} unique flagged product(s) into 'filtered_products' table...",
        flagged.len()
    );
    let rows: Vec<QuarantineRow> = flagged.iter().map(|p| p.to_quarantine_row()).collect();
    let outcomes = store
        .quarantine(&rows)
        .await
        .context("Failed to write quarantine rows")?;

    for (product, outcome) in flagged.iter().zip(outcomes) {
        match outcome {
            QuarantineOutcome::Inserted => {
                report.inserted += 1;
                println!(
                    "  Flagged product ID '{}' (Original Name: '{}') inserted into 'filtered_products' with name removed.",
                    product.product_id, product.name
                );
            }
            QuarantineOutcome::AlreadyQuarantined => {
                report.skipped += 1;
                println!(
                    "  Product with ID '{}' (Original Name: '{}') already exists in 'filtered_products'. Skipping.",
                    product.product_id, product.name
                );
            }
        }
    }

    if report.inserted > 0 {
        println!(
            "Successfully inserted {} new product(s) into 'filtered_products' table (with names removed).",
            report.inserted
        );
    } else {
        println!("No new products were inserted into 'filtered_products' table (all were duplicates).");
    }
    info!(inserted = report.inserted, skipped = report.skipped, "quarantine committed");
    Ok(report)
}
