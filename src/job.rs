use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::banned;
use crate::db::Store;
use crate::embed::{self, Device, EmbedderKind};
use crate::matcher::{LiteralMatcher, Matcher, SemanticMatcher, Strategy};
use crate::recorder::{self, CommitReport};

pub struct ScanOptions {
    pub strategy: Strategy,
    pub banned_words: PathBuf,
    pub top_k: usize,
    pub max_distance: Option<f32>,
    pub embedder: EmbedderKind,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub products: usize,
    pub banned_words: usize,
    pub flagged: usize,
    pub committed: CommitReport,
}

impl ScanReport {
    pub fn print(&self) {
        println!(
            "\nScanned {} products against {} banned words: {} flagged, {} quarantined, {} already quarantined.",
            self.products,
            self.banned_words,
            self.flagged,
            self.committed.inserted,
            self.committed.skipped,
        );
    }
}

/// Build the matcher `opts` asks for and run the scan.
pub async fn run(store: &dyn Store, opts: &ScanOptions) -> Result<ScanReport> {
    match opts.strategy {
        Strategy::Literal => scan(store, &LiteralMatcher, opts).await,
        Strategy::Semantic => {
            let device = Device::detect();
            info!(%device, embedder = ?opts.embedder, "preparing embedder");
            let embedder = embed::build(opts.embedder, device)?;
            let matcher = SemanticMatcher::new(embedder.as_ref())
                .with_top_k(opts.top_k)
                .with_max_distance(opts.max_distance);
            scan(store, &matcher, opts).await
        }
    }
}

/// Provision, read, match, record. Reads finish before the write transaction opens.
pub async fn scan(
    store: &dyn Store,
    matcher: &dyn Matcher,
    opts: &ScanOptions,
) -> Result<ScanReport> {
    store.init_schema().await.context("Failed to provision schema")?;

    let products = store
        .fetch_products()
        .await
        .context("Failed to read products")?;
    let mut report = ScanReport {
        products: products.len(),
        ..Default::default()
    };
    if products.is_empty() {
        println!("No products found in the database. Banned word check and insertion skipped.");
        return Ok(report);
    }
    info!(products = products.len(), matcher = matcher.name(), "loaded products");

    let words = banned::load(&opts.banned_words)?;
    report.banned_words = words.len();

    let flagged = matcher.flag(&products, &words)?;
    report.flagged = flagged.len();
    if flagged.is_empty() {
        println!("\nNo products were flagged for insertion into 'filtered_products' based on banned word check.");
        return Ok(report);
    }

    if opts.dry_run {
        println!("\nDry run: {} product(s) would be quarantined:", flagged.len());
        for p in flagged.iter() {
            println!("  {} ({})", p.product_id, p.name);
        }
        return Ok(report);
    }

    report.committed = recorder::commit(store, &flagged).await?;
    Ok(report)
}
