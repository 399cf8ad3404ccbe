mod banned;
mod db;
mod embed;
mod index;
mod job;
mod matcher;
mod recorder;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use embed::EmbedderKind;
use matcher::semantic::DEFAULT_TOP_K;
use matcher::Strategy;

#[derive(Parser)]
#[command(
    name = "product_quarantine",
    about = "Scan product records for banned words and quarantine offenders"
)]
struct Cli {
    /// Connection string (overrides DATABASE_URL and the DB_* variables)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the companies, products and filtered_products tables if absent
    Init,
    /// Flag products containing banned words and record them in filtered_products
    Scan {
        /// How a banned word is detected in product text
        #[arg(short, long, value_enum, default_value = "literal")]
        strategy: Strategy,
        /// Newline-delimited banned word list
        #[arg(short, long, default_value = banned::DEFAULT_PATH)]
        banned_words: PathBuf,
        /// Nearest chunks flagged per banned word (semantic)
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Ignore neighbours farther than this squared distance (semantic)
        #[arg(long)]
        max_distance: Option<f32>,
        /// Embedding backend (semantic)
        #[arg(long, value_enum, default_value = "hash")]
        embedder: EmbedderKind,
        /// Print what would be quarantined without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List quarantined products
    Quarantine {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show table counts
    Stats,
    /// Delete a company together with its products
    DeleteCompany {
        /// Company id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let settings = settings::Settings::load()?;
    let url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.connection_url());
    let store = db::open(&url)?;
    tracing::debug!(backend = store.backend(), "store opened");

    let result = match cli.command {
        Commands::Init => {
            store.init_schema().await?;
            println!("Schema ready ({}).", store.backend());
            Ok(())
        }
        Commands::Scan {
            strategy,
            banned_words,
            top_k,
            max_distance,
            embedder,
            dry_run,
        } => {
            let opts = job::ScanOptions {
                strategy,
                banned_words,
                top_k,
                max_distance,
                embedder,
                dry_run,
            };
            let report = job::run(store.as_ref(), &opts).await?;
            report.print();
            Ok(())
        }
        Commands::Quarantine { limit } => {
            store.init_schema().await?;
            let rows = store.fetch_quarantine(Some(limit)).await?;
            if rows.is_empty() {
                println!("No quarantined products.");
                return Ok(());
            }
            println!(
                "{:>6} | {:<24} | {:<10} | {}",
                "id", "product_id", "name", "description"
            );
            println!("{}", "-".repeat(90));
            for r in &rows {
                let name = if r.name.is_empty() { "(redacted)" } else { r.name.as_str() };
                println!(
                    "{:>6} | {:<24} | {:<10} | {}",
                    r.id,
                    truncate(r.product_id.as_deref().unwrap_or("-"), 24),
                    truncate(name, 10),
                    truncate(r.description.as_deref().unwrap_or(""), 44),
                );
            }
            println!("\n{} rows", rows.len());
            Ok(())
        }
        Commands::Stats => {
            store.init_schema().await?;
            let s = store.stats().await?;
            println!("Companies:   {}", s.companies);
            println!("Products:    {}", s.products);
            println!("Quarantined: {}", s.quarantined);
            Ok(())
        }
        Commands::DeleteCompany { id } => {
            store.init_schema().await?;
            match store.delete_company(id).await? {
                Some(n) => println!("Deleted company {} and {} product(s).", id, n),
                None => println!("No company with id {}.", id),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1?}", elapsed);
    }

    result
}

/// Cut to `max` chars, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_defaults() {
        let cli = Cli::parse_from(["product_quarantine", "scan"]);
        match cli.command {
            Commands::Scan {
                strategy,
                banned_words,
                top_k,
                embedder,
                dry_run,
                ..
            } => {
                assert_eq!(strategy, Strategy::Literal);
                assert_eq!(banned_words, PathBuf::from("banned_words.txt"));
                assert_eq!(top_k, 4);
                assert_eq!(embedder, EmbedderKind::Hash);
                assert!(!dry_run);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
