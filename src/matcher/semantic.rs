use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::splitter::TextSplitter;
use super::{FlagSet, FlaggedProduct, Matcher};
use crate::db::ProductRecord;
use crate::embed::Embedder;
use crate::index::FlatIndex;

pub const DEFAULT_TOP_K: usize = 4;
const EMBED_BATCH: usize = 256;

/// A slice of one product's text, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub product_id: String,
    pub product_name: String,
    pub description: String,
}

impl Chunk {
    fn flagged(&self) -> FlaggedProduct {
        FlaggedProduct {
            product_id: self.product_id.clone(),
            name: self.product_name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Name, then a blank line and "Description: ..." when a description is present.
pub fn combined_text(p: &ProductRecord) -> String {
    match p.description.as_deref() {
        Some(d) if !d.is_empty() => format!("{}\n\nDescription: {}", p.name, d),
        _ => p.name.clone(),
    }
}

pub fn chunk_products(splitter: &TextSplitter, products: &[ProductRecord]) -> Vec<Chunk> {
    products
        .iter()
        .flat_map(|p| {
            let description = p.description.clone().unwrap_or_default();
            splitter
                .split(&combined_text(p))
                .into_iter()
                .map(move |text| Chunk {
                    text,
                    product_id: p.product_id.clone(),
                    product_name: p.name.clone(),
                    description: description.clone(),
                })
        })
        .collect()
}

/// Chunks and their embeddings. Rebuilt from scratch on every run.
pub struct ChunkIndex {
    index: FlatIndex,
    chunks: Vec<Chunk>,
}

impl ChunkIndex {
    pub fn build(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<Self> {
        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} embedding [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
                .progress_chars("#>-"),
        );

        let mut index = FlatIndex::new(embedder.dimension());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .context("Failed to embed product chunks")?;
            for v in &vectors {
                index.add(v)?;
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        info!(chunks = chunks.len(), embedder = embedder.id(), "chunk index built");
        Ok(Self { index, chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Nearest `k` chunks to `text` with their distances, closest first.
    pub fn query(&self, embedder: &dyn Embedder, text: &str, k: usize) -> Result<Vec<(&Chunk, f32)>> {
        let q = embedder
            .embed(text)
            .with_context(|| format!("Failed to embed '{}'", text))?;
        let hits = self.index.search(&q, k)?;
        Ok(hits
            .into_iter()
            .map(|h| (&self.chunks[h.position], h.distance))
            .collect())
    }
}

/// Flags the owners of the `top_k` chunks nearest to each banned word.
pub struct SemanticMatcher<'e> {
    embedder: &'e dyn Embedder,
    splitter: TextSplitter,
    top_k: usize,
    max_distance: Option<f32>,
}

impl<'e> SemanticMatcher<'e> {
    pub fn new(embedder: &'e dyn Embedder) -> Self {
        Self {
            embedder,
            splitter: TextSplitter::default(),
            top_k: DEFAULT_TOP_K,
            max_distance: None,
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Ignore neighbours farther than `d`. Unset by default: every top-k hit counts.
    pub fn with_max_distance(mut self, d: Option<f32>) -> Self {
        self.max_distance = d;
        self
    }
}

impl Matcher for SemanticMatcher<'_> {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn flag(&self, products: &[ProductRecord], banned_words: &[String]) -> Result<FlagSet> {
        let mut flagged = FlagSet::default();

        let chunks = chunk_products(&self.splitter, products);
        if chunks.is_empty() {
            println!(
                "No text generated after splitting to create embeddings. Banned word check skipped."
            );
            return Ok(flagged);
        }
        if banned_words.is_empty() {
            println!("\nSkipping banned words check as no banned words were loaded.");
            return Ok(flagged);
        }

        debug!(chunks = chunks.len(), products = products.len(), "split product text");
        let index = ChunkIndex::build(self.embedder, chunks)?;
        println!("Vector index created successfully from {} split texts.", index.len());

        println!("\nPerforming similarity search for banned words against product data...");
        for word in banned_words {
            let results: Vec<_> = self
                .query(&index, word)?
                .into_iter()
                .filter(|(_, d)| self.max_distance.map_or(true, |max| *d <= max))
                .collect();
            if results.is_empty() {
                println!("  No significant similarity found for banned word: '{}'", word);
                continue;
            }
            println!("\n--- Results for banned word: '{}' ---", word);
            for (chunk, distance) in results {
                println!("  Similar chunk: \"{}\" (Score: {:.4})", chunk.text, distance);
                println!(
                    "    Original Product ID: {}, Name: {}",
                    chunk.product_id, chunk.product_name
                );
                println!("    Description: {}", chunk.description);
                flagged.insert(chunk.flagged());
            }
        }
        Ok(flagged)
    }
}

impl SemanticMatcher<'_> {
    fn query<'i>(&self, index: &'i ChunkIndex, word: &str) -> Result<Vec<(&'i Chunk, f32)>> {
        index.query(self.embedder, word, self.top_k)
    }
}
