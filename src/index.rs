use anyhow::{bail, Result};
use rayon::prelude::*;

/// Entry count above which distance scans fan out over rayon.
const PARALLEL_THRESHOLD: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Insertion position of the matched vector.
    pub position: usize,
    /// Squared Euclidean distance; lower is closer.
    pub distance: f32,
}

/// Exact nearest-neighbour index over a flat, row-major vector buffer.
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            bail!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            );
        }
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    /// The `k` closest vectors, nearest first. Returns every entry when the
    /// index holds fewer than `k`. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            bail!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimension
            );
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let score = |(position, row): (usize, &[f32])| Hit {
            position,
            distance: squared_l2(row, query),
        };
        let mut hits: Vec<Hit> = if self.len() >= PARALLEL_THRESHOLD {
            self.data
                .par_chunks_exact(self.dimension)
                .enumerate()
                .map(score)
                .collect()
        } else {
            self.data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(score)
                .collect()
        };

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
