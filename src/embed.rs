use std::fmt;
use std::path::Path;

use rayon::prelude::*;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// MiniLM output width; the hash embedder matches it.
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, thiserror::Error)]
#[cfg_attr(not(feature = "fastembed"), allow(dead_code))]
pub enum EmbedError {
    #[error("embedding model failed to load: {0}")]
    ModelLoad(String),
    #[error("embedding failed: {0}")]
    Inference(String),
    #[error("embedder '{0}' is not available in this build (enable the `fastembed` feature)")]
    Unavailable(&'static str),
}

/// Implementations return L2-normalized vectors.
pub trait Embedder: Send + Sync {
    fn id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.par_iter().map(|t| self.embed(t)).collect()
    }
}

/// Where inference runs. Purely a throughput concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn detect() -> Self {
        let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
        Self::select(Path::new("/dev/nvidia0").exists(), visible.as_deref())
    }

    /// Prefer CUDA when a GPU node exists, unless it is hidden explicitly.
    pub fn select(gpu_present: bool, cuda_visible_devices: Option<&str>) -> Self {
        match cuda_visible_devices.map(str::trim) {
            Some("") | Some("-1") => Device::Cpu,
            _ if gpu_present => Device::Cuda,
            _ => Device::Cpu,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cuda => write!(f, "cuda"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if !norm_sq.is_finite() || norm_sq < f32::EPSILON {
        v.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    let inv = 1.0 / norm_sq.sqrt();
    v.iter_mut().for_each(|x| *x *= inv);
}

// ── Hash embedder ──

/// Feature-hashing embedder: lowercase alphanumeric tokens, each hashed with
/// FNV-1a into one signed dimension. Lexical, not semantic, but needs no model
/// files and is deterministic.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be > 0");
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        "fnv1a-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut v = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let idx = (hash % self.dimension as u64) as usize;
            v[idx] += if hash >> 63 == 1 { 1.0 } else { -1.0 };
        }
        l2_normalize(&mut v);
        Ok(v)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

// ── MiniLM (fastembed) ──

#[cfg(feature = "fastembed")]
mod minilm {
    use std::sync::Mutex;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tracing::info;

    use super::{l2_normalize, Device, EmbedError, Embedder, DEFAULT_DIMENSION};

    /// `sentence-transformers/all-MiniLM-L6-v2` through ONNX Runtime.
    pub struct MiniLmEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl MiniLmEmbedder {
        pub fn load(device: Device) -> Result<Self, EmbedError> {
            #[allow(unused_mut)]
            let mut options =
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true);
            #[cfg(feature = "cuda")]
            if device == Device::Cuda {
                use ort::execution_providers::CUDAExecutionProvider;
                options =
                    options.with_execution_providers(vec![CUDAExecutionProvider::default().build()]);
            }
            info!(%device, "loading all-MiniLM-L6-v2");
            let model = TextEmbedding::try_new(options)
                .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }

        fn run(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbedError> {
            let model = self
                .model
                .lock()
                .map_err(|_| EmbedError::Inference("model lock poisoned".into()))?;
            let mut out = model
                .embed(texts, None)
                .map_err(|e| EmbedError::Inference(e.to_string()))?;
            out.iter_mut().for_each(|v| l2_normalize(v));
            Ok(out)
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn id(&self) -> &str {
            "all-MiniLM-L6-v2"
        }

        fn dimension(&self) -> usize {
            DEFAULT_DIMENSION
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.run(vec![text])?
                .pop()
                .ok_or_else(|| EmbedError::Inference("empty model output".into()))
        }

        // ONNX batches internally; one call instead of a rayon fan-out.
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.run(texts.to_vec())
        }
    }
}

#[cfg(feature = "fastembed")]
pub use minilm::MiniLmEmbedder;

/// Embedders selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedderKind {
    Hash,
    Minilm,
}

pub fn build(kind: EmbedderKind, device: Device) -> Result<Box<dyn Embedder>, EmbedError> {
    match kind {
        EmbedderKind::Hash => Ok(Box::new(HashEmbedder::default())),
        #[cfg(feature = "fastembed")]
        EmbedderKind::Minilm => Ok(Box::new(MiniLmEmbedder::load(device)?)),
        #[cfg(not(feature = "fastembed"))]
        EmbedderKind::Minilm => {
            let _ = device;
            Err(EmbedError::Unavailable("minilm"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hash_vectors_are_normalized() {
        let e = HashEmbedder::default();
        let v = e.embed("Acme Widget contains lead paint").unwrap();
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_is_case_insensitive_and_deterministic() {
        let e = HashEmbedder::default();
        assert_eq!(e.embed("LEAD Paint").unwrap(), e.embed("lead paint").unwrap());
    }

    #[test]
    fn shared_tokens_score_higher() {
        let e = HashEmbedder::default();
        let q = e.embed("lead").unwrap();
        let hit = e.embed("contains lead paint").unwrap();
        let miss = e.embed("organic cotton towel").unwrap();
        assert!(dot(&q, &hit) > dot(&q, &miss));
    }

    #[test]
    fn text_without_tokens_is_zero_vector() {
        let v = HashEmbedder::new(8).embed("  !! ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn batch_matches_single() {
        let e = HashEmbedder::new(32);
        let batch = e.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(batch[1], e.embed("two").unwrap());
    }

    #[test]
    fn device_selection() {
        assert_eq!(Device::select(true, None), Device::Cuda);
        assert_eq!(Device::select(true, Some("-1")), Device::Cpu);
        assert_eq!(Device::select(true, Some("")), Device::Cpu);
        assert_eq!(Device::select(false, Some("0")), Device::Cpu);
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn minilm_needs_feature() {
        assert!(matches!(
            build(EmbedderKind::Minilm, Device::Cpu),
            Err(EmbedError::Unavailable(_))
        ));
    }
}
