//! Text embedding backends

use super::IndexError;
use crate::query::tokenize;

/// Trait for embedding text into vectors.
///
/// Implementations handle model loading and inference. The deterministic
/// `HashingEmbedder` is the default; fastembed sits behind the
/// `embeddings` feature.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError>;

    /// Length of every vector this embedder produces
    fn dimensions(&self) -> usize;
}

/// Feature-hashing embedder: no model, no I/O, same output on every run.
///
/// Each token and each character trigram of a token is hashed into one of
/// `dimensions` buckets with a hash-derived sign. Texts sharing vocabulary
/// or spelling land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            self.bump(&mut v, token.as_bytes(), 1.0);
            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.bump(&mut v, gram.as_bytes(), 0.5);
            }
        }
        l2_normalize(&mut v);
        v
    }

    fn bump(&self, v: &mut [f32], bytes: &[u8], weight: f32) {
        let h = fnv1a(bytes);
        let bucket = (h % self.dimensions as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// L2-normalize a vector in place.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// FastEmbedEmbedder (behind `embeddings` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, IndexError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Embedder backed by fastembed (ONNX Runtime).
    ///
    /// `TextEmbedding::embed` needs `&mut self`, hence the mutex.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel, dimensions: usize) -> Result<Self, IndexError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding =
                TextEmbedding::try_new(options).map_err(|e| IndexError::Embedding(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimensions,
            })
        }

        /// nomic-embed-text-v1.5, 768 dimensions
        pub fn default_model() -> Result<Self, IndexError> {
            Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| IndexError::Unavailable("embedding model lock poisoned".into()))?;
            let embeddings = model
                .embed(texts.to_vec(), None)
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            if embeddings.len() != texts.len() {
                return Err(IndexError::EmptyResult);
            }
            Ok(embeddings)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn output_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("federated learning on phones");
        let b = e.embed("federated learning on phones");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashingEmbedder::default();
        let query = e.embed("federated learning");
        let close = e.embed("Federated learning keeps training data on device");
        let far = e.embed("sourdough baking schedule");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let v = HashingEmbedder::new(8).embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
