//! Embedding seam and vector utilities.
//!
//! [`Embedder`] is the trait every embedding backend implements; the
//! concrete providers (fastembed, OpenAI, disabled) live in the
//! application crate. Vectors handed back by an embedder are unit-length
//! (`‖v‖₂ = 1`), which is what lets similarity scoring use a plain dot
//! product everywhere else in the pipeline.

use async_trait::async_trait;

use crate::error::Result;

/// An embedding backend producing fixed-dimension unit vectors.
///
/// Implementations load their model once and are idempotent to repeat
/// initialization. Failure to initialize or infer surfaces
/// [`Error::ModelUnavailable`](crate::error::Error::ModelUnavailable) —
/// callers never proceed with zero vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text span into a vector of [`dims`](Embedder::dims)
    /// dimensions, mean-pooled and L2-normalized.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, one vector per input in order. The default
    /// implementation embeds serially; backends with a batched path
    /// override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Vector dimensionality the backend produces.
    fn dims(&self) -> usize;

    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two vectors; `0.0` on length mismatch or empty input.
///
/// For unit-normalized vectors this equals their cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two vectors of any magnitude.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors,
/// mismatched lengths, or zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes) for
/// storage backends.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_norm() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn dot_equals_cosine_for_unit_vectors() {
        let mut a = vec![1.0f32, 2.0, 3.0];
        let mut b = vec![-2.0f32, 0.5, 1.0];
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        assert!((dot(&a, &b) - cosine_similarity(&a, &b)).abs() < 1e-6);
    }

    #[test]
    fn dot_zero_on_length_mismatch() {
        assert_eq!(dot(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(dot(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn blob_round_trip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }
}
