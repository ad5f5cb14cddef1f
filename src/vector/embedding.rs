//! Embedding generation for node text.
//!
//! This module provides the trait and the default implementation for turning
//! text into fixed-dimension vectors. The default generator is a content-addressed
//! feature map derived from an FNV-1a hash of the text: no model is trained or
//! loaded, and identical text always produces a bit-identical vector.
//!
//! # Algorithm
//! 1. 32-bit FNV-1a over the input bytes
//! 2. Coordinate `j` takes 8 bits of the hash starting at bit `j % 32`,
//!    mapped from `[0, 255]` to `[-1, 1]`
//! 3. The first `min(len, D)` coordinates get a per-byte perturbation
//!    `(byte - 128) / 128`
//! 4. L2 normalization (a zero vector stays zero)

use crate::vector::math::normalize;
use crate::vector::{Node, VectorDimension, VectorError};

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Maximum number of bytes of node text fed to the embedding.
pub const NODE_TEXT_LIMIT: usize = 1024;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Computes the 32-bit FNV-1a hash of `bytes`.
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Writes the embedding of `text` into `out`.
///
/// The dimension is taken from `out.len()` and must equal `expected`.
///
/// # Errors
/// * `VectorError::EmptyText` if `text` is empty
/// * `VectorError::DimensionMismatch` if `out` does not have `expected` slots
pub fn embed(text: &str, expected: VectorDimension, out: &mut [f32]) -> Result<(), VectorError> {
    if text.is_empty() {
        return Err(VectorError::EmptyText);
    }
    expected.validate_vector(out)?;

    let bytes = text.as_bytes();
    let hash = fnv1a_32(bytes);

    for (j, value) in out.iter_mut().enumerate() {
        let byte = (hash >> (j % 32)) & 0xFF;
        *value = byte as f32 / 127.5 - 1.0;
    }

    for (value, &byte) in out.iter_mut().zip(bytes.iter()) {
        *value += (f32::from(byte) - 128.0) / 128.0;
    }

    normalize(out);
    Ok(())
}

/// Builds the text a node is embedded from.
///
/// Joins the non-empty parts of the node's name and payload with a single
/// space and truncates the result to [`NODE_TEXT_LIMIT`] bytes on a char
/// boundary.
#[must_use]
pub fn create_node_text(node: &Node) -> String {
    let mut text = match (node.name.is_empty(), node.data.is_empty()) {
        (false, false) => format!("{} {}", node.name, node.data),
        (false, true) => node.name.clone(),
        (true, false) => node.data.clone(),
        (true, true) => String::new(),
    };

    if text.len() > NODE_TEXT_LIMIT {
        let mut cut = NODE_TEXT_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Deterministic hash-derived embedding generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbeddingGenerator {
    dimension: VectorDimension,
}

impl Default for HashEmbeddingGenerator {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_128())
    }
}

impl HashEmbeddingGenerator {
    /// Create a generator producing vectors of `dimension` coordinates.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    /// Embed a single text.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut out = vec![0.0; self.dimension.get()];
        embed(text, self.dimension, &mut out)?;
        Ok(out)
    }

    /// Embed a node from its name and payload.
    pub fn embed_node(&self, node: &Node) -> Result<Vec<f32>, VectorError> {
        self.embed(&create_node_text(node))
    }
}

impl EmbeddingGenerator for HashEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
