//! Distance and similarity primitives shared by the LSH index and k-means.
//!
//! All functions assume both operands have the same dimension. A mismatch is
//! a programming error and is only caught by debug assertions.

/// Epsilon below which a magnitude is treated as zero.
const EPSILON: f32 = 1e-10;

/// Computes the dot product of two vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Computes the L2 norm of a vector.
#[inline]
pub fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalizes a vector in-place to unit length.
///
/// A zero (or near-zero) vector is left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = magnitude(vector);
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates a normalized copy of a vector.
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut copy = vector.to_vec();
    normalize(&mut copy);
    copy
}

/// Computes cosine similarity between two vectors.
///
/// # Returns
/// * Cosine similarity in range [-1, 1], or 0.0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let norm_a = magnitude(a);
    let norm_b = magnitude(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        // Rounding can push the quotient a hair past the unit interval.
        (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Sum of squared coordinate differences.
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Euclidean distance between two optional vectors.
///
/// Returns `f32::INFINITY` when either side is absent, so a missing vector
/// never looks closer than a present one.
pub fn euclidean_distance(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => distance(a, b),
        _ => f32::INFINITY,
    }
}

/// Euclidean distance between two vectors.
#[inline]
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}
