//! Random-hyperplane locality-sensitive hashing.
//!
//! Each hash function is a random projection vector plus a random offset.
//! A vector hashes to `floor((dot(v, p) + offset) * 1e6)` and lands in bucket
//! `hash mod bucket_count`. Vectors that are close in angle are more likely to
//! collide on a given function, which makes bucket scans a cheap candidate
//! generator. Candidates carry a placeholder score; exact ranking is the
//! caller's job.
//!
//! # Matching
//! A stored entry matches a query when, for some function `i`, the entry's hash
//! for function `i` equals the query's hash for function `i`. An identical
//! vector therefore always matches itself.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::vector::math::dot;
use crate::vector::{VectorDimension, VectorError, VectorSlot};

/// Upper bound on hash functions per entry.
pub const MAX_HASH_FUNCTIONS: usize = 8;

/// Default number of positions a bucket can hold.
pub const DEFAULT_BUCKET_CAPACITY: usize = 100;

/// Maximum number of candidates a single search returns.
pub const MAX_LSH_RESULTS: usize = 1000;

/// Quantization applied to projections before flooring.
const HASH_SCALE: f32 = 1e6;

/// What to do when a bucket is already full on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketOverflow {
    /// Store the entry but skip the full bucket. The entry stays reachable
    /// through its other buckets.
    #[default]
    Drop,
    /// Fail the insert without touching the index.
    Reject,
}

/// Errors that can occur during LSH operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LshError {
    #[error(
        "LSH index is full ({capacity} entries)\nSuggestion: Raise index.max_vectors or rebuild with a larger capacity"
    )]
    CapacityExceeded { capacity: usize },

    #[error(
        "LSH bucket {bucket} is full ({capacity} entries)\nSuggestion: Raise lsh.bucket_capacity or use lsh.overflow = \"drop\""
    )]
    BucketFull { bucket: usize, capacity: usize },

    #[error("Invalid LSH configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// Construction parameters for [`LshIndex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LshParams {
    pub dimension: VectorDimension,
    pub hash_functions: usize,
    pub capacity: usize,
    pub bucket_capacity: usize,
    pub overflow: BucketOverflow,
    pub seed: u64,
}

impl LshParams {
    /// Parameters with the default bucket capacity and overflow policy.
    #[must_use]
    pub fn new(dimension: VectorDimension, hash_functions: usize, capacity: usize, seed: u64) -> Self {
        Self {
            dimension,
            hash_functions,
            capacity,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            overflow: BucketOverflow::default(),
            seed,
        }
    }
}

/// One indexed vector: its hashes and the buckets they map to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LshEntry {
    pub node_id: u64,
    pub slot: VectorSlot,
    pub hash_function_count: usize,
    pub hashes: [i64; MAX_HASH_FUNCTIONS],
    pub buckets: [usize; MAX_HASH_FUNCTIONS],
}

/// A candidate returned by a bucket scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LshMatch {
    pub node_id: u64,
    pub slot: VectorSlot,
    /// Placeholder, always 1.0. Re-score with cosine similarity for ranking.
    pub similarity: f32,
}

/// Occupancy counters for tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LshStats {
    pub entries: usize,
    pub bucket_count: usize,
    pub non_empty_buckets: usize,
    pub largest_bucket: usize,
    pub dropped_bucket_insertions: usize,
}

/// Analytic estimate of true-positive retention for a given similarity.
///
/// Computed as `(1 - similarity) ^ hash_functions`.
#[must_use]
pub fn collision_probability(similarity: f32, hash_functions: usize) -> f32 {
    (1.0 - similarity).powi(hash_functions as i32)
}

/// Approximate similarity index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct LshIndex {
    dimension: VectorDimension,
    hash_functions: usize,
    bucket_count: usize,
    bucket_capacity: usize,
    capacity: usize,
    overflow: BucketOverflow,
    projections: Vec<Vec<f32>>,
    offsets: Vec<f32>,
    entries: Vec<LshEntry>,
    buckets: Vec<Vec<usize>>,
    dropped: usize,
}

impl LshIndex {
    /// Creates an empty index with freshly drawn projections.
    ///
    /// # Errors
    /// `LshError::InvalidConfig` when the hash function count is outside
    /// `1..=8` or a capacity is zero.
    pub fn new(params: LshParams) -> Result<Self, LshError> {
        if params.hash_functions == 0 || params.hash_functions > MAX_HASH_FUNCTIONS {
            return Err(LshError::InvalidConfig(format!(
                "hash_functions must be between 1 and {MAX_HASH_FUNCTIONS}, got {}",
                params.hash_functions
            )));
        }
        if params.capacity == 0 || params.bucket_capacity == 0 {
            return Err(LshError::InvalidConfig(
                "capacity and bucket_capacity must be non-zero".to_string(),
            ));
        }

        let dim = params.dimension.get();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let projections: Vec<Vec<f32>> = (0..params.hash_functions)
            .map(|_| (0..dim).map(|_| rng.random_range(-1.0f32..=1.0)).collect())
            .collect();
        let offsets: Vec<f32> = (0..params.hash_functions)
            .map(|_| rng.random::<f32>())
            .collect();

        let bucket_count = 1usize << (params.hash_functions / 2);

        Ok(Self {
            dimension: params.dimension,
            hash_functions: params.hash_functions,
            bucket_count,
            bucket_capacity: params.bucket_capacity,
            capacity: params.capacity,
            overflow: params.overflow,
            projections,
            offsets,
            entries: Vec::new(),
            buckets: vec![Vec::new(); bucket_count],
            dropped: 0,
        })
    }

    /// Computes the hash and bucket for every hash function.
    ///
    /// Slots past `hash_functions` are zero.
    pub fn hash_vector(
        &self,
        vector: &[f32],
    ) -> Result<([i64; MAX_HASH_FUNCTIONS], [usize; MAX_HASH_FUNCTIONS]), LshError> {
        self.dimension.validate_vector(vector)?;

        let mut hashes = [0i64; MAX_HASH_FUNCTIONS];
        let mut buckets = [0usize; MAX_HASH_FUNCTIONS];
        for (i, (projection, offset)) in self.projections.iter().zip(&self.offsets).enumerate() {
            let hash = ((dot(vector, projection) + offset) * HASH_SCALE).floor() as i64;
            hashes[i] = hash;
            buckets[i] = hash.rem_euclid(self.bucket_count as i64) as usize;
        }
        Ok((hashes, buckets))
    }

    /// Adds a vector under `node_id`.
    ///
    /// # Errors
    /// * `LshError::CapacityExceeded` when the index holds `capacity` entries
    /// * `LshError::BucketFull` when a target bucket is full and the overflow
    ///   policy is [`BucketOverflow::Reject`]
    /// * `LshError::Vector` on a dimension mismatch
    ///
    /// The index is unchanged when an error is returned.
    pub fn add_vector(
        &mut self,
        vector: &[f32],
        node_id: u64,
        slot: VectorSlot,
    ) -> Result<(), LshError> {
        if self.entries.len() >= self.capacity {
            return Err(LshError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let (hashes, buckets) = self.hash_vector(vector)?;
        let targets = &buckets[..self.hash_functions];

        if self.overflow == BucketOverflow::Reject {
            for &bucket in targets {
                // Several functions can share a bucket, so count the pending pushes.
                let pending = targets.iter().filter(|&&b| b == bucket).count();
                if self.buckets[bucket].len() + pending > self.bucket_capacity {
                    return Err(LshError::BucketFull {
                        bucket,
                        capacity: self.bucket_capacity,
                    });
                }
            }
        }

        let position = self.entries.len();
        self.entries.push(LshEntry {
            node_id,
            slot,
            hash_function_count: self.hash_functions,
            hashes,
            buckets,
        });

        for &bucket in targets {
            let list = &mut self.buckets[bucket];
            if list.len() < self.bucket_capacity {
                list.push(position);
            } else {
                self.dropped += 1;
                debug!(bucket, node_id, "LSH bucket full, position dropped");
            }
        }

        Ok(())
    }

    /// Finds candidate matches for `query`.
    ///
    /// `_threshold` is accepted for interface compatibility; entries carry no
    /// vectors, so filtering by similarity happens in the caller.
    pub fn search_similar(&self, query: &[f32], _threshold: f32) -> Result<Vec<LshMatch>, LshError> {
        let (hashes, buckets) = self.hash_vector(query)?;

        let mut seen = vec![false; self.entries.len()];
        let mut matches = Vec::new();

        'scan: for i in 0..self.hash_functions {
            for &position in &self.buckets[buckets[i]] {
                if seen[position] {
                    continue;
                }
                let entry = &self.entries[position];
                if entry.hashes[i] == hashes[i] {
                    seen[position] = true;
                    matches.push(LshMatch {
                        node_id: entry.node_id,
                        slot: entry.slot,
                        similarity: 1.0,
                    });
                    if matches.len() >= MAX_LSH_RESULTS {
                        break 'scan;
                    }
                }
            }
        }

        Ok(matches)
    }

    /// Returns occupancy counters.
    #[must_use]
    pub fn stats(&self) -> LshStats {
        LshStats {
            entries: self.entries.len(),
            bucket_count: self.bucket_count,
            non_empty_buckets: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            largest_bucket: self.buckets.iter().map(Vec::len).max().unwrap_or(0),
            dropped_bucket_insertions: self.dropped,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LshEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn hash_functions(&self) -> usize {
        self.hash_functions
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Positions stored in `bucket`, or `None` if the bucket id is out of range.
    #[must_use]
    pub fn bucket(&self, bucket: usize) -> Option<&[usize]> {
        self.buckets.get(bucket).map(Vec::as_slice)
    }
}
