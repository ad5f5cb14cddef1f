//! Semantic vector indexing for lattice nodes.
//!
//! This module turns node text into fixed-dimension embeddings and indexes them
//! for approximate similarity retrieval.
//!
//! # Architecture
//! - [`HashEmbeddingGenerator`] derives a unit vector from an FNV-1a hash of
//!   the node's text
//! - [`LshIndex`] hashes vectors with random projections into buckets for a
//!   fast candidate scan
//! - [`ClusteringEngine`] partitions the collection with k-means and scores
//!   the partition with the silhouette coefficient
//! - [`SemanticVectorIndex`] owns the vectors and routes queries to the LSH
//!   scan or an exact cosine scan
//!
//! Everything is in memory and single-threaded. [`SharedSemanticIndex`] adds
//! a lock for callers that need one.

mod clustering;
mod concurrent;
mod embedding;
mod engine;
mod lsh;
pub mod math;
mod types;

// Re-export core types for public API
pub use clustering::{
    Assignment, Cluster, ClusteringEngine, ClusteringError, ClusteringParams, ClusteringReport,
    DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_MAX_CLUSTER_MEMBERS, DEFAULT_MAX_ITERATIONS,
    assign_to_nearest_centroid, silhouette_score,
};
pub use concurrent::SharedSemanticIndex;
pub use embedding::{
    EmbeddingGenerator, HashEmbeddingGenerator, NODE_TEXT_LIMIT, create_node_text, embed,
    fnv1a_32,
};
pub use engine::{
    DEFAULT_MAX_RESULTS, IndexConfig, IndexStats, SearchQuery, SearchResult, SemanticVector,
    SemanticVectorIndex,
};
pub use lsh::{
    BucketOverflow, DEFAULT_BUCKET_CAPACITY, LshEntry, LshError, LshIndex, LshMatch, LshParams,
    LshStats, MAX_HASH_FUNCTIONS, MAX_LSH_RESULTS, collision_probability,
};
pub use math::{cosine_similarity, distance, euclidean_distance};
pub use types::{ClusterId, Node, VECTOR_DIMENSION_128, VectorDimension, VectorError, VectorSlot};
