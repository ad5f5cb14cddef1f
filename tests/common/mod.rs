#![allow(dead_code)]

use lattice_semantic::vector::VectorDimension;
use lattice_semantic::{IndexConfig, Node, SemanticVectorIndex};

/// Index with a fixed seed so runs are reproducible.
pub fn create_test_index(dimension: usize, max_vectors: usize, max_clusters: usize) -> SemanticVectorIndex {
    let config = IndexConfig {
        dimension: VectorDimension::new(dimension).expect("non-zero dimension"),
        max_vectors,
        max_clusters,
        seed: 1234,
        ..IndexConfig::default()
    };
    SemanticVectorIndex::new(config).expect("Failed to create index")
}

/// Unit-ish vector along `axis` with a small offset on the next axis.
pub fn near_axis(dimension: usize, axis: usize, sign: f32, jitter: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[axis] = sign;
    v[(axis + 1) % dimension] = jitter;
    v
}

/// Five vectors near `[1, 0, ..]` (ids 0..5) and five near `[-1, 0, ..]` (ids 5..10).
pub fn add_two_blobs(index: &mut SemanticVectorIndex) {
    let dimension = index.dimension().get();
    for i in 0..5u64 {
        let jitter = i as f32 * 0.02;
        index
            .add_embedding(
                &Node::new(i, format!("pos_{i}"), ""),
                near_axis(dimension, 0, 1.0, jitter),
            )
            .expect("Failed to add vector");
        index
            .add_embedding(
                &Node::new(5 + i, format!("neg_{i}"), ""),
                near_axis(dimension, 0, -1.0, -jitter),
            )
            .expect("Failed to add vector");
    }
}
