//! Semantic vector indexing for lattice nodes: hashed embeddings, LSH
//! candidate search and k-means clustering.

pub mod config;
pub mod error;
pub mod logging;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use vector::{
    ClusterId, IndexConfig, IndexStats, Node, SearchQuery, SearchResult, SemanticVector,
    SemanticVectorIndex, SharedSemanticIndex, VectorDimension,
};
