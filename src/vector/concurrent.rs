//! Thread-safe handle around [`SemanticVectorIndex`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::IndexResult;
use crate::vector::{
    ClusteringError, IndexStats, LshStats, Node, SearchQuery, SearchResult, SemanticVector,
    SemanticVectorIndex,
};

/// Cloneable shared index.
///
/// Searches take the write lock because hits update access counters.
#[derive(Clone)]
pub struct SharedSemanticIndex {
    inner: Arc<RwLock<SemanticVectorIndex>>,
}

impl SharedSemanticIndex {
    pub fn new(index: SemanticVectorIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Adds a node with exclusive access.
    pub fn add_node(&self, node: &Node) -> IndexResult<()> {
        self.inner.write().add_node(node)
    }

    pub fn add_embedding(&self, node: &Node, embedding: Vec<f32>) -> IndexResult<()> {
        self.inner.write().add_embedding(node, embedding)
    }

    pub fn search_similar(&self, query: &SearchQuery) -> IndexResult<Vec<SearchResult>> {
        self.inner.write().search_similar(query)
    }

    pub fn search_text(
        &self,
        text: &str,
        min_similarity: f32,
        max_results: usize,
    ) -> IndexResult<Vec<SearchResult>> {
        self.inner
            .write()
            .search_text(text, min_similarity, max_results)
    }

    pub fn find_related(&self, node_id: u64, max_results: usize) -> IndexResult<Vec<SearchResult>> {
        self.inner.write().find_related(node_id, max_results)
    }

    pub fn rebuild_clustering(&self) -> Result<(), ClusteringError> {
        self.inner.write().rebuild_clustering()
    }

    pub fn update_embeddings(&self) -> IndexResult<()> {
        self.inner.write().update_embeddings()
    }

    /// Computes statistics with shared access.
    #[must_use]
    pub fn get_stats(&self) -> IndexStats {
        self.inner.read().get_stats()
    }

    /// Copy of the stored vector for `node_id`.
    #[must_use]
    pub fn get_vector(&self, node_id: u64) -> Option<SemanticVector> {
        self.inner.read().get_vector(node_id).cloned()
    }

    #[must_use]
    pub fn lsh_stats(&self) -> LshStats {
        self.inner.read().lsh_stats()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl From<SemanticVectorIndex> for SharedSemanticIndex {
    fn from(index: SemanticVectorIndex) -> Self {
        Self::new(index)
    }
}

impl std::fmt::Debug for SharedSemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Try to acquire read lock for debug output
        match self.inner.try_read() {
            Some(index) => write!(
                f,
                "SharedSemanticIndex {{ vectors: {}, dimension: {} }}",
                index.len(),
                index.dimension().get()
            ),
            None => write!(f, "SharedSemanticIndex {{ <locked> }}"),
        }
    }
}
