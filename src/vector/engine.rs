//! Semantic vector index that orchestrates embedding, hashing and clustering.
//!
//! This module provides the main entry point for semantic search, coordinating
//! between the embedding generator, the LSH index and the clustering engine.
//!
//! Vectors live in an append-only arena addressed by [`VectorSlot`]. The LSH
//! index and the clusters only hold slots, so every lookup goes back to the
//! arena for the embedding itself.

use std::collections::HashMap;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::vector::math::{cosine_similarity, distance};
use crate::vector::{
    BucketOverflow, Cluster, ClusterId, ClusteringEngine, ClusteringError, ClusteringParams,
    DEFAULT_BUCKET_CAPACITY, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_MAX_CLUSTER_MEMBERS,
    DEFAULT_MAX_ITERATIONS, HashEmbeddingGenerator, LshIndex, LshParams, LshStats,
    MAX_HASH_FUNCTIONS, Node, VectorDimension, VectorError, VectorSlot,
};

/// Number of results a [`SearchQuery`] returns unless told otherwise.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Construction parameters for [`SemanticVectorIndex`].
///
/// Usually built from [`Settings::index_config`], which validates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexConfig {
    pub dimension: VectorDimension,
    pub max_vectors: usize,
    pub hash_functions: usize,
    pub bucket_capacity: usize,
    pub overflow: BucketOverflow,
    pub max_clusters: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f32,
    pub max_cluster_members: usize,
    /// Root seed; every projection set and centroid sample derives from it.
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: VectorDimension::dimension_128(),
            max_vectors: 10_000,
            hash_functions: MAX_HASH_FUNCTIONS,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            overflow: BucketOverflow::Drop,
            max_clusters: 16,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            max_cluster_members: DEFAULT_MAX_CLUSTER_MEMBERS,
            seed: 0,
        }
    }
}

impl IndexConfig {
    fn lsh_params(&self, seed: u64) -> LshParams {
        LshParams {
            dimension: self.dimension,
            hash_functions: self.hash_functions,
            capacity: self.max_vectors,
            bucket_capacity: self.bucket_capacity,
            overflow: self.overflow,
            seed,
        }
    }

    fn clustering_params(&self, seed: u64) -> ClusteringParams {
        ClusteringParams {
            dimension: self.dimension,
            max_clusters: self.max_clusters,
            max_iterations: self.max_iterations,
            convergence_threshold: self.convergence_threshold,
            max_cluster_members: self.max_cluster_members,
            seed,
        }
    }
}

/// An indexed embedding and its usage counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticVector {
    pub node_id: u64,
    pub embedding: Vec<f32>,
    /// `None` until the vector takes part in a clustering run or is
    /// assigned to an existing cluster on insert.
    pub cluster_id: Option<ClusterId>,
    pub cluster_confidence: f32,
    /// Starts at 1 and grows with every search hit.
    pub frequency: u32,
    /// Unix seconds of the insert or the latest search hit.
    pub last_accessed: u64,
    /// Source node confidence clamped to `[0, 1]`.
    pub semantic_weight: f32,
    /// Times this vector came back from [`SemanticVectorIndex::find_related`].
    pub related_count: u32,
}

/// Similarity query over the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_vector: Vec<f32>,
    pub min_similarity: f32,
    pub max_results: usize,
    /// Use the LSH candidate scan instead of the exact scan.
    pub use_lsh: bool,
    /// Only return vectors from this cluster.
    pub cluster_filter: Option<ClusterId>,
}

impl SearchQuery {
    /// Exact query with no similarity floor and [`DEFAULT_MAX_RESULTS`] results.
    #[must_use]
    pub fn new(query_vector: Vec<f32>) -> Self {
        Self {
            query_vector,
            min_similarity: -1.0,
            max_results: DEFAULT_MAX_RESULTS,
            use_lsh: false,
            cluster_filter: None,
        }
    }

    #[must_use]
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    #[must_use]
    pub fn with_lsh(mut self, use_lsh: bool) -> Self {
        self.use_lsh = use_lsh;
        self
    }

    #[must_use]
    pub fn with_cluster_filter(mut self, cluster_id: ClusterId) -> Self {
        self.cluster_filter = Some(cluster_id);
        self
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub node_id: u64,
    pub similarity_score: f32,
    /// Euclidean distance between the query and the stored embedding.
    pub distance: f32,
    pub cluster_id: Option<ClusterId>,
    pub cluster_confidence: f32,
    /// 1-based position after sorting.
    pub rank: usize,
}

/// Summary of the index contents.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub cluster_count: usize,
    /// Mean cosine similarity over all unordered vector pairs.
    pub avg_similarity: f32,
    pub silhouette_score: f32,
}

/// In-memory semantic index over nodes.
///
/// This type has no internal locking. Wrap it in
/// [`SharedSemanticIndex`](crate::vector::SharedSemanticIndex) to share it
/// across threads.
#[derive(Debug)]
pub struct SemanticVectorIndex {
    config: IndexConfig,
    generator: HashEmbeddingGenerator,
    vectors: Vec<SemanticVector>,
    slots: HashMap<u64, VectorSlot>,
    lsh: LshIndex,
    clustering: ClusteringEngine,
    rng: StdRng,
}

impl SemanticVectorIndex {
    /// Creates an empty index.
    ///
    /// # Errors
    /// `IndexError::Lsh` or `IndexError::Clustering` when the configuration
    /// is rejected by a component.
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let lsh = LshIndex::new(config.lsh_params(rng.random()))?;
        let clustering = ClusteringEngine::new(config.clustering_params(rng.random()))?;

        info!(
            dimension = config.dimension.get(),
            max_vectors = config.max_vectors,
            hash_functions = config.hash_functions,
            max_clusters = config.max_clusters,
            seed = config.seed,
            "semantic index created"
        );

        Ok(Self {
            generator: HashEmbeddingGenerator::new(config.dimension),
            config,
            vectors: Vec::new(),
            slots: HashMap::new(),
            lsh,
            clustering,
            rng,
        })
    }

    /// Creates an empty index from layered settings.
    pub fn from_settings(settings: &Settings) -> IndexResult<Self> {
        Self::new(settings.index_config()?)
    }

    /// Embeds `node` and adds it to the index.
    ///
    /// # Errors
    /// * `CapacityExceeded` when the index or the target cluster is full
    /// * `DuplicateNode` when the node id is already indexed
    /// * `Vector(EmptyText)` when the node has no name and no payload
    ///
    /// Nothing is modified when an error is returned.
    pub fn add_node(&mut self, node: &Node) -> IndexResult<()> {
        self.check_insert(node.id)?;
        let embedding = self.generator.embed_node(node)?;
        self.insert(node, embedding)
    }

    /// Adds a precomputed embedding for `node`.
    ///
    /// Same contract as [`add_node`](Self::add_node), plus a dimension check.
    pub fn add_embedding(&mut self, node: &Node, embedding: Vec<f32>) -> IndexResult<()> {
        self.check_insert(node.id)?;
        self.config.dimension.validate_vector(&embedding)?;
        self.insert(node, embedding)
    }

    fn check_insert(&self, node_id: u64) -> IndexResult<()> {
        if self.vectors.len() >= self.config.max_vectors {
            return Err(IndexError::CapacityExceeded {
                resource: "vectors",
                capacity: self.config.max_vectors,
            });
        }
        if self.slots.contains_key(&node_id) {
            return Err(IndexError::DuplicateNode { id: node_id });
        }
        Ok(())
    }

    fn insert(&mut self, node: &Node, embedding: Vec<f32>) -> IndexResult<()> {
        let slot = VectorSlot::new(self.vectors.len() as u32);

        // Checked up front so a full cluster never leaves a dangling LSH entry.
        if let Some(nearest) = self.clustering.nearest_cluster(&embedding) {
            if !self.clustering.has_room(nearest.cluster_id) {
                return Err(ClusteringError::ClusterCapacityExceeded {
                    cluster: nearest.cluster_id,
                    capacity: self.config.max_cluster_members,
                }
                .into());
            }
        }

        self.lsh.add_vector(&embedding, node.id, slot)?;
        let assignment = self.clustering.assign(slot, &embedding)?;

        debug!(
            node_id = node.id,
            %slot,
            cluster = ClusterId::raw(assignment.map(|a| a.cluster_id)),
            "node indexed"
        );

        self.vectors.push(SemanticVector {
            node_id: node.id,
            embedding,
            cluster_id: assignment.map(|a| a.cluster_id),
            cluster_confidence: assignment.map_or(0.0, |a| a.confidence),
            frequency: 1,
            last_accessed: now_secs(),
            semantic_weight: node.confidence.clamp(0.0, 1.0) as f32,
            related_count: 0,
        });
        self.slots.insert(node.id, slot);
        Ok(())
    }

    /// Runs a similarity query and returns ranked hits.
    ///
    /// Every returned vector has its `frequency` and `last_accessed` updated.
    ///
    /// # Errors
    /// * `Vector(DimensionMismatch)` for a wrong-sized query
    /// * `Vector(InvalidScore)` for a non-finite `min_similarity`
    pub fn search_similar(&mut self, query: &SearchQuery) -> IndexResult<Vec<SearchResult>> {
        self.config.dimension.validate_vector(&query.query_vector)?;
        if !query.min_similarity.is_finite() {
            return Err(VectorError::InvalidScore {
                value: query.min_similarity,
                reason: "min_similarity must be finite",
            }
            .into());
        }
        if query.max_results == 0 {
            return Ok(Vec::new());
        }

        let mut results = if query.use_lsh {
            self.lsh_scan(query)?
        } else {
            self.exact_scan(query)
        };

        results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        for (position, result) in results.iter_mut().enumerate() {
            result.rank = position + 1;
        }

        self.record_hits(&results);
        debug!(
            hits = results.len(),
            use_lsh = query.use_lsh,
            "similarity search complete"
        );
        Ok(results)
    }

    /// Embeds `text` and runs an exact query with it.
    pub fn search_text(
        &mut self,
        text: &str,
        min_similarity: f32,
        max_results: usize,
    ) -> IndexResult<Vec<SearchResult>> {
        let query = SearchQuery::new(self.generator.embed(text)?)
            .with_min_similarity(min_similarity)
            .with_max_results(max_results);
        self.search_similar(&query)
    }

    /// Returns the stored vectors most similar to `node_id`'s, excluding itself.
    ///
    /// Each returned vector has its `related_count` incremented.
    ///
    /// # Errors
    /// `NodeNotFound` if the node is not indexed.
    pub fn find_related(&mut self, node_id: u64, max_results: usize) -> IndexResult<Vec<SearchResult>> {
        let slot = *self
            .slots
            .get(&node_id)
            .ok_or(IndexError::NodeNotFound { id: node_id })?;
        let source = &self.vectors[slot.index()].embedding;

        let mut results: Vec<SearchResult> = self
            .vectors
            .iter()
            .filter(|candidate| candidate.node_id != node_id)
            .map(|candidate| to_result(source, candidate))
            .collect();

        results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        results.truncate(max_results);
        for (position, result) in results.iter_mut().enumerate() {
            result.rank = position + 1;
            if let Some(slot) = self.slots.get(&result.node_id) {
                self.vectors[slot.index()].related_count += 1;
            }
        }
        Ok(results)
    }

    fn exact_scan(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let mut results = Vec::new();
        for vector in &self.vectors {
            let result = to_result(&query.query_vector, vector);
            if passes(query, &result) {
                results.push(result);
                if results.len() >= query.max_results {
                    break;
                }
            }
        }
        results
    }

    fn lsh_scan(&self, query: &SearchQuery) -> IndexResult<Vec<SearchResult>> {
        let candidates = self
            .lsh
            .search_similar(&query.query_vector, query.min_similarity)?;

        let mut results: Vec<SearchResult> = candidates
            .iter()
            .filter_map(|candidate| self.vectors.get(candidate.slot.index()))
            .map(|vector| to_result(&query.query_vector, vector))
            .filter(|result| passes(query, result))
            .collect();
        results.truncate(query.max_results);
        Ok(results)
    }

    fn record_hits(&mut self, results: &[SearchResult]) {
        if results.is_empty() {
            return;
        }
        let now = now_secs();
        for result in results {
            if let Some(slot) = self.slots.get(&result.node_id) {
                let vector = &mut self.vectors[slot.index()];
                vector.frequency = vector.frequency.saturating_add(1);
                vector.last_accessed = now;
            }
        }
    }

    /// Re-runs k-means over every stored vector.
    ///
    /// A fresh engine is built with a new seed from the root generator. It
    /// replaces the current one only on success, and then every vector's
    /// cluster id and confidence are overwritten.
    ///
    /// # Errors
    /// `EmptyVectorSet` for an empty index, `ClusterCapacityExceeded` when a
    /// cluster would exceed its member capacity.
    pub fn rebuild_clustering(&mut self) -> Result<(), ClusteringError> {
        let mut engine = ClusteringEngine::new(self.config.clustering_params(self.rng.random()))?;

        let embeddings: Vec<&[f32]> = self.vectors.iter().map(|v| v.embedding.as_slice()).collect();
        let report = engine.cluster(&embeddings)?;
        let assignments = report.assignments.clone();
        let (iterations, silhouette) = (report.iterations, report.silhouette_score);

        for (vector, cluster_id) in self.vectors.iter_mut().zip(assignments) {
            let confidence = engine
                .cluster_by_id(cluster_id)
                .map_or(0.0, |cluster| 1.0 / (1.0 + distance(&vector.embedding, &cluster.centroid)));
            vector.cluster_id = Some(cluster_id);
            vector.cluster_confidence = confidence;
        }
        self.clustering = engine;

        info!(
            vectors = self.vectors.len(),
            clusters = self.config.max_clusters,
            iterations,
            silhouette,
            "clustering rebuilt"
        );
        Ok(())
    }

    /// Rebuilds the LSH index with fresh projections, then re-clusters.
    ///
    /// The old LSH index stays in place if any stored vector cannot be
    /// re-registered.
    pub fn update_embeddings(&mut self) -> IndexResult<()> {
        let mut lsh = LshIndex::new(self.config.lsh_params(self.rng.random()))?;
        for (position, vector) in self.vectors.iter().enumerate() {
            lsh.add_vector(&vector.embedding, vector.node_id, VectorSlot::new(position as u32))?;
        }
        self.lsh = lsh;
        info!(entries = self.lsh.len(), "LSH index rebuilt");

        self.rebuild_clustering()?;
        Ok(())
    }

    /// Computes summary statistics. Pairwise similarity is quadratic in the
    /// number of vectors.
    #[must_use]
    pub fn get_stats(&self) -> IndexStats {
        let n = self.vectors.len();
        let avg_similarity = if n < 2 {
            0.0
        } else {
            let mut total = 0.0f64;
            for (i, a) in self.vectors.iter().enumerate() {
                for b in &self.vectors[i + 1..] {
                    total += f64::from(cosine_similarity(&a.embedding, &b.embedding));
                }
            }
            let pairs = (n * (n - 1) / 2) as f64;
            (total / pairs) as f32
        };

        IndexStats {
            vector_count: n,
            cluster_count: self.clustering.clusters().len(),
            avg_similarity,
            silhouette_score: self.clustering.silhouette_score(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.config.dimension
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn get_vector(&self, node_id: u64) -> Option<&SemanticVector> {
        self.slots
            .get(&node_id)
            .and_then(|slot| self.vectors.get(slot.index()))
    }

    /// Stored vectors in insertion order.
    #[must_use]
    pub fn vectors(&self) -> &[SemanticVector] {
        &self.vectors
    }

    #[must_use]
    pub fn lsh_stats(&self) -> LshStats {
        self.lsh.stats()
    }

    /// Clusters of the last successful run, empty before any.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        self.clustering.clusters()
    }
}

fn to_result(query: &[f32], vector: &SemanticVector) -> SearchResult {
    SearchResult {
        node_id: vector.node_id,
        similarity_score: cosine_similarity(query, &vector.embedding),
        distance: distance(query, &vector.embedding),
        cluster_id: vector.cluster_id,
        cluster_confidence: vector.cluster_confidence,
        rank: 0,
    }
}

fn passes(query: &SearchQuery, result: &SearchResult) -> bool {
    result.similarity_score >= query.min_similarity
        && query
            .cluster_filter
            .is_none_or(|cluster| result.cluster_id == Some(cluster))
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(dim: usize, max_vectors: usize, max_clusters: usize) -> IndexConfig {
        IndexConfig {
            dimension: VectorDimension::new(dim).unwrap(),
            max_vectors,
            max_clusters,
            seed: 11,
            ..IndexConfig::default()
        }
    }

    fn axis(dim: usize, axis: usize, scale: f32) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = scale;
        v
    }

    #[test]
    fn test_duplicate_alpha_nodes_rank_first() {
        let mut index = SemanticVectorIndex::new(IndexConfig::default()).unwrap();
        index.add_node(&Node::new(1, "alpha", "")).unwrap();
        index.add_node(&Node::new(2, "alpha", "")).unwrap();
        index.add_node(&Node::new(3, "beta", "")).unwrap();

        let query = HashEmbeddingGenerator::default().embed("alpha").unwrap();
        let results = index
            .search_similar(&SearchQuery::new(query).with_min_similarity(0.99))
            .unwrap();

        assert_eq!(results.len(), 2);
        let mut ids: Vec<u64> = results.iter().map(|r| r.node_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        assert!(results[0].distance < 1e-3);
    }

    #[test]
    fn test_capacity_exceeded_leaves_index_unchanged() {
        let mut index = SemanticVectorIndex::new(small_config(8, 3, 2)).unwrap();
        for id in 0..3 {
            index.add_node(&Node::new(id, format!("node {id}"), "")).unwrap();
        }

        let err = index.add_node(&Node::new(99, "overflow", "")).unwrap_err();
        assert!(matches!(
            err,
            IndexError::CapacityExceeded {
                resource: "vectors",
                capacity: 3
            }
        ));
        assert_eq!(index.len(), 3);
        assert_eq!(index.lsh_stats().entries, 3);
        assert!(index.get_vector(99).is_none());
    }

    #[test]
    fn test_duplicate_and_empty_nodes_rejected() {
        let mut index = SemanticVectorIndex::new(small_config(8, 10, 2)).unwrap();
        index.add_node(&Node::new(1, "alpha", "")).unwrap();

        assert_eq!(
            index.add_node(&Node::new(1, "other", "")),
            Err(IndexError::DuplicateNode { id: 1 })
        );
        assert_eq!(
            index.add_node(&Node::new(2, "", "")),
            Err(IndexError::Vector(VectorError::EmptyText))
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.lsh_stats().entries, 1);
    }

    #[test]
    fn test_new_vector_defaults() {
        let mut index = SemanticVectorIndex::new(small_config(8, 10, 2)).unwrap();
        index
            .add_node(&Node::new(5, "alpha", "payload").with_confidence(1.7))
            .unwrap();

        let vector = index.get_vector(5).unwrap();
        assert_eq!(vector.frequency, 1);
        assert_eq!(vector.related_count, 0);
        assert_eq!(vector.cluster_id, None);
        assert_eq!(vector.semantic_weight, 1.0);
        assert!(vector.last_accessed > 0);
        assert_eq!(vector.embedding.len(), 8);
    }

    #[test]
    fn test_search_updates_access_counters() {
        let mut index = SemanticVectorIndex::new(small_config(8, 10, 2)).unwrap();
        index.add_embedding(&Node::new(1, "a", ""), axis(8, 0, 1.0)).unwrap();
        index.add_embedding(&Node::new(2, "b", ""), axis(8, 1, 1.0)).unwrap();

        let results = index
            .search_similar(&SearchQuery::new(axis(8, 0, 1.0)).with_min_similarity(0.5))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(index.get_vector(1).unwrap().frequency, 2);
        assert_eq!(index.get_vector(2).unwrap().frequency, 1);
    }

    #[test]
    fn test_exact_scan_stops_at_max_results() {
        let mut index = SemanticVectorIndex::new(small_config(4, 10, 2)).unwrap();
        // Inserted weakest first, so an early stop keeps the weaker matches.
        index.add_embedding(&Node::new(1, "a", ""), vec![0.6, 0.8, 0.0, 0.0]).unwrap();
        index.add_embedding(&Node::new(2, "b", ""), vec![0.8, 0.6, 0.0, 0.0]).unwrap();
        index.add_embedding(&Node::new(3, "c", ""), vec![1.0, 0.0, 0.0, 0.0]).unwrap();

        let results = index
            .search_similar(&SearchQuery::new(vec![1.0, 0.0, 0.0, 0.0]).with_max_results(2))
            .unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.node_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_lsh_search_finds_inserted_vector() {
        let mut index = SemanticVectorIndex::new(small_config(16, 50, 2)).unwrap();
        for i in 0..16 {
            index
                .add_embedding(&Node::new(i as u64, "n", ""), axis(16, i, 1.0))
                .unwrap();
        }

        for i in 0..16 {
            let results = index
                .search_similar(
                    &SearchQuery::new(axis(16, i, 1.0))
                        .with_lsh(true)
                        .with_min_similarity(0.9),
                )
                .unwrap();
            assert_eq!(results.len(), 1, "axis {i}");
            assert_eq!(results[0].node_id, i as u64);
            assert!((results[0].similarity_score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_query_validation() {
        let mut index = SemanticVectorIndex::new(small_config(4, 10, 2)).unwrap();
        assert!(matches!(
            index.search_similar(&SearchQuery::new(vec![1.0; 3])),
            Err(IndexError::Vector(VectorError::DimensionMismatch { .. }))
        ));
        assert!(matches!(
            index.search_similar(&SearchQuery::new(vec![1.0; 4]).with_min_similarity(f32::NAN)),
            Err(IndexError::Vector(VectorError::InvalidScore { .. }))
        ));
        assert!(
            index
                .search_similar(&SearchQuery::new(vec![1.0; 4]).with_max_results(0))
                .unwrap()
                .is_empty()
        );
    }

    fn two_blobs(index: &mut SemanticVectorIndex, dim: usize) {
        for i in 0..5u64 {
            let jitter = 0.01 * i as f32;
            let mut right = axis(dim, 0, 1.0);
            right[1] = jitter;
            let mut left = axis(dim, 0, -1.0);
            left[1] = -jitter;
            index.add_embedding(&Node::new(i, "right", ""), right).unwrap();
            index.add_embedding(&Node::new(10 + i, "left", ""), left).unwrap();
        }
    }

    #[test]
    fn test_rebuild_clustering_assigns_every_vector() {
        let mut index = SemanticVectorIndex::new(small_config(4, 20, 2)).unwrap();
        two_blobs(&mut index, 4);
        index.rebuild_clustering().unwrap();

        assert!(index.vectors().iter().all(|v| v.cluster_id.is_some()));
        assert!(
            index
                .vectors()
                .iter()
                .all(|v| v.cluster_confidence > 0.0 && v.cluster_confidence <= 1.0)
        );

        let right = index.get_vector(0).unwrap().cluster_id;
        let left = index.get_vector(10).unwrap().cluster_id;
        assert_ne!(right, left);
        for i in 0..5u64 {
            assert_eq!(index.get_vector(i).unwrap().cluster_id, right);
            assert_eq!(index.get_vector(10 + i).unwrap().cluster_id, left);
        }

        let stats = index.get_stats();
        assert_eq!(stats.vector_count, 10);
        assert_eq!(stats.cluster_count, 2);
        assert!(stats.silhouette_score > 0.5);
    }

    #[test]
    fn test_cluster_filter() {
        let mut index = SemanticVectorIndex::new(small_config(4, 20, 2)).unwrap();
        two_blobs(&mut index, 4);
        index.rebuild_clustering().unwrap();

        let left = index.get_vector(10).unwrap().cluster_id.unwrap();
        let results = index
            .search_similar(
                &SearchQuery::new(axis(4, 0, 1.0))
                    .with_max_results(20)
                    .with_cluster_filter(left),
            )
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.node_id >= 10));
    }

    #[test]
    fn test_insert_after_rebuild_joins_nearest_cluster() {
        let mut index = SemanticVectorIndex::new(small_config(4, 20, 2)).unwrap();
        two_blobs(&mut index, 4);
        index.rebuild_clustering().unwrap();

        index
            .add_embedding(&Node::new(42, "right", ""), axis(4, 0, 1.0))
            .unwrap();
        assert_eq!(
            index.get_vector(42).unwrap().cluster_id,
            index.get_vector(0).unwrap().cluster_id
        );
    }

    #[test]
    fn test_full_cluster_rejects_insert() {
        let mut config = small_config(4, 20, 1);
        config.max_cluster_members = 3;
        let mut index = SemanticVectorIndex::new(config).unwrap();
        for i in 0..3u64 {
            index.add_embedding(&Node::new(i, "n", ""), axis(4, 0, 1.0)).unwrap();
        }
        index.rebuild_clustering().unwrap();

        let err = index
            .add_embedding(&Node::new(3, "n", ""), axis(4, 0, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::CapacityExceeded {
                resource: "cluster members",
                capacity: 3
            }
        ));
        assert_eq!(index.len(), 3);
        assert_eq!(index.lsh_stats().entries, 3);
    }

    #[test]
    fn test_rebuild_on_empty_index() {
        let mut index = SemanticVectorIndex::new(small_config(4, 20, 2)).unwrap();
        assert_eq!(index.rebuild_clustering(), Err(ClusteringError::EmptyVectorSet));
        assert!(index.clusters().is_empty());
    }

    #[test]
    fn test_update_embeddings_rehashes_all_vectors() {
        let mut index = SemanticVectorIndex::new(small_config(8, 20, 2)).unwrap();
        for i in 0..8 {
            index
                .add_embedding(&Node::new(i as u64, "n", ""), axis(8, i, 1.0))
                .unwrap();
        }

        index.update_embeddings().unwrap();
        assert_eq!(index.lsh_stats().entries, 8);
        assert_eq!(index.clusters().len(), 2);
        assert!(index.vectors().iter().all(|v| v.cluster_id.is_some()));

        let results = index
            .search_similar(&SearchQuery::new(axis(8, 3, 1.0)).with_lsh(true).with_min_similarity(0.9))
            .unwrap();
        assert_eq!(results[0].node_id, 3);
    }

    #[test]
    fn test_find_related_excludes_self() {
        let mut index = SemanticVectorIndex::new(small_config(4, 20, 2)).unwrap();
        index.add_embedding(&Node::new(1, "a", ""), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add_embedding(&Node::new(2, "b", ""), vec![0.9, 0.1, 0.0, 0.0]).unwrap();
        index.add_embedding(&Node::new(3, "c", ""), vec![0.0, 1.0, 0.0, 0.0]).unwrap();

        let related = index.find_related(1, 1).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].node_id, 2);
        assert_eq!(index.get_vector(2).unwrap().related_count, 1);
        assert_eq!(index.get_vector(3).unwrap().related_count, 0);

        assert_eq!(
            index.find_related(404, 1),
            Err(IndexError::NodeNotFound { id: 404 })
        );
    }

    #[test]
    fn test_search_text() {
        let mut index = SemanticVectorIndex::new(IndexConfig::default()).unwrap();
        index.add_node(&Node::new(1, "alpha", "")).unwrap();
        index.add_node(&Node::new(2, "beta", "")).unwrap();

        let results = index.search_text("alpha", 0.99, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, 1);
        assert!(index.search_text("", 0.0, 10).is_err());
    }

    #[test]
    fn test_stats_average_similarity() {
        let mut index = SemanticVectorIndex::new(small_config(2, 10, 2)).unwrap();
        assert_eq!(index.get_stats().avg_similarity, 0.0);

        index.add_embedding(&Node::new(1, "a", ""), vec![1.0, 0.0]).unwrap();
        assert_eq!(index.get_stats().avg_similarity, 0.0);

        index.add_embedding(&Node::new(2, "b", ""), vec![0.0, 1.0]).unwrap();
        index.add_embedding(&Node::new(3, "c", ""), vec![1.0, 0.0]).unwrap();
        // Pairs: (1,2)=0, (1,3)=1, (2,3)=0
        let stats = index.get_stats();
        assert!((stats.avg_similarity - 1.0 / 3.0).abs() < 1e-5);
        assert_eq!(stats.cluster_count, 0);
        assert_eq!(stats.silhouette_score, 0.0);
    }

    #[test]
    fn test_same_seed_same_clusters() {
        let build = || {
            let mut index = SemanticVectorIndex::new(small_config(4, 20, 3)).unwrap();
            two_blobs(&mut index, 4);
            index.rebuild_clustering().unwrap();
            index
                .vectors()
                .iter()
                .map(|v| v.cluster_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
