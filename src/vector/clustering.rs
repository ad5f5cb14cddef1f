//! K-means clustering engine with cluster quality metrics.
//!
//! This module partitions embeddings into a fixed number of clusters and
//! scores the result. It is a plain Lloyd's iteration over Euclidean
//! distance with centroids sampled from the input.
//!
//! # Algorithm Details
//! - Distance metric: Euclidean
//! - Initialization: K input vectors sampled uniformly with replacement
//! - Max iterations: configurable, 100 by default
//! - Convergence: change in total inertia below a threshold (1e-3 by default)
//!
//! # Metrics
//! After a run each cluster carries cohesion (mean member distance to the
//! centroid), radius (same as cohesion), density, separation from the
//! nearest other non-empty cluster and a stability score. The run as a whole
//! gets a mean silhouette score.
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) for the Lloyd iterations
//! - O(n² * d) for the silhouette score

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::vector::math::{distance, squared_euclidean};
use crate::vector::{ClusterId, VectorDimension, VectorSlot};

/// Default maximum number of iterations for K-means clustering.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default convergence threshold on the change in inertia.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f32 = 1e-3;

/// Default capacity of a single cluster's member list.
pub const DEFAULT_MAX_CLUSTER_MEMBERS: usize = 1000;

/// Errors that can occur during clustering operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Add nodes to the index before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use at least one cluster")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding generator"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Cluster {cluster} would hold more than {capacity} members\nSuggestion: Raise clustering.max_clusters or clustering.max_cluster_members"
    )]
    ClusterCapacityExceeded { cluster: ClusterId, capacity: usize },

    #[error("Invalid clustering configuration: {0}")]
    InvalidConfig(String),
}

/// Construction parameters for [`ClusteringEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringParams {
    pub dimension: VectorDimension,
    pub max_clusters: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f32,
    pub max_cluster_members: usize,
    pub seed: u64,
}

impl ClusteringParams {
    /// Parameters with default iteration, convergence and capacity settings.
    #[must_use]
    pub fn new(dimension: VectorDimension, max_clusters: usize, seed: u64) -> Self {
        Self {
            dimension,
            max_clusters,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            max_cluster_members: DEFAULT_MAX_CLUSTER_MEMBERS,
            seed,
        }
    }
}

/// A cluster produced by the last run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub cluster_id: ClusterId,
    pub centroid: Vec<f32>,
    members: Vec<VectorSlot>,
    /// Mean member distance to the centroid.
    pub cohesion: f32,
    /// Distance to the closest other non-empty centroid; infinite when alone.
    pub separation: f32,
    pub density: f32,
    pub radius: f32,
    pub stability_score: f32,
}

impl Cluster {
    fn empty(cluster_id: ClusterId, centroid: Vec<f32>) -> Self {
        Self {
            cluster_id,
            centroid,
            members: Vec::new(),
            cohesion: 0.0,
            separation: f32::INFINITY,
            density: 0.0,
            radius: 0.0,
            stability_score: 0.0,
        }
    }

    #[must_use]
    pub fn members(&self) -> &[VectorSlot] {
        &self.members
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Outcome of a single clustering run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringReport {
    /// Number of Lloyd iterations performed.
    pub iterations: usize,
    /// Whether the inertia change dropped below the threshold.
    pub converged: bool,
    /// Final inertia (sum of squared member-to-centroid distances).
    pub inertia: f32,
    /// Inertia after each iteration.
    pub inertia_history: Vec<f32>,
    pub silhouette_score: f32,
    /// Cluster of each input vector, in input order.
    pub assignments: Vec<ClusterId>,
}

/// Where a single vector landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub cluster_id: ClusterId,
    pub distance: f32,
    /// `1 / (1 + distance)`, in (0, 1].
    pub confidence: f32,
}

impl Assignment {
    fn new(index: usize, distance: f32) -> Self {
        Self {
            cluster_id: ClusterId::from_index(index),
            distance,
            confidence: 1.0 / (1.0 + distance),
        }
    }
}

/// Finds the nearest centroid by Euclidean distance.
///
/// Ties go to the lowest index. Returns `None` for an empty centroid set.
pub fn assign_to_nearest_centroid<C: AsRef<[f32]>>(
    vector: &[f32],
    centroids: &[C],
) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;

    for (i, centroid) in centroids.iter().enumerate() {
        let d = distance(vector, centroid.as_ref());
        match best {
            Some((_, best_distance)) if d >= best_distance => {}
            _ => best = Some((i, d)),
        }
    }

    best
}

/// Computes the mean silhouette score of an assignment.
///
/// `assignments[i]` is the zero-based cluster of `vectors[i]`. Vectors with no
/// other non-empty cluster to compare against are left out of the mean.
/// Returns 0.0 when no vector qualifies.
pub fn silhouette_score(vectors: &[&[f32]], assignments: &[usize], k: usize) -> f32 {
    debug_assert_eq!(vectors.len(), assignments.len());

    let mut counts = vec![0usize; k];
    for &c in assignments {
        counts[c] += 1;
    }

    let mut total = 0.0f32;
    let mut included = 0usize;
    let mut sums = vec![0.0f32; k];

    for (i, vector) in vectors.iter().enumerate() {
        sums.iter_mut().for_each(|s| *s = 0.0);
        for (j, other) in vectors.iter().enumerate() {
            if i != j {
                sums[assignments[j]] += distance(vector, other);
            }
        }

        let own = assignments[i];
        let a = if counts[own] <= 1 {
            0.0
        } else {
            sums[own] / (counts[own] - 1) as f32
        };

        let b = (0..k)
            .filter(|&c| c != own && counts[c] > 0)
            .map(|c| sums[c] / counts[c] as f32)
            .fold(f32::INFINITY, f32::min);

        if b.is_finite() {
            let scale = a.max(b);
            total += if scale > 0.0 { (b - a) / scale } else { 0.0 };
            included += 1;
        }
    }

    if included == 0 {
        0.0
    } else {
        total / included as f32
    }
}

fn inertia(vectors: &[&[f32]], assignments: &[usize], centroids: &[Vec<f32>]) -> f32 {
    vectors
        .iter()
        .zip(assignments)
        .map(|(v, &c)| squared_euclidean(v, &centroids[c]))
        .sum()
}

/// K-means engine holding the clusters of its last run.
#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    params: ClusteringParams,
    rng: StdRng,
    clusters: Vec<Cluster>,
    report: Option<ClusteringReport>,
}

impl ClusteringEngine {
    /// Creates an engine with no clusters.
    ///
    /// # Errors
    /// `InvalidClusterCount` for zero clusters, `InvalidConfig` for zero
    /// iterations, zero member capacity or a negative threshold.
    pub fn new(params: ClusteringParams) -> Result<Self, ClusteringError> {
        if params.max_clusters == 0 {
            return Err(ClusteringError::InvalidClusterCount(0));
        }
        if params.max_iterations == 0 {
            return Err(ClusteringError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if params.max_cluster_members == 0 {
            return Err(ClusteringError::InvalidConfig(
                "max_cluster_members must be at least 1".to_string(),
            ));
        }
        if params.convergence_threshold.is_nan() || params.convergence_threshold < 0.0 {
            return Err(ClusteringError::InvalidConfig(format!(
                "convergence_threshold must be non-negative, got {}",
                params.convergence_threshold
            )));
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(params.seed),
            params,
            clusters: Vec::new(),
            report: None,
        })
    }

    /// Runs k-means over `vectors` and replaces the engine's clusters.
    ///
    /// Members are recorded as `VectorSlot(i)` for `vectors[i]`.
    ///
    /// # Errors
    /// * `EmptyVectorSet` for no input
    /// * `DimensionMismatch` if any vector has the wrong dimension
    /// * `ClusterCapacityExceeded` if the final assignment overfills a cluster
    ///
    /// On error the clusters of the previous run are kept.
    pub fn cluster(&mut self, vectors: &[&[f32]]) -> Result<&ClusteringReport, ClusteringError> {
        if vectors.is_empty() {
            return Err(ClusteringError::EmptyVectorSet);
        }

        let dim = self.params.dimension.get();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ClusteringError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        let k = self.params.max_clusters;
        let n = vectors.len();

        // Sampling with replacement; duplicate centroids are allowed.
        let mut centroids: Vec<Vec<f32>> = (0..k)
            .map(|_| vectors[self.rng.random_range(0..n)].to_vec())
            .collect();

        let mut assignments = vec![0usize; n];
        let mut counts = vec![0usize; k];
        let mut inertia_history = Vec::new();
        let mut converged = false;

        for iteration in 1..=self.params.max_iterations {
            // Assignment step
            for (slot, vector) in assignments.iter_mut().zip(vectors) {
                // centroids is never empty because k >= 1
                *slot = assign_to_nearest_centroid(vector, &centroids).map_or(0, |(c, _)| c);
            }

            // Update step: empty clusters keep their centroid
            let mut sums = vec![vec![0.0f32; dim]; k];
            counts.iter_mut().for_each(|c| *c = 0);
            for (vector, &c) in vectors.iter().zip(&assignments) {
                for (sum, value) in sums[c].iter_mut().zip(vector.iter()) {
                    *sum += value;
                }
                counts[c] += 1;
            }
            for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
                if count > 0 {
                    for (value, total) in centroid.iter_mut().zip(sum) {
                        *value = total / count as f32;
                    }
                }
            }

            let current = inertia(vectors, &assignments, &centroids);
            let previous = inertia_history.last().copied();
            inertia_history.push(current);
            debug!(iteration, inertia = current, "k-means iteration");

            if let Some(previous) = previous {
                if (current - previous).abs() < self.params.convergence_threshold {
                    converged = true;
                    break;
                }
            }
        }

        if let Some((c, &count)) = counts
            .iter()
            .enumerate()
            .find(|&(_, &count)| count > self.params.max_cluster_members)
        {
            debug!(cluster = c, count, "cluster over member capacity");
            return Err(ClusteringError::ClusterCapacityExceeded {
                cluster: ClusterId::from_index(c),
                capacity: self.params.max_cluster_members,
            });
        }

        let mut clusters: Vec<Cluster> = centroids
            .into_iter()
            .enumerate()
            .map(|(c, centroid)| Cluster::empty(ClusterId::from_index(c), centroid))
            .collect();
        for (i, &c) in assignments.iter().enumerate() {
            clusters[c].members.push(VectorSlot::new(i as u32));
        }
        compute_metrics(&mut clusters, vectors);

        let silhouette = silhouette_score(vectors, &assignments, k);
        let iterations = inertia_history.len();
        let final_inertia = inertia_history.last().copied().unwrap_or(0.0);

        if !converged {
            warn!(
                iterations,
                inertia = final_inertia,
                "k-means did not converge within max_iterations"
            );
        }
        info!(
            vectors = n,
            clusters = k,
            iterations,
            inertia = final_inertia,
            silhouette,
            "k-means clustering complete"
        );

        self.clusters = clusters;
        Ok(&*self.report.insert(ClusteringReport {
            iterations,
            converged,
            inertia: final_inertia,
            inertia_history,
            silhouette_score: silhouette,
            assignments: assignments.into_iter().map(ClusterId::from_index).collect(),
        }))
    }

    /// Finds the cluster whose centroid is nearest to `vector`.
    ///
    /// Returns `None` before the first run.
    #[must_use]
    pub fn nearest_cluster(&self, vector: &[f32]) -> Option<Assignment> {
        let centroids: Vec<&[f32]> = self.clusters.iter().map(|c| c.centroid.as_slice()).collect();
        assign_to_nearest_centroid(vector, &centroids).map(|(c, d)| Assignment::new(c, d))
    }

    /// Whether the cluster can take one more member.
    #[must_use]
    pub fn has_room(&self, cluster_id: ClusterId) -> bool {
        self.clusters
            .get(cluster_id.index())
            .is_some_and(|c| c.members.len() < self.params.max_cluster_members)
    }

    /// Adds `slot` to the nearest cluster without moving any centroid.
    ///
    /// Returns `Ok(None)` when no clustering run has happened yet.
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrong-sized vector, `ClusterCapacityExceeded`
    /// when the nearest cluster is full.
    pub fn assign(
        &mut self,
        slot: VectorSlot,
        vector: &[f32],
    ) -> Result<Option<Assignment>, ClusteringError> {
        let dim = self.params.dimension.get();
        if vector.len() != dim {
            return Err(ClusteringError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }

        let Some(assignment) = self.nearest_cluster(vector) else {
            return Ok(None);
        };

        if !self.has_room(assignment.cluster_id) {
            return Err(ClusteringError::ClusterCapacityExceeded {
                cluster: assignment.cluster_id,
                capacity: self.params.max_cluster_members,
            });
        }

        self.clusters[assignment.cluster_id.index()]
            .members
            .push(slot);
        Ok(Some(assignment))
    }

    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[must_use]
    pub fn cluster_by_id(&self, cluster_id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(cluster_id.index())
    }

    /// Report of the last successful run.
    #[must_use]
    pub fn report(&self) -> Option<&ClusteringReport> {
        self.report.as_ref()
    }

    /// Silhouette score of the last run, 0.0 before any run.
    #[must_use]
    pub fn silhouette_score(&self) -> f32 {
        self.report.as_ref().map_or(0.0, |r| r.silhouette_score)
    }

    #[must_use]
    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }
}

fn compute_metrics(clusters: &mut [Cluster], vectors: &[&[f32]]) {
    for cluster in clusters.iter_mut() {
        if cluster.members.is_empty() {
            continue;
        }
        let total: f32 = cluster
            .members
            .iter()
            .map(|slot| distance(vectors[slot.index()], &cluster.centroid))
            .sum();
        cluster.cohesion = total / cluster.members.len() as f32;
        cluster.radius = cluster.cohesion;
        cluster.density = cluster.members.len() as f32 / (cluster.radius + 1.0);
    }

    for i in 0..clusters.len() {
        if clusters[i].members.is_empty() {
            continue;
        }
        let separation = clusters
            .iter()
            .enumerate()
            .filter(|(j, other)| *j != i && !other.members.is_empty())
            .map(|(_, other)| distance(&clusters[i].centroid, &other.centroid))
            .fold(f32::INFINITY, f32::min);

        let cluster = &mut clusters[i];
        cluster.separation = separation;
        cluster.stability_score = (cluster.density / (separation + 1.0)).min(1.0);
    }
}
