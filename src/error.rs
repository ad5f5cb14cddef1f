//! Error types for the semantic index
//!
//! This module provides the top-level error type using thiserror. Component
//! errors (embedding, LSH, clustering) convert into it with `?` so callers
//! handle a single type with actionable messages.

use crate::vector::{ClusteringError, LshError, VectorError};
use thiserror::Error;

/// Main error type for index operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// A bounded collection is full
    #[error(
        "Capacity exceeded for {resource}: limit is {capacity}\nSuggestion: Raise the configured limit and rebuild the index"
    )]
    CapacityExceeded {
        resource: &'static str,
        capacity: usize,
    },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Node {id} is already indexed")]
    DuplicateNode { id: u64 },

    #[error("Node {id} not found. Did you add it to the index first?")]
    NodeNotFound { id: u64 },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Lsh(LshError),

    #[error(transparent)]
    Clustering(ClusteringError),
}

impl From<LshError> for IndexError {
    fn from(err: LshError) -> Self {
        match err {
            LshError::CapacityExceeded { capacity } => Self::CapacityExceeded {
                resource: "lsh index",
                capacity,
            },
            LshError::BucketFull { capacity, .. } => Self::CapacityExceeded {
                resource: "lsh bucket",
                capacity,
            },
            LshError::Vector(err) => Self::Vector(err),
            other => Self::Lsh(other),
        }
    }
}

impl From<ClusteringError> for IndexError {
    fn from(err: ClusteringError) -> Self {
        match err {
            ClusteringError::ClusterCapacityExceeded { capacity, .. } => Self::CapacityExceeded {
                resource: "cluster members",
                capacity,
            },
            other => Self::Clustering(other),
        }
    }
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::DuplicateNode { .. } => "DUPLICATE_NODE",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::Vector(VectorError::EmptyText) => "INVALID_INPUT",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Lsh(_) => "LSH_ERROR",
            Self::Clustering(_) => "CLUSTERING_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CapacityExceeded { .. } => vec![
                "The rejected node was not indexed, the index is unchanged",
                "Raise index.max_vectors or clustering.max_cluster_members in settings.toml",
            ],
            Self::Clustering(ClusteringError::EmptyVectorSet) => vec![
                "Add nodes before calling rebuild_clustering or update_embeddings",
            ],
            Self::Clustering(_) => vec![
                "The previous clustering is still in place",
                "Check the [clustering] section of settings.toml",
            ],
            Self::ConfigError { .. } | Self::Lsh(LshError::InvalidConfig(_)) => vec![
                "Check settings.toml and LS_ environment overrides",
            ],
            Self::Vector(VectorError::EmptyText) => vec![
                "Give the node a non-empty name or payload",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
