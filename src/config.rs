//! Configuration module for the semantic index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `LS_` and use double underscores
//! to separate nested levels:
//! - `LS_INDEX__MAX_VECTORS=50000` sets `index.max_vectors`
//! - `LS_LSH__HASH_FUNCTIONS=6` sets `lsh.hash_functions`
//! - `LS_CLUSTERING__MAX_CLUSTERS=32` sets `clustering.max_clusters`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::vector::{
    BucketOverflow, DEFAULT_BUCKET_CAPACITY, DEFAULT_CONVERGENCE_THRESHOLD,
    DEFAULT_MAX_CLUSTER_MEMBERS, DEFAULT_MAX_ITERATIONS, IndexConfig, MAX_HASH_FUNCTIONS,
    VECTOR_DIMENSION_128, VectorDimension,
};

/// Directory searched for `settings.toml`, from the current directory upwards.
pub const CONFIG_DIR: &str = ".lattice";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode, forces debug-level logging
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Log level when debug is off: trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Vector collection settings
    #[serde(default)]
    pub index: IndexSettings,

    /// Locality-sensitive hashing settings
    #[serde(default)]
    pub lsh: LshSettings,

    /// K-means settings
    #[serde(default)]
    pub clustering: ClusteringSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexSettings {
    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum number of indexed nodes
    #[serde(default = "default_max_vectors")]
    pub max_vectors: usize,

    /// Seed for projections and centroid sampling; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LshSettings {
    /// Number of random projections per vector (1 to 8)
    #[serde(default = "default_hash_functions")]
    pub hash_functions: usize,

    /// Entry positions a single bucket can hold
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: usize,

    /// Behaviour when a bucket is full: "drop" or "reject"
    #[serde(default)]
    pub overflow: BucketOverflow,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringSettings {
    /// Number of k-means clusters
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stop when inertia changes by less than this between iterations
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f32,

    /// Member list capacity of a single cluster
    #[serde(default = "default_max_cluster_members")]
    pub max_cluster_members: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_128
}
fn default_max_vectors() -> usize {
    10_000
}
fn default_hash_functions() -> usize {
    MAX_HASH_FUNCTIONS
}
fn default_bucket_capacity() -> usize {
    DEFAULT_BUCKET_CAPACITY
}
fn default_max_clusters() -> usize {
    16
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_convergence_threshold() -> f32 {
    DEFAULT_CONVERGENCE_THRESHOLD
}
fn default_max_cluster_members() -> usize {
    DEFAULT_MAX_CLUSTER_MEMBERS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            log_level: default_log_level(),
            index: IndexSettings::default(),
            lsh: LshSettings::default(),
            clustering: ClusteringSettings::default(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            max_vectors: default_max_vectors(),
            seed: None,
        }
    }
}

impl Default for LshSettings {
    fn default() -> Self {
        Self {
            hash_functions: default_hash_functions(),
            bucket_capacity: default_bucket_capacity(),
            overflow: BucketOverflow::Drop,
        }
    }
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            max_clusters: default_max_clusters(),
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            max_cluster_members: default_max_cluster_members(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `LS_` overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore
            // stays inside field names
            .merge(Env::prefixed("LS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.lattice/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Validates the settings and builds the index construction config.
    ///
    /// A missing seed is drawn from the thread RNG here so the returned
    /// config is always reproducible.
    pub fn index_config(&self) -> IndexResult<IndexConfig> {
        let dimension = VectorDimension::new(self.index.dimension).map_err(|e| {
            IndexError::ConfigError {
                reason: format!("index.dimension: {e}"),
            }
        })?;

        let checks = [
            ("index.max_vectors", self.index.max_vectors),
            ("lsh.hash_functions", self.lsh.hash_functions),
            ("lsh.bucket_capacity", self.lsh.bucket_capacity),
            ("clustering.max_clusters", self.clustering.max_clusters),
            ("clustering.max_iterations", self.clustering.max_iterations),
            ("clustering.max_cluster_members", self.clustering.max_cluster_members),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(IndexError::ConfigError {
                reason: format!("{name} must be greater than zero"),
            });
        }
        if self.lsh.hash_functions > MAX_HASH_FUNCTIONS {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "lsh.hash_functions must be at most {MAX_HASH_FUNCTIONS}, got {}",
                    self.lsh.hash_functions
                ),
            });
        }
        let threshold = self.clustering.convergence_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(IndexError::ConfigError {
                reason: "clustering.convergence_threshold must be non-negative".to_string(),
            });
        }

        Ok(IndexConfig {
            dimension,
            max_vectors: self.index.max_vectors,
            hash_functions: self.lsh.hash_functions,
            bucket_capacity: self.lsh.bucket_capacity,
            overflow: self.lsh.overflow,
            max_clusters: self.clustering.max_clusters,
            max_iterations: self.clustering.max_iterations,
            convergence_threshold: self.clustering.convergence_threshold,
            max_cluster_members: self.clustering.max_cluster_members,
            seed: self.index.seed.unwrap_or_else(rand::random),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.index.dimension, 128);
        assert_eq!(settings.lsh.hash_functions, 8);
        assert_eq!(settings.lsh.overflow, BucketOverflow::Drop);
        assert_eq!(settings.clustering.max_cluster_members, 1000);
        assert!(settings.index.seed.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.toml",
                r#"
version = 2
debug = true

[index]
dimension = 64
seed = 42

[lsh]
hash_functions = 4
overflow = "reject"

[clustering]
max_clusters = 3
"#,
            )?;

            let settings = Settings::load_from("settings.toml").map_err(|e| *e)?;
            assert_eq!(settings.version, 2);
            assert!(settings.debug);
            assert_eq!(settings.index.dimension, 64);
            assert_eq!(settings.index.seed, Some(42));
            assert_eq!(settings.lsh.hash_functions, 4);
            assert_eq!(settings.lsh.overflow, BucketOverflow::Reject);
            assert_eq!(settings.clustering.max_clusters, 3);
            // Untouched values keep their defaults
            assert_eq!(settings.index.max_vectors, 10_000);
            assert_eq!(settings.clustering.max_iterations, 100);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.toml",
                r#"
[lsh]
hash_functions = 4

[clustering]
max_clusters = 3
"#,
            )?;
            jail.set_env("LS_LSH__HASH_FUNCTIONS", "6");
            jail.set_env("LS_INDEX__MAX_VECTORS", "500");

            let settings = Settings::load_from("settings.toml").map_err(|e| *e)?;
            assert_eq!(settings.lsh.hash_functions, 6);
            assert_eq!(settings.index.max_vectors, 500);
            assert_eq!(settings.clustering.max_clusters, 3);
            Ok(())
        });
    }

    #[test]
    fn test_load_finds_workspace_config() {
        Jail::expect_with(|jail| {
            fs::create_dir_all(jail.directory().join(CONFIG_DIR)).map_err(|e| e.to_string())?;
            jail.create_file(
                format!("{CONFIG_DIR}/settings.toml"),
                "[clustering]\nmax_clusters = 7\n",
            )?;

            let settings = Settings::load().map_err(|e| *e)?;
            assert_eq!(settings.clustering.max_clusters, 7);
            Ok(())
        });
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.index.seed = Some(9);
        settings.clustering.max_clusters = 5;
        settings.save(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        let loaded: Settings = toml::from_str(&content).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_index_config_validation() {
        let mut settings = Settings::default();
        settings.index.seed = Some(1);
        let config = settings.index_config().unwrap();
        assert_eq!(config.dimension.get(), 128);
        assert_eq!(config.seed, 1);

        let mut bad = settings.clone();
        bad.clustering.max_clusters = 0;
        assert!(matches!(
            bad.index_config(),
            Err(IndexError::ConfigError { reason }) if reason.contains("max_clusters")
        ));

        let mut bad = settings.clone();
        bad.lsh.hash_functions = 9;
        assert!(bad.index_config().is_err());

        let mut bad = settings;
        bad.index.dimension = 0;
        assert!(bad.index_config().is_err());
    }
}
