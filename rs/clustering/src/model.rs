use std::path::Path;

use anyhow::{Context, Result};
use config::Backend;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::element::Precision;

/// State produced by a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// One row per cluster, (n_clusters, n_features).
    pub cluster_centers: Array2<f64>,

    /// Cluster of every training sample.
    pub labels: Array1<usize>,

    /// Sum of squared distances of the training samples to their centroid.
    pub inertia: f64,

    /// Lloyd iterations run by the winning restart.
    pub n_iter: usize,

    /// Precision the centroids were computed in. Prediction uses the same one.
    pub precision: Precision,

    pub backend: Backend,
}

impl FittedModel {
    pub fn n_clusters(&self) -> usize {
        self.cluster_centers.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.cluster_centers.ncols()
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model from {}", path.display()))?;
        let model = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model in {}", path.display()))?;
        Ok(model)
    }
}
