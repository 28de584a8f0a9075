use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::enums::{Backend, InitMethod};

/// Config for a KMeans estimator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KMeansConfig {
    /// Number of clusters to form.
    /// Default: 8
    pub n_clusters: usize,

    /// Number of devices the assignment step is sharded over. `None` uses every
    /// available device. Results do not depend on this value.
    /// Default: None
    pub n_devices: Option<usize>,

    /// Seed for centroid initialization. With `None`, every fit draws a fresh seed, so
    /// repeated fits are not reproducible.
    /// Default: None
    pub random_state: Option<u64>,

    /// How the initial centroids are chosen.
    /// Default: k-means++
    pub init: InitMethod,

    /// Number of restarts with different seeds. The restart with the lowest inertia wins.
    /// Ignored (forced to 1) when `init` holds explicit centroids.
    /// Default: 1
    pub n_init: usize,

    /// Maximum number of Lloyd iterations per restart.
    /// Default: 300
    pub max_iter: usize,

    /// Relative tolerance on the squared centroid shift between two iterations. It is
    /// scaled by the mean per-feature variance of the input.
    /// Default: 1e-4
    pub tol: f64,

    /// Implementation used for fitting.
    /// Default: Accelerated
    pub backend: Backend,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            n_devices: None,
            random_state: None,
            init: InitMethod::KMeansPlusPlus,
            n_init: 1,
            max_iter: 300,
            tol: 1e-4,
            backend: Backend::Accelerated,
        }
    }
}

impl KMeansConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    pub fn with_n_devices(mut self, n_devices: Option<usize>) -> Self {
        self.n_devices = n_devices;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self
    }

    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Number of restarts that will actually run.
    pub fn effective_n_init(&self) -> usize {
        if self.init.is_explicit() {
            1
        } else {
            self.n_init
        }
    }

    /// Checks the parameters that don't depend on the input data.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(anyhow!("n_clusters must be positive"));
        }
        if self.n_init == 0 {
            return Err(anyhow!("n_init must be positive"));
        }
        if self.max_iter == 0 {
            return Err(anyhow!("max_iter must be positive"));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(anyhow!("tol must be non-negative, got {}", self.tol));
        }
        if self.n_devices == Some(0) {
            return Err(anyhow!("n_devices must be positive when set"));
        }
        if let InitMethod::Explicit(centroids) = &self.init {
            if centroids.len() != self.n_clusters {
                return Err(anyhow!(
                    "Explicit init has {} centroids but n_clusters is {}",
                    centroids.len(),
                    self.n_clusters
                ));
            }
        }
        Ok(())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: KMeansConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file {}", path.as_ref().display()))?;
        Ok(())
    }
}
