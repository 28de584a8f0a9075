use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// How the initial centroids are chosen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InitMethod {
    /// Greedy k-means++ seeding.
    #[default]
    KMeansPlusPlus,

    /// Pick `n_clusters` distinct rows of the input uniformly at random.
    Random,

    /// Use the given centroids, one row per cluster. Implies a single restart.
    Explicit(Vec<Vec<f64>>),
}

impl InitMethod {
    pub fn is_explicit(&self) -> bool {
        matches!(self, InitMethod::Explicit(_))
    }
}

/// Which implementation runs the Lloyd iterations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumIter, Display)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Assignment sharded across devices, block-ordered reduction.
    #[default]
    Accelerated,

    /// Sequential double precision implementation. Slow, used as a baseline.
    Reference,
}
