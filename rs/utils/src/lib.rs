pub mod cluster_metrics;
pub mod distance;
pub mod test_utils;

pub use distance::CalculateSquared;
