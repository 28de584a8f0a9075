pub mod l2;

/// Trait for calculating the squared L2 distance between two vectors. An optimization for when
/// the true L2 distance is not needed, e.g. nearest centroid search.
pub trait CalculateSquared<F> {
    fn calculate_squared(&self, a: &[F], b: &[F]) -> F;
}
