use std::ops::Range;

use log::debug;
use utils::CalculateSquared;

use crate::device::DeviceSet;
use crate::element::Scalar;
use crate::matrix::FlatMatrix;

pub(crate) struct LloydParams {
    pub num_clusters: usize,
    pub max_iter: usize,

    // Absolute threshold on the summed squared centroid shift.
    pub tolerance: f64,
}

pub(crate) struct LloydResult<F> {
    // Flattened centroids
    pub centroids: Vec<F>,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
}

/// Statistics of one assignment pass, either for a single block or reduced over all of them.
struct AssignmentStats {
    sums: Vec<f64>,
    counts: Vec<usize>,
    labels: Vec<usize>,
    inertia: f64,
}

impl AssignmentStats {
    fn new(num_clusters: usize, dimension: usize, capacity: usize) -> Self {
        Self {
            sums: vec![0.0; num_clusters * dimension],
            counts: vec![0; num_clusters],
            labels: Vec::with_capacity(capacity),
            inertia: 0.0,
        }
    }

    fn merge(&mut self, other: AssignmentStats) {
        self.sums
            .iter_mut()
            .zip(other.sums.iter())
            .for_each(|(sum, other)| *sum += other);
        self.counts
            .iter_mut()
            .zip(other.counts.iter())
            .for_each(|(count, other)| *count += other);
        self.labels.extend(other.labels);
        self.inertia += other.inertia;
    }
}

/// Index and squared distance of the closest centroid. Ties go to the lowest index.
#[inline(always)]
pub(crate) fn nearest_centroid<F, D>(point: &[F], centroids: &[F], calculator: &D) -> (usize, F)
where
    F: Scalar,
    D: CalculateSquared<F>,
{
    let mut min_distance = F::infinity();
    let mut label = 0;
    for (centroid_id, centroid) in centroids.chunks_exact(point.len()).enumerate() {
        let distance = calculator.calculate_squared(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            label = centroid_id;
        }
    }
    (label, min_distance)
}

fn assign_block<F, D>(
    data: &FlatMatrix<F>,
    centroids: &[F],
    num_clusters: usize,
    calculator: &D,
    rows: Range<usize>,
) -> AssignmentStats
where
    F: Scalar,
    D: CalculateSquared<F>,
{
    let dimension = data.dimension();
    let mut stats = AssignmentStats::new(num_clusters, dimension, rows.len());
    for idx in rows {
        let point = data.row(idx);
        let (label, distance) = nearest_centroid(point, centroids, calculator);
        let sum = &mut stats.sums[label * dimension..(label + 1) * dimension];
        for (acc, value) in sum.iter_mut().zip(point.iter()) {
            *acc += value.widen();
        }
        stats.counts[label] += 1;
        stats.labels.push(label);
        stats.inertia += distance.widen();
    }
    stats
}

/// One sharded assignment pass, reduced in block order.
fn assign<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    centroids: &[F],
    num_clusters: usize,
    calculator: &D,
) -> AssignmentStats
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    let blocks = devices.map_blocks(data.num_rows(), |rows| {
        assign_block(data, centroids, num_clusters, calculator, rows)
    });
    let mut total = AssignmentStats::new(num_clusters, data.dimension(), data.num_rows());
    for block in blocks {
        total.merge(block);
    }
    total
}

/// Moves each empty cluster onto one of the points farthest from their own centroid, farthest
/// first, ties to the lowest index.
pub(crate) fn relocate_empty_clusters<F, D>(
    data: &FlatMatrix<F>,
    labels: &[usize],
    old_centroids: &[F],
    new_centroids: &mut [F],
    counts: &[usize],
    calculator: &D,
) where
    F: Scalar,
    D: CalculateSquared<F>,
{
    let empty_clusters = counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(cluster, _)| cluster)
        .collect::<Vec<usize>>();
    if empty_clusters.is_empty() {
        return;
    }

    let dimension = data.dimension();
    let mut farthest = labels
        .iter()
        .enumerate()
        .map(|(idx, &label)| {
            let centroid = &old_centroids[label * dimension..(label + 1) * dimension];
            (calculator.calculate_squared(data.row(idx), centroid).widen(), idx)
        })
        .collect::<Vec<(f64, usize)>>();
    farthest.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    for (cluster, (distance, idx)) in empty_clusters.iter().zip(farthest.iter()) {
        debug!(
            "Cluster {} is empty, relocating it to row {} (squared distance {:.4})",
            cluster, idx, distance
        );
        new_centroids[cluster * dimension..(cluster + 1) * dimension]
            .copy_from_slice(data.row(*idx));
    }
}

/// Squared Euclidean distance between the two centroid sets, summed over clusters.
pub(crate) fn centroid_shift<F: Scalar>(old: &[F], new: &[F]) -> f64 {
    old.iter()
        .zip(new.iter())
        .map(|(a, b)| {
            let diff = a.widen() - b.widen();
            diff * diff
        })
        .sum()
}

/// Lloyd iterations from `initial_centroids` until the centroid shift drops to the tolerance
/// or `max_iter` is reached. The returned labels and inertia come from a final assignment
/// against the returned centroids.
pub(crate) fn run_lloyd<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    initial_centroids: Vec<F>,
    params: &LloydParams,
    calculator: &D,
) -> LloydResult<F>
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    let dimension = data.dimension();
    let num_clusters = params.num_clusters;
    let mut centroids = initial_centroids;
    let mut n_iter = 0;

    for iteration in 0..params.max_iter {
        let stats = assign(devices, data, &centroids, num_clusters, calculator);

        let mut new_centroids = centroids.clone();
        for cluster in 0..num_clusters {
            let count = stats.counts[cluster];
            if count == 0 {
                continue;
            }
            for j in 0..dimension {
                let idx = cluster * dimension + j;
                new_centroids[idx] = F::narrow(stats.sums[idx] / count as f64);
            }
        }
        relocate_empty_clusters(
            data,
            &stats.labels,
            &centroids,
            &mut new_centroids,
            &stats.counts,
            calculator,
        );

        let shift = centroid_shift(&centroids, &new_centroids);
        debug!(
            "Iteration {} - inertia: {:.4} | center shift: {:.6e}",
            iteration + 1,
            stats.inertia,
            shift
        );
        centroids = new_centroids;
        n_iter = iteration + 1;

        if shift <= params.tolerance {
            debug!(
                "Converged at iteration {}: center shift {:.6e} within tolerance {:.6e}",
                n_iter, shift, params.tolerance
            );
            break;
        }
    }

    let stats = assign(devices, data, &centroids, num_clusters, calculator);
    LloydResult {
        centroids,
        labels: stats.labels,
        inertia: stats.inertia,
        n_iter,
    }
}

/// Labels and squared distances of every row to its closest centroid, in row order.
pub(crate) fn predict_labels<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    centroids: &[F],
    calculator: &D,
) -> Vec<(usize, F)>
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    devices
        .map_blocks(data.num_rows(), |rows| {
            rows.map(|idx| nearest_centroid(data.row(idx), centroids, calculator))
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect()
}

/// Squared distance of every row to every centroid, row-major (num_rows, num_clusters).
pub(crate) fn pairwise_squared_distances<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    centroids: &[F],
    calculator: &D,
) -> Vec<F>
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    let dimension = data.dimension();
    devices
        .map_blocks(data.num_rows(), |rows| {
            let mut distances = Vec::with_capacity(rows.len() * centroids.len() / dimension);
            for idx in rows {
                let point = data.row(idx);
                distances.extend(
                    centroids
                        .chunks_exact(dimension)
                        .map(|centroid| calculator.calculate_squared(point, centroid)),
                );
            }
            distances
        })
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use utils::distance::l2::{L2DistanceCalculatorImpl, NonStreamingL2DistanceCalculator};

    use super::*;

    fn nine_points() -> FlatMatrix<f32> {
        let data = array![
            [0.0f32, 0.0],
            [40.0, 40.0],
            [90.0, 90.0],
            [1.0, 1.0],
            [41.0, 41.0],
            [91.0, 91.0],
            [2.0, 2.0],
            [42.0, 42.0],
            [92.0, 92.0],
        ];
        FlatMatrix::from_view(data.view()).unwrap()
    }

    #[test]
    fn test_kmeans_lloyd() {
        let data = nine_points();
        let devices = DeviceSet::new(Some(1)).unwrap();
        let params = LloydParams {
            num_clusters: 3,
            max_iter: 100,
            tolerance: 0.0,
        };
        // The third centroid starts far from the last blob and has to walk there.
        let init = vec![0.0, 0.0, 40.0, 40.0, 50.0, 50.0];
        let result = run_lloyd(
            &devices,
            &data,
            init,
            &params,
            &NonStreamingL2DistanceCalculator {},
        );

        assert_eq!(result.centroids.len(), 3 * 2);
        assert_eq!(result.centroids[4], 91.0);
        assert_eq!(result.labels.len(), 9);
        assert_eq!(result.labels[0], result.labels[3]);
        assert_eq!(result.labels[0], result.labels[6]);
        assert_eq!(result.labels[1], result.labels[4]);
        assert_eq!(result.labels[1], result.labels[7]);
        assert_eq!(result.labels[2], result.labels[5]);
        assert_eq!(result.labels[2], result.labels[8]);
        assert!((result.inertia - 12.0).abs() < 1e-6);
        assert!(result.n_iter <= params.max_iter);
    }

    #[test]
    fn test_converged_start_stays_put() {
        let data = nine_points();
        let devices = DeviceSet::new(Some(2)).unwrap();
        let params = LloydParams {
            num_clusters: 3,
            max_iter: 100,
            tolerance: 0.0,
        };
        let init = vec![1.0, 1.0, 41.0, 41.0, 91.0, 91.0];
        let result = run_lloyd(
            &devices,
            &data,
            init.clone(),
            &params,
            &L2DistanceCalculatorImpl::Scalar,
        );
        assert_eq!(result.centroids, init);
        assert_eq!(result.n_iter, 1);
        assert_eq!(result.labels, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_max_iter_bounds_iterations() {
        let data = nine_points();
        let devices = DeviceSet::new(Some(1)).unwrap();
        let params = LloydParams {
            num_clusters: 3,
            max_iter: 1,
            tolerance: 0.0,
        };
        let init = vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let result = run_lloyd(
            &devices,
            &data,
            init,
            &params,
            &NonStreamingL2DistanceCalculator {},
        );
        assert_eq!(result.n_iter, 1);
    }

    #[test]
    fn test_relocate_empty_clusters() {
        let data = nine_points();
        // Everything assigned to cluster 0 around the origin; cluster 1 is empty.
        let labels = vec![0; 9];
        let old_centroids = vec![0.0f32, 0.0, 500.0, 500.0];
        let mut new_centroids = vec![46.0f32, 46.0, 500.0, 500.0];
        relocate_empty_clusters(
            &data,
            &labels,
            &old_centroids,
            &mut new_centroids,
            &[9, 0],
            &NonStreamingL2DistanceCalculator {},
        );
        assert_eq!(new_centroids, vec![46.0, 46.0, 92.0, 92.0]);
    }

    #[test]
    fn test_nearest_centroid_ties_go_to_lowest_index() {
        let centroids = [0.0f64, 2.0, 2.0, 0.0];
        let (label, distance) = nearest_centroid(
            &[1.0, 1.0],
            &centroids,
            &NonStreamingL2DistanceCalculator {},
        );
        assert_eq!(label, 0);
        assert_eq!(distance, 2.0);
    }

    #[test]
    fn test_pairwise_and_predict_agree() {
        let data = nine_points();
        let devices = DeviceSet::new(Some(3)).unwrap();
        let centroids = vec![1.0f32, 1.0, 41.0, 41.0, 91.0, 91.0];
        let calculator = L2DistanceCalculatorImpl::Scalar;
        let distances = pairwise_squared_distances(&devices, &data, &centroids, &calculator);
        let predictions = predict_labels(&devices, &data, &centroids, &calculator);
        assert_eq!(distances.len(), 27);
        for (row, (label, distance)) in predictions.iter().enumerate() {
            assert_eq!(distances[row * 3 + label], *distance);
        }
        assert_eq!(distances[0], 2.0);
    }
}
