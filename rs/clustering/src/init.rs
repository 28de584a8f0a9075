use anyhow::{anyhow, Result};
use config::InitMethod;
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use utils::CalculateSquared;

use crate::device::DeviceSet;
use crate::element::Scalar;
use crate::matrix::FlatMatrix;

/// Picks the initial flattened centroids for one restart.
pub(crate) fn init_centroids<F, D>(
    method: &InitMethod,
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    num_clusters: usize,
    rng: &mut StdRng,
    calculator: &D,
) -> Result<Vec<F>>
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    if data.num_rows() < num_clusters {
        return Err(anyhow!(
            "n_samples={} should be >= n_clusters={}",
            data.num_rows(),
            num_clusters
        ));
    }

    match method {
        InitMethod::KMeansPlusPlus => Ok(kmeans_plus_plus(
            devices,
            data,
            num_clusters,
            rng,
            calculator,
        )),
        InitMethod::Random => Ok(random_select(data, num_clusters, rng)),
        InitMethod::Explicit(centroids) => {
            if centroids.len() != num_clusters {
                return Err(anyhow!(
                    "Explicit init has {} centroids but n_clusters is {}",
                    centroids.len(),
                    num_clusters
                ));
            }
            Ok(FlatMatrix::<F>::from_rows(centroids, data.dimension())?.into_values())
        }
    }
}

/// Distinct rows drawn uniformly at random.
fn random_select<F: Scalar>(data: &FlatMatrix<F>, num_clusters: usize, rng: &mut StdRng) -> Vec<F> {
    let indices = rand::seq::index::sample(rng, data.num_rows(), num_clusters).into_vec();
    debug!("Random init picked rows {:?}", indices);
    indices
        .iter()
        .flat_map(|&idx| data.row(idx).iter().copied())
        .collect()
}

/// Index drawn with probability proportional to `weights[i]`. Falls back to a uniform draw when
/// every weight is zero (e.g. all remaining points duplicate a centroid).
fn sample_weighted(weights: &[f64], total: f64, rng: &mut StdRng) -> usize {
    if total <= 0.0 {
        return rng.gen_range(0..weights.len());
    }
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (idx, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative > target {
            return idx;
        }
    }
    // Rounding can leave `target` just above the last cumulative sum.
    weights.len() - 1
}

/// Squared distance of every row to `candidate`, combined with `closest` by minimum. Returns
/// the new per-row minimums and their sum, reduced in block order.
fn merge_candidate<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    closest: &[f64],
    candidate: usize,
    calculator: &D,
) -> (Vec<f64>, f64)
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    let candidate_row = data.row(candidate);
    let blocks = devices.map_blocks(data.num_rows(), |rows| {
        let mut block_closest = Vec::with_capacity(rows.len());
        let mut block_sum = 0.0;
        for idx in rows {
            let distance = calculator
                .calculate_squared(data.row(idx), candidate_row)
                .widen()
                .min(closest[idx]);
            block_closest.push(distance);
            block_sum += distance;
        }
        (block_closest, block_sum)
    });

    let mut merged = Vec::with_capacity(data.num_rows());
    let mut potential = 0.0;
    for (block_closest, block_sum) in blocks {
        merged.extend(block_closest);
        potential += block_sum;
    }
    (merged, potential)
}

/// Greedy k-means++: each new center is the best of `2 + ln(k)` candidates sampled
/// proportionally to the squared distance to the closest existing center.
fn kmeans_plus_plus<F, D>(
    devices: &DeviceSet,
    data: &FlatMatrix<F>,
    num_clusters: usize,
    rng: &mut StdRng,
    calculator: &D,
) -> Vec<F>
where
    F: Scalar,
    D: CalculateSquared<F> + Sync,
{
    let num_rows = data.num_rows();
    let num_local_trials = 2 + (num_clusters as f64).ln().floor() as usize;
    let mut centroids = Vec::with_capacity(num_clusters * data.dimension());

    let first = rng.gen_range(0..num_rows);
    centroids.extend_from_slice(data.row(first));
    let unbounded = vec![f64::INFINITY; num_rows];
    let (mut closest, mut potential) =
        merge_candidate(devices, data, &unbounded, first, calculator);
    let mut chosen = vec![first];

    for _ in 1..num_clusters {
        let candidates = (0..num_local_trials)
            .map(|_| sample_weighted(&closest, potential, rng))
            .collect::<Vec<usize>>();

        let mut best: Option<(usize, Vec<f64>, f64)> = None;
        for candidate in candidates {
            let (candidate_closest, candidate_potential) =
                merge_candidate(devices, data, &closest, candidate, calculator);
            let is_better = best
                .as_ref()
                .map_or(true, |(_, _, best_potential)| candidate_potential < *best_potential);
            if is_better {
                best = Some((candidate, candidate_closest, candidate_potential));
            }
        }

        // `num_local_trials` is at least 2, so there always is a best candidate.
        if let Some((candidate, candidate_closest, candidate_potential)) = best {
            centroids.extend_from_slice(data.row(candidate));
            closest = candidate_closest;
            potential = candidate_potential;
            chosen.push(candidate);
        }
    }

    debug!("k-means++ picked rows {:?}, potential {:.4}", chosen, potential);
    centroids
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng;
    use utils::distance::l2::NonStreamingL2DistanceCalculator;

    use super::*;

    fn sample_data() -> FlatMatrix<f64> {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
            [-10.0, 10.0],
            [-10.1, 10.0],
        ];
        FlatMatrix::from_view(x.view()).unwrap()
    }

    #[test]
    fn test_kmeans_plus_plus_spreads_centers() {
        let data = sample_data();
        let devices = DeviceSet::new(Some(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(123);
        let centroids = init_centroids(
            &InitMethod::KMeansPlusPlus,
            &devices,
            &data,
            3,
            &mut rng,
            &NonStreamingL2DistanceCalculator {},
        )
        .unwrap();
        assert_eq!(centroids.len(), 6);

        // One center per blob.
        let mut groups = centroids
            .chunks_exact(2)
            .map(|c| (c[0].round() as i64, c[1].round() as i64))
            .collect::<Vec<_>>();
        groups.sort();
        assert_eq!(groups, vec![(-10, 10), (0, 0), (10, 10)]);
    }

    #[test]
    fn test_init_is_deterministic_and_device_independent() {
        let data = sample_data();
        let single = DeviceSet::new(Some(1)).unwrap();
        let many = DeviceSet::new(Some(3)).unwrap();
        for method in [InitMethod::KMeansPlusPlus, InitMethod::Random] {
            let a = init_centroids(
                &method,
                &single,
                &data,
                3,
                &mut StdRng::seed_from_u64(7),
                &NonStreamingL2DistanceCalculator {},
            )
            .unwrap();
            let b = init_centroids(
                &method,
                &many,
                &data,
                3,
                &mut StdRng::seed_from_u64(7),
                &NonStreamingL2DistanceCalculator {},
            )
            .unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_random_select_distinct_rows() {
        let data = sample_data();
        let mut rng = StdRng::seed_from_u64(1);
        let centroids = random_select(&data, 8, &mut rng);
        let mut rows = centroids
            .chunks_exact(2)
            .map(|c| format!("{:?}", c))
            .collect::<Vec<_>>();
        rows.sort();
        rows.dedup();
        assert_eq!(rows.len(), 8);
    }

    #[test]
    fn test_explicit_and_errors() {
        let data = sample_data();
        let devices = DeviceSet::new(Some(1)).unwrap();
        let calculator = NonStreamingL2DistanceCalculator {};
        let mut rng = StdRng::seed_from_u64(1);

        let explicit = InitMethod::Explicit(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let centroids =
            init_centroids(&explicit, &devices, &data, 2, &mut rng, &calculator).unwrap();
        assert_eq!(centroids, vec![1.0, 2.0, 3.0, 4.0]);

        let wrong_dimension = InitMethod::Explicit(vec![vec![1.0], vec![3.0]]);
        assert!(
            init_centroids(&wrong_dimension, &devices, &data, 2, &mut rng, &calculator).is_err()
        );
        assert!(init_centroids(&explicit, &devices, &data, 3, &mut rng, &calculator).is_err());
        assert!(
            init_centroids(&InitMethod::Random, &devices, &data, 9, &mut rng, &calculator).is_err()
        );
    }

    #[test]
    fn test_sample_weighted() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(sample_weighted(&[0.0, 0.0, 5.0, 0.0], 5.0, &mut rng), 2);
        }
        let idx = sample_weighted(&[0.0, 0.0], 0.0, &mut rng);
        assert!(idx < 2);
    }
}
