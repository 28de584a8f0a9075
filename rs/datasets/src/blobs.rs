use anyhow::{anyhow, Result};
use log::debug;
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::{Distribution, Normal, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub enum Centers {
    /// Draw this many centers uniformly inside `center_box`.
    Count(usize),
    /// Use these centers, one per row.
    Fixed(Array2<f64>),
}

/// Parameters for isotropic Gaussian blobs.
#[derive(Debug, Clone)]
pub struct BlobsConfig {
    pub n_samples: usize,
    /// Ignored with `Centers::Fixed`, which carries its own dimension.
    pub n_features: usize,
    pub centers: Centers,
    pub cluster_std: f64,
    pub center_box: (f64, f64),
    pub shuffle: bool,
    pub random_state: u64,
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            n_samples: 100,
            n_features: 2,
            centers: Centers::Count(3),
            cluster_std: 1.0,
            center_box: (-10.0, 10.0),
            shuffle: true,
            random_state: 0,
        }
    }
}

impl BlobsConfig {
    pub fn new(n_samples: usize, num_centers: usize, random_state: u64) -> Self {
        Self {
            n_samples,
            centers: Centers::Count(num_centers),
            random_state,
            ..Default::default()
        }
    }
}

/// Generates `(data, labels)` where `labels[i]` is the index of the center sample `i` was drawn
/// around. Samples are split evenly between centers, the remainder going to the first ones.
pub fn make_blobs(config: &BlobsConfig) -> Result<(Array2<f64>, Array1<usize>)> {
    if config.cluster_std.is_nan() || config.cluster_std < 0.0 {
        return Err(anyhow!("cluster_std must be non-negative"));
    }
    let mut rng = StdRng::seed_from_u64(config.random_state);

    let centers = match &config.centers {
        Centers::Fixed(centers) => centers.clone(),
        Centers::Count(num_centers) => {
            if *num_centers == 0 || config.n_features == 0 {
                return Err(anyhow!("Need at least one center and one feature"));
            }
            let (low, high) = config.center_box;
            if low.is_nan() || high.is_nan() || low >= high {
                return Err(anyhow!("Invalid center_box ({}, {})", low, high));
            }
            let uniform = Uniform::new(low, high);
            Array2::from_shape_fn((*num_centers, config.n_features), |_| {
                uniform.sample(&mut rng)
            })
        }
    };
    let (num_centers, n_features) = centers.dim();
    if num_centers == 0 || n_features == 0 {
        return Err(anyhow!("Need at least one center and one feature"));
    }

    let mut data = Vec::with_capacity(config.n_samples * n_features);
    let mut labels = Vec::with_capacity(config.n_samples);
    for (center_idx, center) in centers.rows().into_iter().enumerate() {
        let mut count = config.n_samples / num_centers;
        if center_idx < config.n_samples % num_centers {
            count += 1;
        }
        let normals = center
            .iter()
            .map(|&mean| Normal::new(mean, config.cluster_std))
            .collect::<Result<Vec<_>, _>>()?;
        for _ in 0..count {
            for normal in normals.iter() {
                data.push(normal.sample(&mut rng));
            }
            labels.push(center_idx);
        }
    }

    let mut order: Vec<usize> = (0..config.n_samples).collect();
    if config.shuffle {
        order.shuffle(&mut rng);
    }

    let shuffled_data = Array2::from_shape_fn((config.n_samples, n_features), |(i, j)| {
        data[order[i] * n_features + j]
    });
    let shuffled_labels = order.iter().map(|&i| labels[i]).collect::<Array1<usize>>();
    debug!(
        "Generated {} blobs samples around {} centers",
        config.n_samples, num_centers
    );
    Ok((shuffled_data, shuffled_labels))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_make_blobs_shape_and_split() {
        let (data, labels) = make_blobs(&BlobsConfig::new(101, 10, 42)).unwrap();
        assert_eq!(data.dim(), (101, 2));
        assert_eq!(labels.len(), 101);

        let mut counts = vec![0; 10];
        labels.iter().for_each(|&label| counts[label] += 1);
        assert_eq!(counts[0], 11);
        assert!(counts[1..].iter().all(|&count| count == 10));
    }

    #[test]
    fn test_make_blobs_is_deterministic() {
        let config = BlobsConfig::new(500, 4, 7);
        let (data_a, labels_a) = make_blobs(&config).unwrap();
        let (data_b, labels_b) = make_blobs(&config).unwrap();
        assert_eq!(data_a, data_b);
        assert_eq!(labels_a, labels_b);

        let (data_c, _) = make_blobs(&BlobsConfig::new(500, 4, 8)).unwrap();
        assert_ne!(data_a, data_c);
    }

    #[test]
    fn test_make_blobs_fixed_centers() {
        let config = BlobsConfig {
            n_samples: 4,
            centers: Centers::Fixed(array![[0.0, 0.0, 0.0], [100.0, 100.0, 100.0]]),
            cluster_std: 0.0,
            shuffle: false,
            ..Default::default()
        };
        let (data, labels) = make_blobs(&config).unwrap();
        assert_eq!(data.dim(), (4, 3));
        assert_eq!(labels.to_vec(), vec![0, 0, 1, 1]);
        assert_eq!(data.row(3).to_vec(), vec![100.0, 100.0, 100.0]);
    }

    #[test]
    fn test_make_blobs_invalid() {
        assert!(make_blobs(&BlobsConfig::new(10, 0, 0)).is_err());
        let config = BlobsConfig {
            cluster_std: -1.0,
            ..Default::default()
        };
        assert!(make_blobs(&config).is_err());
        let config = BlobsConfig {
            center_box: (1.0, 1.0),
            ..Default::default()
        };
        assert!(make_blobs(&config).is_err());
    }
}
