//! Sequential double precision k-means. It shares no code path with the device engine apart
//! from the scalar distance, which makes it a baseline for both accuracy and speed.

use anyhow::{anyhow, Result};
use log::debug;
use utils::distance::l2::{l2_distance, NonStreamingL2DistanceCalculator};
use utils::CalculateSquared;

pub struct ReferenceKMeans {
    pub num_clusters: usize,
    pub max_iter: usize,

    // Absolute threshold on the summed squared centroid shift.
    pub tolerance: f64,

    // data shape
    pub dimension: usize,
}

pub struct ReferenceResult {
    // Flattened centroids
    pub centroids: Vec<f64>,
    pub assignments: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
}

impl ReferenceKMeans {
    pub fn new(num_clusters: usize, max_iter: usize, tolerance: f64, dimension: usize) -> Self {
        Self {
            num_clusters,
            max_iter,
            tolerance,
            dimension,
        }
    }

    fn validate(&self, data: &[&[f64]], centroids: &[f64]) -> Result<()> {
        for data_point in data.iter() {
            if data_point.len() != self.dimension {
                return Err(anyhow!(
                    "Dimension of data point {} is not equal to dimension of KMeans object {}",
                    data_point.len(),
                    self.dimension
                ));
            }
        }
        if centroids.len() != self.num_clusters * self.dimension {
            return Err(anyhow!(
                "Expected {} centroid values, got {}",
                self.num_clusters * self.dimension,
                centroids.len()
            ));
        }
        Ok(())
    }

    fn nearest(&self, data_point: &[f64], centroids: &[f64]) -> (usize, f64) {
        let distance_calculator = NonStreamingL2DistanceCalculator {};
        let mut min_distance = f64::INFINITY;
        let mut label = 0;
        for centroid_id in 0..self.num_clusters {
            let centroid =
                &centroids[centroid_id * self.dimension..(centroid_id + 1) * self.dimension];
            let distance = distance_calculator.calculate_squared(data_point, centroid);
            if distance < min_distance {
                min_distance = distance;
                label = centroid_id;
            }
        }
        (label, min_distance)
    }

    /// Closest centroid of every data point, with the squared distance to it.
    pub fn assign(&self, data: Vec<&[f64]>, centroids: &[f64]) -> Result<Vec<(usize, f64)>> {
        self.validate(&data, centroids)?;
        Ok(data
            .iter()
            .map(|data_point| self.nearest(data_point, centroids))
            .collect())
    }

    pub fn predict(&self, data: Vec<&[f64]>, centroids: &[f64]) -> Result<Vec<usize>> {
        Ok(self
            .assign(data, centroids)?
            .into_iter()
            .map(|(label, _)| label)
            .collect())
    }

    /// Euclidean distance of every data point to every centroid, row-major. Two squared
    /// distances one ulp apart can share a square root, so the first minimum of a row may name a
    /// lower index than `predict` in that case.
    pub fn transform(&self, data: Vec<&[f64]>, centroids: &[f64]) -> Result<Vec<f64>> {
        self.validate(&data, centroids)?;
        let mut distances = Vec::with_capacity(data.len() * self.num_clusters);
        for data_point in data.iter() {
            for centroid in centroids.chunks_exact(self.dimension) {
                distances.push(l2_distance(data_point, centroid));
            }
        }
        Ok(distances)
    }

    pub fn fit(&self, data: Vec<&[f64]>, initial_centroids: Vec<f64>) -> Result<ReferenceResult> {
        self.validate(&data, &initial_centroids)?;
        if data.len() < self.num_clusters {
            return Err(anyhow!(
                "n_samples={} should be >= n_clusters={}",
                data.len(),
                self.num_clusters
            ));
        }
        Ok(self.run_lloyd(data, initial_centroids))
    }

    fn run_lloyd(&self, data_points: Vec<&[f64]>, initial_centroids: Vec<f64>) -> ReferenceResult {
        let num_data_points = data_points.len();
        let mut centroids = initial_centroids;
        let mut cluster_labels = vec![0; num_data_points];
        let mut n_iter = 0;

        for iteration in 0..self.max_iter {
            // Assign points
            let mut cluster_sizes = vec![0; self.num_clusters];
            let mut inertia = 0.0;
            for i in 0..num_data_points {
                let (label, distance) = self.nearest(data_points[i], &centroids);
                cluster_labels[i] = label;
                cluster_sizes[label] += 1;
                inertia += distance;
            }

            // Flattened centroids
            let mut new_centroids = vec![0.0; self.num_clusters * self.dimension];
            for i in 0..num_data_points {
                let data_point = &data_points[i];
                let label = cluster_labels[i];
                for j in 0..self.dimension {
                    new_centroids[label * self.dimension + j] += data_point[j];
                }
            }
            new_centroids.iter_mut().enumerate().for_each(|x| {
                let size = cluster_sizes[x.0 / self.dimension];
                if size > 0 {
                    *x.1 /= size as f64;
                }
            });

            // Empty clusters keep nothing from the sums above; move them to the farthest points.
            let empty_clusters = (0..self.num_clusters)
                .filter(|&cluster| cluster_sizes[cluster] == 0)
                .collect::<Vec<usize>>();
            if !empty_clusters.is_empty() {
                let mut farthest = (0..num_data_points)
                    .map(|i| {
                        let label = cluster_labels[i];
                        let centroid =
                            &centroids[label * self.dimension..(label + 1) * self.dimension];
                        let distance = NonStreamingL2DistanceCalculator {}
                            .calculate_squared(data_points[i], centroid);
                        (distance, i)
                    })
                    .collect::<Vec<(f64, usize)>>();
                farthest.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
                for (cluster, (_, i)) in empty_clusters.iter().zip(farthest.iter()) {
                    new_centroids[cluster * self.dimension..(cluster + 1) * self.dimension]
                        .copy_from_slice(data_points[*i]);
                }
                // Clusters left without a point to take keep their previous position.
                for cluster in empty_clusters.iter().skip(farthest.len()) {
                    new_centroids[cluster * self.dimension..(cluster + 1) * self.dimension]
                        .copy_from_slice(
                            &centroids[cluster * self.dimension..(cluster + 1) * self.dimension],
                        );
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            debug!(
                "Reference iteration {} - inertia: {:.4} | center shift: {:.6e}",
                iteration + 1,
                inertia,
                shift
            );
            centroids = new_centroids;
            n_iter = iteration + 1;

            // Check convergence
            if shift <= self.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for i in 0..num_data_points {
            let (label, distance) = self.nearest(data_points[i], &centroids);
            cluster_labels[i] = label;
            inertia += distance;
        }

        ReferenceResult {
            centroids,
            assignments: cluster_labels,
            inertia,
            n_iter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nine_points() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![40.0, 40.0],
            vec![90.0, 90.0],
            vec![1.0, 1.0],
            vec![41.0, 41.0],
            vec![91.0, 91.0],
            vec![2.0, 2.0],
            vec![42.0, 42.0],
            vec![92.0, 92.0],
        ]
    }

    #[test]
    fn test_reference_lloyd() {
        let data = nine_points();
        let kmeans = ReferenceKMeans::new(3, 100, 0.0, 2);
        let data_ref = data.iter().map(|x| x.as_slice()).collect();
        let result = kmeans
            .fit(data_ref, vec![0.0, 0.0, 40.0, 40.0, 50.0, 50.0])
            .expect("KMeans run should succeed");

        assert_eq!(kmeans.num_clusters, 3);
        assert_eq!(kmeans.max_iter, 100);
        assert_eq!(kmeans.dimension, 2);

        assert_eq!(result.centroids, vec![1.0, 1.0, 41.0, 41.0, 91.0, 91.0]);
        assert_eq!(result.assignments[0], result.assignments[3]);
        assert_eq!(result.assignments[0], result.assignments[6]);
        assert_eq!(result.assignments[1], result.assignments[4]);
        assert_eq!(result.assignments[1], result.assignments[7]);
        assert_eq!(result.assignments[2], result.assignments[5]);
        assert_eq!(result.assignments[2], result.assignments[8]);
        assert!((result.inertia - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_empty_cluster_relocated() {
        let data = nine_points();
        let kmeans = ReferenceKMeans::new(3, 100, 0.0, 2);
        let data_ref = data.iter().map(|x| x.as_slice()).collect();
        // The last centroid is too far away to ever win a point at first.
        let result = kmeans
            .fit(data_ref, vec![1.0, 1.0, 66.0, 66.0, 1000.0, 1000.0])
            .expect("KMeans run should succeed");
        let mut sizes = vec![0; 3];
        result.assignments.iter().for_each(|&label| sizes[label] += 1);
        assert!(sizes.iter().all(|&size| size > 0));
    }

    #[test]
    fn test_reference_predict_and_transform() {
        let data = nine_points();
        let kmeans = ReferenceKMeans::new(3, 100, 0.0, 2);
        let centroids = vec![1.0, 1.0, 41.0, 41.0, 91.0, 91.0];
        let data_ref: Vec<&[f64]> = data.iter().map(|x| x.as_slice()).collect();
        let labels = kmeans.predict(data_ref.clone(), &centroids).unwrap();
        assert_eq!(labels, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);

        let distances = kmeans.transform(data_ref, &centroids).unwrap();
        assert_eq!(distances.len(), 27);
        assert!((distances[0] - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_reference_transform_ties_go_to_lowest_index() {
        let kmeans = ReferenceKMeans::new(2, 10, 0.0, 2);
        let data = vec![vec![1.0, 1.0]];
        let data_ref: Vec<&[f64]> = data.iter().map(|x| x.as_slice()).collect();
        let centroids = vec![0.0, 2.0, 2.0, 0.0];

        let distances = kmeans.transform(data_ref.clone(), &centroids).unwrap();
        assert_eq!(distances, vec![2.0f64.sqrt(), 2.0f64.sqrt()]);
        assert_eq!(kmeans.predict(data_ref, &centroids).unwrap(), vec![0]);
    }

    #[test]
    fn test_reference_dimension_mismatch() {
        let kmeans = ReferenceKMeans::new(1, 10, 0.0, 3);
        let data = vec![vec![1.0, 2.0]];
        let data_ref = data.iter().map(|x| x.as_slice()).collect();
        assert!(kmeans.fit(data_ref, vec![0.0, 0.0, 0.0]).is_err());

        let data = vec![vec![1.0, 2.0, 3.0]];
        let data_ref = data.iter().map(|x| x.as_slice()).collect();
        assert!(kmeans.fit(data_ref, vec![0.0, 0.0]).is_err());
    }
}
