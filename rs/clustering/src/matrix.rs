use std::slice::ChunksExact;

use anyhow::{anyhow, Result};
use ndarray::{Array2, ArrayView2};

use crate::element::{convert, Element, Scalar};

/// Row-major matrix stored as one flattened buffer, so each row is a contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatMatrix<F> {
    values: Vec<F>,
    num_rows: usize,
    dimension: usize,
}

impl<F: Scalar> FlatMatrix<F> {
    /// Copies `x` into compute precision. Fails on empty input or non-finite values.
    pub fn from_view<T: Element>(x: ArrayView2<T>) -> Result<Self> {
        let (num_rows, dimension) = x.dim();
        if num_rows == 0 {
            return Err(anyhow!("Input has no samples"));
        }
        if dimension == 0 {
            return Err(anyhow!("Input has no features"));
        }

        let mut values = Vec::with_capacity(num_rows * dimension);
        // `iter` walks in logical row-major order whatever the memory layout.
        for (idx, value) in x.iter().enumerate() {
            if !value.as_f64().is_finite() {
                return Err(anyhow!(
                    "Input contains a non-finite value at row {}, column {}",
                    idx / dimension,
                    idx % dimension
                ));
            }
            values.push(convert::<T, F>(*value));
        }

        Ok(Self {
            values,
            num_rows,
            dimension,
        })
    }

    pub fn from_rows(rows: &[Vec<f64>], dimension: usize) -> Result<Self> {
        let mut values = Vec::with_capacity(rows.len() * dimension);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(anyhow!(
                    "Row {} has {} features, expected {}",
                    idx,
                    row.len(),
                    dimension
                ));
            }
            if row.iter().any(|value| !value.is_finite()) {
                return Err(anyhow!("Row {} contains a non-finite value", idx));
            }
            values.extend(row.iter().map(|&value| F::narrow(value)));
        }
        Ok(Self {
            values,
            num_rows: rows.len(),
            dimension,
        })
    }

    pub fn from_array(array: &Array2<f64>) -> Self {
        let (num_rows, dimension) = array.dim();
        Self {
            values: array.iter().map(|&value| F::narrow(value)).collect(),
            num_rows,
            dimension,
        }
    }

    #[inline(always)]
    pub fn row(&self, idx: usize) -> &[F] {
        &self.values[idx * self.dimension..(idx + 1) * self.dimension]
    }

    pub fn rows(&self) -> ChunksExact<'_, F> {
        self.values.chunks_exact(self.dimension)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn values(&self) -> &[F] {
        &self.values
    }

    pub fn into_values(self) -> Vec<F> {
        self.values
    }

    /// Mean over features of the per-feature population variance.
    pub fn mean_feature_variance(&self) -> f64 {
        let n = self.num_rows as f64;
        let mut means = vec![0.0f64; self.dimension];
        for row in self.rows() {
            for (mean, value) in means.iter_mut().zip(row.iter()) {
                *mean += value.widen();
            }
        }
        means.iter_mut().for_each(|mean| *mean /= n);

        let mut variances = vec![0.0f64; self.dimension];
        for row in self.rows() {
            for ((variance, mean), value) in variances.iter_mut().zip(means.iter()).zip(row.iter())
            {
                let diff = value.widen() - mean;
                *variance += diff * diff;
            }
        }
        variances.iter().map(|variance| variance / n).sum::<f64>() / self.dimension as f64
    }
}

/// Reshapes flattened centroids into a (num_clusters, dimension) array of doubles.
pub(crate) fn to_array<F: Scalar>(values: &[F], dimension: usize) -> Result<Array2<f64>> {
    let widened = values.iter().map(|value| value.widen()).collect::<Vec<f64>>();
    Ok(Array2::from_shape_vec((values.len() / dimension, dimension), widened)?)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_from_view_row_major() {
        let x = array![[1.0f64, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let matrix = FlatMatrix::<f32>::from_view(x.view()).unwrap();
        assert_eq!(matrix.num_rows(), 3);
        assert_eq!(matrix.dimension(), 2);
        assert_eq!(matrix.row(1), &[3.0f32, 4.0]);

        // Transposed views are not contiguous in row-major order.
        let transposed = x.t();
        let matrix = FlatMatrix::<f64>::from_view(transposed).unwrap();
        assert_eq!(matrix.row(0), &[1.0, 3.0, 5.0]);
        assert_eq!(matrix.rows().count(), 2);
    }

    #[test]
    fn test_from_view_rejects_bad_input() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(FlatMatrix::<f64>::from_view(empty.view()).is_err());
        let no_features = Array2::<f64>::zeros((3, 0));
        assert!(FlatMatrix::<f64>::from_view(no_features.view()).is_err());
        let with_nan = array![[1.0f64, f64::NAN]];
        assert!(FlatMatrix::<f64>::from_view(with_nan.view()).is_err());
        let with_inf = array![[1.0f32], [f32::INFINITY]];
        assert!(FlatMatrix::<f32>::from_view(with_inf.view()).is_err());
    }

    #[test]
    fn test_from_rows() {
        let matrix = FlatMatrix::<f64>::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(matrix.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert!(FlatMatrix::<f64>::from_rows(&[vec![1.0]], 2).is_err());
        assert!(FlatMatrix::<f64>::from_rows(&[vec![f64::NAN, 1.0]], 2).is_err());
    }

    #[test]
    fn test_mean_feature_variance() {
        let x = array![[0.0f64, 10.0], [2.0, 10.0]];
        let matrix = FlatMatrix::<f64>::from_view(x.view()).unwrap();
        // Variances are 1.0 and 0.0
        assert_eq!(matrix.mean_feature_variance(), 0.5);
    }

    #[test]
    fn test_to_array() {
        let array = to_array(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        assert_eq!(array, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }
}
