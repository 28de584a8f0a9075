use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{anyhow, Result};
use config::{Backend, InitMethod, KMeansConfig};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use utils::distance::l2::{L2DistanceCalculatorImpl, NonStreamingL2DistanceCalculator};

use crate::device::DeviceSet;
use crate::element::{Element, Precision, Scalar};
use crate::init::init_centroids;
use crate::lloyd::{pairwise_squared_distances, predict_labels, run_lloyd, LloydParams, LloydResult};
use crate::matrix::{to_array, FlatMatrix};
use crate::model::FittedModel;
use crate::reference::{ReferenceKMeans, ReferenceResult};

/// KMeans estimator: configure, `fit`, then `predict`/`transform` new data.
///
/// Fitting with `Backend::Accelerated` shards the assignment step over the configured devices.
/// Inputs of type `f64` are clustered in double precision, `f32` and `i32` in single precision.
/// Prediction on a fitted model always runs in the precision the model was fitted in.
pub struct KMeans {
    config: KMeansConfig,
    fitted: Option<FittedModel>,

    // Built on first use, dropped when the config changes.
    devices: OnceLock<DeviceSet>,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self {
            config,
            fitted: None,
            devices: OnceLock::new(),
        }
    }

    /// Estimator starting from the given centroids, one row per cluster. `n_clusters` is taken
    /// from the number of rows and a single restart is run.
    pub fn with_initial_centroids(config: KMeansConfig, centroids: ArrayView2<f64>) -> Self {
        let rows = centroids
            .outer_iter()
            .map(|row| row.to_vec())
            .collect::<Vec<Vec<f64>>>();
        let config = KMeansConfig {
            n_clusters: rows.len(),
            n_init: 1,
            ..config
        }
        .with_init(InitMethod::Explicit(rows));
        Self::new(config)
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Replaces the configuration. The fitted state is kept until the next `fit`.
    pub fn set_config(&mut self, config: KMeansConfig) {
        if config.n_devices != self.config.n_devices {
            self.devices = OnceLock::new();
        }
        self.config = config;
    }

    pub fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn model(&self) -> Result<&FittedModel> {
        self.fitted
            .as_ref()
            .ok_or_else(|| anyhow!("This KMeans instance is not fitted yet, call fit first"))
    }

    pub fn cluster_centers(&self) -> Result<&Array2<f64>> {
        Ok(&self.model()?.cluster_centers)
    }

    pub fn labels(&self) -> Result<&Array1<usize>> {
        Ok(&self.model()?.labels)
    }

    pub fn inertia(&self) -> Result<f64> {
        Ok(self.model()?.inertia)
    }

    pub fn n_iter(&self) -> Result<usize> {
        Ok(self.model()?.n_iter)
    }

    fn devices(&self) -> Result<&DeviceSet> {
        if let Some(devices) = self.devices.get() {
            return Ok(devices);
        }
        let devices = DeviceSet::new(self.config.n_devices)?;
        // Only `&mut self` methods reset the cell, so nobody else can have filled it meanwhile.
        let _ = self.devices.set(devices);
        self.devices
            .get()
            .ok_or_else(|| anyhow!("Device set was not initialized"))
    }

    /// One seed per restart, all derived from `random_state`.
    fn restart_seeds(&self) -> Vec<u64> {
        let master_seed = self.config.random_state.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(master_seed);
        (0..self.config.effective_n_init())
            .map(|_| rng.gen::<u64>())
            .collect()
    }

    /// Clusters `x`, replacing any previous fitted state.
    pub fn fit<T: Element>(&mut self, x: ArrayView2<T>) -> Result<&mut Self> {
        self.config.validate()?;
        let (n_samples, n_features) = x.dim();
        info!(
            "Fitting KMeans: {} samples, {} features, {} clusters, backend {}",
            n_samples, n_features, self.config.n_clusters, self.config.backend
        );

        let start = Instant::now();
        let model = match self.config.backend {
            Backend::Accelerated => self.fit_accelerated::<T::Compute, T>(x)?,
            Backend::Reference => self.fit_reference(x)?,
        };
        info!(
            "KMeans fit done in {:?}: inertia {:.4} after {} iterations ({} precision)",
            start.elapsed(),
            model.inertia,
            model.n_iter,
            model.precision
        );

        self.fitted = Some(model);
        Ok(self)
    }

    fn fit_accelerated<F: Scalar, T: Element>(&self, x: ArrayView2<T>) -> Result<FittedModel> {
        let data = FlatMatrix::<F>::from_view(x)?;
        let devices = self.devices()?;
        let calculator = L2DistanceCalculatorImpl::for_dimension(data.dimension());
        let params = LloydParams {
            num_clusters: self.config.n_clusters,
            max_iter: self.config.max_iter,
            tolerance: self.config.tol * data.mean_feature_variance(),
        };
        debug!(
            "Running on {} devices with {:?} distance, absolute tolerance {:.6e}",
            devices.len(),
            calculator,
            params.tolerance
        );

        let mut best: Option<LloydResult<F>> = None;
        for (restart, seed) in self.restart_seeds().into_iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed);
            let initial = init_centroids(
                &self.config.init,
                devices,
                &data,
                params.num_clusters,
                &mut rng,
                &calculator,
            )?;
            let result = run_lloyd(devices, &data, initial, &params, &calculator);
            debug!(
                "Restart {}: inertia {:.4} after {} iterations",
                restart, result.inertia, result.n_iter
            );
            if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
                best = Some(result);
            }
        }
        let best = best.ok_or_else(|| anyhow!("No restart was run"))?;

        Ok(FittedModel {
            cluster_centers: to_array(&best.centroids, data.dimension())?,
            labels: Array1::from(best.labels),
            inertia: best.inertia,
            n_iter: best.n_iter,
            precision: F::PRECISION,
            backend: Backend::Accelerated,
        })
    }

    fn fit_reference<T: Element>(&self, x: ArrayView2<T>) -> Result<FittedModel> {
        let data = FlatMatrix::<f64>::from_view(x)?;
        let devices = self.devices()?;
        let calculator = NonStreamingL2DistanceCalculator {};
        let reference = ReferenceKMeans::new(
            self.config.n_clusters,
            self.config.max_iter,
            self.config.tol * data.mean_feature_variance(),
            data.dimension(),
        );

        let mut best: Option<ReferenceResult> = None;
        for (restart, seed) in self.restart_seeds().into_iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed);
            let initial = init_centroids(
                &self.config.init,
                devices,
                &data,
                reference.num_clusters,
                &mut rng,
                &calculator,
            )?;
            let result = reference.fit(data.rows().collect(), initial)?;
            debug!(
                "Reference restart {}: inertia {:.4} after {} iterations",
                restart, result.inertia, result.n_iter
            );
            if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
                best = Some(result);
            }
        }
        let best = best.ok_or_else(|| anyhow!("No restart was run"))?;

        Ok(FittedModel {
            cluster_centers: to_array(&best.centroids, data.dimension())?,
            labels: Array1::from(best.assignments),
            inertia: best.inertia,
            n_iter: best.n_iter,
            precision: Precision::Double,
            backend: Backend::Reference,
        })
    }

    fn check_features(model: &FittedModel, n_features: usize) -> Result<()> {
        if n_features != model.n_features() {
            return Err(anyhow!(
                "X has {} features, but KMeans was fitted with {} features",
                n_features,
                model.n_features()
            ));
        }
        Ok(())
    }

    /// Closest centroid and squared distance to it, computed the way the model was fitted.
    fn nearest<T: Element>(&self, x: ArrayView2<T>) -> Result<Vec<(usize, f64)>> {
        let model = self.model()?;
        Self::check_features(model, x.ncols())?;
        match (model.backend, model.precision) {
            (Backend::Reference, _) => {
                let data = FlatMatrix::<f64>::from_view(x)?;
                self.reference_for(model)
                    .assign(data.rows().collect(), &flat_centers(model))
            }
            (Backend::Accelerated, Precision::Single) => self.nearest_in::<f32, T>(model, x),
            (Backend::Accelerated, Precision::Double) => self.nearest_in::<f64, T>(model, x),
        }
    }

    fn nearest_in<F: Scalar, T: Element>(
        &self,
        model: &FittedModel,
        x: ArrayView2<T>,
    ) -> Result<Vec<(usize, f64)>> {
        let data = FlatMatrix::<F>::from_view(x)?;
        let centroids = FlatMatrix::<F>::from_array(&model.cluster_centers);
        let calculator = L2DistanceCalculatorImpl::for_dimension(data.dimension());
        Ok(
            predict_labels(self.devices()?, &data, centroids.values(), &calculator)
                .into_iter()
                .map(|(label, distance)| (label, distance.widen()))
                .collect(),
        )
    }

    /// Index of the closest centroid for every sample of `x`. On the training data this equals
    /// `labels()`.
    pub fn predict<T: Element>(&self, x: ArrayView2<T>) -> Result<Array1<usize>> {
        Ok(self
            .nearest(x)?
            .into_iter()
            .map(|(label, _)| label)
            .collect())
    }

    /// Euclidean distance of every sample to every centroid, (n_samples, n_clusters).
    ///
    /// The row-wise arg-min equals `predict`, except when two squared distances are close enough
    /// to round to the same square root: the arg-min then names the lower index.
    pub fn transform<T: Element>(&self, x: ArrayView2<T>) -> Result<Array2<f64>> {
        let model = self.model()?;
        Self::check_features(model, x.ncols())?;
        let distances = match (model.backend, model.precision) {
            (Backend::Reference, _) => self.reference_transform(model, x)?,
            (Backend::Accelerated, Precision::Single) => self.transform_in::<f32, T>(model, x)?,
            (Backend::Accelerated, Precision::Double) => self.transform_in::<f64, T>(model, x)?,
        };
        Ok(Array2::from_shape_vec((x.nrows(), model.n_clusters()), distances)?)
    }

    fn transform_in<F: Scalar, T: Element>(
        &self,
        model: &FittedModel,
        x: ArrayView2<T>,
    ) -> Result<Vec<f64>> {
        let data = FlatMatrix::<F>::from_view(x)?;
        let centroids = FlatMatrix::<F>::from_array(&model.cluster_centers);
        let calculator = L2DistanceCalculatorImpl::for_dimension(data.dimension());
        Ok(
            pairwise_squared_distances(self.devices()?, &data, centroids.values(), &calculator)
                .into_iter()
                .map(|distance| distance.widen().sqrt())
                .collect(),
        )
    }

    /// Sequential implementation sized for `model`, for assignment only.
    fn reference_for(&self, model: &FittedModel) -> ReferenceKMeans {
        ReferenceKMeans::new(
            model.n_clusters(),
            self.config.max_iter,
            0.0,
            model.n_features(),
        )
    }

    fn reference_transform<T: Element>(
        &self,
        model: &FittedModel,
        x: ArrayView2<T>,
    ) -> Result<Vec<f64>> {
        let data = FlatMatrix::<f64>::from_view(x)?;
        self.reference_for(model)
            .transform(data.rows().collect(), &flat_centers(model))
    }

    /// Assignment of `x` computed by the sequential reference implementation, whatever backend
    /// fitted the model.
    pub fn reference_predict<T: Element>(&self, x: ArrayView2<T>) -> Result<Array1<usize>> {
        let model = self.model()?;
        Self::check_features(model, x.ncols())?;
        let data = FlatMatrix::<f64>::from_view(x)?;
        let labels = self
            .reference_for(model)
            .predict(data.rows().collect(), &flat_centers(model))?;
        Ok(Array1::from(labels))
    }

    pub fn fit_predict<T: Element>(&mut self, x: ArrayView2<T>) -> Result<Array1<usize>> {
        Ok(self.fit(x)?.labels()?.clone())
    }

    pub fn fit_transform<T: Element>(&mut self, x: ArrayView2<T>) -> Result<Array2<f64>> {
        self.fit(x)?.transform(x)
    }

    /// Opposite of the inertia of `x` against the fitted centroids.
    pub fn score<T: Element>(&self, x: ArrayView2<T>) -> Result<f64> {
        let inertia: f64 = self
            .nearest(x)?
            .into_iter()
            .map(|(_, distance)| distance)
            .sum();
        Ok(-inertia)
    }
}

/// Centroids flattened row by row.
fn flat_centers(model: &FittedModel) -> Vec<f64> {
    model.cluster_centers.iter().copied().collect()
}
