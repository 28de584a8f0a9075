//! Datasets used to exercise the estimators: the bundled Iris data, and synthetic Gaussian blobs.

pub mod blobs;
pub mod data_home;
pub mod iris;
pub mod loader;

pub use blobs::{make_blobs, BlobsConfig, Centers};
pub use data_home::{data_home, DATA_HOME_ENV};
pub use iris::{load_iris, Bunch};
pub use loader::load_csv;
