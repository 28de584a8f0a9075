//! KMeans clustering with an estimator-style API. The assignment step is sharded over a set of
//! compute devices; a sequential double precision implementation serves as a baseline.

pub mod device;
pub mod element;
pub mod estimator;
mod init;
mod lloyd;
mod matrix;
pub mod model;
pub mod reference;

pub use device::{DeviceSet, BLOCK_ROWS};
pub use element::{Element, Precision, Scalar};
pub use estimator::KMeans;
pub use model::FittedModel;
pub use reference::{ReferenceKMeans, ReferenceResult};
