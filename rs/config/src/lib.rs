pub mod enums;
pub mod kmeans;

pub use enums::{Backend, InitMethod};
pub use kmeans::KMeansConfig;
