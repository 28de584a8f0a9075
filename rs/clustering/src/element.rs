use std::fmt::Debug;

use num_traits::Float;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Floating point width the iterations run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Single,
    Double,
}

/// A float type the engine computes in.
pub trait Scalar: Float + Send + Sync + Debug + 'static {
    const PRECISION: Precision;

    fn widen(self) -> f64;

    fn narrow(value: f64) -> Self;
}

impl Scalar for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline(always)]
    fn widen(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn narrow(value: f64) -> Self {
        value as f32
    }
}

impl Scalar for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline(always)]
    fn widen(self) -> f64 {
        self
    }

    #[inline(always)]
    fn narrow(value: f64) -> Self {
        value
    }
}

/// An input element type. Doubles are processed in double precision; singles and integers in
/// single precision.
pub trait Element: Copy + Send + Sync + 'static {
    type Compute: Scalar;

    fn as_f64(self) -> f64;
}

impl Element for f64 {
    type Compute = f64;

    fn as_f64(self) -> f64 {
        self
    }
}

impl Element for f32 {
    type Compute = f32;

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Element for i32 {
    type Compute = f32;

    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// Converts an input element to the compute type `F`. Going through f64 is exact for every
/// `Element`, so the result is the nearest `F` to the input value.
#[inline(always)]
pub(crate) fn convert<T: Element, F: Scalar>(value: T) -> F {
    F::narrow(value.as_f64())
}
