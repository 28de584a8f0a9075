use num_traits::Float;
use strum::EnumIter;

use crate::distance::CalculateSquared;

/// Kernels available for squared L2. The choice only depends on the dimension, so every caller
/// working on the same data ends up with the same summation order.
#[derive(Debug, EnumIter, PartialEq, Eq, Clone, Copy)]
pub enum L2DistanceCalculatorImpl {
    Scalar,
    Lanes4,
    Lanes8,
    Lanes16,
}

impl L2DistanceCalculatorImpl {
    pub fn for_dimension(dimension: usize) -> Self {
        if dimension % 16 == 0 {
            L2DistanceCalculatorImpl::Lanes16
        } else if dimension % 8 == 0 {
            L2DistanceCalculatorImpl::Lanes8
        } else if dimension % 4 == 0 {
            L2DistanceCalculatorImpl::Lanes4
        } else {
            L2DistanceCalculatorImpl::Scalar
        }
    }

    /// Whether this kernel can be used on vectors of the given dimension.
    pub fn supports(&self, dimension: usize) -> bool {
        match self {
            L2DistanceCalculatorImpl::Scalar => true,
            L2DistanceCalculatorImpl::Lanes4 => dimension % 4 == 0,
            L2DistanceCalculatorImpl::Lanes8 => dimension % 8 == 0,
            L2DistanceCalculatorImpl::Lanes16 => dimension % 16 == 0,
        }
    }
}

impl<F: Float> CalculateSquared<F> for L2DistanceCalculatorImpl {
    #[inline(always)]
    fn calculate_squared(&self, a: &[F], b: &[F]) -> F {
        match self {
            L2DistanceCalculatorImpl::Scalar => {
                NonStreamingL2DistanceCalculator {}.calculate_squared(a, b)
            }
            L2DistanceCalculatorImpl::Lanes4 => {
                LaneConformingL2DistanceCalculator::<4>::new().calculate_squared(a, b)
            }
            L2DistanceCalculatorImpl::Lanes8 => {
                LaneConformingL2DistanceCalculator::<8>::new().calculate_squared(a, b)
            }
            L2DistanceCalculatorImpl::Lanes16 => {
                LaneConformingL2DistanceCalculator::<16>::new().calculate_squared(a, b)
            }
        }
    }
}

/// Calculator where we know in advance that the dimension of vectors is a multiple of LANES.
/// Keeps LANES independent accumulators so the compiler can vectorize the inner loop.
pub struct LaneConformingL2DistanceCalculator<const LANES: usize> {}

impl<const LANES: usize> LaneConformingL2DistanceCalculator<LANES> {
    pub fn new() -> Self {
        Self {}
    }
}

impl<const LANES: usize> Default for LaneConformingL2DistanceCalculator<LANES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LANES: usize, F: Float> CalculateSquared<F>
    for LaneConformingL2DistanceCalculator<LANES>
{
    #[inline(always)]
    fn calculate_squared(&self, a: &[F], b: &[F]) -> F {
        let mut lanes = [F::zero(); LANES];
        for (a_chunk, b_chunk) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
            for i in 0..LANES {
                let diff = a_chunk[i] - b_chunk[i];
                lanes[i] = lanes[i] + diff * diff;
            }
        }
        lanes.iter().fold(F::zero(), |acc, &x| acc + x)
    }
}

/// Plain sequential sum, works for any dimension.
pub struct NonStreamingL2DistanceCalculator {}

impl<F: Float> CalculateSquared<F> for NonStreamingL2DistanceCalculator {
    #[inline(always)]
    fn calculate_squared(&self, a: &[F], b: &[F]) -> F {
        a.iter().zip(b.iter()).fold(F::zero(), |acc, (&x, &y)| {
            let diff = x - y;
            acc + diff * diff
        })
    }
}

pub fn l2_distance<F: Float>(a: &[F], b: &[F]) -> F {
    NonStreamingL2DistanceCalculator {}
        .calculate_squared(a, b)
        .sqrt()
}
