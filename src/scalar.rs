//! Scalar kind abstraction for the transform kernels.
//!
//! The transform matrix is either real (`f64`) or complex (`Complex64`);
//! wave-function coefficients are always complex. The `Scalar` trait carries
//! the little that differs between the two kinds (f64 component views for
//! the wire and the GPU, the flop weight for performance reporting) so the
//! tiling/gather algorithm is written once.

use std::fmt::Debug;

use bytemuck::Pod;
use faer_traits::ComplexField;
use num_complex::Complex64;
use num_traits::{One, Zero};

/// Matrix element kind for the parallel transform.
///
/// Implemented for `f64` and `Complex64`. The `ComplexField` bound is what
/// the faer GEMM requires; `Pod` is what allows reinterpreting buffers as
/// raw f64 components for collective communication and device upload.
pub trait Scalar:
    Copy + Clone + Debug + Default + PartialEq + Zero + One + ComplexField + Pod + Send + Sync + 'static
{
    /// Number of f64 components per element (1 for real, 2 for complex).
    const COMPONENTS: usize;

    /// Create a scalar from a real value.
    fn from_f64(v: f64) -> Self;

    /// Whether this kind is complex.
    fn is_complex() -> bool;

    /// Flops per multiply-add pair, for performance reporting
    /// (2 for real, 8 for complex).
    fn flops_per_madd() -> f64;

    /// View a slice of elements as its raw f64 components.
    fn components(slice: &[Self]) -> &[f64] {
        bytemuck::cast_slice(slice)
    }

    /// Mutable view of a slice of elements as its raw f64 components.
    fn components_mut(slice: &mut [Self]) -> &mut [f64] {
        bytemuck::cast_slice_mut(slice)
    }
}

impl Scalar for f64 {
    const COMPONENTS: usize = 1;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn is_complex() -> bool {
        false
    }

    fn flops_per_madd() -> f64 {
        2.0
    }
}

impl Scalar for Complex64 {
    const COMPONENTS: usize = 2;

    fn from_f64(v: f64) -> Self {
        Complex64::new(v, 0.0)
    }

    fn is_complex() -> bool {
        true
    }

    fn flops_per_madd() -> f64 {
        8.0
    }
}
