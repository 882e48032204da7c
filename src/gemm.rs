//! Local dense-multiply backend abstraction.
//!
//! The transform engine is written once against [`GemmBackend`]; the only
//! backend-specific code is the multiply call and its synchronization
//! point. [`HostGemm`] runs on the CPU through faer; `GpuGemm` (in
//! `gemm_gpu`) offloads to a wgpu compute device.
//!
//! The contract is deliberately narrower than BLAS `gemm`: `beta` is fixed
//! to one. The transform applies its `beta` scaling (or zeroing) once over
//! the whole destination range before the tile loop, so every per-tile
//! multiply is a pure accumulation.

use faer::linalg::matmul::matmul as faer_matmul;
use faer::{Accum, Par};

use crate::scalar::Scalar;

/// Backend for the local multiply-accumulate
/// `C += alpha * A * B`, all operands column-major:
/// `A` is `m x k` with leading dimension `lda`, `B` is `k x n` with `ldb`,
/// `C` is `m x n` with `ldc`.
pub trait GemmBackend<T: Scalar> {
    fn gemm_acc(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &[T],
        ldb: usize,
        c: &mut [T],
        ldc: usize,
    );

    /// Block until all multiply work issued through this backend has
    /// completed. Scratch buffers handed to `gemm_acc` may only be reused
    /// after this returns (a no-op for synchronous backends).
    fn synchronize(&self);
}

/// CPU backend over faer's GEMM.
///
/// Uses the rayon thread pool by default; `sequential()` pins the multiply
/// to the calling thread, which keeps small-tile overheads down in tests
/// and on narrow machines.
pub struct HostGemm {
    par: Par,
}

impl HostGemm {
    pub fn new() -> Self {
        Self {
            par: Par::rayon(0),
        }
    }

    pub fn sequential() -> Self {
        Self { par: Par::Seq }
    }
}

impl Default for HostGemm {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> GemmBackend<T> for HostGemm {
    fn gemm_acc(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        lda: usize,
        b: &[T],
        ldb: usize,
        c: &mut [T],
        ldc: usize,
    ) {
        if m == 0 || n == 0 {
            return;
        }
        if k == 0 {
            return;
        }
        assert!(lda >= m && ldb >= k && ldc >= m, "leading dimensions too small");
        assert!(a.len() >= (k - 1) * lda + m, "A slice too short");
        assert!(b.len() >= (n - 1) * ldb + k, "B slice too short");
        assert!(c.len() >= (n - 1) * ldc + m, "C slice too short");

        // Column-major views: row stride 1, column stride = leading dim.
        let a_mat = unsafe { faer::MatRef::from_raw_parts(a.as_ptr(), m, k, 1, lda as isize) };
        let b_mat = unsafe { faer::MatRef::from_raw_parts(b.as_ptr(), k, n, 1, ldb as isize) };
        let mut c_mat =
            unsafe { faer::MatMut::from_raw_parts_mut(c.as_mut_ptr(), m, n, 1, ldc as isize) };

        faer_matmul(&mut c_mat, Accum::Add, a_mat, b_mat, alpha, self.par);
    }

    fn synchronize(&self) {}
}
