//! Distributed storage and redistribution kernel for plane-wave
//! coefficient arrays.
//!
//! No single process holds a full set of wave functions: the slab layout
//! shards the basis rows of every band across a group, and every operation
//! that needs a different sharding of the same logical array is an
//! explicit collective redistribution. This crate provides:
//!
//! - [`WaveFunctions`](wave::WaveFunctions): the dual-layout coefficient
//!   container, with [`swap_forward`](wave::WaveFunctions::swap_forward) /
//!   [`swap_backward`](wave::WaveFunctions::swap_backward) converting a
//!   band range between the slab layout and the band-swapped layout of a
//!   target sub-group (bit-identical round trip);
//! - [`transform`](transform::transform): the block-cyclic-aware parallel
//!   linear transform `out = alpha * in * M + beta * out`, where `M` lives
//!   on a [`ProcessGrid`](grid::ProcessGrid) independent of the
//!   wave-function distribution, with host (faer) and wgpu local-multiply
//!   backends;
//! - the deterministic [index splitters](split) and
//!   [communication-group boundary](comm) both are built on.

pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod config;
pub mod error;
pub mod gemm;
pub mod gemm_gpu;
pub mod gemm_shaders;
pub mod grid;
pub mod matrix;
pub mod scalar;
pub mod split;
pub mod stats;
mod swap;
pub mod transform;
pub mod wave;

pub use error::{BandwagonError, Result};
