//! Communication-group abstraction for the redistribution and transform
//! kernels.
//!
//! Provides a trait for the collective operations the kernels need
//! (varying-count all-to-all and all-gather, barrier, scalar reduction,
//! sub-group derivation) and a no-op single-process implementation.
//!
//! Payloads cross the trait as raw `f64` component slices; callers convert
//! complex buffers with [`Scalar::components`](crate::scalar::Scalar) and
//! scale their count tables by `Scalar::COMPONENTS`. This keeps the trait
//! object-safe while serving both scalar kinds.

use crate::error::{BandwagonError, Result};

/// Abstraction over inter-process collective communication.
///
/// Implementations: `SelfComm` (single process), `MpiComm` (via the mpi
/// crate, feature `distributed`).
///
/// Every collective requires synchronized participation from the whole
/// group, with count/offset tables computed identically on every member;
/// a failed or stuck peer stalls all participants. That is the accepted
/// failure model; there is no retry.
pub trait CommGroup: Send + Sync {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Synchronization barrier.
    fn barrier(&self);

    /// Sum a local scalar across all ranks.
    fn all_reduce_sum(&self, local: f64) -> f64;

    /// Derive a sub-group: ranks passing the same `color` form one new
    /// group, ordered by `key`.
    fn split(&self, color: usize, key: usize) -> Result<Box<dyn CommGroup>>;

    /// Personalized varying-count exchange.
    ///
    /// `send[send_displs[r] .. send_displs[r] + send_counts[r]]` goes to
    /// rank `r`; the segment from rank `r` lands at
    /// `recv[recv_displs[r] ..]`. Count and offset tables are in f64
    /// components and must be monotone and gapless, matching what every
    /// other rank computed from the same deterministic split.
    fn all_to_all_varying(
        &self,
        send: &[f64],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [f64],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<()>;

    /// Varying-count all-gather.
    ///
    /// Every rank contributes `send` (whose length must equal
    /// `counts[self.rank()]`); afterwards `recv[displs[r] ..]` holds rank
    /// `r`'s contribution on every member of the group.
    fn all_gather_varying(
        &self,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<()>;
}

/// No-op communication group for single-process execution.
///
/// Collectives degenerate to bounds-checked local copies.
pub struct SelfComm;

impl CommGroup for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce_sum(&self, local: f64) -> f64 {
        local
    }

    fn split(&self, _color: usize, _key: usize) -> Result<Box<dyn CommGroup>> {
        Ok(Box::new(SelfComm))
    }

    fn all_to_all_varying(
        &self,
        send: &[f64],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [f64],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<()> {
        if send_counts.len() != 1 || recv_counts.len() != 1 {
            return Err(BandwagonError::Communication(format!(
                "count table sized for {} ranks in a group of 1",
                send_counts.len().max(recv_counts.len())
            )));
        }
        if send_counts[0] != recv_counts[0] {
            return Err(BandwagonError::Communication(format!(
                "self-exchange count mismatch: sending {}, expecting {}",
                send_counts[0], recv_counts[0]
            )));
        }
        let n = send_counts[0];
        recv[recv_displs[0]..recv_displs[0] + n]
            .copy_from_slice(&send[send_displs[0]..send_displs[0] + n]);
        Ok(())
    }

    fn all_gather_varying(
        &self,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<()> {
        if counts.len() != 1 {
            return Err(BandwagonError::Communication(format!(
                "count table sized for {} ranks in a group of 1",
                counts.len()
            )));
        }
        if send.len() != counts[0] {
            return Err(BandwagonError::Communication(format!(
                "gather contribution of {} elements, count table says {}",
                send.len(),
                counts[0]
            )));
        }
        recv[displs[0]..displs[0] + counts[0]].copy_from_slice(send);
        Ok(())
    }
}
