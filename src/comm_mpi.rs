//! MPI communication group for multi-process runs.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements [`CommGroup`] over an owned rsmpi communicator, using the
//! varying-count collectives (`MPI_Alltoallv` / `MPI_Allgatherv`) that the
//! redistribution and transform kernels are built on.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing the world group:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let world = MpiComm::world();
//! ```
//!
//! Sub-groups created by [`CommGroup::split`] own their communicator and
//! free it on drop.

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;
use mpi::Count;

use crate::comm::CommGroup;
use crate::error::{BandwagonError, Result};

/// MPI-backed communication group.
///
/// Wraps an owned communicator. Construct the initial one with
/// [`MpiComm::world`] (panics if MPI has not been initialized); derive
/// further groups with [`CommGroup::split`].
pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// The world communicator.
    ///
    /// Panics if MPI has not been initialized via `mpi::initialize()`.
    pub fn world() -> Self {
        Self {
            comm: SimpleCommunicator::world(),
        }
    }
}

fn counts_i32(counts: &[usize]) -> Vec<Count> {
    counts.iter().map(|&c| c as Count).collect()
}

impl CommGroup for MpiComm {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn all_reduce_sum(&self, local: f64) -> f64 {
        let mut global = 0.0f64;
        self.comm
            .all_reduce_into(&local, &mut global, SystemOperation::sum());
        global
    }

    fn split(&self, color: usize, key: usize) -> Result<Box<dyn CommGroup>> {
        let comm = self
            .comm
            .split_by_color_with_key(Color::with_value(color as i32), key as i32)
            .ok_or_else(|| {
                BandwagonError::Communication(
                    "communicator split left this rank without a group".into(),
                )
            })?;
        Ok(Box::new(MpiComm { comm }))
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
        let sc = counts_i32(send_counts);
        let sd = counts_i32(send_displs);
        let rc = counts_i32(recv_counts);
        let rd = counts_i32(recv_displs);
        let send_part = Partition::new(send, &sc[..], &sd[..]);
        let mut recv_part = PartitionMut::new(recv, &rc[..], &rd[..]);
        self.comm
            .all_to_all_varcount_into(&send_part, &mut recv_part);
        Ok(())
    }

    fn all_gather_varying(
        &self,
        send: &[f64],
        recv: &mut [f64],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<()> {
        let c = counts_i32(counts);
        let d = counts_i32(displs);
        let mut recv_part = PartitionMut::new(recv, &c[..], &d[..]);
        self.comm.all_gather_varcount_into(send, &mut recv_part);
        Ok(())
    }
}
