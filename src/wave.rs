//! Distributed wave-function coefficient storage.
//!
//! A [`WaveFunctions`] owns the coefficients of a set of bands in the slab
//! layout: this process holds a contiguous shard of basis rows for the
//! entire band range, column-major with leading dimension equal to the
//! local row count. An optional muffin-tin block carries the augmented
//! local-orbital coefficients with its own row count and the same band
//! range.
//!
//! [`swap_forward`](WaveFunctions::swap_forward) re-shards a band range
//! across a target sub-group so that each member holds the sub-group's
//! entire basis range for a shard of the bands (the layout basis-space
//! transforms want), and [`swap_backward`](WaveFunctions::swap_backward)
//! restores the slab layout bit-identically. The count/offset tables are
//! cached and reused while the band range and target group stay the same.

use num_complex::Complex64;

use crate::comm::CommGroup;
use crate::error::{BandwagonError, Result};
use crate::scalar::Scalar;
use crate::split::BlockSplit;
use crate::swap::{self, SwapPlan};

/// Sub-group scope for a redistribution.
///
/// Carries the target group and, for each of its ranks, the slab-layout
/// basis row count that rank contributes. The counts must be the same on
/// every member; [`SwapTarget::balanced`] derives them from the
/// deterministic contiguous splitter, which is the common case.
pub struct SwapTarget<'a> {
    comm: &'a dyn CommGroup,
    row_counts: Vec<usize>,
}

impl std::fmt::Debug for SwapTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapTarget")
            .field("row_counts", &self.row_counts)
            .finish()
    }
}

impl<'a> SwapTarget<'a> {
    pub fn new(comm: &'a dyn CommGroup, row_counts: Vec<usize>) -> Result<Self> {
        if row_counts.len() != comm.size() {
            return Err(BandwagonError::Precondition(format!(
                "row count table has {} entries for a group of {}",
                row_counts.len(),
                comm.size()
            )));
        }
        Ok(Self { comm, row_counts })
    }

    /// Target whose row counts follow the balanced contiguous split of
    /// `global_rows` over the group.
    pub fn balanced(comm: &'a dyn CommGroup, global_rows: usize) -> Self {
        let split = BlockSplit::new(global_rows, comm.size(), 0);
        let row_counts = (0..comm.size()).map(|r| split.local_size_of(r)).collect();
        Self { comm, row_counts }
    }

    pub fn comm(&self) -> &dyn CommGroup {
        self.comm
    }

    pub fn row_counts(&self) -> &[usize] {
        &self.row_counts
    }

    /// Total basis rows across the sub-group.
    pub fn total_rows(&self) -> usize {
        self.row_counts.iter().sum()
    }
}

/// Band-sharded view produced by a forward swap: the target sub-group's
/// entire basis range for this rank's shard of the requested bands.
pub struct SwappedCoeffs {
    pub(crate) i0: usize,
    pub(crate) n: usize,
    pub(crate) total_rows: usize,
    pub(crate) bands_loc: usize,
    pub(crate) band_offset: usize,
    pub(crate) data: Vec<Complex64>,
}

impl SwappedCoeffs {
    /// Basis rows per band (the whole sub-group's range).
    pub fn num_rows(&self) -> usize {
        self.total_rows
    }

    /// Number of bands held locally.
    pub fn num_bands_loc(&self) -> usize {
        self.bands_loc
    }

    /// Global index of the first locally held band.
    pub fn band_offset(&self) -> usize {
        self.i0 + self.band_offset
    }

    /// Coefficients of local band `j`, all basis rows.
    pub fn band(&self, j: usize) -> &[Complex64] {
        &self.data[j * self.total_rows..(j + 1) * self.total_rows]
    }

    /// Mutable coefficients of local band `j`.
    pub fn band_mut(&mut self, j: usize) -> &mut [Complex64] {
        &mut self.data[j * self.total_rows..(j + 1) * self.total_rows]
    }
}

/// Muffin-tin (augmented local-orbital) coefficient block.
pub(crate) struct MtBlock {
    pub(crate) rows_loc: usize,
    pub(crate) data: Vec<Complex64>,
}

/// Distributed set of wave functions in the slab layout.
pub struct WaveFunctions {
    rows_loc: usize,
    num_bands: usize,
    pw: Vec<Complex64>,
    pub(crate) mt: Option<MtBlock>,
    swapped: Option<SwappedCoeffs>,
    plan: Option<SwapPlan>,
    scratch: Vec<Complex64>,
}

impl WaveFunctions {
    /// Container for `num_bands` bands with `rows_loc` local basis rows.
    pub fn new(rows_loc: usize, num_bands: usize) -> Self {
        Self {
            rows_loc,
            num_bands,
            pw: vec![Complex64::ZERO; rows_loc * num_bands],
            mt: None,
            swapped: None,
            plan: None,
            scratch: Vec::new(),
        }
    }

    /// Container with an additional muffin-tin block of `mt_rows_loc`
    /// local rows.
    pub fn with_mt(rows_loc: usize, mt_rows_loc: usize, num_bands: usize) -> Self {
        let mut wf = Self::new(rows_loc, num_bands);
        wf.mt = Some(MtBlock {
            rows_loc: mt_rows_loc,
            data: vec![Complex64::ZERO; mt_rows_loc * num_bands],
        });
        wf
    }

    pub fn num_rows_loc(&self) -> usize {
        self.rows_loc
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn has_mt(&self) -> bool {
        self.mt.is_some()
    }

    pub fn mt_rows_loc(&self) -> usize {
        self.mt.as_ref().map_or(0, |mt| mt.rows_loc)
    }

    /// Plane-wave block, column-major, leading dimension `rows_loc`.
    pub fn pw(&self) -> &[Complex64] {
        &self.pw
    }

    pub fn pw_mut(&mut self) -> &mut [Complex64] {
        &mut self.pw
    }

    /// Muffin-tin block, column-major, leading dimension `mt_rows_loc`.
    pub fn mt(&self) -> Option<&[Complex64]> {
        self.mt.as_ref().map(|mt| &mt.data[..])
    }

    pub fn mt_mut(&mut self) -> Option<&mut [Complex64]> {
        self.mt.as_mut().map(|mt| &mut mt.data[..])
    }

    /// Local slab rows of band `j`.
    pub fn band(&self, j: usize) -> &[Complex64] {
        &self.pw[j * self.rows_loc..(j + 1) * self.rows_loc]
    }

    /// Mutable local slab rows of band `j`.
    pub fn band_mut(&mut self, j: usize) -> &mut [Complex64] {
        &mut self.pw[j * self.rows_loc..(j + 1) * self.rows_loc]
    }

    /// The swapped-layout block, if a forward swap is active.
    pub fn swapped(&self) -> Option<&SwappedCoeffs> {
        self.swapped.as_ref()
    }

    pub fn swapped_mut(&mut self) -> Option<&mut SwappedCoeffs> {
        self.swapped.as_mut()
    }

    fn checked_plan(&mut self, i0: usize, n: usize, target: &SwapTarget) -> Result<()> {
        if n == 0 {
            return Err(BandwagonError::Precondition(
                "cannot swap an empty band range".into(),
            ));
        }
        if i0 + n > self.num_bands {
            return Err(BandwagonError::Precondition(format!(
                "band range [{i0}, {}) exceeds the allocated {} bands",
                i0 + n,
                self.num_bands
            )));
        }
        let rank = target.comm().rank();
        if target.row_counts()[rank] != self.rows_loc {
            return Err(BandwagonError::Precondition(format!(
                "target says rank {rank} holds {} slab rows, container holds {}",
                target.row_counts()[rank],
                self.rows_loc
            )));
        }
        let reusable = self
            .plan
            .as_ref()
            .is_some_and(|p| p.matches(i0, n, target.row_counts()));
        if !reusable {
            self.plan = Some(SwapPlan::new(rank, target.row_counts(), i0, n));
        }
        Ok(())
    }

    /// Re-shard bands `[i0, i0 + n)` across the target sub-group: after the
    /// call, [`swapped`](Self::swapped) holds the sub-group's entire basis
    /// range for this rank's shard of the bands. The slab block is left
    /// untouched.
    pub fn swap_forward(&mut self, i0: usize, n: usize, target: &SwapTarget) -> Result<()> {
        let _span = tracing::debug_span!("swap_forward", i0, n).entered();
        self.checked_plan(i0, n, target)?;
        let plan = self.plan.as_ref().unwrap();

        let total_rows = target.total_rows();
        let bands_loc = plan.band_counts[plan.rank];
        let band_offset = plan.band_displs[plan.rank];

        self.scratch.clear();
        self.scratch.resize(total_rows * bands_loc, Complex64::ZERO);

        // The slab block is column-major with no padding, so the outgoing
        // columns [i0, i0 + n) are already one contiguous, correctly
        // ordered send buffer.
        let send = &self.pw[i0 * self.rows_loc..(i0 + n) * self.rows_loc];
        let (sc, sd) = plan.forward_send_tables();
        let (rc, rd) = plan.forward_recv_tables();
        target.comm().all_to_all_varying(
            Complex64::components(send),
            &scale2(&sc),
            &scale2(&sd),
            Complex64::components_mut(&mut self.scratch),
            &scale2(&rc),
            &scale2(&rd),
        )?;

        let mut data = match self.swapped.take() {
            Some(old) => old.data,
            None => Vec::new(),
        };
        data.clear();
        data.resize(total_rows * bands_loc, Complex64::ZERO);
        swap::unpack_forward(plan, &self.scratch, &mut data);

        self.swapped = Some(SwappedCoeffs {
            i0,
            n,
            total_rows,
            bands_loc,
            band_offset,
            data,
        });
        Ok(())
    }

    /// Inverse of [`swap_forward`](Self::swap_forward): scatter the swapped
    /// block back into slab columns `[i0, i0 + n)`. The swapped view is
    /// retired; its buffer is kept as scratch for the next swap.
    pub fn swap_backward(&mut self, i0: usize, n: usize, target: &SwapTarget) -> Result<()> {
        let _span = tracing::debug_span!("swap_backward", i0, n).entered();
        match self.swapped.as_ref() {
            None => {
                return Err(BandwagonError::Precondition(
                    "swap_backward without an active forward swap".into(),
                ))
            }
            Some(s) if s.i0 != i0 || s.n != n => {
                return Err(BandwagonError::Precondition(format!(
                    "swap_backward range [{i0}, {}) does not match the swapped range [{}, {})",
                    i0 + n,
                    s.i0,
                    s.i0 + s.n
                )))
            }
            Some(_) => {}
        }
        self.checked_plan(i0, n, target)?;
        let swapped = self.swapped.take().unwrap();
        let plan = self.plan.as_ref().unwrap();

        self.scratch.clear();
        self.scratch
            .resize(swapped.total_rows * swapped.bands_loc, Complex64::ZERO);
        swap::pack_backward(plan, &swapped.data, &mut self.scratch);

        // Mirror of the forward exchange: the incoming per-source blocks
        // are exactly the slab columns [i0, i0 + n) in order.
        let recv = &mut self.pw[i0 * self.rows_loc..(i0 + n) * self.rows_loc];
        let (sc, sd) = plan.forward_recv_tables();
        let (rc, rd) = plan.forward_send_tables();
        target.comm().all_to_all_varying(
            Complex64::components(&self.scratch),
            &scale2(&sc),
            &scale2(&sd),
            Complex64::components_mut(recv),
            &scale2(&rc),
            &scale2(&rd),
        )?;

        // Keep the allocation for the next forward swap on this container.
        self.scratch = swapped.data;
        Ok(())
    }
}

fn scale2(table: &[usize]) -> Vec<usize> {
    table.iter().map(|&v| v * 2).collect()
}
