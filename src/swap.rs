//! Redistribution plans for the slab <-> band-swapped layout exchange.
//!
//! A [`SwapPlan`] is the pure part of the redistribution: given the target
//! sub-group's per-rank slab row counts and a band range, it computes the
//! per-pair element counts
//!
//! ```text
//! count(src, dst) = slab_rows(src) * bands(dst)
//! ```
//!
//! and the monotone, gapless offset tables for a single varying-count
//! all-to-all. Every rank derives the identical tables from the same
//! inputs, so no communication is needed to agree on them. The plan also
//! knows how to unpack the forward exchange into the band-swapped buffer
//! and how to pack that buffer for the backward exchange; the other two
//! corners of the rectangle are contiguous slab columns and need no
//! staging.

use num_complex::Complex64;

use crate::split::BlockSplit;

/// Count/offset tables for one (band range, sub-group) pair.
///
/// All element counts are in complex coefficients.
#[derive(Debug, Clone)]
pub(crate) struct SwapPlan {
    pub(crate) rank: usize,
    pub(crate) size: usize,
    i0: usize,
    n: usize,
    /// Slab rows each sub-group rank contributes.
    pub(crate) row_counts: Vec<usize>,
    /// Row offset of each rank's shard within the stacked basis range.
    pub(crate) row_displs: Vec<usize>,
    /// Bands each rank owns in the swapped layout (balanced contiguous).
    pub(crate) band_counts: Vec<usize>,
    /// First owned band of each rank, relative to the range start.
    pub(crate) band_displs: Vec<usize>,
    /// send_counts[d] = row_counts[rank] * band_counts[d]
    send_counts: Vec<usize>,
    send_displs: Vec<usize>,
    /// recv_counts[s] = row_counts[s] * band_counts[rank]
    recv_counts: Vec<usize>,
    recv_displs: Vec<usize>,
}

fn exclusive_scan(counts: &[usize]) -> Vec<usize> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}

impl SwapPlan {
    pub(crate) fn new(rank: usize, row_counts: &[usize], i0: usize, n: usize) -> Self {
        let size = row_counts.len();
        assert!(rank < size);
        let band_split = BlockSplit::new(n, size, rank);
        let band_counts: Vec<usize> = (0..size).map(|r| band_split.local_size_of(r)).collect();
        let band_displs: Vec<usize> = (0..size).map(|r| band_split.global_offset_of(r)).collect();

        let my_rows = row_counts[rank];
        let my_bands = band_counts[rank];
        let send_counts: Vec<usize> = band_counts.iter().map(|&b| my_rows * b).collect();
        let recv_counts: Vec<usize> = row_counts.iter().map(|&r| r * my_bands).collect();
        let send_displs = exclusive_scan(&send_counts);
        let recv_displs = exclusive_scan(&recv_counts);
        let row_displs = exclusive_scan(row_counts);

        tracing::debug!(
            rank,
            size,
            i0,
            n,
            total = send_counts.iter().sum::<usize>(),
            "built swap plan"
        );

        Self {
            rank,
            size,
            i0,
            n,
            row_counts: row_counts.to_vec(),
            row_displs,
            band_counts,
            band_displs,
            send_counts,
            send_displs,
            recv_counts,
            recv_displs,
        }
    }

    /// Whether this plan was built for the same band range and group shape.
    pub(crate) fn matches(&self, i0: usize, n: usize, row_counts: &[usize]) -> bool {
        self.i0 == i0 && self.n == n && self.row_counts == row_counts
    }

    pub(crate) fn total_rows(&self) -> usize {
        self.row_counts.iter().sum()
    }

    /// (counts, displs) this rank sends in the forward direction.
    pub(crate) fn forward_send_tables(&self) -> (Vec<usize>, Vec<usize>) {
        (self.send_counts.clone(), self.send_displs.clone())
    }

    /// (counts, displs) this rank receives in the forward direction.
    /// The backward direction reuses the same tables with the roles
    /// mirrored.
    pub(crate) fn forward_recv_tables(&self) -> (Vec<usize>, Vec<usize>) {
        (self.recv_counts.clone(), self.recv_displs.clone())
    }
}

/// Scatter the forward exchange's receive buffer into the band-swapped
/// block (stacked basis rows x local bands, column-major).
///
/// The segment from source `s` arrives as a dense `row_counts[s] x
/// bands_loc` column-major block; its columns interleave into the swapped
/// buffer at row offset `row_displs[s]`.
pub(crate) fn unpack_forward(plan: &SwapPlan, recv: &[Complex64], swapped: &mut [Complex64]) {
    let total_rows = plan.total_rows();
    let bands_loc = plan.band_counts[plan.rank];
    debug_assert_eq!(swapped.len(), total_rows * bands_loc);
    for s in 0..plan.size {
        let rows = plan.row_counts[s];
        if rows == 0 {
            continue;
        }
        let src = plan.recv_displs[s];
        let dst_row = plan.row_displs[s];
        for j in 0..bands_loc {
            swapped[dst_row + j * total_rows..dst_row + j * total_rows + rows]
                .copy_from_slice(&recv[src + j * rows..src + (j + 1) * rows]);
        }
    }
}

/// Gather the band-swapped block into a send buffer for the backward
/// exchange: the exact inverse of [`unpack_forward`].
pub(crate) fn pack_backward(plan: &SwapPlan, swapped: &[Complex64], send: &mut [Complex64]) {
    let total_rows = plan.total_rows();
    let bands_loc = plan.band_counts[plan.rank];
    debug_assert_eq!(swapped.len(), total_rows * bands_loc);
    for d in 0..plan.size {
        let rows = plan.row_counts[d];
        if rows == 0 {
            continue;
        }
        let dst = plan.recv_displs[d];
        let src_row = plan.row_displs[d];
        for j in 0..bands_loc {
            send[dst + j * rows..dst + (j + 1) * rows]
                .copy_from_slice(&swapped[src_row + j * total_rows..src_row + j * total_rows + rows]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plans are pure per-rank values, so a single process can instantiate
    /// every rank of a sub-group and route the exchange by hand. `pw[r]`
    /// holds rank r's slab shard (rows[r] x num_bands, column-major).
    struct Sim {
        rows: Vec<usize>,
        pw: Vec<Vec<Complex64>>,
    }

    impl Sim {
        /// Deterministic coefficients: value encodes (global row, band).
        fn new(rows: Vec<usize>, num_bands: usize) -> Self {
            let mut pw = Vec::new();
            let mut row0 = 0;
            for &r in &rows {
                let mut data = vec![Complex64::ZERO; r * num_bands];
                for j in 0..num_bands {
                    for i in 0..r {
                        data[i + j * r] = Complex64::new((row0 + i) as f64, j as f64);
                    }
                }
                pw.push(data);
                row0 += r;
            }
            Self { rows, pw }
        }

        fn plans(&self, i0: usize, n: usize) -> Vec<SwapPlan> {
            (0..self.rows.len())
                .map(|r| SwapPlan::new(r, &self.rows, i0, n))
                .collect()
        }

        /// Route every rank's forward send buffer to its destinations.
        fn exchange_forward(&self, plans: &[SwapPlan], i0: usize, n: usize) -> Vec<Vec<Complex64>> {
            let size = self.rows.len();
            // Forward send buffers are the contiguous slab columns.
            let sends: Vec<&[Complex64]> = (0..size)
                .map(|r| &self.pw[r][i0 * self.rows[r]..(i0 + n) * self.rows[r]])
                .collect();
            let mut recvs: Vec<Vec<Complex64>> = plans
                .iter()
                .map(|p| vec![Complex64::ZERO; p.forward_recv_tables().0.iter().sum()])
                .collect();
            for src in 0..size {
                let (sc, sd) = plans[src].forward_send_tables();
                for dst in 0..size {
                    let (rc, rd) = plans[dst].forward_recv_tables();
                    assert_eq!(sc[dst], rc[src], "count table asymmetry {src}->{dst}");
                    recvs[dst][rd[src]..rd[src] + rc[src]]
                        .copy_from_slice(&sends[src][sd[dst]..sd[dst] + sc[dst]]);
                }
            }
            recvs
        }

        /// Forward swap on every rank; returns each rank's swapped block.
        fn swap_forward(&self, plans: &[SwapPlan], i0: usize, n: usize) -> Vec<Vec<Complex64>> {
            let recvs = self.exchange_forward(plans, i0, n);
            plans
                .iter()
                .map(|p| {
                    let mut swapped =
                        vec![Complex64::ZERO; p.total_rows() * p.band_counts[p.rank]];
                    unpack_forward(p, &recvs[p.rank], &mut swapped);
                    swapped
                })
                .collect()
        }

        /// Backward swap: scatter swapped blocks into fresh slab columns
        /// (covering the swapped band range only).
        fn swap_backward(
            &self,
            plans: &[SwapPlan],
            swapped: &[Vec<Complex64>],
            n: usize,
        ) -> Vec<Vec<Complex64>> {
            let size = self.rows.len();
            let sends: Vec<Vec<Complex64>> = plans
                .iter()
                .map(|p| {
                    let mut send =
                        vec![Complex64::ZERO; p.total_rows() * p.band_counts[p.rank]];
                    pack_backward(p, &swapped[p.rank], &mut send);
                    send
                })
                .collect();
            let mut slabs: Vec<Vec<Complex64>> = (0..size)
                .map(|r| vec![Complex64::ZERO; self.rows[r] * n])
                .collect();
            for src in 0..size {
                // Backward roles mirror the forward tables.
                let (sc, sd) = plans[src].forward_recv_tables();
                for dst in 0..size {
                    let (rc, rd) = plans[dst].forward_send_tables();
                    assert_eq!(sc[dst], rc[src]);
                    slabs[dst][rd[src]..rd[src] + rc[src]]
                        .copy_from_slice(&sends[src][sd[dst]..sd[dst] + sc[dst]]);
                }
            }
            slabs
        }
    }

    #[test]
    fn count_tables_are_symmetric_and_gapless() {
        let sim = Sim::new(vec![10, 9, 9, 9], 8);
        let plans = sim.plans(0, 8);
        for p in &plans {
            let (sc, sd) = p.forward_send_tables();
            let (rc, rd) = p.forward_recv_tables();
            // Gapless, monotone offsets.
            assert_eq!(sd, exclusive_scan(&sc));
            assert_eq!(rd, exclusive_scan(&rc));
            // Totals: everything this rank owns leaves; everything it will
            // own arrives.
            assert_eq!(sc.iter().sum::<usize>(), sim.rows[p.rank] * 8);
            assert_eq!(
                rc.iter().sum::<usize>(),
                p.total_rows() * p.band_counts[p.rank]
            );
        }
        // Pairwise: what src sends to dst is what dst expects from src.
        for src in &plans {
            for dst in &plans {
                assert_eq!(
                    src.forward_send_tables().0[dst.rank],
                    dst.forward_recv_tables().0[src.rank]
                );
            }
        }
    }

    #[test]
    fn forward_swap_produces_full_rows_per_band() {
        let sim = Sim::new(vec![3, 2, 4], 5);
        let plans = sim.plans(0, 5);
        let swapped = sim.swap_forward(&plans, 0, 5);
        let total = 9;
        for p in &plans {
            let bands = p.band_counts[p.rank];
            let first = p.band_displs[p.rank];
            for j in 0..bands {
                for i in 0..total {
                    assert_eq!(
                        swapped[p.rank][i + j * total],
                        Complex64::new(i as f64, (first + j) as f64),
                        "rank {} band {j} row {i}",
                        p.rank
                    );
                }
            }
        }
    }

    #[test]
    fn round_trip_is_bit_identical() {
        // Sub-group sizes 1..=4, band ranges not aligned to anything.
        for rows in [vec![7], vec![4, 3], vec![3, 0, 4], vec![2, 3, 1, 4]] {
            let sim = Sim::new(rows.clone(), 9);
            for (i0, n) in [(0, 9), (2, 5), (8, 1), (0, 1)] {
                let plans = sim.plans(i0, n);
                let swapped = sim.swap_forward(&plans, i0, n);
                let slabs = sim.swap_backward(&plans, &swapped, n);
                for (r, slab) in slabs.iter().enumerate() {
                    let expected =
                        &sim.pw[r][i0 * sim.rows[r]..(i0 + n) * sim.rows[r]];
                    assert_eq!(&slab[..], expected, "rows {rows:?} range ({i0}, {n}) rank {r}");
                }
            }
        }
    }

    #[test]
    fn more_ranks_than_bands_leaves_spare_ranks_empty() {
        let sim = Sim::new(vec![2, 2, 2, 1], 2);
        let plans = sim.plans(0, 2);
        assert_eq!(plans[0].band_counts, vec![1, 1, 0, 0]);
        let swapped = sim.swap_forward(&plans, 0, 2);
        assert!(swapped[2].is_empty());
        assert!(swapped[3].is_empty());
        let slabs = sim.swap_backward(&plans, &swapped, 2);
        for r in 0..4 {
            assert_eq!(&slabs[r][..], &sim.pw[r][..2 * sim.rows[r]]);
        }
    }

    #[test]
    fn plan_reuse_matches_same_inputs_only() {
        let p = SwapPlan::new(1, &[4, 3], 2, 5);
        assert!(p.matches(2, 5, &[4, 3]));
        assert!(!p.matches(2, 5, &[3, 4]));
        assert!(!p.matches(0, 5, &[4, 3]));
        assert!(!p.matches(2, 4, &[4, 3]));
    }
}
