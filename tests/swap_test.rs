//! Single-process redistribution round trips through the public API.
//!
//! Multi-process coverage of the same properties lives in
//! `tests/distributed_test.rs` (feature `distributed`, run under mpirun)
//! and in the simulated-rank unit tests of the swap plan.

use bandwagon::comm::SelfComm;
use bandwagon::wave::{SwapTarget, WaveFunctions};
use num_complex::Complex64;

fn filled(rows: usize, bands: usize) -> WaveFunctions {
    let mut wf = WaveFunctions::new(rows, bands);
    for j in 0..bands {
        for (r, v) in wf.band_mut(j).iter_mut().enumerate() {
            *v = Complex64::new(r as f64 * 1.25 - j as f64, j as f64 * 0.75 + r as f64 * 0.125);
        }
    }
    wf
}

#[test]
fn round_trip_restores_flat_layout_exactly() {
    let comm = SelfComm;
    let target = SwapTarget::balanced(&comm, 11);
    let mut wf = filled(11, 6);
    let before = wf.pw().to_vec();

    for (i0, n) in [(0, 6), (1, 4), (5, 1)] {
        wf.swap_forward(i0, n, &target).unwrap();
        wf.swap_backward(i0, n, &target).unwrap();
        assert_eq!(wf.pw(), &before[..], "range ({i0}, {n})");
    }
}

#[test]
fn swapped_layout_exposes_full_basis_range_per_band() {
    let comm = SelfComm;
    let target = SwapTarget::balanced(&comm, 7);
    let mut wf = filled(7, 5);

    wf.swap_forward(2, 3, &target).unwrap();
    let swapped = wf.swapped().expect("forward swap leaves a swapped block");
    assert_eq!(swapped.num_rows(), 7);
    assert_eq!(swapped.num_bands_loc(), 3);
    assert_eq!(swapped.band_offset(), 2);
    for j in 0..3 {
        assert_eq!(swapped.band(j), wf.band(2 + j));
    }
}

#[test]
fn swapped_block_is_writable_before_backward() {
    // The physics layer mutates the swapped block in place (e.g. after an
    // FFT round trip); the backward swap must carry the mutation home.
    let comm = SelfComm;
    let target = SwapTarget::balanced(&comm, 4);
    let mut wf = filled(4, 3);

    wf.swap_forward(0, 3, &target).unwrap();
    let two = Complex64::new(2.0, 0.0);
    {
        let swapped = wf.swapped_mut().unwrap();
        for j in 0..swapped.num_bands_loc() {
            for v in swapped.band_mut(j) {
                *v *= two;
            }
        }
    }
    let expected: Vec<Complex64> = filled(4, 3).pw().iter().map(|&v| v * two).collect();
    wf.swap_backward(0, 3, &target).unwrap();
    assert_eq!(wf.pw(), &expected[..]);
}

#[test]
fn sequential_swaps_with_different_targets_round_trip() {
    // Two consecutive swaps against differently shaped targets must each
    // leave the flat layout untouched.
    let comm = SelfComm;
    let mut wf = filled(9, 4);
    let before = wf.pw().to_vec();

    let balanced = SwapTarget::balanced(&comm, 9);
    wf.swap_forward(0, 4, &balanced).unwrap();
    wf.swap_backward(0, 4, &balanced).unwrap();
    assert_eq!(wf.pw(), &before[..]);

    let explicit = SwapTarget::new(&comm, vec![9]).unwrap();
    wf.swap_forward(1, 2, &explicit).unwrap();
    wf.swap_backward(1, 2, &explicit).unwrap();
    assert_eq!(wf.pw(), &before[..]);
}

#[test]
fn mismatched_backward_range_is_rejected() {
    let comm = SelfComm;
    let target = SwapTarget::balanced(&comm, 4);
    let mut wf = filled(4, 5);
    wf.swap_forward(0, 3, &target).unwrap();
    let err = wf.swap_backward(1, 3, &target).unwrap_err();
    assert!(err.to_string().contains("does not match"), "{err}");
}
