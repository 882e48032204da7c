//! WGSL compute shaders for the device GEMM, using double-single (DS)
//! arithmetic for ~f64 precision.
//!
//! Each f64 value is represented as a (hi, lo) pair of f32 values where
//! true_value = hi + lo, giving ~48 bits of mantissa (vs f32's 24). DS
//! primitives (TwoSum, TwoProd) rely on IEEE 754 rounding guarantees for
//! f32 add/sub/mul/fma, which WGSL provides.
//!
//! Complex buffers are stored with interleaved re/im components: element
//! `e` has its real part at component `2e` and imaginary part at `2e + 1`,
//! each component a (hi, lo) pair split across the two arrays.

/// DS GEMM shaders: `C += alpha * A * B`, column-major operands.
///
/// Entry points:
/// - `gemm_real`: real multiply-accumulate, one thread per C element
/// - `gemm_complex`: complex multiply-accumulate, one thread per C element
pub const GEMM_SHADER_SOURCE: &str = r#"
// ============================================================
// Double-Single (DS) GEMM Compute Shaders
// ============================================================
//
// DS representation: value ~ hi + lo (two f32s give ~48-bit mantissa)
// Primitives: TwoSum (Knuth), TwoProd (via fma)

// --- DS Primitives ---

// Error-free addition: s + err = a + b exactly
fn two_sum(a: f32, b: f32) -> vec2<f32> {
    let s = a + b;
    let v = s - a;
    let err = (a - (s - v)) + (b - v);
    return vec2(s, err);
}

// Error-free multiplication via fma: p + err = a * b exactly
fn two_prod(a: f32, b: f32) -> vec2<f32> {
    let p = a * b;
    let err = fma(a, b, -p);
    return vec2(p, err);
}

// DS add: (a_hi + a_lo) + (b_hi + b_lo)
fn ds_add(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    let s = two_sum(a.x, b.x);
    let e = a.y + b.y + s.y;
    return two_sum(s.x, e);
}

// DS subtract
fn ds_sub(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    return ds_add(a, vec2(-b.x, -b.y));
}

// DS multiply: (a_hi + a_lo) * (b_hi + b_lo)
fn ds_mul(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    let p = two_prod(a.x, b.x);
    let e = fma(a.x, b.y, fma(a.y, b.x, p.y));
    return two_sum(p.x, e);
}

// --- Shared bindings ---
//
// Operand arrays hold one f32 per component: a_hi[i]/a_lo[i] form the DS
// pair of component i. For the complex kernel a "component" is a real or
// imaginary part; for the real kernel it is the element itself.

struct GemmParams {
    m: u32,
    n: u32,
    k: u32,
    lda: u32,
    ldb: u32,
    ldc: u32,
    alpha_re_hi: f32,
    alpha_re_lo: f32,
    alpha_im_hi: f32,
    alpha_im_lo: f32,
}

@group(0) @binding(0) var<storage, read> a_hi: array<f32>;
@group(0) @binding(1) var<storage, read> a_lo: array<f32>;
@group(0) @binding(2) var<storage, read> b_hi: array<f32>;
@group(0) @binding(3) var<storage, read> b_lo: array<f32>;
@group(0) @binding(4) var<storage, read_write> c_hi: array<f32>;
@group(0) @binding(5) var<storage, read_write> c_lo: array<f32>;
@group(0) @binding(6) var<uniform> params: GemmParams;

fn load_a(idx: u32) -> vec2<f32> {
    return vec2(a_hi[idx], a_lo[idx]);
}

fn load_b(idx: u32) -> vec2<f32> {
    return vec2(b_hi[idx], b_lo[idx]);
}

// --- Real DS GEMM: C[i, j] += alpha * sum_l A[i, l] * B[l, j] ---

@compute @workgroup_size(8, 8)
fn gemm_real(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    let j = gid.y;
    if i >= params.m || j >= params.n {
        return;
    }
    var acc = vec2(0.0, 0.0);
    for (var l = 0u; l < params.k; l = l + 1u) {
        let p = ds_mul(load_a(i + l * params.lda), load_b(l + j * params.ldb));
        acc = ds_add(acc, p);
    }
    acc = ds_mul(vec2(params.alpha_re_hi, params.alpha_re_lo), acc);
    let ci = i + j * params.ldc;
    let s = ds_add(vec2(c_hi[ci], c_lo[ci]), acc);
    c_hi[ci] = s.x;
    c_lo[ci] = s.y;
}

// --- Complex DS GEMM ---
//
// Element (i, j) of a column-major complex array with leading dimension
// ld sits at component index 2 * (i + j * ld).

@compute @workgroup_size(8, 8)
fn gemm_complex(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    let j = gid.y;
    if i >= params.m || j >= params.n {
        return;
    }
    var acc_re = vec2(0.0, 0.0);
    var acc_im = vec2(0.0, 0.0);
    for (var l = 0u; l < params.k; l = l + 1u) {
        let ai = 2u * (i + l * params.lda);
        let bi = 2u * (l + j * params.ldb);
        let ar = load_a(ai);
        let aim = load_a(ai + 1u);
        let br = load_b(bi);
        let bim = load_b(bi + 1u);
        // (ar + i*aim) * (br + i*bim)
        acc_re = ds_add(acc_re, ds_sub(ds_mul(ar, br), ds_mul(aim, bim)));
        acc_im = ds_add(acc_im, ds_add(ds_mul(ar, bim), ds_mul(aim, br)));
    }
    let al_re = vec2(params.alpha_re_hi, params.alpha_re_lo);
    let al_im = vec2(params.alpha_im_hi, params.alpha_im_lo);
    let out_re = ds_sub(ds_mul(al_re, acc_re), ds_mul(al_im, acc_im));
    let out_im = ds_add(ds_mul(al_re, acc_im), ds_mul(al_im, acc_re));
    let ci = 2u * (i + j * params.ldc);
    let sr = ds_add(vec2(c_hi[ci], c_lo[ci]), out_re);
    let si = ds_add(vec2(c_hi[ci + 1u], c_lo[ci + 1u]), out_im);
    c_hi[ci] = sr.x;
    c_lo[ci] = sr.y;
    c_hi[ci + 1u] = si.x;
    c_lo[ci + 1u] = si.y;
}
"#;
