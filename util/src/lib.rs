//! Test helpers shared by the crates of the workspace.
use nalgebra::{DVector, DVectorView};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// `max_i |a_i - b_i| / max(max_i |b_i|, floor)`
pub fn max_relative_difference<'a>(
    a: impl Into<DVectorView<'a, f64>>,
    b: impl Into<DVectorView<'a, f64>>,
    floor: f64,
) -> f64 {
    let a = a.into();
    let b = b.into();
    assert_eq!(a.len(), b.len(), "vectors must have the same length");
    let scale = b.amax().max(floor);
    (a - b).amax() / scale
}

/// Deterministic pseudo-random vector with entries in `[-scale, scale]`.
///
/// A small linear congruential generator is plenty for picking "arbitrary" iterates in tests
/// while keeping failures reproducible.
pub fn pseudo_random_vector(len: usize, seed: u64, scale: f64) -> DVector<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    DVector::from_fn(len, |_, _| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
        scale * (2.0 * unit - 1.0)
    })
}
