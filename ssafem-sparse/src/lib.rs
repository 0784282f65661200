//! Sparse linear algebra used by the SSA Newton solver: operators, Jacobi preconditioning
//! and conjugate gradient.
use nalgebra::RealField;

pub mod cg;
pub mod preconditioner;

pub use nalgebra;
pub use nalgebra_sparse;

/// Scalar trait alias for the generic numerical routines in the `ssafem` crates.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
