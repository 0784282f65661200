//! Finite element solver for the Shallow-Shelf Approximation (SSA) of ice flow.
//!
//! The SSA is a nonlinear elliptic system for the depth-averaged horizontal velocity of
//! floating or fast-sliding ice. This crate discretizes it with bilinear quadrilaterals on a
//! structured (possibly non-uniform) grid, caches all velocity-independent coefficients at
//! quadrature points, and solves the resulting system with a Newton method whose linear
//! systems are solved with preconditioned conjugate gradients.
//!
//! A typical solve:
//!
//! 1. build a [`Grid`](grid::Grid) and a [`SsaConfig`](config::SsaConfig),
//! 2. create a [`SsaSolver`](solver::SsaSolver) and set Dirichlet data,
//! 3. `prepare` it with [`InputFields`](fields::InputFields),
//! 4. `solve` and inspect the [`TerminationReason`](solver::TerminationReason).
pub mod assembly;
pub mod coefficients;
pub mod comm;
pub mod config;
pub mod constitutive;
pub mod dofmap;
pub mod element;
pub mod error;
pub mod fields;
pub mod grid;
pub mod quadrature;
pub mod solver;

pub mod optimize {
    pub use ssafem_optimize::*;
}

pub mod sparse {
    pub use ssafem_sparse::*;
}

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
