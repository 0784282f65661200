/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// Newton-Krylov driver for systems with sparse Jacobians
pub mod krylov;
/// Implementations of the Newton method with different line search strategies
pub mod newton;
