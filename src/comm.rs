//! Collective operations between the ranks of a domain decomposition.
use crate::grid::Grid;
use nalgebra::DVector;

/// Collective operations used by the solver.
///
/// Every rank must call the same sequence of collective operations. The solver calls
/// [`update_ghosts`](Communicator::update_ghosts) once before every residual and Jacobian
/// evaluation and once before every product with the Jacobian inside a linear solve. Every
/// norm and dot product of the Newton and Krylov iterations goes through [`sum`](Communicator::sum).
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Overwrites the ghost entries of `dofs` (interleaved velocity, indexed by global DOF)
    /// with the values owned by neighboring ranks.
    fn update_ghosts(&self, grid: &Grid, dofs: &mut DVector<f64>);

    fn sum(&self, local: f64) -> f64;

    fn max(&self, local: f64) -> f64;
}

/// Single-rank communicator: the rank owns everything, so there is nothing to exchange.
#[derive(Debug, Copy, Clone, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn update_ghosts(&self, grid: &Grid, dofs: &mut DVector<f64>) {
        debug_assert_eq!(dofs.len(), grid.num_dofs());
    }

    fn sum(&self, local: f64) -> f64 {
        local
    }

    fn max(&self, local: f64) -> f64 {
        local
    }
}

/// Global dot product of two interleaved DOF vectors, summing each rank's owned entries once.
pub fn owned_dot(comm: &impl Communicator, grid: &Grid, a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let local: f64 = grid
        .owned_nodes()
        .iter()
        .map(|(i, j)| {
            let node = grid.node_index(i, j);
            a[2 * node] * b[2 * node] + a[2 * node + 1] * b[2 * node + 1]
        })
        .sum();
    comm.sum(local)
}

/// Global 2-norm of the owned entries of an interleaved DOF vector.
pub fn owned_norm(comm: &impl Communicator, grid: &Grid, dofs: &[f64]) -> f64 {
    owned_dot(comm, grid, dofs, dofs).sqrt()
}
