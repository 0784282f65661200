//! Global assembly of the SSA residual and Jacobian.
//!
//! Element contributions are computed in parallel into an arena of small dense buffers, one per
//! local element, and then scattered sequentially into the rows owned by the grid. Dirichlet
//! DOFs are handled through their [`DofConstraint`](crate::dofmap::DofConstraint): elements read
//! prescribed values instead of the iterate, constrained rows and columns are skipped during the
//! scatter, and the constrained rows are finally set to `dirichlet_scale * (u - u_prescribed)`
//! in the residual and to `dirichlet_scale` on the diagonal of the Jacobian.
use crate::coefficients::CoefficientCache;
use crate::config::SsaConfig;
use crate::constitutive::ConstitutiveLaw;
use crate::dofmap::DofMap;
use crate::grid::Grid;
use crate::nalgebra::{DVector, DVectorView, DVectorViewMut, SMatrix, SVector};
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;

pub mod front;
pub mod jacobian;
pub mod residual;

use jacobian::element_jacobian;
use residual::element_residual;

/// Per-element dense buffers, reused between evaluations.
#[derive(Debug, Clone, Default)]
pub struct ElementBuffers {
    residuals: Vec<SVector<f64, 8>>,
    jacobians: Vec<SMatrix<f64, 8, 8>>,
}

/// Assembles the residual and Jacobian of the SSA on the local part of a grid.
///
/// The assembler only borrows its inputs; it is cheap to construct for every evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SsaAssembler<'a> {
    grid: &'a Grid,
    dofs: &'a DofMap,
    cache: &'a CoefficientCache,
    law: ConstitutiveLaw,
    dirichlet_scale: f64,
}

impl<'a> SsaAssembler<'a> {
    /// # Panics
    ///
    /// Panics if the coefficient cache is not valid or was built for another grid patch.
    pub fn new(grid: &'a Grid, dofs: &'a DofMap, cache: &'a CoefficientCache, config: &SsaConfig) -> Self {
        assert!(cache.is_valid(), "assembly requires valid cached coefficients");
        assert_eq!(
            cache.element_range(),
            &grid.local_elements(),
            "coefficient cache was built for a different element range"
        );
        assert_eq!(dofs.num_dofs(), grid.num_dofs());
        Self {
            grid,
            dofs,
            cache,
            law: config.constitutive_law(),
            dirichlet_scale: config.dirichlet_scale,
        }
    }

    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn num_dofs(&self) -> usize {
        self.grid.num_dofs()
    }

    /// Writes the residual at `velocity` into the owned rows of `residual` and zeros the rest.
    ///
    /// `velocity` must hold up-to-date values in the ghost-inclusive node range.
    pub fn assemble_residual_into(
        &self,
        mut residual: DVectorViewMut<f64>,
        velocity: DVectorView<f64>,
        buffers: &mut ElementBuffers,
    ) {
        assert_eq!(residual.len(), self.num_dofs());
        assert_eq!(velocity.len(), self.num_dofs());
        let x = velocity.as_slice();
        let elements = self.cache.elements();

        buffers.residuals.resize(elements.len(), SVector::zeros());
        buffers
            .residuals
            .par_iter_mut()
            .zip(elements.par_iter())
            .for_each(|(output, element)| {
                let dofs = self.dofs.element_dofs(self.grid, element.i, element.j);
                let local = self.dofs.gather(&dofs, x);
                *output = element_residual(&self.law, element, &local);
            });

        residual.fill(0.0);
        for (element, local_residual) in elements.iter().zip(&buffers.residuals) {
            let dofs = self.dofs.element_dofs(self.grid, element.i, element.j);
            for k in 0..8 {
                let dof = dofs.dofs[k];
                if !dofs.constraints[k].is_dirichlet() && self.grid.is_owned(dof / 2) {
                    residual[dof] += local_residual[k];
                }
            }
        }

        for (dof, prescribed) in self.dofs.dirichlet_dofs() {
            if self.grid.is_owned(dof / 2) {
                residual[dof] = self.dirichlet_scale * (x[dof] - prescribed);
            }
        }
    }

    pub fn assemble_residual(&self, velocity: &DVector<f64>) -> DVector<f64> {
        let mut residual = DVector::zeros(self.num_dofs());
        self.assemble_residual_into(
            DVectorViewMut::from(&mut residual),
            DVectorView::from(velocity),
            &mut ElementBuffers::default(),
        );
        residual
    }

    /// A zero matrix with the sparsity pattern expected by
    /// [`assemble_jacobian_into`](Self::assemble_jacobian_into).
    pub fn create_jacobian(&self) -> CsrMatrix<f64> {
        jacobian::create_jacobian(self.grid)
    }

    /// Overwrites the values of `matrix` with the Jacobian at `velocity`.
    ///
    /// # Panics
    ///
    /// Panics if `matrix` does not contain the pattern of
    /// [`create_jacobian`](Self::create_jacobian).
    pub fn assemble_jacobian_into(
        &self,
        matrix: &mut CsrMatrix<f64>,
        velocity: DVectorView<f64>,
        buffers: &mut ElementBuffers,
    ) {
        assert_eq!(matrix.nrows(), self.num_dofs());
        assert_eq!(velocity.len(), self.num_dofs());
        let x = velocity.as_slice();
        let elements = self.cache.elements();

        buffers.jacobians.resize(elements.len(), SMatrix::zeros());
        buffers
            .jacobians
            .par_iter_mut()
            .zip(elements.par_iter())
            .for_each(|(output, element)| {
                let dofs = self.dofs.element_dofs(self.grid, element.i, element.j);
                let local = self.dofs.gather(&dofs, x);
                *output = element_jacobian(&self.law, element, &local);
            });

        matrix.values_mut().fill(0.0);
        for (element, local_jacobian) in elements.iter().zip(&buffers.jacobians) {
            let dofs = self.dofs.element_dofs(self.grid, element.i, element.j);
            for k in 0..8 {
                let row_dof = dofs.dofs[k];
                if dofs.constraints[k].is_dirichlet() || !self.grid.is_owned(row_dof / 2) {
                    continue;
                }
                let mut row = matrix.row_mut(row_dof);
                let (columns, values) = row.cols_and_values_mut();
                for l in 0..8 {
                    if dofs.constraints[l].is_dirichlet() {
                        continue;
                    }
                    let idx = columns
                        .binary_search(&dofs.dofs[l])
                        .expect("Could not find column index associated with element DOF in CSR row");
                    values[idx] += local_jacobian[(k, l)];
                }
            }
        }

        for (dof, _) in self.dofs.dirichlet_dofs() {
            if self.grid.is_owned(dof / 2) {
                let mut row = matrix.row_mut(dof);
                let (columns, values) = row.cols_and_values_mut();
                let idx = columns
                    .binary_search(&dof)
                    .expect("Jacobian pattern must contain the diagonal");
                values[idx] = self.dirichlet_scale;
            }
        }
    }

    pub fn assemble_jacobian(&self, velocity: &DVector<f64>) -> CsrMatrix<f64> {
        let mut matrix = self.create_jacobian();
        self.assemble_jacobian_into(&mut matrix, DVectorView::from(velocity), &mut ElementBuffers::default());
        matrix
    }
}
