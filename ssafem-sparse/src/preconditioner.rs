use crate::cg::LinearOperator;
use crate::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// Diagonal (Jacobi) preconditioner `P = diag(A)^{-1}`.
///
/// Rows with a zero or non-finite diagonal entry are left unscaled.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Real> {
    inverse_diagonal: DVector<T>,
}

impl<T: Real> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let mut inverse_diagonal = DVector::repeat(matrix.nrows(), T::one());
        for (i, row) in matrix.row_iter().enumerate() {
            let diagonal = row
                .col_indices()
                .iter()
                .position(|&j| j == i)
                .map(|idx| row.values()[idx]);
            if let Some(d) = diagonal {
                if d != T::zero() && d.is_finite() {
                    inverse_diagonal[i] = T::one() / d;
                }
            }
        }
        Self { inverse_diagonal }
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: Real> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if x.len() != self.inverse_diagonal.len() {
            return Err(Box::from("Jacobi preconditioner applied to vector of wrong length"));
        }
        y.copy_from(&x.component_mul(&self.inverse_diagonal));
        Ok(())
    }
}
