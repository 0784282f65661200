//! Element Jacobian and the global sparsity pattern.
use crate::coefficients::ElementCoefficients;
use crate::constitutive::ConstitutiveLaw;
use crate::grid::Grid;
use crate::nalgebra::{SMatrix, SVector, Vector2};
use crate::quadrature::{StrainRate, NUM_QUADRATURE_POINTS};
use itertools::iproduct;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Exact derivative of [`element_residual`](super::residual::element_residual) with respect to
/// the interleaved element velocity.
///
/// With `W_k` the strain rate of the vector basis function `k` and `B` the bilinear form of
/// [`StrainRate::dot`], the viscous part of residual entry `k` is `2 nuH B(Du, W_k)`, so
/// ```text
/// J[k, l] = sum JxW (2 dnuH B(Du, W_l) B(Du, W_k) + 2 nuH B(W_l, W_k)
///                    + psi_a psi_b (beta delta_cd + dbeta u_c u_d / s))
/// ```
/// where `k = 2a + c` and `l = 2b + d`.
pub fn element_jacobian(
    law: &ConstitutiveLaw,
    element: &ElementCoefficients,
    local: &SVector<f64, 8>,
) -> SMatrix<f64, 8, 8> {
    let quadrature = &element.quadrature;
    let mut jacobian = SMatrix::<f64, 8, 8>::zeros();

    for q in 0..NUM_QUADRATURE_POINTS {
        let coefficients = &element.points[q];
        let (u, du) = quadrature.velocity(q, local);
        let (viscosity, drag) = law.evaluate(coefficients, &u, &du);
        let jxw = quadrature.jxw[q];

        let basis_strain: [StrainRate; 8] = std::array::from_fn(|k| {
            let grad_psi = Vector2::new(quadrature.grad[q][(0, k / 2)], quadrature.grad[q][(1, k / 2)]);
            StrainRate::of_basis_function(&grad_psi, k % 2)
        });
        let g: [f64; 8] = basis_strain.map(|w| du.dot(&w));
        let u_c = [u.x, u.y];

        for k in 0..8 {
            let (a, c) = (k / 2, k % 2);
            for l in 0..8 {
                let (b, d) = (l / 2, l % 2);
                let viscous =
                    2.0 * viscosity.dnu_h * g[l] * g[k] + 2.0 * viscosity.nu_h * basis_strain[l].dot(&basis_strain[k]);
                let delta_cd = if c == d { 1.0 } else { 0.0 };
                let basal = quadrature.psi[q][a]
                    * quadrature.psi[q][b]
                    * (drag.beta * delta_cd + drag.dbeta * u_c[c] * u_c[d] / drag.speed);
                jacobian[(k, l)] += jxw * (viscous + basal);
            }
        }
    }

    jacobian
}

/// Sparsity pattern of the Jacobian: 2x2 blocks coupling every owned node with the nodes of
/// the elements around it. Rows of nodes not owned by the grid are empty.
pub fn sparsity_pattern(grid: &Grid) -> SparsityPattern {
    // Collecting into a BTreeSet stores each entry once, in row-major order
    let mut matrix_entries = BTreeSet::new();
    let elements = grid.local_elements();
    for (i, j) in elements.iter() {
        let nodes = grid.element_nodes(i, j);
        for &node_i in nodes.iter().filter(|&&node| grid.is_owned(node)) {
            for &node_j in &nodes {
                for (s_i, s_j) in iproduct!(0..2, 0..2) {
                    matrix_entries.insert((2 * node_i + s_i, 2 * node_j + s_j));
                }
            }
        }
    }

    let num_rows = grid.num_dofs();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            // A while loop handles consecutive empty rows
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .expect("entries are sorted and unique by construction")
}

/// A zero matrix with the Jacobian sparsity pattern of `grid`.
pub fn create_jacobian(grid: &Grid) -> CsrMatrix<f64> {
    let pattern = sparsity_pattern(grid);
    let values = vec![0.0; pattern.nnz()];
    CsrMatrix::try_from_pattern_and_values(pattern, values).expect("values match the pattern")
}
