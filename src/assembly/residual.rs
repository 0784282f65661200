//! Element residual of the SSA weak form.
use crate::coefficients::ElementCoefficients;
use crate::constitutive::ConstitutiveLaw;
use crate::nalgebra::SVector;
use crate::quadrature::NUM_QUADRATURE_POINTS;

/// Residual of one element for the interleaved element velocity `local`.
///
/// Per quadrature point and corner `a` with shape function `psi`:
/// ```text
/// R[a, x] += JxW (2 nuH ((2 u_x + v_y) psi_x + D_xy psi_y) + beta u psi - tau_x psi)
/// R[a, y] += JxW (2 nuH (D_xy psi_x + (2 v_y + u_x) psi_y) + beta v psi - tau_y psi)
/// ```
/// with `D_xy = (u_y + v_x) / 2`. The calving-front load, if any, is subtracted.
pub fn element_residual(
    law: &ConstitutiveLaw,
    element: &ElementCoefficients,
    local: &SVector<f64, 8>,
) -> SVector<f64, 8> {
    let quadrature = &element.quadrature;
    let mut residual = SVector::<f64, 8>::zeros();

    for q in 0..NUM_QUADRATURE_POINTS {
        let coefficients = &element.points[q];
        let (u, du) = quadrature.velocity(q, local);
        let (viscosity, drag) = law.evaluate(coefficients, &u, &du);
        let jxw = quadrature.jxw[q];
        let tau = coefficients.driving_stress;
        let d_xy = du.shear();

        for a in 0..4 {
            let psi = quadrature.psi[q][a];
            let (psi_x, psi_y) = (quadrature.grad[q][(0, a)], quadrature.grad[q][(1, a)]);
            residual[2 * a] += jxw
                * (2.0 * viscosity.nu_h * ((2.0 * du.u_x + du.v_y) * psi_x + d_xy * psi_y) + drag.beta * u.x * psi
                    - tau.x * psi);
            residual[2 * a + 1] += jxw
                * (2.0 * viscosity.nu_h * (d_xy * psi_x + (2.0 * du.v_y + du.u_x) * psi_y) + drag.beta * u.y * psi
                    - tau.y * psi);
        }
    }

    if let Some(load) = &element.front_load {
        residual -= load;
    }
    residual
}
