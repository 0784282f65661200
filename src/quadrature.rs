//! Gauss quadrature on Q1 quadrilaterals and their sides.
//!
//! An [`ElementQuadrature`] tabulates everything the assemblers need at the 2x2 Gauss points of
//! one element: shape function values, physical gradients and `weight * det J`. It offers two
//! views on nodal data: a scalar view that interpolates node-centered coefficient fields, and a
//! vector view that interpolates the interleaved element velocity and its strain rates.
use crate::element::Quad4Element;
use crate::nalgebra::{Matrix1x4, Matrix2x4, Point2, SVector, Vector2};

/// Number of quadrature points per element.
pub const NUM_QUADRATURE_POINTS: usize = 4;

/// 2x2 tensor-product Gauss rule on `[-1, 1]^2`, `x` running fastest.
pub fn gauss_2x2() -> ([f64; 4], [Point2<f64>; 4]) {
    let (weights_1d, points_1d) = gauss_line_2();
    let mut weights = [0.0; 4];
    let mut points = [Point2::origin(); 4];
    for j in 0..2 {
        for i in 0..2 {
            weights[2 * j + i] = weights_1d[i] * weights_1d[j];
            points[2 * j + i] = Point2::new(points_1d[i], points_1d[j]);
        }
    }
    (weights, points)
}

/// Two-point Gauss rule on `[-1, 1]`.
pub fn gauss_line_2() -> ([f64; 2], [f64; 2]) {
    let p = 1.0 / 3.0_f64.sqrt();
    ([1.0, 1.0], [-p, p])
}

/// Strain rate components `Du = (u_x, u_y, v_x, v_y)` at a point.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct StrainRate {
    pub u_x: f64,
    pub u_y: f64,
    pub v_x: f64,
    pub v_y: f64,
}

impl StrainRate {
    /// `D_xy = (u_y + v_x) / 2`.
    pub fn shear(&self) -> f64 {
        0.5 * (self.u_y + self.v_x)
    }

    /// Second invariant `u_x^2 + v_y^2 + u_x v_y + (u_y + v_x)^2 / 4`.
    pub fn second_invariant(&self) -> f64 {
        let d_xy = self.shear();
        self.u_x * self.u_x + self.v_y * self.v_y + self.u_x * self.v_y + d_xy * d_xy
    }

    /// Directional derivative of the second invariant in the direction of `other`.
    ///
    /// This is the symmetric bilinear form `B(D, W)` with `B(D, D) = 2 * gamma(D)`, which gives
    /// the viscous part of the weak form when `W` is the strain rate of a test function.
    pub fn dot(&self, other: &StrainRate) -> f64 {
        2.0 * self.u_x * other.u_x
            + 2.0 * self.v_y * other.v_y
            + self.u_x * other.v_y
            + self.v_y * other.u_x
            + 2.0 * self.shear() * other.shear()
    }

    /// Strain rate of the vector basis function `psi e_c` with gradient `grad_psi`.
    pub fn of_basis_function(grad_psi: &Vector2<f64>, component: usize) -> Self {
        if component == 0 {
            Self {
                u_x: grad_psi.x,
                u_y: grad_psi.y,
                ..Self::default()
            }
        } else {
            Self {
                v_x: grad_psi.x,
                v_y: grad_psi.y,
                ..Self::default()
            }
        }
    }
}

/// Shape function values, physical gradients and scaled weights at the quadrature points of
/// one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementQuadrature {
    pub psi: [Matrix1x4<f64>; NUM_QUADRATURE_POINTS],
    pub grad: [Matrix2x4<f64>; NUM_QUADRATURE_POINTS],
    pub jxw: [f64; NUM_QUADRATURE_POINTS],
}

impl ElementQuadrature {
    /// Tabulates the 2x2 Gauss rule on `element`.
    ///
    /// Returns `None` if the element is degenerate or inverted at any quadrature point.
    pub fn new(element: &Quad4Element<f64>) -> Option<Self> {
        let (weights, points) = gauss_2x2();
        let mut psi = [Matrix1x4::zeros(); NUM_QUADRATURE_POINTS];
        let mut grad = [Matrix2x4::zeros(); NUM_QUADRATURE_POINTS];
        let mut jxw = [0.0; NUM_QUADRATURE_POINTS];
        for q in 0..NUM_QUADRATURE_POINTS {
            let (g, det_j) = element.physical_gradients(&points[q])?;
            psi[q] = element.evaluate_basis(&points[q]);
            grad[q] = g;
            jxw[q] = weights[q] * det_j;
        }
        Some(Self { psi, grad, jxw })
    }

    /// Interpolates a nodal scalar field at quadrature point `q`.
    pub fn scalar(&self, q: usize, nodal: &[f64; 4]) -> f64 {
        (0..4).map(|a| self.psi[q][a] * nodal[a]).sum()
    }

    /// Interpolates a nodal 2-vector field at quadrature point `q`.
    pub fn vector2(&self, q: usize, nodal: &[Vector2<f64>; 4]) -> Vector2<f64> {
        (0..4).map(|a| nodal[a] * self.psi[q][a]).sum()
    }

    /// Velocity and strain rates at quadrature point `q` from the interleaved element
    /// velocity `(u_0, v_0, u_1, v_1, ...)`.
    pub fn velocity(&self, q: usize, local: &SVector<f64, 8>) -> (Vector2<f64>, StrainRate) {
        let mut u = Vector2::zeros();
        let mut du = StrainRate::default();
        for a in 0..4 {
            let (ua, va) = (local[2 * a], local[2 * a + 1]);
            let psi = self.psi[q][a];
            let (psi_x, psi_y) = (self.grad[q][(0, a)], self.grad[q][(1, a)]);
            u.x += ua * psi;
            u.y += va * psi;
            du.u_x += ua * psi_x;
            du.u_y += ua * psi_y;
            du.v_x += va * psi_x;
            du.v_y += va * psi_y;
        }
        (u, du)
    }

    /// The node with the largest shape function value at `q`, ties going to the lowest index.
    pub fn dominant_node(&self, q: usize) -> usize {
        let mut best = 0;
        for a in 1..4 {
            if self.psi[q][a] > self.psi[q][best] {
                best = a;
            }
        }
        best
    }
}

/// Two-point Gauss rule along one side of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct SideQuadrature {
    /// Element shape function values at the side quadrature points.
    pub psi: [Matrix1x4<f64>; 2],
    /// Weights scaled by half the side length.
    pub weights: [f64; 2],
    /// Outward unit normal.
    pub normal: Vector2<f64>,
}

impl SideQuadrature {
    /// Side `side` joins vertices `side` and `side + 1 (mod 4)`.
    pub fn new(element: &Quad4Element<f64>, side: usize) -> Self {
        debug_assert!(side < 4, "a quadrilateral has 4 sides");
        let (a, b) = (side, (side + 1) % 4);
        let reference = Quad4Element::<f64>::reference();
        let (ref_a, ref_b) = (reference.vertices()[a], reference.vertices()[b]);

        let edge = element.vertices()[b] - element.vertices()[a];
        let length = edge.norm();
        let (weights_1d, points_1d) = gauss_line_2();

        let mut psi = [Matrix1x4::zeros(); 2];
        let mut weights = [0.0; 2];
        for k in 0..2 {
            let t = points_1d[k];
            let xi = Point2::from(ref_a.coords * (0.5 * (1.0 - t)) + ref_b.coords * (0.5 * (1.0 + t)));
            psi[k] = element.evaluate_basis(&xi);
            weights[k] = weights_1d[k] * 0.5 * length;
        }

        Self {
            psi,
            weights,
            normal: Vector2::new(edge.y, -edge.x) / length,
        }
    }

    /// The two element-local vertices of the side.
    pub fn vertices(side: usize) -> [usize; 2] {
        [side, (side + 1) % 4]
    }
}
