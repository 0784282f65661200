//! Bilinear quadrilateral element geometry.
use crate::nalgebra::{Matrix1x4, Matrix2, Matrix2x4, OPoint, Point2, RealField, Scalar, Vector2};
use numeric_literals::replace_float_literals;

/// Bilinear (Q1) quadrilateral in 2D.
///
/// Vertices are ordered counter-clockwise, matching the reference element
/// `(-1, -1), (1, -1), (1, 1), (-1, 1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Quad4Element<T>
where
    T: Scalar,
{
    vertices: [Point2<T>; 4],
}

impl<T> Quad4Element<T>
where
    T: Scalar,
{
    pub fn from_vertices(vertices: [Point2<T>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point2<T>; 4] {
        &self.vertices
    }
}

impl<T> Quad4Element<T>
where
    T: RealField + Copy,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn reference() -> Self {
        Self::from_vertices([
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0),
        ])
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn evaluate_basis(&self, xi: &Point2<T>) -> Matrix1x4<T> {
        // N_{alpha, beta}(xi) = 1 at the reference vertex (alpha, beta)
        let phi = |alpha, beta, xi: &Point2<T>| (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0;
        Matrix1x4::from_row_slice(&[
            phi(-1.0, -1.0, xi),
            phi( 1.0, -1.0, xi),
            phi( 1.0,  1.0, xi),
            phi(-1.0,  1.0, xi),
        ])
    }

    /// Reference gradients, one column per basis function.
    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn gradients(&self, xi: &Point2<T>) -> Matrix2x4<T> {
        let phi_grad = |alpha, beta, xi: &Point2<T>|
            Vector2::new(
                alpha * (1.0 + beta * xi[1]) / 4.0,
                beta * (1.0 + alpha * xi[0]) / 4.0,
            );

        Matrix2x4::from_columns(&[
            phi_grad(-1.0, -1.0, xi),
            phi_grad( 1.0, -1.0, xi),
            phi_grad( 1.0,  1.0, xi),
            phi_grad(-1.0,  1.0, xi),
        ])
    }

    #[allow(non_snake_case)]
    pub fn map_reference_coords(&self, xi: &Point2<T>) -> Point2<T> {
        let X: Matrix2x4<T> = Matrix2x4::from_fn(|i, j| self.vertices[j][i]);
        let N = self.evaluate_basis(xi);
        OPoint::from(X * N.transpose())
    }

    #[allow(non_snake_case)]
    pub fn reference_jacobian(&self, xi: &Point2<T>) -> Matrix2<T> {
        let X: Matrix2x4<T> = Matrix2x4::from_fn(|i, j| self.vertices[j][i]);
        let G = self.gradients(xi);
        X * G.transpose()
    }

    /// Physical gradients `grad phi = J^{-T} grad_xi phi` together with `det J`.
    ///
    /// Returns `None` if the element is degenerate or inverted at `xi`, i.e. `det J` is not
    /// strictly positive and finite.
    #[allow(non_snake_case)]
    pub fn physical_gradients(&self, xi: &Point2<T>) -> Option<(Matrix2x4<T>, T)> {
        let J = self.reference_jacobian(xi);
        let det_J = J.determinant();
        if !(det_J > T::zero()) || !det_J.is_finite() {
            return None;
        }
        let J_inv_t = J.try_inverse()?.transpose();
        Some((J_inv_t * self.gradients(xi), det_J))
    }

    /// Area of the element, computed with the shoelace formula.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn area(&self) -> T {
        let v = &self.vertices;
        let mut twice_area = T::zero();
        for a in 0..4 {
            let b = (a + 1) % 4;
            twice_area += v[a].x * v[b].y - v[b].x * v[a].y;
        }
        twice_area / 2.0
    }
}
