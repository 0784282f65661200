use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use ssafem_sparse::Real;
use std::error::Error;

/// A function `F: R^n -> R^m`, evaluated into a caller-provided buffer.
pub trait VectorFunction<T>
where
    T: Real,
{
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>);

    /// Inner product on the range of `F`, used for every residual norm a solver computes.
    ///
    /// Functions whose vectors are distributed over several processes must reduce over all of
    /// them, counting each entry once.
    fn inner_product(&self, a: &DVectorView<T>, b: &DVectorView<T>) -> T {
        a.dot(b)
    }

    fn norm(&self, v: &DVectorView<T>) -> T {
        self.inner_product(v, v).sqrt()
    }
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Real,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        X::eval_into(self, f, x)
    }

    fn inner_product(&self, a: &DVectorView<T>, b: &DVectorView<T>) -> T {
        X::inner_product(self, a, b)
    }
}

/// A vector function which is able to solve linear systems with its own Jacobian.
///
/// Newton's method only ever needs `J(x)^{-1} r`, so implementors are free to pick how the
/// Jacobian is represented and inverted (dense LU, sparse Krylov, ...).
pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Real,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>>;
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Real,
    X: DifferentiableVectorFunction<T>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

/// Builds a [`VectorFunction`] (and optionally a [`DifferentiableVectorFunction`]) from closures.
#[derive(Debug, Clone)]
pub struct VectorFunctionBuilder {
    dimension: usize,
}

#[derive(Debug, Clone)]
pub struct ConcreteVectorFunction<F, J> {
    dimension: usize,
    function: F,
    jacobian_solver: J,
}

impl VectorFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_function<F, T>(self, function: F) -> ConcreteVectorFunction<F, ()>
    where
        T: Scalar,
        F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function,
            jacobian_solver: (),
        }
    }
}

impl<F> ConcreteVectorFunction<F, ()> {
    pub fn with_jacobian_solver<J, T>(self, jacobian_solver: J) -> ConcreteVectorFunction<F, J>
    where
        T: Scalar,
        J: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>, &DVectorView<T>) -> Result<(), Box<dyn Error>>,
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function: self.function,
            jacobian_solver,
        }
    }
}

impl<F, J, T> VectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Real,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        (self.function)(f, x)
    }
}

impl<F, J, T> DifferentiableVectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Real,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    J: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>, &DVectorView<T>) -> Result<(), Box<dyn Error>>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        (self.jacobian_solver)(sol, x, rhs)
    }
}

/// Approximates the Jacobian of a vector function evaluated at `x`, using
/// central finite differences with step `h`.
///
/// Column `j` is `(F(x + h e_j) - F(x - h e_j)) / 2h`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_jacobian<T>(mut f: impl VectorFunction<T>, x: &DVector<T>, h: &T) -> DMatrix<T>
where
    T: Real,
{
    let out_dim = f.dimension();
    let in_dim = x.len();

    let mut result = DMatrix::zeros(out_dim, in_dim);
    let mut x_shifted = x.clone();
    let mut f_plus = DVector::zeros(out_dim);
    let mut f_minus = DVector::zeros(out_dim);

    for j in 0..in_dim {
        x_shifted[j] = x[j] + *h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_plus), &DVectorView::from(&x_shifted));
        x_shifted[j] = x[j] - *h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_minus), &DVectorView::from(&x_shifted));
        x_shifted[j] = x[j];

        let mut column_j = result.column_mut(j);
        column_j.copy_from(&f_plus);
        column_j -= &f_minus;
        column_j /= 2.0 * *h;
    }

    result
}

/// Central finite-difference derivative of a scalar function of one variable.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_derivative<T>(mut f: impl FnMut(T) -> T, x: T, h: T) -> T
where
    T: Real,
{
    (f(x + h) - f(x - h)) / (2.0 * h)
}
