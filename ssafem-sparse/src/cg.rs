//! Preconditioned conjugate gradient for symmetric positive definite operators.
//!
//! The SSA Newton matrix is the Hessian of a convex functional with Dirichlet rows and
//! columns replaced by a scaled identity, so it is symmetric positive definite and CG is
//! the natural Krylov method for the inner linear solves.
use crate::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt;

/// An operator `y = A x` on dense vectors.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: Real> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(Box::from(format!(
                "dimension mismatch: {}x{} operator applied to vector of length {} (output length {})",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )));
        }
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

impl<T: Real> LinearOperator<T> for DMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

/// The identity, used as the default (absent) preconditioner.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// The inner product CG measures residuals and search directions with.
///
/// When the vectors are distributed, an implementation must reduce over all ranks and must
/// count every global entry exactly once.
pub trait InnerProduct<T: Scalar> {
    fn dot(&self, a: DVectorView<T>, b: DVectorView<T>) -> T;
}

impl<'a, T, I> InnerProduct<T> for &'a I
where
    T: Scalar,
    I: ?Sized + InnerProduct<T>,
{
    fn dot(&self, a: DVectorView<T>, b: DVectorView<T>) -> T {
        <I as InnerProduct<T>>::dot(self, a, b)
    }
}

/// The standard dot product on vectors held entirely by one process.
#[derive(Debug, Copy, Clone, Default)]
pub struct EuclideanInnerProduct;

impl<T: Real> InnerProduct<T> for EuclideanInnerProduct {
    fn dot(&self, a: DVectorView<T>, b: DVectorView<T>) -> T {
        a.dot(&b)
    }
}

/// Convergence test `||r|| <= max(relative * ||b||, absolute)` on the recursively updated residual.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResidualTolerance<T> {
    pub relative: T,
    pub absolute: T,
}

impl<T: Real> ResidualTolerance<T> {
    pub fn relative(relative: T) -> Self {
        Self {
            relative,
            absolute: T::zero(),
        }
    }

    fn threshold(&self, b_norm: T) -> T {
        (self.relative * b_norm).max(self.absolute)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum CgErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    NonFiniteResidual,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for CgErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "error applying preconditioner: {}", err),
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::NonFiniteResidual => write!(f, "residual became non-finite"),
            Self::MaxIterationsReached { max_iter } => write!(f, "max iterations ({}) reached", max_iter),
        }
    }
}

#[derive(Debug)]
pub struct CgError {
    pub output: CgOutput,
    pub kind: CgErrorKind,
}

impl fmt::Display for CgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG failed after {} iterations: {}", self.output.num_iterations, self.kind)
    }
}

impl Error for CgError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CgOutput {
    /// Number of updates made to the solution vector.
    pub num_iterations: usize,
}

/// Reusable work vectors, so that repeated Newton steps do not reallocate.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace<T: Scalar> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

impl<T: Real> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl<T: Real> CgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for v in [&mut self.r, &mut self.z, &mut self.p, &mut self.Ap] {
            if v.len() != dim {
                *v = DVector::zeros(dim);
            }
        }
    }
}

/// Conjugate gradient solver, configured builder-style.
///
/// ```ignore
/// let output = ConjugateGradient::new()
///     .with_operator(&matrix)
///     .with_preconditioner(JacobiPreconditioner::from_csr(&matrix))
///     .with_tolerance(ResidualTolerance::relative(1e-10))
///     .solve_with_guess(&b, &mut x)?;
/// ```
#[derive(Debug)]
pub struct ConjugateGradient<'a, T: Scalar, A, P, I = EuclideanInnerProduct> {
    workspace: Option<&'a mut CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    inner_product: I,
    tolerance: ResidualTolerance<T>,
    max_iter: Option<usize>,
}

impl<'a, T: Real> ConjugateGradient<'a, T, (), IdentityOperator> {
    pub fn new() -> Self {
        Self {
            workspace: None,
            operator: (),
            preconditioner: IdentityOperator,
            inner_product: EuclideanInnerProduct,
            tolerance: ResidualTolerance::relative(T::from_f64(1e-8).expect("literal must fit in T")),
            max_iter: None,
        }
    }

    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: Some(workspace),
            ..Self::new()
        }
    }
}

impl<'a, T: Real, P, I> ConjugateGradient<'a, T, (), P, I> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P, I> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            inner_product: self.inner_product,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, T: Real, A, P, I> ConjugateGradient<'a, T, A, P, I> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2, I> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            inner_product: self.inner_product,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    /// Replaces the Euclidean dot product used for all norms and step lengths.
    pub fn with_inner_product<I2>(self, inner_product: I2) -> ConjugateGradient<'a, T, A, P, I2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            inner_product,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_tolerance(self, tolerance: ResidualTolerance<T>) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, T, A, P, I> ConjugateGradient<'a, T, A, P, I>
where
    T: Real,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    I: InnerProduct<T>,
{
    /// Solves `A x = b`, using the content of `x` as initial guess.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput, CgError> {
        let mut owned_workspace = None;
        let ws = match self.workspace.as_deref_mut() {
            Some(ws) => ws,
            None => owned_workspace.get_or_insert_with(CgWorkspace::default),
        };
        solve_pcg(
            &self.operator,
            &self.preconditioner,
            &self.inner_product,
            self.tolerance,
            self.max_iter,
            ws,
            b.into(),
            x.into(),
        )
    }
}

#[allow(non_snake_case, clippy::too_many_arguments)]
fn solve_pcg<T, A, P, I>(
    a: &A,
    preconditioner: &P,
    inner_product: &I,
    tolerance: ResidualTolerance<T>,
    max_iter: Option<usize>,
    ws: &mut CgWorkspace<T>,
    b: DVectorView<T>,
    mut x: DVectorViewMut<T>,
) -> Result<CgOutput, CgError>
where
    T: Real,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    I: InnerProduct<T>,
{
    use CgErrorKind::*;
    assert_eq!(b.len(), x.len(), "right-hand side and solution must have the same length");

    let mut output = CgOutput::default();
    let fail = |output: CgOutput, kind| Err(CgError { output, kind });

    ws.resize(x.len());
    let CgWorkspace { r, z, p, Ap } = ws;
    let dot = |u: &DVector<T>, v: &DVector<T>| inner_product.dot(DVectorView::from(u), DVectorView::from(v));

    let b_norm = inner_product.dot(DVectorView::from(&b), DVectorView::from(&b)).sqrt();
    if b_norm == T::zero() {
        x.fill(T::zero());
        return Ok(output);
    }
    let threshold = tolerance.threshold(b_norm);

    // r = b - A x
    if let Err(err) = a.apply(DVectorViewMut::from(&mut *r), DVectorView::from(&x)) {
        return fail(output, OperatorError(err));
    }
    r.axpy(T::one(), &b, -T::one());

    if let Err(err) = preconditioner.apply(DVectorViewMut::from(&mut *z), DVectorView::from(&*r)) {
        return fail(output, PreconditionerError(err));
    }
    p.copy_from(&*z);
    let mut zTr = dot(&*z, &*r);

    loop {
        let r_norm = dot(&*r, &*r).sqrt();
        if !r_norm.is_finite() {
            return fail(output, NonFiniteResidual);
        }
        if r_norm <= threshold {
            return Ok(output);
        }
        if let Some(max_iter) = max_iter {
            if output.num_iterations >= max_iter {
                return fail(output, MaxIterationsReached { max_iter });
            }
        }
        if zTr <= T::zero() {
            return fail(output, IndefinitePreconditioner);
        }

        if let Err(err) = a.apply(DVectorViewMut::from(&mut *Ap), DVectorView::from(&*p)) {
            return fail(output, OperatorError(err));
        }
        let pAp = dot(&*p, &*Ap);
        if pAp <= T::zero() {
            return fail(output, IndefiniteOperator);
        }

        let alpha = zTr / pAp;
        x.axpy(alpha, &*p, T::one());
        r.axpy(-alpha, &*Ap, T::one());
        output.num_iterations += 1;

        if let Err(err) = preconditioner.apply(DVectorViewMut::from(&mut *z), DVectorView::from(&*r)) {
            return fail(output, PreconditionerError(err));
        }
        let zTr_next = dot(&*z, &*r);
        let beta = zTr_next / zTr;
        // p <- z + beta p
        p.axpy(T::one(), &*z, beta);
        zTr = zTr_next;
    }
}
