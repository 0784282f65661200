use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;
use ssafem_sparse::Real;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Stopping criteria for Newton's method.
///
/// The iteration has converged once
/// ```text
/// |F(x_k)| <= max(absolute_tolerance, relative_tolerance * |F(x_0)|).
/// ```
/// It has diverged if the residual norm becomes non-finite or grows beyond
/// `divergence_tolerance * |F(x_0)|`. Norms are taken with [`VectorFunction::norm`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
    pub divergence_tolerance: Option<T>,
}

impl<T: Real> NewtonSettings<T> {
    fn converged(&self, residual_norm: T, initial_residual_norm: T) -> bool {
        residual_norm <= self.absolute_tolerance.max(self.relative_tolerance * initial_residual_norm)
    }

    fn diverged(&self, residual_norm: T, initial_residual_norm: T) -> bool {
        !residual_norm.is_finite()
            || self
                .divergence_tolerance
                .map(|dtol| residual_norm > dtol * initial_residual_norm)
                .unwrap_or(false)
    }
}

/// Summary of a Newton solve, available both on success and on failure.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutput<T> {
    /// Number of Newton steps taken (i.e. number of updates to `x`).
    pub iterations: usize,
    pub initial_residual_norm: T,
    pub residual_norm: T,
}

#[derive(Debug)]
pub enum NewtonErrorKind {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(Box<dyn Error>),
    /// The line search failed to produce an acceptable step.
    LineSearchError(Box<dyn Error>),
    /// The residual norm became non-finite or grew beyond the divergence tolerance.
    Diverged,
}

impl Display for NewtonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonErrorKind::MaximumIterationsReached(maxit) => {
                write!(f, "failed to converge within maximum number of iterations ({})", maxit)
            }
            NewtonErrorKind::JacobianError(err) => write!(f, "failed to solve Jacobian system: {}", err),
            NewtonErrorKind::LineSearchError(err) => write!(f, "line search failed: {}", err),
            NewtonErrorKind::Diverged => write!(f, "residual norm diverged"),
        }
    }
}

#[derive(Debug)]
pub struct NewtonError<T> {
    pub output: NewtonOutput<T>,
    pub kind: NewtonErrorKind,
}

impl<T: fmt::Debug> Display for NewtonError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "Newton failed after {} iterations (residual norm {:?}): {}",
            self.output.iterations, self.output.residual_norm, self.kind
        )
    }
}

impl<T: fmt::Debug> Error for NewtonError<T> {}

/// Attempts to solve the non-linear equation `F(x) = 0`, taking full Newton steps.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutput<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch {})
}

/// Same as [`newton`], but allows specifying a line search.
///
/// No heap allocation is performed by the iteration itself. On return, `x` holds the last
/// accepted iterate and `f` the residual at `x`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutput<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    function.eval_into(&mut f, &DVectorView::from(&x));
    let initial_residual_norm = function.norm(&DVectorView::from(&f));
    let mut output = NewtonOutput {
        iterations: 0,
        initial_residual_norm,
        residual_norm: initial_residual_norm,
    };
    let fail = |output, kind| Err(NewtonError { output, kind });

    debug!("Newton iter 0: residual norm {:?}", initial_residual_norm);
    if !initial_residual_norm.is_finite() {
        return fail(output, NewtonErrorKind::Diverged);
    }

    while !settings.converged(output.residual_norm, initial_residual_norm) {
        if settings
            .max_iterations
            .map(|max_iter| output.iterations >= max_iter)
            .unwrap_or(false)
        {
            return fail(output, NewtonErrorKind::MaximumIterationsReached(output.iterations));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        minus_dx.fill(T::zero());
        if let Err(err) =
            function.solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f))
        {
            return fail(output, NewtonErrorKind::JacobianError(err));
        }

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;
        let dx = &minus_dx;

        let step_length = match line_search.step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(dx),
        ) {
            Ok(step_length) => step_length,
            Err(err) => return fail(output, NewtonErrorKind::LineSearchError(err)),
        };

        output.iterations += 1;
        output.residual_norm = function.norm(&DVectorView::from(&f));
        debug!(
            "Newton iter {}: residual norm {:?}, step length {:?}",
            output.iterations, output.residual_norm, step_length
        );

        if settings.diverged(output.residual_norm, initial_residual_norm) {
            return fail(output, NewtonErrorKind::Diverged);
        }
    }

    Ok(output)
}

pub trait LineSearch<T: Real, F: VectorFunction<T>> {
    /// Moves `x` along `direction` and leaves the residual at the new `x` in `f`.
    ///
    /// Returns the accepted step length. On error, `x` and `f` must be left at the
    /// starting point.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x));
        Ok(T::one())
    }
}

/// Backtracking line search on the merit function `g(x) = <F(x), F(x)> / 2` with the Armijo
/// sufficient decrease condition.
///
/// Assuming the direction `p` solves the Newton equation, `grad g^T p = -|F|^2`, so the
/// condition reads `g(x + alpha p) <= (1 - 2 c alpha) g(x)`.
/// See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BacktrackingLineSearch<T> {
    pub sufficient_decrease: T,
    pub contraction: T,
    pub min_step: T,
}

impl<T: Real> Default for BacktrackingLineSearch<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            contraction: 0.5,
            min_step: 1e-8,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        let c = self.sufficient_decrease;
        let p = direction;
        let merit = |function: &F, f: &DVectorViewMut<T>| {
            let f = DVectorView::from(f);
            0.5 * function.inner_product(&f, &f)
        };
        let g_initial = merit(&*function, &f);

        // x is always kept at x_0 + alpha_prev * p, so each trial only moves by the
        // difference between consecutive step lengths
        let mut alpha_prev = 0.0;
        let mut alpha = 1.0;

        loop {
            x.axpy(alpha - alpha_prev, &p, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x));

            let g = merit(&*function, &f);
            // A non-finite merit value (e.g. a trial point where the material law overflows)
            // is treated as insufficient decrease
            if g.is_finite() && g <= (1.0 - 2.0 * c * alpha) * g_initial {
                return Ok(alpha);
            }

            alpha_prev = alpha;
            alpha *= self.contraction;
            if alpha < self.min_step {
                x.axpy(-alpha_prev, &p, T::one());
                function.eval_into(&mut f, &DVectorView::from(&x));
                return Err(Box::from(format!(
                    "no sufficient decrease for step lengths down to {:?} (minimum {:?})",
                    alpha_prev, self.min_step
                )));
            }
        }
    }
}
