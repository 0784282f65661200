//! Newton-Krylov: Newton's method where each Jacobian system is solved with preconditioned
//! conjugate gradient on an assembled sparse Jacobian.
use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::newton::{
    newton_line_search, BacktrackingLineSearch, NewtonError, NewtonOutput, NewtonSettings, NoLineSearch,
};
use log::trace;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use ssafem_sparse::cg::{CgWorkspace, ConjugateGradient, InnerProduct, LinearOperator, ResidualTolerance};
use ssafem_sparse::preconditioner::JacobiPreconditioner;
use ssafem_sparse::Real;
use std::cell::RefCell;
use std::error::Error;

/// A discrete nonlinear system `F(x) = 0` with a sparse Jacobian.
///
/// This is the callback contract between a discretization and the Newton-Krylov driver: the
/// driver decides at which iterates the system is evaluated, the system only assembles.
/// `evaluate_jacobian` is always called at the iterate of the most recent
/// `evaluate_residual` call.
pub trait NonlinearSystem<T: Real> {
    fn dimension(&self) -> usize;

    fn evaluate_residual(&mut self, residual: DVectorViewMut<T>, x: DVectorView<T>);

    /// Allocates a matrix with the sparsity pattern expected by [`evaluate_jacobian`].
    ///
    /// [`evaluate_jacobian`]: Self::evaluate_jacobian
    fn create_jacobian(&self) -> CsrMatrix<T>;

    /// Overwrites the values of `jacobian`, whose pattern was produced by
    /// [`create_jacobian`](Self::create_jacobian).
    fn evaluate_jacobian(&mut self, jacobian: &mut CsrMatrix<T>, x: DVectorView<T>);

    /// Inner product used for every norm and dot product of the solve.
    ///
    /// A system distributed over several processes sums over the entries it owns and reduces
    /// the result over all processes.
    fn inner_product(&self, a: DVectorView<T>, b: DVectorView<T>) -> T {
        a.dot(&b)
    }

    /// Brings the entries of `x` that this process reads but does not own up to date, before
    /// the Jacobian is applied to `x`.
    fn update_ghosts(&self, _x: &mut DVector<T>) {}
}

impl<T: Real, S: ?Sized + NonlinearSystem<T>> NonlinearSystem<T> for &mut S {
    fn dimension(&self) -> usize {
        S::dimension(self)
    }

    fn evaluate_residual(&mut self, residual: DVectorViewMut<T>, x: DVectorView<T>) {
        S::evaluate_residual(self, residual, x)
    }

    fn create_jacobian(&self) -> CsrMatrix<T> {
        S::create_jacobian(self)
    }

    fn evaluate_jacobian(&mut self, jacobian: &mut CsrMatrix<T>, x: DVectorView<T>) {
        S::evaluate_jacobian(self, jacobian, x)
    }

    fn inner_product(&self, a: DVectorView<T>, b: DVectorView<T>) -> T {
        S::inner_product(self, a, b)
    }

    fn update_ghosts(&self, x: &mut DVector<T>) {
        S::update_ghosts(self, x)
    }
}

/// The assembled Jacobian as seen by CG: ghost entries of the input are refreshed before
/// every product.
struct JacobianOperator<'a, T: Real, S> {
    system: &'a S,
    jacobian: &'a CsrMatrix<T>,
    ghosted: &'a RefCell<DVector<T>>,
}

impl<'a, T: Real, S: NonlinearSystem<T>> LinearOperator<T> for JacobianOperator<'a, T, S> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let mut ghosted = self.ghosted.borrow_mut();
        ghosted.copy_from(&x);
        self.system.update_ghosts(&mut ghosted);
        LinearOperator::apply(self.jacobian, y, DVectorView::from(&*ghosted))
    }
}

struct SystemInnerProduct<'a, S>(&'a S);

impl<'a, T: Real, S: NonlinearSystem<T>> InnerProduct<T> for SystemInnerProduct<'a, S> {
    fn dot(&self, a: DVectorView<T>, b: DVectorView<T>) -> T {
        self.0.inner_product(a, b)
    }
}

/// Settings for the inner (linear) Krylov solves.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinearSolverSettings<T> {
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewtonKrylovSettings<T> {
    pub newton: NewtonSettings<T>,
    pub linear: LinearSolverSettings<T>,
    /// `None` takes full Newton steps.
    pub line_search: Option<BacktrackingLineSearch<T>>,
}

/// Outcome of [`solve_newton_krylov`].
///
/// The linear iteration count is reported whether or not Newton succeeded.
#[derive(Debug)]
pub struct NewtonKrylovReport<T> {
    pub result: Result<NewtonOutput<T>, NewtonError<T>>,
    pub linear_iterations: usize,
}

/// Adapts a [`NonlinearSystem`] to the [`DifferentiableVectorFunction`] interface used by
/// [`newton_line_search`], solving Jacobian systems with Jacobi-preconditioned CG.
pub struct KrylovAdapter<'a, T: Real, S> {
    system: S,
    jacobian: CsrMatrix<T>,
    workspace: &'a mut CgWorkspace<T>,
    ghosted: RefCell<DVector<T>>,
    settings: LinearSolverSettings<T>,
    linear_iterations: usize,
}

impl<'a, T: Real, S: NonlinearSystem<T>> KrylovAdapter<'a, T, S> {
    pub fn new(system: S, workspace: &'a mut CgWorkspace<T>, settings: LinearSolverSettings<T>) -> Self {
        let jacobian = system.create_jacobian();
        let ghosted = RefCell::new(DVector::zeros(system.dimension()));
        Self {
            system,
            jacobian,
            workspace,
            ghosted,
            settings,
            linear_iterations: 0,
        }
    }

    pub fn linear_iterations(&self) -> usize {
        self.linear_iterations
    }
}

impl<'a, T: Real, S: NonlinearSystem<T>> VectorFunction<T> for KrylovAdapter<'a, T, S> {
    fn dimension(&self) -> usize {
        self.system.dimension()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        self.system
            .evaluate_residual(DVectorViewMut::from(&mut *f), DVectorView::from(x))
    }

    fn inner_product(&self, a: &DVectorView<T>, b: &DVectorView<T>) -> T {
        self.system
            .inner_product(DVectorView::from(a), DVectorView::from(b))
    }
}

impl<'a, T: Real, S: NonlinearSystem<T>> DifferentiableVectorFunction<T> for KrylovAdapter<'a, T, S> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        self.system
            .evaluate_jacobian(&mut self.jacobian, DVectorView::from(x));
        let preconditioner = JacobiPreconditioner::from_csr(&self.jacobian);
        let tolerance = ResidualTolerance {
            relative: self.settings.relative_tolerance,
            absolute: self.settings.absolute_tolerance,
        };

        let operator = JacobianOperator {
            system: &self.system,
            jacobian: &self.jacobian,
            ghosted: &self.ghosted,
        };
        let mut cg = ConjugateGradient::with_workspace(&mut *self.workspace)
            .with_operator(operator)
            .with_preconditioner(preconditioner)
            .with_inner_product(SystemInnerProduct(&self.system))
            .with_tolerance(tolerance);
        if let Some(max_iter) = self.settings.max_iterations {
            cg = cg.with_max_iter(max_iter);
        }

        match cg.solve_with_guess(DVectorView::from(rhs), DVectorViewMut::from(&mut *sol)) {
            Ok(output) => {
                trace!("CG converged in {} iterations", output.num_iterations);
                self.linear_iterations += output.num_iterations;
                Ok(())
            }
            Err(err) => {
                self.linear_iterations += err.output.num_iterations;
                Err(Box::new(err))
            }
        }
    }
}

/// Solves `F(x) = 0` starting from the content of `x`.
///
/// Entries of `x` that the system pins through identity rows of its Jacobian (and
/// matching residual rows) are left untouched as long as they already satisfy `F = 0`
/// there.
pub fn solve_newton_krylov<T, S>(
    system: S,
    x: &mut DVector<T>,
    settings: &NewtonKrylovSettings<T>,
) -> NewtonKrylovReport<T>
where
    T: Real,
    S: NonlinearSystem<T>,
{
    let n = system.dimension();
    assert_eq!(x.len(), n, "initial guess has wrong dimension");

    let mut workspace = CgWorkspace::default();
    let mut adapter = KrylovAdapter::new(system, &mut workspace, settings.linear);
    let mut f = DVector::zeros(n);
    let mut dx = DVector::zeros(n);

    let result = match &settings.line_search {
        Some(line_search) => newton_line_search(
            &mut adapter,
            x,
            &mut f,
            &mut dx,
            settings.newton,
            &mut line_search.clone(),
        ),
        None => newton_line_search(&mut adapter, x, &mut f, &mut dx, settings.newton, &mut NoLineSearch),
    };

    NewtonKrylovReport {
        result,
        linear_iterations: adapter.linear_iterations(),
    }
}
