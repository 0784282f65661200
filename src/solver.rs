//! The nonlinear SSA solve.
//!
//! [`SsaSolver`] is a small state machine:
//!
//! ```text
//! Idle --prepare--> CoefficientsCached --solve--> Solving --> Done
//!  ^                                                           |
//!  +-------------------------- invalidate ---------------------+
//! ```
//!
//! `prepare` interpolates the physical inputs to quadrature points once; any number of solves
//! (for instance a retry with relaxed tolerances) can then reuse the cached coefficients.
//! The residual and Jacobian are handed to the Newton-Krylov driver through the
//! [`NonlinearSystem`] trait, implemented by a private adapter that borrows the solver's
//! grid, DOF map and cache for the duration of one solve.
use crate::assembly::{ElementBuffers, SsaAssembler};
use crate::coefficients::CoefficientCache;
use crate::comm::{owned_dot, owned_norm, Communicator, SerialCommunicator};
use crate::config::{NewtonConfig, SsaConfig};
use crate::dofmap::{DirichletData, DofMap};
use crate::error::InputError;
use crate::fields::InputFields;
use crate::grid::Grid;
use crate::nalgebra::{DVector, DVectorView, DVectorViewMut};
use eyre::WrapErr;
use log::{debug, info, trace, warn};
use nalgebra_sparse::CsrMatrix;
use ssafem_optimize::krylov::{solve_newton_krylov, NonlinearSystem};
use ssafem_optimize::newton::NewtonErrorKind;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SolverState {
    Idle,
    CoefficientsCached,
    Solving,
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TerminationKind {
    Converged,
    MaxIterationsExceeded,
    LineSearchFailure,
    LinearSolveFailure,
    Diverged,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationKind::Converged => "converged",
            TerminationKind::MaxIterationsExceeded => "max-iterations-exceeded",
            TerminationKind::LineSearchFailure => "line-search-failure",
            TerminationKind::LinearSolveFailure => "linear-solve-failure",
            TerminationKind::Diverged => "diverged",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one solve attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationReason {
    kind: TerminationKind,
    detail: String,
}

impl TerminationReason {
    pub fn new(kind: TerminationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> TerminationKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn succeeded(&self) -> bool {
        self.kind == TerminationKind::Converged
    }

    fn from_newton_error(kind: &NewtonErrorKind) -> Self {
        let termination_kind = match kind {
            NewtonErrorKind::MaximumIterationsReached(_) => TerminationKind::MaxIterationsExceeded,
            NewtonErrorKind::JacobianError(_) => TerminationKind::LinearSolveFailure,
            NewtonErrorKind::LineSearchError(_) => TerminationKind::LineSearchFailure,
            NewtonErrorKind::Diverged => TerminationKind::Diverged,
        };
        Self::new(termination_kind, kind.to_string())
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Velocity and diagnostics of the latest solve attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaSolution {
    /// Interleaved `(u, v)` per node.
    pub velocity: DVector<f64>,
    pub reason: TerminationReason,
    pub newton_iterations: usize,
    pub linear_iterations: usize,
    pub initial_residual_norm: f64,
    pub residual_norm: f64,
}

#[derive(Debug)]
pub struct SsaSolver<C: Communicator = SerialCommunicator> {
    grid: Grid,
    config: SsaConfig,
    comm: C,
    dofs: DofMap,
    cache: CoefficientCache,
    state: SolverState,
    /// Initial guess of the next solve.
    velocity: DVector<f64>,
    buffers: ElementBuffers,
    solution: Option<SsaSolution>,
}

impl SsaSolver<SerialCommunicator> {
    pub fn new(grid: Grid, config: SsaConfig) -> eyre::Result<Self> {
        Self::with_communicator(grid, config, SerialCommunicator)
    }
}

impl<C: Communicator> SsaSolver<C> {
    pub fn with_communicator(grid: Grid, config: SsaConfig, comm: C) -> eyre::Result<Self> {
        config.validate().wrap_err("failed to create SSA solver")?;
        let dofs = DofMap::new(&grid, &DirichletData::none(grid.num_nodes()))?;
        let velocity = DVector::zeros(grid.num_dofs());
        Ok(Self {
            grid,
            config,
            comm,
            dofs,
            cache: CoefficientCache::new(),
            state: SolverState::Idle,
            velocity,
            buffers: ElementBuffers::default(),
            solution: None,
        })
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &SsaConfig {
        &self.config
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dofs
    }

    pub fn coefficients(&self) -> &CoefficientCache {
        &self.cache
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Replaces the Dirichlet boundary data and rebuilds the DOF map.
    pub fn set_dirichlet(&mut self, dirichlet: &DirichletData) -> eyre::Result<()> {
        self.dofs = DofMap::new(&self.grid, dirichlet).wrap_err("failed to set Dirichlet data")?;
        if self.state == SolverState::Done {
            self.state = SolverState::CoefficientsCached;
        }
        Ok(())
    }

    /// Sets the initial guess of the next solve.
    ///
    /// By default a solve starts from the final iterate of the previous one, or from zero.
    pub fn set_initial_guess(&mut self, velocity: DVector<f64>) -> eyre::Result<()> {
        if velocity.len() != self.grid.num_dofs() {
            return Err(InputError::SizeMismatch {
                field: "velocity",
                expected: self.grid.num_dofs(),
                actual: velocity.len(),
            })
            .wrap_err("failed to set initial guess");
        }
        self.velocity = velocity;
        Ok(())
    }

    /// Validates the physical inputs and caches coefficients at quadrature points.
    pub fn prepare(&mut self, inputs: &InputFields) -> eyre::Result<()> {
        self.state = SolverState::Idle;
        let fields = inputs
            .validate(&self.grid)
            .wrap_err("failed to prepare SSA coefficients")?;
        let front = self.config.front_parameters();
        self.cache
            .rebuild(&self.grid, &fields, front.as_ref())
            .wrap_err("failed to prepare SSA coefficients")?;

        // Collective: every rank reaches it regardless of the log level
        let max_thickness = self
            .comm
            .max(fields.thickness.iter().copied().fold(0.0, f64::max));
        debug!(
            "Prepared SSA coefficients on {}x{} grid, max thickness {:.1}",
            self.grid.mx(),
            self.grid.my(),
            max_thickness
        );
        self.state = SolverState::CoefficientsCached;
        Ok(())
    }

    /// Marks the cached coefficients as stale; `prepare` must be called before the next solve.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
        self.state = SolverState::Idle;
    }

    /// Solves with the configured Newton settings.
    pub fn solve(&mut self) -> eyre::Result<TerminationReason> {
        let settings = self.config.newton;
        self.solve_with(&settings)
    }

    /// Solves with the given Newton settings, reusing the cached coefficients.
    ///
    /// Only a missing `prepare` is an error; every nonlinear or linear failure is reported as a
    /// [`TerminationReason`].
    pub fn solve_with(&mut self, newton: &NewtonConfig) -> eyre::Result<TerminationReason> {
        if !self.cache.is_valid() {
            return Err(InputError::NotPrepared).wrap_err("cannot solve SSA");
        }
        self.state = SolverState::Solving;

        let mut x = self.velocity.clone();
        self.dofs.enforce(&mut x);
        let settings = newton.solver_settings(&self.config.linear);

        let system = SsaSystem {
            assembler: SsaAssembler::new(&self.grid, &self.dofs, &self.cache, &self.config),
            comm: &self.comm,
            ghosted: DVector::zeros(self.grid.num_dofs()),
            buffers: &mut self.buffers,
            monitor: self.config.monitor,
        };
        let report = solve_newton_krylov(system, &mut x, &settings);

        let (reason, output) = match &report.result {
            Ok(output) => {
                let reason = TerminationReason::new(
                    TerminationKind::Converged,
                    format!(
                        "residual norm reduced from {:.3e} to {:.3e} in {} Newton iterations",
                        output.initial_residual_norm, output.residual_norm, output.iterations
                    ),
                );
                (reason, *output)
            }
            Err(err) => (TerminationReason::from_newton_error(&err.kind), err.output),
        };

        if reason.succeeded() {
            info!("SSA solve {} ({} linear iterations)", reason, report.linear_iterations);
        } else {
            warn!(
                "SSA solve did not converge after {} Newton iterations: {}",
                output.iterations, reason
            );
        }

        self.velocity.copy_from(&x);
        self.solution = Some(SsaSolution {
            velocity: x,
            reason: reason.clone(),
            newton_iterations: output.iterations,
            linear_iterations: report.linear_iterations,
            initial_residual_norm: output.initial_residual_norm,
            residual_norm: output.residual_norm,
        });
        self.state = SolverState::Done;
        Ok(reason)
    }

    /// The latest solve attempt, or `None` before the first solve.
    pub fn result(&self) -> Option<&SsaSolution> {
        self.solution.as_ref()
    }

    /// An assembler over the cached coefficients, e.g. to evaluate residuals outside a solve.
    pub fn assembler(&self) -> eyre::Result<SsaAssembler<'_>> {
        if !self.cache.is_valid() {
            return Err(InputError::NotPrepared).wrap_err("cannot assemble SSA system");
        }
        Ok(SsaAssembler::new(&self.grid, &self.dofs, &self.cache, &self.config))
    }
}

/// Binds the assemblers to one solve for the Newton-Krylov driver.
struct SsaSystem<'a, C> {
    assembler: SsaAssembler<'a>,
    comm: &'a C,
    /// Copy of the current iterate with refreshed ghost values.
    ghosted: DVector<f64>,
    buffers: &'a mut ElementBuffers,
    monitor: bool,
}

impl<'a, C: Communicator> SsaSystem<'a, C> {
    fn refresh_ghosts(&mut self, x: &DVectorView<f64>) {
        self.ghosted.copy_from(x);
        self.comm.update_ghosts(self.assembler.grid(), &mut self.ghosted);
    }
}

impl<'a, C: Communicator> NonlinearSystem<f64> for SsaSystem<'a, C> {
    fn dimension(&self) -> usize {
        self.assembler.num_dofs()
    }

    fn evaluate_residual(&mut self, mut residual: DVectorViewMut<f64>, x: DVectorView<f64>) {
        self.refresh_ghosts(&x);
        self.assembler.assemble_residual_into(
            DVectorViewMut::from(&mut residual),
            DVectorView::from(&self.ghosted),
            self.buffers,
        );
        if self.monitor {
            let norm = owned_norm(self.comm, self.assembler.grid(), residual.as_slice());
            trace!("SSA residual norm {:.6e}", norm);
        }
    }

    fn create_jacobian(&self) -> CsrMatrix<f64> {
        self.assembler.create_jacobian()
    }

    fn evaluate_jacobian(&mut self, jacobian: &mut CsrMatrix<f64>, x: DVectorView<f64>) {
        self.refresh_ghosts(&x);
        self.assembler
            .assemble_jacobian_into(jacobian, DVectorView::from(&self.ghosted), self.buffers);
        if self.monitor {
            let local: f64 = jacobian.values().iter().map(|v| v * v).sum();
            let diagonal_min = jacobian
                .diagonal_as_csr()
                .values()
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);
            let frobenius = self.comm.sum(local).sqrt();
            let diagonal_min = -self.comm.max(-diagonal_min);
            trace!(
                "SSA Jacobian Frobenius norm {:.6e}, smallest diagonal entry {:.6e}",
                frobenius,
                diagonal_min
            );
        }
    }

    fn inner_product(&self, a: DVectorView<f64>, b: DVectorView<f64>) -> f64 {
        owned_dot(self.comm, self.assembler.grid(), a.as_slice(), b.as_slice())
    }

    fn update_ghosts(&self, x: &mut DVector<f64>) {
        self.comm.update_ghosts(self.assembler.grid(), x);
    }
}
